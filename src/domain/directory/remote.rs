use super::{DirectoryCommand, DirectoryError, DirectoryMap, DirectoryReply, DirectoryService};
use crate::domain::node::{ConnectorFactory, KnowledgeBase};
use crate::library::communication::node::{ConnectorError, NodeConnector};
use crate::library::communication::{Message, Payload};
use async_trait::async_trait;
use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Recipient id of directory nodes
pub const DIRECTORY_RECIPIENT_ID: &str = "directory";

/// Stub translating [`DirectoryCommands`](DirectoryCommand) into requests on a connected connector
pub struct DirectoryClient<'a> {
    connector: &'a NodeConnector,
    conversation_id: String,
}

impl<'a> DirectoryClient<'a> {
    /// Creates a stub which sends over `connector` as part of the given conversation
    pub fn new(connector: &'a NodeConnector, conversation_id: impl Into<String>) -> Self {
        Self {
            connector,
            conversation_id: conversation_id.into(),
        }
    }

    /// Sends the command and waits for the directory's reply
    ///
    /// Errors reported by the directory node are returned as [`DirectoryError::Remote`].
    pub async fn call(&self, command: &DirectoryCommand) -> Result<DirectoryReply, DirectoryError> {
        trace!("Forwarding {} to {}", command.operation(), self.connector.name());

        let request = Message::new(
            self.conversation_id.as_str(),
            self.connector.name(),
            DIRECTORY_RECIPIENT_ID,
            self.connector.next_request_id(),
            Ok(Payload::encode(command)?),
        );

        let reply = self.connector.write(request).await.map_err(|e| match e {
            ConnectorError::Remote(remote) => DirectoryError::Remote(remote),
            other => DirectoryError::Connector(other),
        })?;

        Ok(reply.decode()?)
    }
}

/// Directory living on a directory node, reached through a [`NodeConnector`]
///
/// Every operation connects, forwards the call and disconnects again. Calls are serialized
/// since the connector holds at most one connection.
pub struct RemoteDirectory {
    connector: NodeConnector,
    factory: ConnectorFactory,
    calls: AtomicU64,
    lock: Mutex<()>,
}

impl RemoteDirectory {
    /// Creates a proxy for the directory node `connector` points at
    ///
    /// Connectors returned by [`lookup`](DirectoryService::lookup) are built with `factory`.
    pub fn new(connector: NodeConnector, factory: ConnectorFactory) -> Self {
        Self {
            connector,
            factory,
            calls: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    /// Connector of the directory node
    pub fn connector(&self) -> &NodeConnector {
        &self.connector
    }

    async fn forward(&self, command: DirectoryCommand) -> Result<DirectoryReply, DirectoryError> {
        let _guard = self.lock.lock().await;

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let conversation_id = format!("{}-{}", self.connector.name(), call);

        self.connector.open().await?;
        let outcome = DirectoryClient::new(&self.connector, conversation_id)
            .call(&command)
            .await;
        self.connector.disconnect().await;

        outcome
    }

    async fn forward_expecting_done(&self, command: DirectoryCommand) -> Result<(), DirectoryError> {
        let operation = command.operation();

        match self.forward(command).await? {
            DirectoryReply::Done => Ok(()),
            _ => Err(DirectoryError::UnexpectedReply(operation)),
        }
    }

    async fn forward_expecting_map(
        &self,
        command: DirectoryCommand,
    ) -> Result<DirectoryMap, DirectoryError> {
        let operation = command.operation();

        match self.forward(command).await? {
            DirectoryReply::Map(map) => Ok(map),
            _ => Err(DirectoryError::UnexpectedReply(operation)),
        }
    }
}

#[async_trait]
impl DirectoryService for RemoteDirectory {
    async fn register(&self, executor_id: &str, location_id: &str) -> Result<(), DirectoryError> {
        self.forward_expecting_done(DirectoryCommand::Register {
            executor_id: executor_id.to_owned(),
            location_id: location_id.to_owned(),
        })
        .await
    }

    async fn register_connector(
        &self,
        _executor_id: &str,
        _connector: &NodeConnector,
    ) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unsupported("register_connector"))
    }

    async fn unregister(&self, executor_id: &str) -> Result<(), DirectoryError> {
        self.forward_expecting_done(DirectoryCommand::Unregister {
            executor_id: executor_id.to_owned(),
        })
        .await
    }

    async fn lookup(&self, executor_id: &str) -> Result<NodeConnector, DirectoryError> {
        let command = DirectoryCommand::Lookup {
            executor_id: executor_id.to_owned(),
        };

        match self.forward(command).await? {
            DirectoryReply::Node(node) => Ok(self.factory.connector_for(&node)?),
            _ => Err(DirectoryError::UnexpectedReply("lookup")),
        }
    }

    async fn lookup_id(&self, executor_id: &str) -> Result<Option<String>, DirectoryError> {
        let command = DirectoryCommand::LookupId {
            executor_id: executor_id.to_owned(),
        };

        match self.forward(command).await? {
            DirectoryReply::LocationId(location_id) => Ok(location_id),
            _ => Err(DirectoryError::UnexpectedReply("lookup_id")),
        }
    }

    async fn register_kbase(
        &self,
        kbase_id: &str,
        location_id: &str,
    ) -> Result<(), DirectoryError> {
        self.forward_expecting_done(DirectoryCommand::RegisterKBase {
            kbase_id: kbase_id.to_owned(),
            location_id: location_id.to_owned(),
        })
        .await
    }

    async fn register_kbase_instance(
        &self,
        _kbase_id: &str,
        _kbase: KnowledgeBase,
    ) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unsupported("register_kbase_instance"))
    }

    async fn unregister_kbase(&self, _kbase_id: &str) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unsupported("unregister_kbase"))
    }

    async fn lookup_kbase(&self, kbase_id: &str) -> Result<Option<KnowledgeBase>, DirectoryError> {
        let command = DirectoryCommand::LookupKBase {
            kbase_id: kbase_id.to_owned(),
        };

        match self.forward(command).await? {
            DirectoryReply::KnowledgeBase(kbase) => Ok(kbase),
            _ => Err(DirectoryError::UnexpectedReply("lookup_kbase")),
        }
    }

    async fn executors_map(&self) -> Result<DirectoryMap, DirectoryError> {
        self.forward_expecting_map(DirectoryCommand::ExecutorsMap)
            .await
    }

    async fn kbases_map(&self) -> Result<DirectoryMap, DirectoryError> {
        self.forward_expecting_map(DirectoryCommand::KBasesMap).await
    }

    async fn dispose(&self) -> Result<(), DirectoryError> {
        self.connector.disconnect().await;
        Ok(())
    }
}
