use super::{DirectoryError, DirectoryMap, DirectoryService};
use crate::domain::node::{ConnectorFactory, ExecutionNode, KnowledgeBase, NodeCommand, NodeReply};
use crate::library::communication::node::NodeConnector;
use crate::library::communication::{Message, Payload};
use crate::library::BoxedError;
use async_trait::async_trait;
use log::{debug, trace};
use tokio::sync::RwLock;

/// Sender id used for messages the directory sends on its own behalf
pub const DIRECTORY_SENDER_ID: &str = "directory";

/// Authoritative in-memory directory
pub struct LocalDirectory {
    executors: RwLock<DirectoryMap>,
    kbases: RwLock<DirectoryMap>,
    nodes: RwLock<Vec<ExecutionNode>>,
    factory: ConnectorFactory,
}

impl LocalDirectory {
    /// Creates an empty directory which builds connectors with `factory`
    pub fn new(factory: ConnectorFactory) -> Self {
        Self {
            executors: RwLock::default(),
            kbases: RwLock::default(),
            nodes: RwLock::default(),
            factory,
        }
    }

    /// Makes an execution node known to the directory, replacing one with the same id
    pub async fn add_node(&self, node: ExecutionNode) {
        let mut nodes = self.nodes.write().await;
        nodes.retain(|known| known.id != node.id);
        debug!("Execution node {} is reachable at {}", node.id, node.address);
        nodes.push(node);
    }

    /// Execution nodes known to the directory
    pub async fn nodes(&self) -> Vec<ExecutionNode> {
        self.nodes.read().await.clone()
    }

    /// Finds the node hosting an executor among the known nodes
    pub async fn locate(&self, executor_id: &str) -> Result<ExecutionNode, DirectoryError> {
        let nodes = self.nodes.read().await;
        self.locate_in(executor_id, nodes.iter()).await
    }

    /// Finds the node hosting an executor among the given nodes
    pub async fn locate_in<'a>(
        &self,
        executor_id: &str,
        nodes: impl IntoIterator<Item = &'a ExecutionNode>,
    ) -> Result<ExecutionNode, DirectoryError> {
        let location_id = self
            .executors
            .read()
            .await
            .get(executor_id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownId(executor_id.to_owned()))?;

        find_node(&location_id, nodes)
    }

    /// Resolves an executor into a connector for one of the given nodes
    pub async fn lookup_in<'a>(
        &self,
        executor_id: &str,
        nodes: impl IntoIterator<Item = &'a ExecutionNode>,
    ) -> Result<NodeConnector, DirectoryError> {
        let node = self.locate_in(executor_id, nodes).await?;
        Ok(self.factory.connector_for(&node)?)
    }

    async fn fetch_kbase(
        &self,
        node: &ExecutionNode,
        kbase_id: &str,
    ) -> Result<Option<KnowledgeBase>, BoxedError> {
        let connector = self.factory.connector_for(node)?;
        connector.open().await?;

        let command = NodeCommand::LookupKnowledgeBase {
            kbase_id: kbase_id.to_owned(),
        };
        let request = Message::new(
            format!("{}-kbase-{}", DIRECTORY_SENDER_ID, kbase_id),
            DIRECTORY_SENDER_ID,
            node.id.as_str(),
            connector.next_request_id(),
            Ok(Payload::encode(&command)?),
        );

        let outcome = connector.write(request).await;
        connector.disconnect().await;

        match outcome?.decode::<NodeReply>()? {
            NodeReply::KnowledgeBase(kbase) => Ok(Some(kbase)),
            NodeReply::Missing => Ok(None),
        }
    }
}

fn find_node<'a>(
    location_id: &str,
    nodes: impl IntoIterator<Item = &'a ExecutionNode>,
) -> Result<ExecutionNode, DirectoryError> {
    nodes
        .into_iter()
        .find(|node| node.id == location_id)
        .cloned()
        .ok_or_else(|| DirectoryError::UnknownNode(location_id.to_owned()))
}

#[async_trait]
impl DirectoryService for LocalDirectory {
    async fn register(&self, executor_id: &str, location_id: &str) -> Result<(), DirectoryError> {
        trace!("Registering executor {} at {}", executor_id, location_id);
        self.executors
            .write()
            .await
            .insert(executor_id.to_owned(), location_id.to_owned());
        Ok(())
    }

    async fn register_connector(
        &self,
        executor_id: &str,
        connector: &NodeConnector,
    ) -> Result<(), DirectoryError> {
        self.register(executor_id, connector.name()).await
    }

    async fn unregister(&self, executor_id: &str) -> Result<(), DirectoryError> {
        trace!("Unregistering executor {}", executor_id);
        self.executors.write().await.remove(executor_id);
        Ok(())
    }

    async fn lookup(&self, executor_id: &str) -> Result<NodeConnector, DirectoryError> {
        let node = self.locate(executor_id).await?;
        Ok(self.factory.connector_for(&node)?)
    }

    async fn lookup_id(&self, executor_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.executors.read().await.get(executor_id).cloned())
    }

    async fn register_kbase(
        &self,
        kbase_id: &str,
        location_id: &str,
    ) -> Result<(), DirectoryError> {
        trace!("Registering knowledge base {} at {}", kbase_id, location_id);
        self.kbases
            .write()
            .await
            .insert(kbase_id.to_owned(), location_id.to_owned());
        Ok(())
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
        let location_id = match self.kbases.read().await.get(kbase_id).cloned() {
            Some(location_id) => location_id,
            None => return Ok(None),
        };

        let node = {
            let nodes = self.nodes.read().await;
            find_node(&location_id, nodes.iter())?
        };

        self.fetch_kbase(&node, kbase_id)
            .await
            .map_err(|source| DirectoryError::LookupFailed {
                id: kbase_id.to_owned(),
                source,
            })
    }

    async fn executors_map(&self) -> Result<DirectoryMap, DirectoryError> {
        Ok(self.executors.read().await.clone())
    }

    async fn kbases_map(&self) -> Result<DirectoryMap, DirectoryError> {
        Ok(self.kbases.read().await.clone())
    }

    async fn dispose(&self) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unsupported("dispose"))
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::events::recording::RecordingListener;
    use crate::library::communication::handler::MessageHandler;
    use crate::library::communication::transport::{Acceptor, SessionOptions};
    use crate::library::communication::writer::IoWriter;
    use crate::library::communication::{RemoteError, RemoteErrorKind};
    use crate::library::EmptyResult;
    use pretty_assertions::assert_eq;
    use std::error::Error;
    use std::sync::Arc;

    fn directory() -> LocalDirectory {
        LocalDirectory::new(ConnectorFactory::new(Arc::new(RecordingListener::default())))
    }

    #[tokio::test]
    async fn return_what_has_been_registered() {
        let directory = directory();

        directory.register("exec-1", "node-A").await.unwrap();
        assert_eq!(
            directory.lookup_id("exec-1").await.unwrap(),
            Some("node-A".to_string())
        );

        directory.unregister("exec-1").await.unwrap();
        assert_eq!(directory.lookup_id("exec-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn let_the_last_registration_win() {
        let directory = directory();

        directory.register("exec-1", "node-A").await.unwrap();
        directory.register("exec-1", "node-B").await.unwrap();

        assert_eq!(
            directory.lookup_id("exec-1").await.unwrap(),
            Some("node-B".to_string())
        );
        assert_eq!(directory.executors_map().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_executors_into_connectors() {
        let directory = directory();
        let nodes = vec![
            ExecutionNode::new("node-B", "127.0.0.1:9001"),
            ExecutionNode::new("node-A", "127.0.0.1:9000"),
        ];

        directory.register("exec-1", "node-A").await.unwrap();
        let connector = directory.lookup_in("exec-1", &nodes).await.unwrap();

        assert_eq!(connector.name(), "node-A");
        assert_eq!(connector.address(), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn fail_lookups_without_a_matching_node() {
        let directory = directory();
        let nodes = vec![ExecutionNode::new("node-B", "127.0.0.1:9001")];

        directory.register("exec-1", "node-A").await.unwrap();
        let error = directory.lookup_in("exec-1", &nodes).await.unwrap_err();

        assert!(matches!(&error, DirectoryError::UnknownNode(id) if id == "node-A"));
        assert!(error.is_not_found());
        assert!(matches!(
            directory.lookup("exec-2").await,
            Err(DirectoryError::UnknownId(_))
        ));
    }

    #[tokio::test]
    async fn use_known_nodes_for_plain_lookups() {
        let directory = directory();
        directory
            .add_node(ExecutionNode::new("node-A", "127.0.0.1:1"))
            .await;
        directory
            .add_node(ExecutionNode::new("node-A", "127.0.0.1:9000"))
            .await;
        directory.register("exec-1", "node-A").await.unwrap();

        assert_eq!(directory.nodes().await.len(), 1);
        assert_eq!(
            directory.lookup("exec-1").await.unwrap().address(),
            "127.0.0.1:9000"
        );
    }

    #[tokio::test]
    async fn register_connectors_by_name() {
        let directory = directory();
        let connector =
            NodeConnector::new("node-C", "127.0.0.1:1", Arc::new(RecordingListener::default()))
                .unwrap();

        directory
            .register_connector("exec-3", &connector)
            .await
            .unwrap();

        assert_eq!(
            directory.lookup_id("exec-3").await.unwrap(),
            Some("node-C".to_string())
        );
    }

    #[tokio::test]
    async fn refuse_unsupported_operations() {
        let directory = directory();
        let kbase = KnowledgeBase {
            id: "kb".into(),
            node_id: "node-A".into(),
            packages: vec![],
        };

        assert!(directory.dispose().await.unwrap_err().is_unsupported());
        assert!(directory
            .unregister_kbase("kb")
            .await
            .unwrap_err()
            .is_unsupported());
        assert!(directory
            .register_kbase_instance("kb", kbase)
            .await
            .unwrap_err()
            .is_unsupported());
    }

    /// Execution node hosting a single knowledge base
    struct KnowledgeBaseHost {
        kbase: KnowledgeBase,
    }

    #[async_trait]
    impl MessageHandler for KnowledgeBaseHost {
        async fn message_received(&self, writer: Arc<dyn IoWriter>, message: Message) -> EmptyResult {
            let NodeCommand::LookupKnowledgeBase { kbase_id } = message.decode::<NodeCommand>()?;

            let body = if kbase_id == "broken" {
                Err(RemoteError::message(RemoteErrorKind::Failure, "knowledge base is corrupt"))
            } else if kbase_id == self.kbase.id {
                Ok(Payload::encode(&NodeReply::KnowledgeBase(self.kbase.clone()))?)
            } else {
                Ok(Payload::encode(&NodeReply::Missing)?)
            };

            writer.write(Message::reply_to(&message, body))?;
            Ok(())
        }
    }

    async fn directory_with_host(kbase: &KnowledgeBase) -> (LocalDirectory, Acceptor) {
        let host = Arc::new(KnowledgeBaseHost {
            kbase: kbase.clone(),
        });
        let acceptor = Acceptor::bind(
            "127.0.0.1:0",
            host,
            Arc::new(RecordingListener::default()),
            SessionOptions::accepting(),
        )
        .await
        .unwrap();

        let directory = directory();
        directory
            .add_node(ExecutionNode::new(
                "node-A",
                acceptor.local_addr().to_string(),
            ))
            .await;

        (directory, acceptor)
    }

    #[tokio::test]
    async fn fetch_knowledge_bases_from_their_node() {
        let kbase = KnowledgeBase {
            id: "kb-1".into(),
            node_id: "node-A".into(),
            packages: vec!["org.example.rules".into()],
        };
        let (directory, acceptor) = directory_with_host(&kbase).await;

        directory.register_kbase("kb-1", "node-A").await.unwrap();
        directory.register_kbase("kb-2", "node-A").await.unwrap();

        assert_eq!(directory.lookup_kbase("kb-1").await.unwrap(), Some(kbase));
        assert_eq!(directory.lookup_kbase("kb-2").await.unwrap(), None);
        assert_eq!(directory.lookup_kbase("kb-unregistered").await.unwrap(), None);

        acceptor.stop().await;
    }

    #[tokio::test]
    async fn wrap_failed_knowledge_base_lookups() {
        let kbase = KnowledgeBase {
            id: "kb-1".into(),
            node_id: "node-A".into(),
            packages: vec![],
        };
        let (directory, acceptor) = directory_with_host(&kbase).await;
        directory.register_kbase("broken", "node-A").await.unwrap();

        let error = directory.lookup_kbase("broken").await.unwrap_err();

        assert!(matches!(&error, DirectoryError::LookupFailed { id, .. } if id == "broken"));
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        assert!(causes.iter().any(|c| c == "knowledge base is corrupt"));

        acceptor.stop().await;
    }
}
