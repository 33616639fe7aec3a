use super::{DirectoryCommand, DirectoryError, DirectoryReply, DirectoryService, LocalDirectory};
use crate::library::communication::conversation::Conversation;
use crate::library::communication::handler::MessageHandler;
use crate::library::communication::writer::IoWriter;
use crate::library::communication::{Message, Payload, RemoteError};
use crate::library::EmptyResult;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

/// Serves a [`LocalDirectory`] to remote parties
///
/// Install it as message handler of an [`Acceptor`](crate::library::communication::transport::Acceptor)
/// to turn a process into a directory node. Failures are sent back as error replies.
pub struct DirectoryServer {
    directory: Arc<LocalDirectory>,
}

impl DirectoryServer {
    /// Creates a server for the given directory
    pub fn new(directory: Arc<LocalDirectory>) -> Self {
        Self { directory }
    }

    /// Carries out a single command
    pub async fn execute(&self, command: DirectoryCommand) -> Result<DirectoryReply, DirectoryError> {
        let directory = self.directory.as_ref();

        let reply = match command {
            DirectoryCommand::Register {
                executor_id,
                location_id,
            } => {
                directory.register(&executor_id, &location_id).await?;
                DirectoryReply::Done
            }
            DirectoryCommand::Unregister { executor_id } => {
                directory.unregister(&executor_id).await?;
                DirectoryReply::Done
            }
            DirectoryCommand::Lookup { executor_id } => {
                DirectoryReply::Node(directory.locate(&executor_id).await?)
            }
            DirectoryCommand::LookupId { executor_id } => {
                DirectoryReply::LocationId(directory.lookup_id(&executor_id).await?)
            }
            DirectoryCommand::RegisterKBase {
                kbase_id,
                location_id,
            } => {
                directory.register_kbase(&kbase_id, &location_id).await?;
                DirectoryReply::Done
            }
            DirectoryCommand::UnregisterKBase { kbase_id } => {
                directory.unregister_kbase(&kbase_id).await?;
                DirectoryReply::Done
            }
            DirectoryCommand::LookupKBase { kbase_id } => {
                DirectoryReply::KnowledgeBase(directory.lookup_kbase(&kbase_id).await?)
            }
            DirectoryCommand::ExecutorsMap => DirectoryReply::Map(directory.executors_map().await?),
            DirectoryCommand::KBasesMap => DirectoryReply::Map(directory.kbases_map().await?),
        };

        Ok(reply)
    }
}

#[async_trait]
impl MessageHandler for DirectoryServer {
    async fn message_received(&self, writer: Arc<dyn IoWriter>, message: Message) -> EmptyResult {
        let conversation = Conversation::responding_to(writer, &message);

        let outcome = match message.decode::<DirectoryCommand>() {
            Ok(command) => {
                debug!(
                    "Executing {} for {} ({})",
                    command.operation(),
                    message.sender_id(),
                    message.conversation_id()
                );
                self.execute(command).await.map_err(DirectoryError::into_remote)
            }
            Err(e) => Err(RemoteError::new(e)),
        };

        if !message.expects_reply() {
            if let Err(e) = outcome {
                warn!("One-way directory command from {} failed: {}", message.sender_id(), e);
            }
            return Ok(());
        }

        match outcome {
            Ok(reply) => conversation.respond(Payload::encode(&reply)?)?,
            Err(error) => conversation.respond_error(error)?,
        }

        Ok(())
    }
}
