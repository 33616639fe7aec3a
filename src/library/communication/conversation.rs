//! Logical exchanges between two endpoints
//!
//! A [`Conversation`] stamps every outgoing message with its conversation, sender and recipient
//! ids and hands out request ids local to itself. The [`ConversationManager`] creates
//! conversations and owns the connections they run over; conversations cannot be closed
//! individually, only [`ConversationManager::end_conversation`] tears their connections down.

use super::events::SystemEventListener;
use super::handler::{BlockingResponseHandler, MessageHandler, ResponseError, ResponseHandler};
use super::node::{ConnectorError, NodeConnector};
use super::transport::TransportError;
use super::writer::IoWriter;
use super::{Message, MessageBody, Payload, RemoteError, NO_REPLY};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Failure of a conversation operation
#[derive(Error, Debug)]
pub enum ConversationError {
    /// Setting up the connection for a new conversation failed
    #[error("unable to start conversation with {recipient} at {address}")]
    StartFailed {
        /// Recipient of the conversation
        recipient: String,
        /// Address of the recipient
        address: String,
        /// Underlying connector failure
        #[source]
        source: ConnectorError,
    },
    /// Writing a message of the conversation failed
    #[error("unable to send message in conversation {0}")]
    Send(String, #[source] TransportError),
    /// A reply can only be sent by a conversation created for a received message
    #[error("conversation {0} has not received a message to respond to")]
    NothingToRespondTo(String),
    /// The remote party answered with an error
    #[error(transparent)]
    Remote(RemoteError),
    /// The pending request was dropped before a reply arrived
    #[error("request {1} of conversation {0} was abandoned before a reply arrived")]
    Abandoned(String, i32),
}

/// Factory and connection owner for [`Conversations`](Conversation)
pub struct ConversationManager {
    sender_id: String,
    counter: AtomicU64,
    listener: Arc<dyn SystemEventListener>,
    handler: Option<Arc<dyn MessageHandler>>,
    connectors: Mutex<Vec<Arc<NodeConnector>>>,
}

impl ConversationManager {
    /// Creates a manager whose conversations send on behalf of `sender_id`
    pub fn new(sender_id: impl Into<String>, listener: Arc<dyn SystemEventListener>) -> Self {
        Self {
            sender_id: sender_id.into(),
            counter: AtomicU64::new(0),
            listener,
            handler: None,
            connectors: Mutex::new(Vec::new()),
        }
    }

    /// Passes requests which the remote parties send over conversation connections to `handler`
    pub fn with_message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Identifier stamped as sender on every message
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Opens a connection to `address` and starts a conversation with `recipient_id` over it
    ///
    /// Every conversation gets a connection (and thus a response registry) of its own, so
    /// request ids only have to be unique within the conversation.
    pub async fn start_conversation(
        &self,
        address: &str,
        recipient_id: &str,
    ) -> Result<Conversation, ConversationError> {
        let number = self.counter.fetch_add(1, Ordering::SeqCst);
        let conversation_id = format!("{}-{}", self.sender_id, number);

        let start_failed = |source| ConversationError::StartFailed {
            recipient: recipient_id.to_owned(),
            address: address.to_owned(),
            source,
        };

        let name = format!("{}/{}", self.sender_id, conversation_id);
        let connector = match &self.handler {
            Some(handler) => NodeConnector::with_message_handler(
                name,
                address,
                handler.clone(),
                self.listener.clone(),
            ),
            None => NodeConnector::new(name, address, self.listener.clone()),
        }
        .map_err(start_failed)?;

        connector.open().await.map_err(start_failed)?;
        let writer = connector.writer().await.map_err(start_failed)?;

        self.connectors.lock().await.push(Arc::new(connector));
        self.listener.debug(&format!(
            "Started conversation {} with {} at {}",
            conversation_id, recipient_id, address
        ));

        Ok(Conversation::new(
            conversation_id,
            self.sender_id.clone(),
            recipient_id,
            writer,
        ))
    }

    /// Number of connections currently held open for conversations
    pub async fn open_connections(&self) -> usize {
        self.connectors.lock().await.len()
    }

    /// Closes the connections of every conversation started so far
    pub async fn end_conversation(&self) {
        let connectors: Vec<_> = self.connectors.lock().await.drain(..).collect();

        for connector in connectors {
            connector.disconnect().await;
        }
    }
}

/// A logical exchange with a single recipient
pub struct Conversation {
    id: String,
    sender_id: String,
    recipient_id: String,
    request_counter: AtomicI32,
    writer: Arc<dyn IoWriter>,
    received: Option<Message>,
}

impl Conversation {
    /// Creates a conversation which writes through `writer`
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        writer: Arc<dyn IoWriter>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            request_counter: AtomicI32::new(0),
            writer,
            received: None,
        }
    }

    /// Continues the conversation a received message belongs to, with both ends swapped
    pub fn responding_to(writer: Arc<dyn IoWriter>, message: &Message) -> Self {
        let mut conversation = Self::new(
            message.conversation_id(),
            message.recipient_id(),
            message.sender_id(),
            writer,
        );
        conversation.received = Some(message.clone());
        conversation
    }

    /// Conversation id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Local endpoint
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Remote endpoint
    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    /// Message this conversation has been created for, if any
    pub fn received(&self) -> Option<&Message> {
        self.received.as_ref()
    }

    fn next_request_id(&self) -> i32 {
        let advance = |id: i32| if id >= i32::MAX { 1 } else { id + 1 };
        let previous =
            self.request_counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| Some(advance(id)));

        match previous {
            Ok(id) | Err(id) => advance(id),
        }
    }

    /// Sends a message to the recipient
    ///
    /// With a handler the message gets the next request id of this conversation and the handler
    /// is registered for its reply. Without one it is sent as one-way message. Returns the request
    /// id that has been used.
    pub fn send_message(
        &self,
        body: MessageBody,
        handler: Option<Box<dyn ResponseHandler>>,
    ) -> Result<i32, ConversationError> {
        let request_id = if handler.is_some() {
            self.next_request_id()
        } else {
            NO_REPLY
        };

        let message = Message::new(
            self.id.as_str(),
            self.sender_id.as_str(),
            self.recipient_id.as_str(),
            request_id,
            body,
        );

        match handler {
            Some(handler) => self.writer.write_with_handler(message, handler),
            None => self.writer.write(message),
        }
        .map_err(|e| ConversationError::Send(self.id.clone(), e))?;

        Ok(request_id)
    }

    /// Sends a request and waits for its reply
    pub async fn request(&self, payload: Payload) -> Result<Message, ConversationError> {
        let (handler, pending) = BlockingResponseHandler::new();
        let request_id = self.send_message(Ok(payload), Some(Box::new(handler)))?;

        pending.wait().await.map_err(|e| match e {
            ResponseError::Remote(e) => ConversationError::Remote(e),
            ResponseError::Abandoned => ConversationError::Abandoned(self.id.clone(), request_id),
        })
    }

    /// Answers the received message with a payload
    pub fn respond(&self, payload: Payload) -> Result<(), ConversationError> {
        self.reply(Ok(payload))
    }

    /// Answers the received message with an error
    pub fn respond_error(&self, error: RemoteError) -> Result<(), ConversationError> {
        self.reply(Err(error))
    }

    fn reply(&self, body: MessageBody) -> Result<(), ConversationError> {
        let received = self
            .received
            .as_ref()
            .ok_or_else(|| ConversationError::NothingToRespondTo(self.id.clone()))?;

        let message = Message::new(
            self.id.as_str(),
            self.sender_id.as_str(),
            self.recipient_id.as_str(),
            NO_REPLY,
            body,
        )
        .with_response_id(received.request_id());

        self.writer
            .write(message)
            .map_err(|e| ConversationError::Send(self.id.clone(), e))
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::events::recording::RecordingListener;
    use crate::library::communication::handler::CallbackResponseHandler;
    use crate::library::communication::transport::{Acceptor, SessionOptions};
    use crate::library::communication::writer::recording::RecordingWriter;
    use crate::library::communication::RemoteErrorKind;
    use crate::library::EmptyResult;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    fn payload(value: &str) -> Payload {
        Payload::encode(value).unwrap()
    }

    fn recording_conversation() -> (Conversation, Arc<RecordingWriter>) {
        let writer = Arc::new(RecordingWriter::default());
        let conversation = Conversation::new("conv-1", "client", "r1", writer.clone());
        (conversation, writer)
    }

    #[tokio::test]
    async fn keep_replies_apart_when_they_arrive_reordered() {
        let (conversation, writer) = recording_conversation();
        let outcomes: Arc<StdMutex<Vec<(&str, String)>>> = Default::default();

        for tag in &["A", "B"] {
            let outcomes = outcomes.clone();
            let tag: &'static str = tag;
            conversation
                .send_message(
                    Ok(payload(tag)),
                    Some(CallbackResponseHandler::boxed(move |outcome| {
                        let body: String = outcome.unwrap().decode().unwrap();
                        outcomes.lock().unwrap().push((tag, body));
                    })),
                )
                .unwrap();
        }

        let sent = writer.messages();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.conversation_id() == "conv-1"
            && m.sender_id() == "client"
            && m.recipient_id() == "r1"));

        // The recipient answers B before A
        for request in sent.iter().rev() {
            let body: String = request.decode().unwrap();
            let reply = Message::reply_to(request, Ok(payload(&format!("reply to {}", body))));
            writer
                .registry
                .on_message_received(writer.clone(), reply)
                .await
                .unwrap();
        }

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(
            *outcomes,
            vec![
                ("B", "reply to B".to_string()),
                ("A", "reply to A".to_string())
            ]
        );
    }

    #[test]
    fn number_requests_locally() {
        let (conversation, writer) = recording_conversation();

        let first = conversation
            .send_message(Ok(payload("1")), Some(CallbackResponseHandler::boxed(|_| {})))
            .unwrap();
        let one_way = conversation.send_message(Ok(payload("2")), None).unwrap();
        let second = conversation
            .send_message(Ok(payload("3")), Some(CallbackResponseHandler::boxed(|_| {})))
            .unwrap();

        assert_eq!((first, one_way, second), (1, NO_REPLY, 2));
        assert_eq!(writer.registry.pending_count(), 2);
    }

    #[test]
    fn respond_to_the_received_request() {
        let request = Message::new("conv-9", "client", "server", 4, Ok(payload("question")));
        let writer = Arc::new(RecordingWriter::default());
        let conversation = Conversation::responding_to(writer.clone(), &request);

        conversation.respond(payload("answer")).unwrap();
        conversation
            .respond_error(RemoteError::unsupported("dispose"))
            .unwrap();

        let sent = writer.messages();
        assert_eq!(sent[0].conversation_id(), "conv-9");
        assert_eq!(sent[0].sender_id(), "server");
        assert_eq!(sent[0].recipient_id(), "client");
        assert_eq!(sent[0].request_id(), NO_REPLY);
        assert_eq!(sent[0].response_id(), 4);
        assert_eq!(sent[0].decode::<String>().unwrap(), "answer");
        assert_eq!(
            sent[1].body().as_ref().unwrap_err().kind(),
            RemoteErrorKind::Unsupported
        );
    }

    #[test]
    fn refuse_to_respond_without_a_request() {
        let (conversation, writer) = recording_conversation();

        assert!(matches!(
            conversation.respond(payload("x")),
            Err(ConversationError::NothingToRespondTo(_))
        ));
        assert!(writer.messages().is_empty());
    }

    /// Greets whoever asks
    struct Greeter;

    #[async_trait]
    impl MessageHandler for Greeter {
        async fn message_received(&self, writer: Arc<dyn IoWriter>, message: Message) -> EmptyResult {
            let conversation = Conversation::responding_to(writer, &message);
            let name: String = message.decode()?;
            conversation.respond(Payload::encode(&format!("hello {}", name))?)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn talk_over_a_real_connection() {
        let listener = Arc::new(RecordingListener::default());
        let acceptor = Acceptor::bind(
            "127.0.0.1:0",
            Arc::new(Greeter),
            listener.clone(),
            SessionOptions::accepting(),
        )
        .await
        .unwrap();
        let address = acceptor.local_addr().to_string();

        let manager = ConversationManager::new("client", listener);
        let first = manager.start_conversation(&address, "r1").await.unwrap();
        let second = manager.start_conversation(&address, "r1").await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(manager.open_connections().await, 2);

        let reply = first.request(payload("world")).await.unwrap();
        assert_eq!(reply.conversation_id(), first.id());
        assert_eq!(reply.sender_id(), "r1");
        assert_eq!(reply.decode::<String>().unwrap(), "hello world");

        manager.end_conversation().await;
        assert_eq!(manager.open_connections().await, 0);
        assert!(matches!(
            second.send_message(Ok(payload("late")), None),
            Err(ConversationError::Send(..))
        ));

        acceptor.stop().await;
    }

    #[tokio::test]
    async fn report_unreachable_recipients() {
        let port = {
            let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap().port()
        };
        let manager = ConversationManager::new("client", Arc::new(RecordingListener::default()));

        let result = manager
            .start_conversation(&format!("127.0.0.1:{}", port), "r1")
            .await;

        assert!(matches!(
            result,
            Err(ConversationError::StartFailed {
                source: ConnectorError::Unreachable { .. },
                ..
            })
        ));
        assert_eq!(manager.open_connections().await, 0);
    }
}
