use super::RemoteError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel value for [`Message::request_id`] and [`Message::response_id`]
///
/// As a request id it denotes a one-way message for which no reply is wanted,
/// as a response id it marks a message which does not answer anything.
pub const NO_REPLY: i32 = -1;

/// Opaque, serialized payload of a [`Message`]
///
/// The messaging layer never looks into the payload. Typed access is provided by
/// [`Payload::encode`] and [`Payload::decode`] which use [`bincode`].
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wraps raw bytes
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Serializes a value into a new payload
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, bincode::Error> {
        Ok(Self(bincode::serialize(value)?))
    }

    /// Deserializes the payload into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, bincode::Error> {
        bincode::deserialize(&self.0)
    }

    /// Raw serialized bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

/// Body of a [`Message`], either a regular payload or an error reported by the sender
pub type MessageBody = Result<Payload, RemoteError>;

/// Envelope which is shipped between nodes
///
/// Identifiers are logical endpoint names and not transport addresses. A message with
/// a `request_id` other than [`NO_REPLY`] asks for a reply; the reply carries the very
/// same value as its `response_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    conversation_id: String,
    sender_id: String,
    recipient_id: String,
    request_id: i32,
    response_id: i32,
    body: MessageBody,
}

impl Message {
    /// Creates a new message which does not answer a previous one
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        request_id: i32,
        body: MessageBody,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            request_id,
            response_id: NO_REPLY,
            body,
        }
    }

    /// Creates a one-way reply to the given message
    ///
    /// Sender and recipient are swapped and the `response_id` is set to the request id
    /// of the answered message.
    pub fn reply_to(request: &Message, body: MessageBody) -> Self {
        Self {
            conversation_id: request.conversation_id.clone(),
            sender_id: request.recipient_id.clone(),
            recipient_id: request.sender_id.clone(),
            request_id: NO_REPLY,
            response_id: request.request_id,
            body,
        }
    }

    /// Overrides the response id, marking this message as a reply
    pub fn with_response_id(mut self, response_id: i32) -> Self {
        self.response_id = response_id;
        self
    }

    /// Identifier of the logical session this message belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Logical identifier of the sending endpoint
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Logical identifier of the receiving endpoint
    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    /// Identifier under which a reply is expected or [`NO_REPLY`]
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    /// Request id this message answers or [`NO_REPLY`]
    pub fn response_id(&self) -> i32 {
        self.response_id
    }

    /// Whether the sender expects a reply
    pub fn expects_reply(&self) -> bool {
        self.request_id != NO_REPLY
    }

    /// Whether this message answers a previous request
    pub fn is_reply(&self) -> bool {
        self.response_id != NO_REPLY
    }

    /// Borrows the body
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Consumes the message and returns its body
    pub fn into_body(self) -> MessageBody {
        self.body
    }

    /// Decodes a successful body into a typed value
    ///
    /// Returns the remote error if the body carries one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        match &self.body {
            Ok(payload) => payload.decode().map_err(DecodeError::Malformed),
            Err(error) => Err(DecodeError::Remote(error.clone())),
        }
    }
}

/// Error returned by [`Message::decode`]
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The body carried an error instead of a payload
    #[error("remote party reported an error")]
    Remote(#[source] RemoteError),
    /// The payload could not be deserialized into the requested type
    #[error("malformed payload")]
    Malformed(#[source] bincode::Error),
}
