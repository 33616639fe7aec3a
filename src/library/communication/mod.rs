//! Request/response messaging between the nodes of a distributed system
//!
//! Everything that travels between two processes is a [`Message`]: an envelope naming the
//! conversation, both endpoints and the request it answers, around a [`MessageBody`] that is
//! either a regular [`Payload`] or a [`RemoteError`].
//!
//! The building blocks, from the wire upwards:
//!
//! 1. The [`transport`] moves framed messages across TCP connections
//! 2. A [`ResponseRegistry`] per connection correlates inbound replies with the
//!    [`ResponseHandler`](handler::ResponseHandler) registered for the request they answer and
//!    hands everything else to a [`MessageHandler`](handler::MessageHandler)
//! 3. The [`NodeConnector`](node::NodeConnector) combines both into a named connection offering
//!    one-way, callback based and blocking sends
//! 4. [`Conversations`](conversation::Conversation) give a series of exchanges a stable identity
//!    independent of the connection they run over
//!
//! Correctness never depends on the order in which replies arrive, only on the request ids.

mod correlation;
mod error;
mod message;

pub mod conversation;
pub mod events;
pub mod handler;
pub mod node;
pub mod transport;
pub mod writer;

pub use correlation::{CorrelationError, Dispatch, ResponseRegistry};
pub use error::{RemoteError, RemoteErrorKind};
pub use message::{DecodeError, Message, MessageBody, Payload, NO_REPLY};
