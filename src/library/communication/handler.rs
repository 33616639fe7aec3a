//! Callbacks invoked when messages arrive
//!
//! There are two kinds of receivers. A [`ResponseHandler`] waits for exactly one reply to a
//! request it has been registered for, while a [`MessageHandler`] processes every inbound
//! message that is not a reply to a pending request (i.e. new requests from the remote party).

use super::writer::IoWriter;
use super::{Message, RemoteError};
use crate::library::EmptyResult;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Receiver for the reply to a single request
///
/// Both methods consume the handler, thus it is invoked at most once.
pub trait ResponseHandler: Send {
    /// Called with the reply if its body carries a regular payload
    fn receive(self: Box<Self>, message: Message);

    /// Called if the reply carries an error reported by the remote party
    fn set_error(self: Box<Self>, error: RemoteError);
}

/// Processor for inbound messages which do not answer a pending request
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles a message, optionally writing a reply through `writer`
    async fn message_received(&self, writer: Arc<dyn IoWriter>, message: Message) -> EmptyResult;
}

/// Reason why no reply could be obtained from a [`PendingResponse`]
#[derive(Error, Debug)]
pub enum ResponseError {
    /// The remote party answered with an error
    #[error(transparent)]
    Remote(RemoteError),
    /// The handler was dropped without ever being invoked
    #[error("response handler was abandoned before a reply arrived")]
    Abandoned,
}

/// One-shot handler which hands the reply over to a waiting [`PendingResponse`]
pub struct BlockingResponseHandler {
    tx: oneshot::Sender<Result<Message, RemoteError>>,
}

/// Waiting side of a [`BlockingResponseHandler`]
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<Message, RemoteError>>,
}

impl BlockingResponseHandler {
    /// Creates a linked pair of handler and waiting side
    pub fn new() -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, PendingResponse { rx })
    }

    fn complete(self, outcome: Result<Message, RemoteError>) {
        // The waiting side may have given up already, nobody is left to tell
        self.tx.send(outcome).ok();
    }
}

impl ResponseHandler for BlockingResponseHandler {
    fn receive(self: Box<Self>, message: Message) {
        (*self).complete(Ok(message));
    }

    fn set_error(self: Box<Self>, error: RemoteError) {
        (*self).complete(Err(error));
    }
}

impl PendingResponse {
    /// Waits until the linked handler has been invoked
    ///
    /// There is no deadline, the caller may wrap this in a timeout if required.
    pub async fn wait(self) -> Result<Message, ResponseError> {
        match self.rx.await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(error)) => Err(ResponseError::Remote(error)),
            Err(_) => Err(ResponseError::Abandoned),
        }
    }
}

/// [`ResponseHandler`] which calls a closure with the outcome
pub struct CallbackResponseHandler<F> {
    callback: F,
}

impl<F> CallbackResponseHandler<F>
where
    F: FnOnce(Result<Message, RemoteError>) + Send + 'static,
{
    /// Wraps the closure and boxes it, ready for registration
    pub fn boxed(callback: F) -> Box<dyn ResponseHandler> {
        Box::new(Self { callback })
    }
}

impl<F> ResponseHandler for CallbackResponseHandler<F>
where
    F: FnOnce(Result<Message, RemoteError>) + Send,
{
    fn receive(self: Box<Self>, message: Message) {
        let this = *self;
        (this.callback)(Ok(message))
    }

    fn set_error(self: Box<Self>, error: RemoteError) {
        let this = *self;
        (this.callback)(Err(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::communication::{Payload, NO_REPLY};
    use pretty_assertions::assert_eq;

    fn reply() -> Message {
        Message::new("c", "b", "a", NO_REPLY, Ok(Payload::default())).with_response_id(1)
    }

    #[tokio::test]
    async fn blocking_handler_hands_over_the_reply() {
        let (handler, pending) = BlockingResponseHandler::new();
        Box::new(handler).receive(reply());

        assert_eq!(pending.wait().await.unwrap(), reply());
    }

    #[tokio::test]
    async fn blocking_handler_reraises_the_original_error() {
        let (handler, pending) = BlockingResponseHandler::new();
        let error = RemoteError::unsupported("dispose");
        Box::new(handler).set_error(error.clone());

        match pending.wait().await {
            Err(ResponseError::Remote(e)) => assert_eq!(e, error),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropped_handler_is_reported_as_abandoned() {
        let (handler, pending) = BlockingResponseHandler::new();
        drop(handler);

        assert!(matches!(pending.wait().await, Err(ResponseError::Abandoned)));
    }
}
