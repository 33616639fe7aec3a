//! Routing of inbound messages to the handlers waiting for them
//!
//! Every connection owns a [`ResponseRegistry`]. Senders register a [`ResponseHandler`] under the
//! request id of an outgoing message, the reading side of the connection later removes it again
//! when a message with a matching response id arrives. Removal is the single synchronization
//! point: whoever takes the handler out of the table delivers to it, so a reply is delivered
//! at most once and a duplicate is treated like any other message without a pending handler.

use super::handler::{MessageHandler, ResponseHandler};
use super::writer::IoWriter;
use super::Message;
use crate::library::BoxedError;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Failure to dispatch an inbound message
#[derive(Error, Debug)]
pub enum CorrelationError {
    /// No handler is pending for the message and no generic handler is configured
    #[error("unable to process message (request id {request_id}, response id {response_id}): no handler registered")]
    Unroutable {
        /// Request id of the inbound message
        request_id: i32,
        /// Response id of the inbound message
        response_id: i32,
    },
    /// The generic message handler failed to process the message
    #[error("message handler failed")]
    HandlerFailed(#[source] BoxedError),
}

/// Path an inbound message has taken through the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to the pending handler of a request
    Response,
    /// Delivered to the generic message handler
    Request,
}

/// Table of pending requests of a single connection
#[derive(Default)]
pub struct ResponseRegistry {
    pending: Mutex<HashMap<i32, Box<dyn ResponseHandler>>>,
    generic_handler: Option<Arc<dyn MessageHandler>>,
}

impl ResponseRegistry {
    /// Creates a registry which rejects every message that is not a reply
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry which hands messages without a pending handler to `handler`
    pub fn with_generic_handler(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            pending: Mutex::default(),
            generic_handler: Some(handler),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<i32, Box<dyn ResponseHandler>>> {
        // Handlers are never invoked while the lock is held, a poisoned table is still consistent
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a handler for the reply to request `id`
    ///
    /// A handler previously registered under the same id is replaced and returned.
    pub fn add_response_handler(
        &self,
        id: i32,
        handler: Box<dyn ResponseHandler>,
    ) -> Option<Box<dyn ResponseHandler>> {
        trace!("Registering response handler for request {}", id);
        self.pending().insert(id, handler)
    }

    /// Removes the handler for request `id` without invoking it
    pub fn remove_response_handler(&self, id: i32) -> Option<Box<dyn ResponseHandler>> {
        self.pending().remove(&id)
    }

    /// Number of requests still waiting for their reply
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Dispatches an inbound message
    ///
    /// Replies to a pending request go to its handler: regular payloads through
    /// [`ResponseHandler::receive`], error bodies through [`ResponseHandler::set_error`].
    /// Everything else is passed to the generic handler, if there is one.
    pub async fn on_message_received(
        &self,
        writer: Arc<dyn IoWriter>,
        message: Message,
    ) -> Result<Dispatch, CorrelationError> {
        let handler = if message.is_reply() {
            self.remove_response_handler(message.response_id())
        } else {
            None
        };

        if let Some(handler) = handler {
            trace!("Dispatching reply to request {}", message.response_id());

            match message.body() {
                Ok(_) => handler.receive(message),
                Err(error) => {
                    let error = error.clone();
                    handler.set_error(error);
                }
            }

            return Ok(Dispatch::Response);
        }

        match &self.generic_handler {
            Some(generic) => {
                generic
                    .message_received(writer, message)
                    .await
                    .map_err(CorrelationError::HandlerFailed)?;

                Ok(Dispatch::Request)
            }
            None => Err(CorrelationError::Unroutable {
                request_id: message.request_id(),
                response_id: message.response_id(),
            }),
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::handler::CallbackResponseHandler;
    use crate::library::communication::writer::recording::RecordingWriter;
    use crate::library::communication::{Payload, RemoteError, NO_REPLY};
    use crate::library::EmptyResult;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Outcomes = Arc<Mutex<Vec<(usize, Result<Message, RemoteError>)>>>;

    fn recording_handler(tag: usize, outcomes: &Outcomes) -> Box<dyn ResponseHandler> {
        let outcomes = outcomes.clone();
        CallbackResponseHandler::boxed(move |outcome| outcomes.lock().unwrap().push((tag, outcome)))
    }

    fn reply(response_id: i32, body: &str) -> Message {
        Message::new("c", "b", "a", NO_REPLY, Ok(Payload::encode(body).unwrap()))
            .with_response_id(response_id)
    }

    fn writer() -> Arc<dyn IoWriter> {
        Arc::new(RecordingWriter::default())
    }

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn message_received(&self, _writer: Arc<dyn IoWriter>, _message: Message) -> EmptyResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn deliver_replies_to_their_own_handler_regardless_of_order() {
        let registry = ResponseRegistry::new();
        let outcomes = Outcomes::default();

        registry.add_response_handler(1, recording_handler(1, &outcomes));
        registry.add_response_handler(2, recording_handler(2, &outcomes));

        registry.on_message_received(writer(), reply(2, "B")).await.unwrap();
        registry.on_message_received(writer(), reply(1, "A")).await.unwrap();

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        for (tag, outcome) in outcomes.iter() {
            let body: String = outcome.as_ref().unwrap().decode().unwrap();
            let expected = if *tag == 1 { "A" } else { "B" };
            assert_eq!(body, expected);
        }
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn deliver_at_most_once() {
        let registry = ResponseRegistry::new();
        let outcomes = Outcomes::default();
        registry.add_response_handler(5, recording_handler(5, &outcomes));

        assert_eq!(
            registry.on_message_received(writer(), reply(5, "first")).await.unwrap(),
            Dispatch::Response
        );

        let duplicate = registry.on_message_received(writer(), reply(5, "again")).await;
        assert!(matches!(
            duplicate,
            Err(CorrelationError::Unroutable { response_id: 5, .. })
        ));
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn route_error_bodies_to_the_error_channel() {
        let registry = ResponseRegistry::new();
        let outcomes = Outcomes::default();
        registry.add_response_handler(3, recording_handler(3, &outcomes));

        let error = RemoteError::unsupported("dispose");
        let message = Message::new("c", "b", "a", NO_REPLY, Err(error.clone())).with_response_id(3);
        registry.on_message_received(writer(), message).await.unwrap();

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].1.as_ref().unwrap_err(), &error);
    }

    #[tokio::test]
    async fn fall_back_to_the_generic_handler() {
        let generic = Arc::new(CountingHandler::default());
        let registry = ResponseRegistry::with_generic_handler(generic.clone());

        let request = Message::new("c", "a", "b", 1, Ok(Payload::default()));
        let dispatch = registry.on_message_received(writer(), request).await.unwrap();

        assert_eq!(dispatch, Dispatch::Request);
        assert_eq!(generic.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_correlate_one_way_messages() {
        let registry = ResponseRegistry::new();
        let outcomes = Outcomes::default();
        registry.add_response_handler(NO_REPLY, recording_handler(0, &outcomes));

        let one_way = Message::new("c", "a", "b", NO_REPLY, Ok(Payload::default()));
        let result = registry.on_message_received(writer(), one_way).await;

        assert!(matches!(result, Err(CorrelationError::Unroutable { .. })));
        assert!(outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deliver_exactly_once_under_concurrency() {
        let registry = Arc::new(ResponseRegistry::new());
        let delivered = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for id in 1..=64 {
            let registry = registry.clone();
            let delivered = delivered.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, rx) = tokio::sync::oneshot::channel();
                registry.add_response_handler(
                    id,
                    CallbackResponseHandler::boxed(move |outcome| {
                        tx.send(outcome.unwrap().response_id()).ok();
                    }),
                );

                let responder = registry.clone();
                tokio::spawn(async move {
                    responder
                        .on_message_received(writer(), reply(id, "ok"))
                        .await
                        .unwrap();
                });

                assert_eq!(rx.await.unwrap(), id);
                delivered.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(delivered.load(Ordering::SeqCst), 64);
        assert_eq!(registry.pending_count(), 0);
    }
}
