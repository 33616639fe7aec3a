//! Outgoing half of a session as seen by handlers

use super::handler::ResponseHandler;
use super::transport::TransportError;
use super::Message;

/// Outgoing side of a single session
///
/// Writes never wait for the message to hit the wire; they hand it over to the
/// session and return. Any reply is routed to the handler given to [`IoWriter::write_with_handler`].
pub trait IoWriter: Send + Sync {
    /// Sends a message without registering anything for a reply
    fn write(&self, message: Message) -> Result<(), TransportError>;

    /// Registers `handler` under the request id of `message` and sends it afterwards
    ///
    /// The registration happens before the message is handed to the session, so a reply
    /// can never overtake its handler. If sending fails, the registration is undone.
    fn write_with_handler(
        &self,
        message: Message,
        handler: Box<dyn ResponseHandler>,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use crate::library::communication::ResponseRegistry;
    use std::sync::{Arc, Mutex};

    /// Writer which records every outgoing message and registers handlers in a local registry
    #[derive(Default)]
    pub struct RecordingWriter {
        pub written: Mutex<Vec<Message>>,
        pub registry: Arc<ResponseRegistry>,
    }

    impl RecordingWriter {
        pub fn messages(&self) -> Vec<Message> {
            self.written.lock().unwrap().clone()
        }
    }

    impl IoWriter for RecordingWriter {
        fn write(&self, message: Message) -> Result<(), TransportError> {
            self.written.lock().unwrap().push(message);
            Ok(())
        }

        fn write_with_handler(
            &self,
            message: Message,
            handler: Box<dyn ResponseHandler>,
        ) -> Result<(), TransportError> {
            if !message.expects_reply() {
                return Err(TransportError::HandlerForOneWay(message.request_id()));
            }

            self.registry
                .add_response_handler(message.request_id(), handler);
            self.write(message)
        }
    }
}
