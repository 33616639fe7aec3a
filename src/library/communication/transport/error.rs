use std::io;
use thiserror::Error;

/// Failure of the physical transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// `connect` was called on a connector which already holds a session
    #[error("connector is already connected")]
    AlreadyConnected,
    /// An operation required a session but none is bound
    #[error("connector is not connected")]
    NotConnected,
    /// The session has been closed and no longer accepts messages
    #[error("session is closed")]
    Closed,
    /// A response handler was supplied for a message which does not expect a reply
    #[error("message with request id {0} does not expect a reply")]
    HandlerForOneWay(i32),
    /// Socket level failure
    #[error("i/o failure")]
    Io(#[from] io::Error),
    /// A message could not be (de-)serialized
    #[error("message codec failure")]
    Codec(#[from] bincode::Error),
}
