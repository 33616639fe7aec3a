//! Movement of framed [`Messages`](super::Message) across TCP sockets
//!
//! A [`TcpConnector`] owns the client side of one connection while an [`Acceptor`] listens for
//! and serves incoming connections. Both turn a socket into a [`Session`], which runs one reader
//! task dispatching inbound messages through a [`ResponseRegistry`](super::ResponseRegistry) and
//! one writer task draining the outgoing queue fed by [`SessionWriter`] handles.

mod acceptor;
mod codec;
mod connector;
mod error;
mod session;

pub use acceptor::*;
pub use codec::*;
pub use connector::*;
pub use error::*;
pub use session::*;
