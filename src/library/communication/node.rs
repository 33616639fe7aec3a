//! Client side façade for talking to a single remote node
//!
//! A [`NodeConnector`] bundles a [`TcpConnector`] with the [`ResponseRegistry`] of its connection
//! and offers three ways of sending a message:
//!
//! - [`NodeConnector::send`] writes a one-way message
//! - [`NodeConnector::write_with_handler`] registers a handler and returns immediately
//! - [`NodeConnector::write`] suspends the caller until the reply (or the remote error) arrives
//!
//! ```no_run
//! # use execgrid::library::communication::{Message, Payload};
//! # use execgrid::library::communication::events::LogEventListener;
//! # use execgrid::library::communication::node::NodeConnector;
//! # use std::sync::Arc;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = NodeConnector::new("node-A", "127.0.0.1:8000", Arc::new(LogEventListener::default()))?;
//! connector.open().await?;
//!
//! let id = connector.next_request_id();
//! let request = Message::new("conversation", "client", "node-A", id, Ok(Payload::encode("ping")?));
//! let reply = connector.write(request).await?;
//! let answer: String = reply.decode()?;
//!
//! connector.disconnect().await;
//! # Ok(())
//! # }
//! ```

use super::events::SystemEventListener;
use super::handler::{BlockingResponseHandler, MessageHandler, ResponseError, ResponseHandler};
use super::transport::{SessionId, TcpConnector, TransportError};
use super::writer::IoWriter;
use super::{Message, RemoteError, ResponseRegistry};
use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Failure of a [`NodeConnector`] operation
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Connectors must carry a name
    #[error("connector name must not be empty")]
    EmptyName,
    /// The remote node did not accept the connection
    #[error("unable to reach node {name} at {address}")]
    Unreachable {
        /// Name of the connector
        name: String,
        /// Address that has been tried
        address: String,
    },
    /// Writing to the connection failed
    #[error("transport failure")]
    Transport(#[from] TransportError),
    /// The remote party answered with an error
    #[error(transparent)]
    Remote(RemoteError),
    /// The pending request was dropped before a reply arrived
    #[error("request {0} was abandoned before a reply arrived")]
    Abandoned(i32),
    /// No reply arrived within the deadline
    #[error("no reply to request {0} within {1:?}")]
    Timeout(i32, Duration),
}

impl ConnectorError {
    /// The error reported by the remote party, if this is one
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Named connection to a remote node with request/response correlation
pub struct NodeConnector {
    name: String,
    transport: TcpConnector,
    registry: Arc<ResponseRegistry>,
    counter: AtomicI32,
}

impl fmt::Debug for NodeConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConnector")
            .field("name", &self.name)
            .field("address", &self.address())
            .finish()
    }
}

impl NodeConnector {
    /// Creates an unconnected connector which only accepts replies on its connection
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        listener: Arc<dyn SystemEventListener>,
    ) -> Result<Self, ConnectorError> {
        Self::with_registry(name.into(), address.into(), ResponseRegistry::new(), listener)
    }

    /// Creates an unconnected connector which passes requests of the remote party to `handler`
    pub fn with_message_handler(
        name: impl Into<String>,
        address: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        listener: Arc<dyn SystemEventListener>,
    ) -> Result<Self, ConnectorError> {
        Self::with_registry(
            name.into(),
            address.into(),
            ResponseRegistry::with_generic_handler(handler),
            listener,
        )
    }

    fn with_registry(
        name: String,
        address: String,
        registry: ResponseRegistry,
        listener: Arc<dyn SystemEventListener>,
    ) -> Result<Self, ConnectorError> {
        if name.trim().is_empty() {
            return Err(ConnectorError::EmptyName);
        }

        let registry = Arc::new(registry);
        let transport = TcpConnector::new(address, registry.clone(), listener);

        Ok(Self {
            name,
            transport,
            registry,
            counter: AtomicI32::new(1),
        })
    }

    /// Logical name of the connector
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address of the remote node
    pub fn address(&self) -> &str {
        self.transport.address()
    }

    /// Pending requests of this connector's connection
    pub fn registry(&self) -> &Arc<ResponseRegistry> {
        &self.registry
    }

    /// Opens the connection, see [`TcpConnector::connect`]
    pub async fn connect(&self) -> Result<bool, ConnectorError> {
        Ok(self.transport.connect().await?)
    }

    /// Opens the connection and turns an unreachable node into an error
    pub async fn open(&self) -> Result<(), ConnectorError> {
        if self.connect().await? {
            Ok(())
        } else {
            Err(ConnectorError::Unreachable {
                name: self.name.clone(),
                address: self.address().to_owned(),
            })
        }
    }

    /// Whether a session is bound and still open
    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Closes the connection, does nothing if there is none
    ///
    /// Pending requests are left untouched; their handlers fire if the same
    /// registry ever receives a matching reply again.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Adopts an already established stream, for connectors created before their connection existed
    pub async fn bind(&self, stream: TcpStream) -> Result<SessionId, ConnectorError> {
        Ok(self.transport.bind(stream).await?)
    }

    /// Identifier of the bound session
    pub async fn id(&self) -> Option<SessionId> {
        self.transport.session_id().await
    }

    /// Writing handle of the bound session
    pub async fn writer(&self) -> Result<Arc<dyn IoWriter>, ConnectorError> {
        Ok(Arc::new(self.transport.writer().await?))
    }

    /// Allocates a request id which is unique for this connector
    ///
    /// Wraps around before overflowing and never yields `0` or [`NO_REPLY`](super::NO_REPLY).
    pub fn next_request_id(&self) -> i32 {
        let previous = self.counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
            Some(if id >= i32::MAX { 1 } else { id + 1 })
        });

        match previous {
            Ok(id) | Err(id) => id,
        }
    }

    /// Sends a message without waiting for anything
    pub async fn send(&self, message: Message) -> Result<(), ConnectorError> {
        Ok(self.transport.write(message).await?)
    }

    /// Registers `handler` for the reply and sends the message
    ///
    /// Returns as soon as the message has been queued, `handler` is invoked later on the reading
    /// side of the connection.
    pub async fn write_with_handler(
        &self,
        message: Message,
        handler: Box<dyn ResponseHandler>,
    ) -> Result<(), ConnectorError> {
        Ok(self.transport.write_with_handler(message, handler).await?)
    }

    /// Sends a request and waits for its reply
    ///
    /// An error reported by the remote party is returned as [`ConnectorError::Remote`] exactly as
    /// it was received. There is no deadline, see [`NodeConnector::write_timeout`] for a bounded
    /// variant.
    pub async fn write(&self, message: Message) -> Result<Message, ConnectorError> {
        let request_id = message.request_id();
        let (handler, pending) = BlockingResponseHandler::new();

        self.write_with_handler(message, Box::new(handler)).await?;

        pending.wait().await.map_err(|e| into_connector_error(e, request_id))
    }

    /// Like [`NodeConnector::write`] but gives up after `limit`
    ///
    /// On expiry the pending handler is removed, a late reply is then reported as unroutable.
    pub async fn write_timeout(
        &self,
        message: Message,
        limit: Duration,
    ) -> Result<Message, ConnectorError> {
        let request_id = message.request_id();
        let (handler, pending) = BlockingResponseHandler::new();

        self.write_with_handler(message, Box::new(handler)).await?;

        match timeout(limit, pending.wait()).await {
            Ok(outcome) => outcome.map_err(|e| into_connector_error(e, request_id)),
            Err(_) => {
                self.registry.remove_response_handler(request_id);
                debug!("Request {} to {} timed out", request_id, self.name);
                Err(ConnectorError::Timeout(request_id, limit))
            }
        }
    }
}

fn into_connector_error(error: ResponseError, request_id: i32) -> ConnectorError {
    match error {
        ResponseError::Remote(e) => ConnectorError::Remote(e),
        ResponseError::Abandoned => ConnectorError::Abandoned(request_id),
    }
}
