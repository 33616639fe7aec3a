use super::session::{Session, SessionId, SessionOptions, SessionWriter};
use super::TransportError;
use crate::library::communication::events::SystemEventListener;
use crate::library::communication::handler::ResponseHandler;
use crate::library::communication::writer::IoWriter;
use crate::library::communication::{Message, ResponseRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Upper bound for establishing a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of a single physical connection
///
/// At most one session is held at any time. Inbound messages of the session are
/// dispatched through the [`ResponseRegistry`] handed to the constructor.
pub struct TcpConnector {
    address: String,
    registry: Arc<ResponseRegistry>,
    listener: Arc<dyn SystemEventListener>,
    options: SessionOptions,
    session: Mutex<Option<Session>>,
}

impl TcpConnector {
    /// Creates an unconnected connector for the given `host:port` address
    pub fn new(
        address: impl Into<String>,
        registry: Arc<ResponseRegistry>,
        listener: Arc<dyn SystemEventListener>,
    ) -> Self {
        Self {
            address: address.into(),
            registry,
            listener,
            options: SessionOptions::default(),
            session: Mutex::new(None),
        }
    }

    /// Address this connector connects to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Opens the connection
    ///
    /// Returns `Ok(false)` if the remote party could not be reached within [`CONNECT_TIMEOUT`],
    /// the cause is reported to the event listener. Calling this while a session is bound is
    /// an error, `connect` is not idempotent.
    pub async fn connect(&self) -> Result<bool, TransportError> {
        let mut session = self.session.lock().await;

        if session.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.listener
                    .info(&format!("Unable to connect to {}: {}", self.address, e));
                return Ok(false);
            }
            Err(_) => {
                self.listener.info(&format!(
                    "Unable to connect to {}: no answer within {:?}",
                    self.address, CONNECT_TIMEOUT
                ));
                return Ok(false);
            }
        };

        let new_session = self.spawn_session(stream);
        self.listener.debug(&format!(
            "Connected to {} (session {})",
            self.address,
            new_session.id()
        ));
        *session = Some(new_session);

        Ok(true)
    }

    /// Adopts an already established stream as this connector's session
    pub async fn bind(&self, stream: TcpStream) -> Result<SessionId, TransportError> {
        let mut session = self.session.lock().await;

        if session.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let new_session = self.spawn_session(stream);
        let id = new_session.id();
        *session = Some(new_session);

        Ok(id)
    }

    fn spawn_session(&self, stream: TcpStream) -> Session {
        Session::spawn(
            stream,
            self.registry.clone(),
            self.listener.clone(),
            &self.options,
            CancellationToken::new(),
        )
    }

    /// Closes the session if there is one and waits until it has shut down
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();

        if let Some(session) = session {
            let id = session.id();
            session.close().await;
            self.listener
                .debug(&format!("Disconnected from {} (session {})", self.address, id));
        }
    }

    /// Whether a session is bound and still open
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map_or(false, |session| !session.is_closed())
    }

    /// Identifier of the bound session
    pub async fn session_id(&self) -> Option<SessionId> {
        self.session.lock().await.as_ref().map(Session::id)
    }

    /// Sending handle of the bound session
    pub async fn writer(&self) -> Result<SessionWriter, TransportError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(Session::writer)
            .ok_or(TransportError::NotConnected)
    }

    /// Sends a message without expecting a reply
    pub async fn write(&self, message: Message) -> Result<(), TransportError> {
        self.writer().await?.write(message).map_err(|e| self.report(e))
    }

    /// Registers `handler` for the reply to `message`, then sends it
    pub async fn write_with_handler(
        &self,
        message: Message,
        handler: Box<dyn ResponseHandler>,
    ) -> Result<(), TransportError> {
        self.writer()
            .await?
            .write_with_handler(message, handler)
            .map_err(|e| self.report(e))
    }

    fn report(&self, error: TransportError) -> TransportError {
        self.listener
            .exception(&format!("Unable to write to {}", self.address), &error);
        error
    }
}
