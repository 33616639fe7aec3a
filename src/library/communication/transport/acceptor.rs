use super::session::{Session, SessionOptions};
use super::TransportError;
use crate::library::communication::events::SystemEventListener;
use crate::library::communication::handler::MessageHandler;
use crate::library::communication::ResponseRegistry;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default bidirectional idle threshold of accepted sessions
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

impl SessionOptions {
    /// Options applied to accepted sessions unless configured otherwise
    pub fn accepting() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            ..Self::default()
        }
    }
}

/// Listening side of the transport
///
/// Every accepted connection becomes a [`Session`] with its own [`ResponseRegistry`] which hands
/// new requests to the shared [`MessageHandler`].
pub struct Acceptor {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    sessions: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl Acceptor {
    /// Binds to `address` and starts accepting connections in the background
    pub async fn bind(
        address: &str,
        handler: Arc<dyn MessageHandler>,
        listener: Arc<dyn SystemEventListener>,
        options: SessionOptions,
    ) -> Result<Self, TransportError> {
        let socket = TcpListener::bind(address).await?;
        let local_addr = socket.local_addr()?;
        let shutdown = CancellationToken::new();
        let sessions = Arc::new(AtomicUsize::new(0));

        listener.info(&format!("Accepting connections on {}", local_addr));

        let accept_task = tokio::spawn(accept_loop(
            socket,
            handler,
            listener,
            options,
            shutdown.clone(),
            sessions.clone(),
        ));

        Ok(Self {
            local_addr,
            shutdown,
            sessions,
            accept_task,
        })
    }

    /// Address the acceptor is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of sessions which are currently open
    pub fn current_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Stops accepting, closes every open session and waits for them to terminate
    pub async fn stop(self) {
        self.shutdown.cancel();

        if let Err(e) = self.accept_task.await {
            log::warn!("Accept loop on {} failed: {}", self.local_addr, e);
        }
    }
}

async fn accept_loop(
    socket: TcpListener,
    handler: Arc<dyn MessageHandler>,
    listener: Arc<dyn SystemEventListener>,
    options: SessionOptions,
    shutdown: CancellationToken,
    sessions: Arc<AtomicUsize>,
) {
    let mut monitors: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = socket.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                listener.exception("Unable to accept connection", &e);
                continue;
            }
        };

        let registry = Arc::new(ResponseRegistry::with_generic_handler(handler.clone()));
        let session = Session::spawn(
            stream,
            registry,
            listener.clone(),
            &options,
            shutdown.child_token(),
        );

        listener.debug(&format!("Accepted session {} from {}", session.id(), peer));
        sessions.fetch_add(1, Ordering::SeqCst);

        let counter = sessions.clone();
        let session_listener = listener.clone();
        monitors.retain(|monitor| !monitor.is_finished());
        monitors.push(tokio::spawn(async move {
            let id = session.id();
            session.join().await;
            counter.fetch_sub(1, Ordering::SeqCst);
            session_listener.debug(&format!("Session {} closed", id));
        }));
    }

    join_all(monitors).await;
}
