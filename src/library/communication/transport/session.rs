use super::codec::{MessageCodec, DEFAULT_MAX_FRAME_LENGTH};
use super::TransportError;
use crate::library::communication::events::SystemEventListener;
use crate::library::communication::handler::ResponseHandler;
use crate::library::communication::writer::IoWriter;
use crate::library::communication::{Message, ResponseRegistry};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Size of the read buffer if nothing else is configured
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2048;

/// Opaque identifier of a physical session
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tuning knobs of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Initial capacity of the read buffer
    pub read_buffer_size: usize,
    /// Largest accepted frame in bytes
    pub max_frame_length: usize,
    /// Period without traffic in either direction after which the session is reported as idle
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            idle_timeout: None,
        }
    }
}

/// Milliseconds since session start at which traffic was last observed
struct Activity {
    started: Instant,
    last: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let now = self.started.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last.load(Ordering::Relaxed)))
    }
}

/// Sending handle of a [`Session`]
///
/// Cheap to clone; all clones feed the same outgoing queue.
#[derive(Clone)]
pub struct SessionWriter {
    id: SessionId,
    outgoing: mpsc::UnboundedSender<Message>,
    registry: Arc<ResponseRegistry>,
    activity: Arc<Activity>,
}

impl SessionWriter {
    /// Identifier of the session this writer belongs to
    pub fn session_id(&self) -> SessionId {
        self.id
    }
}

impl IoWriter for SessionWriter {
    fn write(&self, message: Message) -> Result<(), TransportError> {
        self.outgoing
            .send(message)
            .map_err(|_| TransportError::Closed)?;
        self.activity.touch();
        Ok(())
    }

    fn write_with_handler(
        &self,
        message: Message,
        handler: Box<dyn ResponseHandler>,
    ) -> Result<(), TransportError> {
        let request_id = message.request_id();

        if !message.expects_reply() {
            return Err(TransportError::HandlerForOneWay(request_id));
        }

        self.registry.add_response_handler(request_id, handler);

        if let Err(e) = self.write(message) {
            self.registry.remove_response_handler(request_id);
            return Err(e);
        }

        Ok(())
    }
}

/// Established physical connection with its reader and writer tasks
///
/// Inbound messages are dispatched through the [`ResponseRegistry`] in the order they arrive,
/// one at a time, on the reader task. Outbound messages are queued and written by the writer task.
pub struct Session {
    writer: SessionWriter,
    shutdown: CancellationToken,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Session {
    /// Starts serving a connected stream
    ///
    /// Cancelling `shutdown` closes the session.
    pub fn spawn(
        stream: TcpStream,
        registry: Arc<ResponseRegistry>,
        listener: Arc<dyn SystemEventListener>,
        options: &SessionOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let id = SessionId::generate();
        let (read_half, write_half) = stream.into_split();
        let (outgoing, queue) = mpsc::unbounded_channel();
        let activity = Arc::new(Activity::new());

        let writer = SessionWriter {
            id,
            outgoing,
            registry: registry.clone(),
            activity: activity.clone(),
        };

        let frames_in = FramedRead::with_capacity(
            read_half,
            MessageCodec::new(options.max_frame_length),
            options.read_buffer_size,
        );
        let frames_out = FramedWrite::new(write_half, MessageCodec::new(options.max_frame_length));

        let reader_task = tokio::spawn(read_loop(
            frames_in,
            writer.clone(),
            registry,
            listener.clone(),
            options.idle_timeout,
            shutdown.clone(),
        ));
        let writer_task = tokio::spawn(write_loop(frames_out, queue, listener, id, shutdown.clone()));

        Self {
            writer,
            shutdown,
            reader_task,
            writer_task,
        }
    }

    /// Identifier of this session
    pub fn id(&self) -> SessionId {
        self.writer.id
    }

    /// Sending handle for this session
    pub fn writer(&self) -> SessionWriter {
        self.writer.clone()
    }

    /// Whether the session has stopped reading, e.g. because the peer closed the connection
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.reader_task.is_finished()
    }

    /// Closes the session and waits until both directions have shut down
    pub async fn close(self) {
        self.shutdown.cancel();
        self.join().await;
    }

    /// Waits until the session terminates on its own (or is cancelled from elsewhere)
    pub async fn join(self) {
        if let Err(e) = self.reader_task.await {
            log::warn!("Reader task of session {} failed: {}", self.writer.id, e);
        }

        // Reading has stopped for good, nothing will be written anymore either
        self.shutdown.cancel();

        if let Err(e) = self.writer_task.await {
            log::warn!("Writer task of session {} failed: {}", self.writer.id, e);
        }
    }
}

type FrameReader = FramedRead<tokio::net::tcp::OwnedReadHalf, MessageCodec>;
type FrameWriter = FramedWrite<tokio::net::tcp::OwnedWriteHalf, MessageCodec>;

async fn read_loop(
    mut frames: FrameReader,
    writer: SessionWriter,
    registry: Arc<ResponseRegistry>,
    listener: Arc<dyn SystemEventListener>,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
) {
    let id = writer.id;
    let activity = writer.activity.clone();
    let writer: Arc<dyn IoWriter> = Arc::new(writer);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = next_frame(&mut frames, idle_timeout) => next,
        };

        let message = match next {
            Some(Some(Ok(message))) => message,
            Some(Some(Err(e))) => {
                listener.exception(&format!("Session {} failed to read a message", id), &e);
                break;
            }
            Some(None) => {
                listener.debug(&format!("Session {} closed by peer", id));
                break;
            }
            None => {
                if idle_timeout.map_or(false, |idle| activity.idle_for() >= idle) {
                    listener.debug(&format!("Session {} is idle", id));
                    activity.touch();
                }
                continue;
            }
        };

        activity.touch();

        // A message nobody can handle is dropped, the session itself keeps going
        if let Err(e) = registry.on_message_received(writer.clone(), message).await {
            listener.exception(&format!("Session {} was unable to process message", id), &e);
        }
    }

    shutdown.cancel();
}

/// Reads the next frame, returning `None` if the idle period elapsed first
async fn next_frame(
    frames: &mut FrameReader,
    idle_timeout: Option<Duration>,
) -> Option<Option<Result<Message, TransportError>>> {
    match idle_timeout {
        Some(idle) => timeout(idle, frames.next()).await.ok(),
        None => Some(frames.next().await),
    }
}

async fn write_loop(
    mut frames: FrameWriter,
    mut queue: mpsc::UnboundedReceiver<Message>,
    listener: Arc<dyn SystemEventListener>,
    id: SessionId,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            message = queue.recv() => message,
            _ = shutdown.cancelled() => None,
        };

        let message = match message {
            Some(message) => message,
            None => break,
        };

        if let Err(e) = frames.send(message).await {
            listener.exception(&format!("Session {} failed to write a message", id), &e);
            shutdown.cancel();
            break;
        }
    }

    if let Err(e) = frames.close().await {
        listener.debug(&format!("Session {} did not shut down cleanly: {}", id, e));
    }
}
