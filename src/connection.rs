use crate::config::AmpConfig;
use crate::error::{AmpError, Result};
use crate::framing::{Frame, LineFramer};
use futures_util::StreamExt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

const READ_BUFFER_SIZE: usize = 1024;

/// Lifecycle of the amplifier socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared between the public handle and the supervisor task
struct Shared {
    config: AmpConfig,
    /// Write half of the live socket, `None` while disconnected
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: watch::Sender<ConnectionState>,
    /// Line handler: every complete line received is pushed here
    lines: mpsc::UnboundedSender<String>,
}

/// Why a read loop ended
enum ReadEnd {
    /// Peer closed the socket
    Eof,
    /// Read failed
    Failed(io::Error),
    /// `close()` was called or the line handler went away
    Stopped,
}

/// Persistent TCP connection with automatic reconnect
///
/// One supervisor task owns the connect / read / reconnect cycle. Failures are
/// never reported to callers; the supervisor logs them, waits the configured
/// delay and tries again until [`Connection::close`] is called.
pub struct Connection {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Create a connection that delivers received lines to `lines`
    ///
    /// Nothing is opened until [`Connection::connect`] is called. Cancelling
    /// `cancel` has the same effect as `close()` minus the wait.
    pub fn new(
        config: AmpConfig,
        lines: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                config,
                writer: Mutex::new(None),
                state,
                lines,
            }),
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Start connecting in the background
    ///
    /// Returns immediately. Connection failures are retried forever, so the
    /// only way to observe success is [`Connection::state`] or
    /// [`Connection::wait_connected`].
    pub async fn connect(&self) {
        if self.cancel.is_cancelled() {
            tracing::warn!("Connection already closed, not reconnecting");
            return;
        }

        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("Connection to {} already running", self.shared.config.address());
            return;
        }

        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            shared.supervise(cancel).await;
        }));
    }

    /// Write raw bytes to the amplifier
    ///
    /// Fails with [`AmpError::NotConnected`] unless a socket is currently
    /// open; nothing is queued for later. Concurrent senders are serialized
    /// so each write reaches the wire whole.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let stream = writer.as_mut().ok_or(AmpError::NotConnected)?;

        tracing::debug!("Sending: {}", String::from_utf8_lossy(data));
        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the socket is connected
    ///
    /// Fails with [`AmpError::NotConnected`] if the connection is closed first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.subscribe_state();

        tokio::select! {
            _ = self.cancel.cancelled() => Err(AmpError::NotConnected),
            result = rx.wait_for(|state| *state == ConnectionState::Connected) => {
                result.map(|_| ()).map_err(|_| AmpError::NotConnected)
            }
        }
    }

    /// Close the socket and stop reconnecting
    ///
    /// Once this returns no more lines are delivered and no reconnect attempt,
    /// including one already waiting out its delay, will start.
    pub async fn close(&self) {
        self.cancel.cancel();

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Connection task failed: {}", e);
            }
        }

        self.shared.drop_writer().await;
        self.shared.set_state(ConnectionState::Disconnected);
        tracing::debug!("Connection closed");
    }
}

impl Shared {
    /// Connect, read until the socket dies, wait, repeat
    async fn supervise(&self, cancel: CancellationToken) {
        let address = self.config.address();

        loop {
            self.set_state(ConnectionState::Connecting);

            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                attempt = self.open(&address) => attempt,
            };

            match attempt {
                Ok(stream) => {
                    tracing::info!("Connected to {}", address);
                    let (reader, writer) = stream.into_split();
                    *self.writer.lock().await = Some(writer);
                    self.set_state(ConnectionState::Connected);

                    let end = self.read_loop(reader, &cancel).await;
                    self.drop_writer().await;
                    self.set_state(ConnectionState::Disconnected);

                    match end {
                        ReadEnd::Eof => tracing::warn!("Connection closed by {}", address),
                        ReadEnd::Failed(e) => tracing::error!("Read loop error: {}", e),
                        ReadEnd::Stopped => break,
                    }
                }
                Err(e) => {
                    tracing::error!("Connection to {} failed: {}", address, e);
                    self.set_state(ConnectionState::Disconnected);
                }
            }

            tracing::info!(
                "Attempting to reconnect in {:?}...",
                self.config.reconnect_delay
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("Connection supervisor for {} stopped", address);
    }

    async fn open(&self, address: &str) -> io::Result<TcpStream> {
        tracing::debug!("Connecting to {}", address);

        match self.config.connect_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(address))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
            None => TcpStream::connect(address).await,
        }
    }

    /// Frame incoming bytes into lines and hand them to the line handler
    ///
    /// The framer lives only as long as this socket, so a partial line left
    /// by a dropped connection is never joined to data from the next one.
    async fn read_loop(&self, reader: OwnedReadHalf, cancel: &CancellationToken) -> ReadEnd {
        let mut frames = FramedRead::with_capacity(reader, LineFramer::new(), READ_BUFFER_SIZE);

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ReadEnd::Stopped,
                frame = frames.next() => frame,
            };

            let line = match frame {
                None => return ReadEnd::Eof,
                Some(Err(e)) => return ReadEnd::Failed(e),
                Some(Ok(Frame::Overflow(dropped))) => {
                    tracing::warn!(
                        "Line too long, discarded {} bytes without a terminator",
                        dropped
                    );
                    continue;
                }
                Some(Ok(Frame::Line(line))) => line,
            };

            if cancel.is_cancelled() {
                return ReadEnd::Stopped;
            }
            tracing::debug!("Received: {}", line);
            if self.lines.send(line).is_err() {
                tracing::debug!("Line handler dropped, stopping read loop");
                return ReadEnd::Stopped;
            }
        }
    }

    async fn drop_writer(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::trace!("Connection state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }
}
