use crate::config::AmpConfig;
use crate::connection::{Connection, ConnectionState};
use crate::error::Result;
use crate::protocol::{self, ZoneCommand};
use crate::types::{AmpEvent, SourceId, VolumeLevel, ZoneId};
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Suggested step for `volume_up`/`volume_down`, in percent
pub const DEFAULT_VOLUME_STEP: u32 = 2;

/// Receiver of decoded status events
///
/// Events are delivered one at a time in the order their lines arrived; the
/// next event isn't decoded until the future returned for the previous one
/// has completed. Any `FnMut(AmpEvent) -> impl Future<Output = ()>` closure
/// is a subscriber.
pub trait StatusSubscriber: Send + 'static {
    fn on_event(&mut self, event: AmpEvent) -> BoxFuture<'static, ()>;
}

impl<F, Fut> StatusSubscriber for F
where
    F: FnMut(AmpEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_event(&mut self, event: AmpEvent) -> BoxFuture<'static, ()> {
        (self)(event).boxed()
    }
}

/// Line channel and subscriber, parked until the dispatcher is started
struct PendingDispatch {
    lines: mpsc::UnboundedReceiver<String>,
    subscriber: Box<dyn StatusSubscriber>,
}

/// Client for a multi-zone amplifier
///
/// `AmpController` sends zone commands over a single persistent connection and
/// forwards every status line the amplifier reports to the subscriber given at
/// construction. Commands are fire-and-forget: the amplifier answers
/// asynchronously and replies are only tied to a zone, never to the command
/// that caused them.
///
/// # Example
///
/// ```no_run
/// use proaudio_amp::{AmpConfig, AmpController, AmpEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = AmpConfig::new("10.0.50.166", 50005);
///     let amp = AmpController::new(config, |event: AmpEvent| async move {
///         println!("{:?}", event);
///     });
///
///     amp.connect().await;
///     amp.wait_connected().await?;
///     amp.get_status(4).await?;
///     amp.set_volume(4, 30).await?;
///
///     amp.close().await;
///     Ok(())
/// }
/// ```
pub struct AmpController {
    connection: Connection,
    pending: Mutex<Option<PendingDispatch>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl AmpController {
    /// Create a controller for the amplifier described by `config`
    ///
    /// No connection is made until [`AmpController::connect`] is called.
    pub fn new(config: AmpConfig, subscriber: impl StatusSubscriber) -> Self {
        tracing::debug!("Creating controller for {}", config.address());

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let connection = Connection::new(config, line_tx, cancel.child_token());

        Self {
            connection,
            pending: Mutex::new(Some(PendingDispatch {
                lines: line_rx,
                subscriber: Box::new(subscriber),
            })),
            dispatcher: Mutex::new(None),
            cancel,
        }
    }

    /// Start the connection and the event dispatcher
    ///
    /// Returns without waiting for the socket; failures are retried in the
    /// background. Use [`AmpController::wait_connected`] to wait for it.
    pub async fn connect(&self) {
        if let Some(pending) = self.pending.lock().await.take() {
            let handle = tokio::spawn(dispatch(
                pending.lines,
                pending.subscriber,
                self.cancel.clone(),
            ));
            *self.dispatcher.lock().await = Some(handle);
        }
        self.connection.connect().await;
    }

    /// Wait until the amplifier socket is connected
    pub async fn wait_connected(&self) -> Result<()> {
        self.connection.wait_connected().await
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Close the connection
    ///
    /// Stops reconnecting and event delivery. A subscriber call already in
    /// progress is allowed to finish; once this returns the subscriber is
    /// never called again. The controller can't be reconnected afterwards.
    ///
    /// Must not be awaited from inside the subscriber, which would wait on
    /// itself.
    pub async fn close(&self) {
        tracing::debug!("Closing controller");
        self.cancel.cancel();
        self.connection.close().await;

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Status dispatcher failed: {}", e);
            }
        }
    }

    /// Send an arbitrary zone command
    pub async fn send_command(&self, command: ZoneCommand) -> Result<()> {
        self.connection.send(command.encode().as_bytes()).await
    }

    // ========== Status ==========

    /// Ask the amplifier for the power, volume, mute and source of a zone
    ///
    /// The answers arrive later as four separate status events.
    pub async fn get_status(&self, zone: ZoneId) -> Result<()> {
        tracing::info!("Getting status for zone {}", zone);
        for query in protocol::status_queries(zone) {
            self.send_command(query).await?;
        }
        Ok(())
    }

    // ========== Power ==========

    /// Switch a zone on or off
    pub async fn set_power(&self, zone: ZoneId, power: bool) -> Result<()> {
        if power {
            tracing::info!("Powering on zone {}", zone);
        } else {
            tracing::info!("Powering off zone {}", zone);
        }
        self.send_command(ZoneCommand::power(zone, power)).await
    }

    /// Switch a zone on
    pub async fn power_on(&self, zone: ZoneId) -> Result<()> {
        self.set_power(zone, true).await
    }

    /// Switch a zone off
    pub async fn power_off(&self, zone: ZoneId) -> Result<()> {
        self.set_power(zone, false).await
    }

    // ========== Mute ==========

    /// Mute or unmute a zone
    pub async fn set_mute(&self, zone: ZoneId, mute: bool) -> Result<()> {
        if mute {
            tracing::info!("Muting zone {}", zone);
        } else {
            tracing::info!("Unmuting zone {}", zone);
        }
        self.send_command(ZoneCommand::mute(zone, mute)).await
    }

    /// Mute a zone
    pub async fn mute(&self, zone: ZoneId) -> Result<()> {
        self.set_mute(zone, true).await
    }

    /// Unmute a zone
    pub async fn unmute(&self, zone: ZoneId) -> Result<()> {
        self.set_mute(zone, false).await
    }

    // ========== Volume ==========

    /// Set the absolute volume of a zone, in percent
    ///
    /// The value is not clamped; the amplifier decides what to do with levels
    /// above 100.
    pub async fn set_volume(&self, zone: ZoneId, volume: VolumeLevel) -> Result<()> {
        tracing::info!("Setting volume to {} on zone {}", volume, zone);
        self.send_command(ZoneCommand::volume(zone, volume)).await
    }

    /// Raise the volume of a zone by `steps` percent
    pub async fn volume_up(&self, zone: ZoneId, steps: u32) -> Result<()> {
        tracing::info!("Volume up by {} on zone {}", steps, zone);
        self.send_command(ZoneCommand::volume_step(zone, saturating_step(steps)))
            .await
    }

    /// Lower the volume of a zone by `steps` percent
    pub async fn volume_down(&self, zone: ZoneId, steps: u32) -> Result<()> {
        tracing::info!("Volume down by {} on zone {}", steps, zone);
        self.send_command(ZoneCommand::volume_step(zone, -saturating_step(steps)))
            .await
    }

    // ========== Source ==========

    /// Select the input source played in a zone
    ///
    /// Source ids are forwarded as given; the amplifier ignores unknown ones.
    pub async fn set_source(&self, zone: ZoneId, source: SourceId) -> Result<()> {
        tracing::info!("Setting source to {} on zone {}", source, zone);
        self.send_command(ZoneCommand::source(zone, source)).await
    }
}

impl Drop for AmpController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn saturating_step(steps: u32) -> i32 {
    i32::try_from(steps).unwrap_or(i32::MAX)
}

/// Decode received lines and hand the results to the subscriber, in order
async fn dispatch(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut subscriber: Box<dyn StatusSubscriber>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let event = match protocol::decode(&line) {
            Ok(Some(status)) => AmpEvent::Status(status),
            Ok(None) => {
                tracing::trace!("Ignoring unrecognized line: {}", line);
                continue;
            }
            Err(e) => {
                tracing::warn!("{}", e);
                AmpEvent::ParseError(e)
            }
        };

        if cancel.is_cancelled() {
            break;
        }
        subscriber.on_event(event).await;
    }

    tracing::debug!("Status dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_saturate_instead_of_wrapping() {
        assert_eq!(saturating_step(2), 2);
        assert_eq!(saturating_step(u32::MAX), i32::MAX);
    }

    #[tokio::test]
    async fn commands_fail_before_connect() {
        let amp = AmpController::new(AmpConfig::new("127.0.0.1", 1), |_event: AmpEvent| async {});
        assert_eq!(amp.state(), ConnectionState::Disconnected);
        assert!(amp.set_volume(4, 62).await.is_err());
        assert!(amp.get_status(4).await.is_err());
    }

    #[tokio::test]
    async fn dispatcher_skips_noise_and_reports_parse_errors() {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let subscriber = move |event: AmpEvent| {
            let event_tx = event_tx.clone();
            async move {
                let _ = event_tx.send(event);
            }
        };

        for line in ["^ECHO garbage", "^=VPZ.2 @4,abc", "^=VPZ.2 @4,62"] {
            line_tx.send(line.to_string()).unwrap();
        }
        drop(line_tx);
        dispatch(line_rx, Box::new(subscriber), CancellationToken::new()).await;

        assert!(matches!(event_rx.recv().await, Some(AmpEvent::ParseError(_))));
        let status = event_rx.recv().await.unwrap();
        assert_eq!(status.status().and_then(|s| s.volume()), Some(62));
        assert!(event_rx.try_recv().is_err());
    }
}
