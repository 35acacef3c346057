//! End-to-end tests against a local listener standing in for the amplifier

use proaudio_amp::{
    AmpConfig, AmpController, AmpError, AmpEvent, Attribute, ConnectionState, StatusEvent,
    ZoneStatus, DEFAULT_VOLUME_STEP,
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECONNECT_DELAY: Duration = Duration::from_millis(200);
const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    listener: TcpListener,
    amp: AmpController,
    events: mpsc::UnboundedReceiver<AmpEvent>,
}

impl Harness {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = AmpConfig::new("127.0.0.1", port).with_reconnect_delay(RECONNECT_DELAY);

        let (tx, events) = mpsc::unbounded_channel();
        let amp = AmpController::new(config, move |event: AmpEvent| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
            }
        });

        Self {
            listener,
            amp,
            events,
        }
    }

    /// Connect the controller and return the server side of the socket
    async fn connect(&self) -> TcpStream {
        self.amp.connect().await;
        let socket = self.accept().await;
        timeout(WAIT, self.amp.wait_connected())
            .await
            .unwrap()
            .unwrap();
        socket
    }

    async fn accept(&self) -> TcpStream {
        let (socket, _) = timeout(WAIT, self.listener.accept()).await.unwrap().unwrap();
        socket
    }

    async fn next_event(&mut self) -> AmpEvent {
        timeout(WAIT, self.events.recv()).await.unwrap().unwrap()
    }

    async fn next_status(&mut self) -> StatusEvent {
        match self.next_event().await {
            AmpEvent::Status(status) => status,
            other => panic!("expected status event, got {:?}", other),
        }
    }

    async fn assert_no_event(&mut self) {
        assert!(timeout(Duration::from_millis(200), self.events.recv())
            .await
            .is_err());
    }
}

/// Read until `count` complete `$`-terminated commands have arrived
async fn read_commands(socket: &mut TcpStream, count: usize) -> Vec<String> {
    let mut received = String::new();
    let mut buf = [0u8; 256];
    while received.matches('$').count() < count {
        let n = timeout(WAIT, socket.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "controller closed the socket");
        received.push_str(std::str::from_utf8(&buf[..n]).unwrap());
    }
    received
        .split_inclusive('$')
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn set_volume_round_trip() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    h.amp.set_volume(4, 62).await.unwrap();
    assert_eq!(read_commands(&mut socket, 1).await, vec!["^VPZ @4, 62$"]);

    socket.write_all(b"^=VPZ.2 @4,62\r\n").await.unwrap();
    assert_eq!(
        h.next_status().await,
        StatusEvent::new(4, ZoneStatus::Volume(62))
    );
}

#[tokio::test]
async fn every_command_uses_the_wire_template() {
    let h = Harness::start().await;
    let mut socket = h.connect().await;

    h.amp.set_power(3, true).await.unwrap();
    h.amp.set_mute(3, false).await.unwrap();
    h.amp.set_source(3, 5).await.unwrap();
    h.amp.volume_up(3, DEFAULT_VOLUME_STEP).await.unwrap();
    h.amp.volume_down(3, 4).await.unwrap();
    h.amp.power_off(3).await.unwrap();

    assert_eq!(
        read_commands(&mut socket, 6).await,
        vec![
            "^PZ @3, 1$",
            "^MZ @3, 0$",
            "^SZ @3, 5$",
            "^VPZ @3, +2$",
            "^VPZ @3, -4$",
            "^PZ @3, 0$",
        ]
    );
}

#[tokio::test]
async fn get_status_sends_four_queries_in_order() {
    let h = Harness::start().await;
    let mut socket = h.connect().await;

    h.amp.get_status(7).await.unwrap();
    assert_eq!(
        read_commands(&mut socket, 4).await,
        vec!["^PZ @7, ?$", "^VPZ @7, ?$", "^MZ @7, ?$", "^SZ @7, ?$"]
    );
}

#[tokio::test]
async fn line_split_across_reads_yields_one_event() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket.write_all(b"^=PZ.2 @4,").await.unwrap();
    socket.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    socket.write_all(b"1\r\n").await.unwrap();

    assert_eq!(
        h.next_status().await,
        StatusEvent::new(4, ZoneStatus::Power(true))
    );
    h.assert_no_event().await;
}

#[tokio::test]
async fn two_lines_in_one_read_keep_order() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket
        .write_all(b"^=PZ.2 @4,1\r\n^=MZ.2 @4,0\r\n")
        .await
        .unwrap();

    assert_eq!(h.next_status().await.power(), Some(true));
    assert_eq!(h.next_status().await.mute(), Some(false));
    h.assert_no_event().await;
}

#[tokio::test]
async fn unrecognized_lines_yield_nothing() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket.write_all(b"^ECHO garbage\r\n").await.unwrap();
    h.assert_no_event().await;

    socket.write_all(b"^=SZ.2 @2,6\r\n").await.unwrap();
    assert_eq!(h.next_status().await.source(), Some(6));
}

#[tokio::test]
async fn malformed_value_is_reported_and_reading_continues() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket
        .write_all(b"^=VPZ.2 @4,abc\r\n^=VPZ.2 @4,10\r\n")
        .await
        .unwrap();

    match h.next_event().await {
        AmpEvent::ParseError(e) => {
            assert_eq!(e.attribute, Attribute::Volume);
            assert_eq!(e.line, "^=VPZ.2 @4,abc");
        }
        other => panic!("expected parse error, got {:?}", other),
    }
    assert_eq!(h.next_status().await.volume(), Some(10));
}

#[tokio::test]
async fn reconnects_after_peer_closes() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket.write_all(b"^=MZ.2 @1,1\r\n").await.unwrap();
    assert_eq!(h.next_status().await.mute(), Some(true));

    drop(socket);
    let dropped_at = Instant::now();

    let mut socket = h.accept().await;
    assert!(dropped_at.elapsed() >= RECONNECT_DELAY);
    timeout(WAIT, h.amp.wait_connected()).await.unwrap().unwrap();

    socket.write_all(b"^=MZ.2 @1,0\r\n").await.unwrap();
    assert_eq!(h.next_status().await.mute(), Some(false));
    h.assert_no_event().await;

    h.amp.set_mute(1, true).await.unwrap();
    assert_eq!(read_commands(&mut socket, 1).await, vec!["^MZ @1, 1$"]);
}

#[tokio::test]
async fn partial_line_is_discarded_on_disconnect() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket.write_all(b"^=PZ.2 @4,").await.unwrap();
    drop(socket);

    let mut socket = h.accept().await;
    timeout(WAIT, h.amp.wait_connected()).await.unwrap().unwrap();
    socket.write_all(b"^=SZ.2 @4,2\r\n").await.unwrap();

    assert_eq!(
        h.next_status().await,
        StatusEvent::new(4, ZoneStatus::Source(2))
    );
    h.assert_no_event().await;
}

#[tokio::test]
async fn keeps_retrying_until_the_amp_appears() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = AmpConfig::new("127.0.0.1", port).with_reconnect_delay(RECONNECT_DELAY);
    let amp = AmpController::new(config, |_event: AmpEvent| async {});
    amp.connect().await;

    tokio::time::sleep(RECONNECT_DELAY * 2).await;
    assert_ne!(amp.state(), ConnectionState::Connected);
    assert!(matches!(
        amp.set_power(1, true).await,
        Err(AmpError::NotConnected)
    ));

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let _socket = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    timeout(WAIT, amp.wait_connected()).await.unwrap().unwrap();

    amp.close().await;
}

#[tokio::test]
async fn close_stops_delivery_and_reconnects() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    h.amp.close().await;
    assert_eq!(h.amp.state(), ConnectionState::Disconnected);
    assert!(matches!(
        h.amp.get_status(1).await,
        Err(AmpError::NotConnected)
    ));

    // The peer sees the socket closed and nothing new arrives
    let mut buf = [0u8; 16];
    assert_eq!(
        timeout(WAIT, socket.read(&mut buf)).await.unwrap().unwrap(),
        0
    );
    let _ = socket.write_all(b"^=PZ.2 @1,1\r\n").await;
    h.assert_no_event().await;

    assert!(timeout(RECONNECT_DELAY * 3, h.listener.accept())
        .await
        .is_err());

    // Connecting again after close is a no-op
    h.amp.connect().await;
    assert!(timeout(RECONNECT_DELAY * 2, h.listener.accept())
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_waits_for_an_in_flight_delivery() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = AmpConfig::new("127.0.0.1", port).with_reconnect_delay(RECONNECT_DELAY);

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let amp = AmpController::new(config, move |_event: AmpEvent| {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    amp.connect().await;
    let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    timeout(WAIT, amp.wait_connected()).await.unwrap().unwrap();

    socket.write_all(b"^=PZ.2 @4,1\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    amp.close().await;
    let at_close = delivered.load(Ordering::SeqCst);

    let _ = socket.write_all(b"^=PZ.2 @4,0\r\n").await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), at_close);
    assert_eq!(at_close, 1);
}

#[tokio::test]
async fn unterminated_flood_does_not_stall_the_connection() {
    let mut h = Harness::start().await;
    let mut socket = h.connect().await;

    socket.write_all(&vec![b'A'; 256 * 1024]).await.unwrap();
    socket
        .write_all(b"\r\n^=PZ.2 @4,1\r\n")
        .await
        .unwrap();

    assert_eq!(
        h.next_status().await,
        StatusEvent::new(4, ZoneStatus::Power(true))
    );
    h.assert_no_event().await;
    assert_eq!(h.amp.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn state_changes_are_observable() {
    let h = Harness::start().await;
    let mut states = h.amp.subscribe_state();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

    let _socket = h.connect().await;
    timeout(WAIT, states.wait_for(|state| *state == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    h.amp.close().await;
    assert_eq!(*states.borrow(), ConnectionState::Disconnected);
}
