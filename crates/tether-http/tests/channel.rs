//! Integration tests for ResilientChannel against a local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tether_core::Endpoint;
use tether_http::{
    ChannelConfig, ChannelState, ChatMessage, Envelope, ResilientChannel, Sender,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

// ============================================================================
// Test server
// ============================================================================

struct Connection {
    path: String,
    socket: WebSocketStream<TcpStream>,
}

impl Connection {
    /// Next data or close frame, skipping control frames.
    async fn next_frame(&mut self) -> Option<Message> {
        loop {
            match timeout(WAIT, self.socket.next()).await.ok()?? {
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(message) => return Some(message),
                Err(_) => return None,
            }
        }
    }

    /// Next frame that is not a liveness probe.
    async fn next_non_probe(&mut self) -> Option<Message> {
        loop {
            match self.next_frame().await? {
                Message::Text(text) if text.as_str() == "ping" => continue,
                message => return Some(message),
            }
        }
    }

    async fn send_json(&mut self, value: serde_json::Value) {
        self.socket
            .send(Message::text(value.to_string()))
            .await
            .unwrap();
    }
}

struct TestServer {
    port: u16,
    connections: mpsc::UnboundedReceiver<Connection>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let path = Arc::new(Mutex::new(String::new()));
                let seen = Arc::clone(&path);
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *seen.lock().unwrap() = req.uri().path().to_string();
                    Ok(resp)
                };
                let Ok(socket) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let path = path.lock().unwrap().clone();
                if tx.send(Connection { path, socket }).is_err() {
                    break;
                }
            }
        });

        Self { port, connections }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new(format!("ws://127.0.0.1:{}/ws/chat", self.port)).unwrap()
    }

    async fn accept(&mut self) -> Connection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("no connection arrived")
            .unwrap()
    }

    /// True if no connection arrives within a short quiet period.
    async fn stays_quiet(&mut self) -> bool {
        timeout(QUIET, self.connections.recv()).await.is_err()
    }
}

fn config(server: &TestServer) -> ChannelConfig {
    ChannelConfig::new(server.endpoint())
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
        .with_max_attempts(5)
}

fn collecting_channel(config: ChannelConfig) -> (ResilientChannel, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = ResilientChannel::new(config, move |envelope| {
        let _ = tx.send(envelope);
    });
    (channel, rx)
}

async fn wait_for_state(channel: &ResilientChannel, state: ChannelState) {
    let mut watch = channel.watch_state();
    timeout(WAIT, watch.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .unwrap();
}

fn is_normal_close(message: &Message) -> bool {
    matches!(message, Message::Close(Some(frame)) if frame.code == CloseCode::Normal)
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_connects_to_resource_path() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));
    assert_eq!(channel.state(), ChannelState::Idle);

    channel.connect("thread-42").await;
    let conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    assert_eq!(conn.path, "/ws/chat/thread-42");
    assert!(channel.is_open());
    assert_eq!(channel.resource_id().await.as_deref(), Some("thread-42"));
}

#[tokio::test]
async fn test_forwards_envelopes_and_swallows_acks() {
    let mut server = TestServer::start().await;
    let (channel, mut rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    conn.send_json(json!({"type": "pong"})).await;
    conn.socket.send(Message::text("not json")).await.unwrap();
    conn.send_json(json!({
        "type": "new_message",
        "data": {"id": 7, "type": "official", "text": "hi", "time": "09:30", "isRead": false}
    }))
    .await;

    let envelope = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.kind, "new_message");
    let message: ChatMessage = envelope.data_as().unwrap().unwrap();
    assert_eq!(message.sender, Sender::Official);
    assert_eq!(message.text, "hi");

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_replacing_handler_keeps_connection() {
    let mut server = TestServer::start().await;
    let (channel, mut first) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    let (tx, mut second) = mpsc::unbounded_channel();
    channel.set_handler(move |envelope| {
        let _ = tx.send(envelope);
    });

    conn.send_json(json!({"type": "typing"})).await;

    let envelope = timeout(WAIT, second.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.kind, "typing");
    assert!(first.try_recv().is_err());
    assert!(channel.is_open());
    assert!(server.stays_quiet().await);
}

#[tokio::test]
async fn test_send_requires_open_channel() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));

    assert!(channel.send(&Envelope::new("typing", None)).await.is_err());

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    channel
        .send(&Envelope::new("read", Some(json!({"id": 7}))))
        .await
        .unwrap();

    let frame = conn.next_non_probe().await.unwrap();
    let sent: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(sent, json!({"type": "read", "data": {"id": 7}}));
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_sends_probe() {
    let mut server = TestServer::start().await;
    let (channel, _rx) =
        collecting_channel(config(&server).with_heartbeat_interval(Duration::from_millis(50)));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;

    let frame = conn.next_frame().await.unwrap();
    assert_eq!(frame, Message::text("ping"));
    let frame = conn.next_frame().await.unwrap();
    assert_eq!(frame, Message::text("ping"));
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_dropped_connection() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;
    drop(conn);

    let again = server.accept().await;
    assert_eq!(again.path, "/ws/chat/thread-1");
    wait_for_state(&channel, ChannelState::Open).await;
    assert_eq!(channel.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_abnormal_close_reconnects() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    conn.socket
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();

    let again = server.accept().await;
    assert_eq!(again.path, "/ws/chat/thread-1");
}

#[tokio::test]
async fn test_normal_server_close_is_terminal() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    conn.socket
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    wait_for_state(&channel, ChannelState::Closed).await;
    assert!(server.stays_quiet().await);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    // Bind then drop to obtain a port with nothing listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = Endpoint::new(format!("ws://127.0.0.1:{port}/ws/chat")).unwrap();
    let config = ChannelConfig::new(endpoint)
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .with_max_attempts(3);
    let (channel, _rx) = collecting_channel(config);

    channel.connect("thread-1").await;

    timeout(WAIT, async {
        while !(channel.reconnect_attempts() == 3 && channel.state() == ChannelState::Closed) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::sleep(QUIET).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(channel.reconnect_attempts(), 3);
}

#[tokio::test]
async fn test_repeated_connect_keeps_attempt_budget() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = Endpoint::new(format!("ws://127.0.0.1:{port}/ws/chat")).unwrap();
    let config = ChannelConfig::new(endpoint)
        .with_backoff(Duration::from_millis(40), Duration::from_millis(40))
        .with_max_attempts(3);
    let (channel, _rx) = collecting_channel(config);

    channel.connect("thread-1").await;

    // Re-issuing connect while reconnects are pending must not reset the count.
    let mut highest = 0;
    timeout(WAIT, async {
        while channel.reconnect_attempts() < 3 {
            channel.connect("thread-1").await;
            let attempts = channel.reconnect_attempts();
            assert!(attempts >= highest, "attempts went from {highest} to {attempts}");
            highest = attempts;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("attempt budget was never spent");

    tokio::time::sleep(QUIET).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(channel.reconnect_attempts(), 3);
}

#[tokio::test]
async fn test_connect_after_close_starts_fresh() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;
    conn.socket
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    wait_for_state(&channel, ChannelState::Closed).await;

    channel.connect("thread-1").await;
    let again = server.accept().await;
    assert_eq!(again.path, "/ws/chat/thread-1");
    wait_for_state(&channel, ChannelState::Open).await;
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_disconnect_closes_normally() {
    let mut server = TestServer::start().await;
    let (channel, _rx) =
        collecting_channel(config(&server).with_heartbeat_interval(Duration::from_millis(50)));

    channel.connect("thread-1").await;
    let mut conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Closed);

    let frame = conn.next_non_probe().await.unwrap();
    assert!(is_normal_close(&frame));

    // Several heartbeat periods pass without another probe.
    let mut probes = 0;
    let _ = timeout(QUIET, async {
        while let Some(Ok(message)) = conn.socket.next().await {
            if message == Message::text("ping") {
                probes += 1;
            }
        }
    })
    .await;
    assert_eq!(probes, 0);

    assert!(server.stays_quiet().await);
    assert_eq!(channel.resource_id().await, None);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let mut server = TestServer::start().await;
    let config = ChannelConfig::new(server.endpoint())
        .with_backoff(Duration::from_millis(150), Duration::from_millis(150))
        .with_max_attempts(5);
    let (channel, _rx) = collecting_channel(config);

    channel.connect("thread-1").await;
    let conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;
    drop(conn);

    timeout(WAIT, async {
        while channel.reconnect_attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(server.stays_quiet().await);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_switching_resource_tears_down_previous() {
    let mut server = TestServer::start().await;
    let (channel, mut rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let mut first = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    channel.connect("thread-2").await;

    let frame = first.next_non_probe().await.unwrap();
    assert!(is_normal_close(&frame));

    let mut second = server.accept().await;
    assert_eq!(second.path, "/ws/chat/thread-2");
    wait_for_state(&channel, ChannelState::Open).await;
    assert_eq!(channel.resource_id().await.as_deref(), Some("thread-2"));

    second.send_json(json!({"type": "typing"})).await;
    let envelope = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.kind, "typing");
}

#[tokio::test]
async fn test_connect_same_resource_is_noop() {
    let mut server = TestServer::start().await;
    let (channel, _rx) = collecting_channel(config(&server));

    channel.connect("thread-1").await;
    let _conn = server.accept().await;
    wait_for_state(&channel, ChannelState::Open).await;

    channel.connect("thread-1").await;
    assert!(server.stays_quiet().await);
    assert!(channel.is_open());
}
