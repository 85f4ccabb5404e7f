//! WebSocket channel handler.
//!
//! One task per socket: it drains the connection's outbound queue, feeds
//! inbound frames to the realtime core, pings on an interval and closes the
//! socket once the peer goes quiet for longer than the heartbeat timeout.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ember_core::{Handled, Session};
use ember_protocol::EventCodec;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, warn};

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;

/// WebSocket upgrade handler.
///
/// A connection slot is reserved before the upgrade and held by the socket
/// task until it exits.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Ok(slot) = Arc::clone(&state.connection_slots).try_acquire_owned() else {
        warn!(
            limit = state.config.limits.max_connections,
            "Connection limit reached, refusing upgrade"
        );
        metrics::record_rejection();
        return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
    };

    let max_size = state.config.limits.max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: OwnedSemaphorePermit) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (connection_id, mut outbound) = state.hub.attach();
    let mut session = state.realtime.connect(connection_id.clone());
    let codec = EventCodec::with_max_frame_size(state.config.limits.max_message_size);

    let period = Duration::from_millis(state.config.heartbeat.interval_ms.max(1));
    let timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let mut heartbeat = interval_at(tokio::time::Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Events queued by the relay for this connection
            Some(text) = outbound.recv() => {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &codec, &mut session, &text);
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => handle_text(&state, &codec, &mut session, &text),
                        Err(_) => {
                            debug!(connection = %connection_id, "Dropping non UTF-8 binary frame");
                            metrics::record_error("utf8");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        session.touch();
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        session.touch();
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if session.is_stale(timeout) {
                    debug!(connection = %connection_id, "Heartbeat timeout");
                    metrics::record_error("heartbeat_timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.realtime.disconnect(&mut session);
    state.hub.detach(&connection_id);
    metrics::set_online_users(state.realtime.stats().online_users);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode one inbound frame and hand it to the core.
///
/// Frames that do not decode are logged and dropped; the client gets no
/// error event.
fn handle_text(state: &AppState, codec: &EventCodec, session: &mut Session, text: &str) {
    session.touch();

    let event = match codec.decode(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(connection = %session.handle(), error = %e, "Dropping undecodable frame");
            metrics::record_error("protocol");
            return;
        }
    };

    let start = Instant::now();
    metrics::record_event(event.name(), text.len());

    match state.realtime.handle_event(session, event) {
        Handled::Registration(registration) => {
            if registration.is_registered() {
                metrics::record_registration();
                metrics::set_online_users(state.realtime.stats().online_users);
            }
        }
        Handled::Relayed(delivery) => metrics::record_delivery(delivery.outcome()),
    }

    metrics::record_latency(start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use ember_protocol::UserId;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
    use tower::ServiceExt;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server(config: Config) -> (SocketAddr, Arc<AppState>) {
        let state = Arc::new(AppState::new(config, Arc::new(MemoryStore::new())));
        let app = server::router(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        client
    }

    async fn register(client: &mut Client, user: &str) {
        let frame = json!({ "event": "register-user", "data": user }).to_string();
        client.send(ClientMessage::Text(frame.into())).await.unwrap();
    }

    /// Poll until `check` holds, failing after two seconds.
    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Next text frame, skipping control frames.
    async fn next_event(client: &mut Client) -> Value {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match client.next().await {
                    Some(Ok(ClientMessage::Text(text))) => {
                        return serde_json::from_str::<Value>(&text).unwrap();
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("Socket ended: {:?}", other),
                }
            }
        })
        .await
        .expect("no event received")
    }

    async fn post_message(state: &Arc<AppState>, from: &str, to: &str, message: &str) -> StatusCode {
        let request = Request::post("/api/chat/send")
            .header("x-user-id", from)
            .header("content-type", "application/json")
            .body(Body::from(json!({ "to": to, "message": message }).to_string()))
            .unwrap();
        server::router(Arc::clone(state))
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_end_to_end_relay() {
        let (addr, state) = spawn_server(Config::default()).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        register(&mut alice, "A").await;
        register(&mut bob, "B").await;
        eventually(|| state.realtime.stats().online_users == 2).await;

        assert_eq!(post_message(&state, "A", "B", "hi").await, StatusCode::OK);
        assert_eq!(
            next_event(&mut bob).await,
            json!({ "event": "new-message", "data": { "from": "A", "message": "hi" } })
        );

        let offer = r#"{"event":"call-user","data":{"to":"B","offer":{"type":"offer","sdp":"v=0\r\n"},"from":"A"}}"#;
        alice.send(ClientMessage::Text(offer.into())).await.unwrap();
        assert_eq!(
            next_event(&mut bob).await,
            json!({ "event": "incoming-call", "data": { "from": "A", "offer": { "type": "offer", "sdp": "v=0\r\n" } } })
        );

        bob.close(None).await.unwrap();
        eventually(|| !state.realtime.is_online(&UserId::new("B"))).await;

        assert_eq!(post_message(&state, "A", "B", "again").await, StatusCode::OK);
        assert_eq!(
            state
                .store
                .conversation(&UserId::new("A"), &UserId::new("B"))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_bad_frames_are_dropped() {
        let mut config = Config::default();
        config.limits.max_message_size = 128;
        let (addr, state) = spawn_server(config).await;
        let mut client = connect(addr).await;

        client.send(ClientMessage::Text("not json".into())).await.unwrap();
        client
            .send(ClientMessage::Text(r#"{"event":"hang-up"}"#.into()))
            .await
            .unwrap();
        client
            .send(ClientMessage::Binary(br#"{"event":"register-user","data":"A"}"#.to_vec().into()))
            .await
            .unwrap();

        eventually(|| state.realtime.is_online(&UserId::new("A"))).await;
        assert_eq!(state.realtime.stats().online_users, 1);
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_socket() {
        let mut config = Config::default();
        config.limits.max_message_size = 128;
        let (addr, state) = spawn_server(config).await;
        let mut client = connect(addr).await;

        register(&mut client, "A").await;
        eventually(|| state.realtime.is_online(&UserId::new("A"))).await;

        // refused by the socket before it is buffered for decoding
        let oversized = json!({ "event": "register-user", "data": "x".repeat(4096) }).to_string();
        let _ = client.send(ClientMessage::Text(oversized.into())).await;

        eventually(|| !state.realtime.is_online(&UserId::new("A"))).await;
        eventually(|| state.hub.is_empty()).await;
        eventually(|| state.connection_slots.available_permits() == state.config.limits.max_connections).await;
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let mut config = Config::default();
        config.limits.max_connections = 1;
        let (addr, state) = spawn_server(config).await;

        let _first = connect(addr).await;
        eventually(|| state.hub.len() == 1).await;

        match connect_async(format!("ws://{}/ws", addr)).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 503);
            }
            other => panic!("Expected 503, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_concurrent_upgrades_respect_limit() {
        let mut config = Config::default();
        config.limits.max_connections = 2;
        let (addr, state) = spawn_server(config).await;

        let attempts: Vec<_> = (0..8)
            .map(|_| tokio::spawn(connect_async(format!("ws://{}/ws", addr))))
            .collect();

        let mut accepted = Vec::new();
        for attempt in attempts {
            if let Ok((client, _)) = attempt.await.unwrap() {
                accepted.push(client);
            }
        }

        assert_eq!(accepted.len(), 2);
        eventually(|| state.hub.len() == 2).await;
        assert_eq!(state.connection_slots.available_permits(), 0);

        // a closed socket hands its slot back
        let mut first = accepted.remove(0);
        first.close(None).await.unwrap();
        eventually(|| state.connection_slots.available_permits() == 1).await;
        let _again = connect(addr).await;
    }

    #[tokio::test]
    async fn test_silent_peer_is_dropped() {
        let mut config = Config::default();
        config.heartbeat.interval_ms = 50;
        config.heartbeat.timeout_ms = 150;
        let (addr, state) = spawn_server(config).await;

        // never read, so pings are never answered
        let mut client = connect(addr).await;
        register(&mut client, "A").await;
        eventually(|| state.realtime.is_online(&UserId::new("A"))).await;

        eventually(|| !state.realtime.is_online(&UserId::new("A"))).await;
        eventually(|| state.hub.is_empty()).await;
    }
}
