//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use readalong_common::id::{prefix, prefixed_ulid};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time;

use crate::auth::tokens;
use crate::broker::{Envelope, Topic, TopicEvent};
use crate::error::ApiError;
use crate::guards;
use crate::services::OutgoingMessage;
use crate::AppState;

use super::events::{
    ClientMessage, ConnectPayload, EventName, GatewayMessage, HeartbeatPayload, RoomPayload, SendPayload,
    OP_CONNECT, OP_DEBUG_SEND, OP_HEARTBEAT, OP_SEND, OP_SUBSCRIBE, OP_UNSUBSCRIBE,
};
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_FORCED_DISCONNECT: u16 = 4005;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving CONNECT after the upgrade (seconds).
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Interval the client is told to heartbeat at.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: wait for CONNECT within the timeout.
    let connect = time::timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        read_connect(&mut ws_rx),
    )
    .await;

    let payload = match connect {
        Ok(Ok(payload)) => payload,
        Ok(Err((code, reason))) => {
            tracing::debug!(%reason, "gateway handshake failed");
            let _ = send_close(&mut ws_tx, code, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    // Step 2: authenticate. No session exists until this succeeds.
    let user_id = match tokens::verify_bearer(&payload.authorization, &state.config.jwt_secret) {
        Ok(user_id) => user_id,
        Err(_) => {
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, "AccessDenied").await;
            return;
        }
    };

    let mut session = GatewaySession::new(prefixed_ulid(prefix::GATEWAY_SESSION), user_id);

    // Subscribe before going online so a kick published right after cannot
    // slip past this socket.
    let broker_rx = state.broker.subscribe();

    let status = match state.presence.connect(&session.user_id, &session.session_id).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, user_id = %session.user_id, "presence connect failed");
            let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Presence unavailable").await;
            return;
        }
    };

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        "gateway session established"
    );

    let seq = session.next_seq();
    let ready = GatewayMessage::dispatch(
        EventName::READY,
        seq,
        serde_json::json!({
            "session_id": session.session_id,
            "user_id": session.user_id,
            "status": status,
            "heartbeat_interval": HEARTBEAT_INTERVAL_MS,
        }),
    );

    if send_message(&mut ws_tx, &ready).await.is_ok() {
        run_session(&state, &mut session, ws_tx, ws_rx, broker_rx).await;
    }

    if let Err(e) = state
        .presence
        .disconnect(&session.user_id, &session.session_id)
        .await
    {
        tracing::error!(error = %e, user_id = %session.user_id, "presence disconnect failed");
    }

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        rooms = session.room_count(),
        "gateway session ended"
    );
}

/// Read frames until the first meaningful one, which must be CONNECT.
async fn read_connect(ws_rx: &mut WsStream) -> Result<ConnectPayload, (u16, &'static str)> {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => return Err((CLOSE_UNKNOWN_ERROR, "Client closed")),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during connect");
                return Err((CLOSE_UNKNOWN_ERROR, "Read error"));
            }
        };

        let client_msg: ClientMessage =
            serde_json::from_str(&text).map_err(|_| (CLOSE_UNKNOWN_ERROR, "Invalid JSON"))?;

        if client_msg.op != OP_CONNECT {
            return Err((CLOSE_NOT_AUTHENTICATED, "Expected CONNECT"));
        }
        return serde_json::from_value(client_msg.d).map_err(|_| (CLOSE_AUTH_FAILED, "AccessDenied"));
    }
    Err((CLOSE_UNKNOWN_ERROR, "Connection closed before CONNECT"))
}

/// What the loop should do after handling one frame or envelope.
enum Flow {
    Continue,
    Close,
}

/// Main session event loop: read client frames, forward broker envelopes,
/// enforce the heartbeat deadline.
async fn run_session(
    state: &AppState,
    session: &mut GatewaySession,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut broker_rx: broadcast::Receiver<Arc<Envelope>>,
) {
    // Client must heartbeat within 1.5x the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        let flow = tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_client_frame(state, session, &mut ws_tx, &text, &mut got_heartbeat).await
                }
                Some(Ok(Message::Close(_))) | None => Flow::Close,
                Some(Err(e)) => {
                    tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                    Flow::Close
                }
                Some(Ok(_)) => Flow::Continue,
            },

            result = broker_rx.recv() => match result {
                Ok(envelope) => forward_envelope(session, &mut ws_tx, &envelope).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        skipped = n,
                        "gateway session lagged behind broker"
                    );
                    Flow::Continue
                }
                Err(broadcast::error::RecvError::Closed) => Flow::Close,
            },

            _ = heartbeat_timer.tick() => {
                if got_heartbeat {
                    got_heartbeat = false;
                    Flow::Continue
                } else {
                    tracing::debug!(session_id = %session.session_id, "heartbeat timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    Flow::Close
                }
            }
        };

        if let Flow::Close = flow {
            break;
        }
    }
}

async fn handle_client_frame(
    state: &AppState,
    session: &mut GatewaySession,
    ws_tx: &mut WsSink,
    text: &str,
    got_heartbeat: &mut bool,
) -> Flow {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => {
            let _ = send_close(ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
            return Flow::Close;
        }
    };

    let reply = match client_msg.op {
        OP_HEARTBEAT => {
            *got_heartbeat = true;
            let payload: HeartbeatPayload =
                serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
            Ok(Some(GatewayMessage::heartbeat_ack(payload.seq)))
        }
        OP_SUBSCRIBE => match decode::<RoomPayload>(client_msg.d) {
            Ok(p) => subscribe_room(state, session, &p.room_id).await,
            Err(e) => Err(e),
        },
        OP_UNSUBSCRIBE => decode::<RoomPayload>(client_msg.d).map(|p| {
            session.unsubscribe(&p.room_id);
            let seq = session.next_seq();
            Some(GatewayMessage::dispatch(
                EventName::UNSUBSCRIBED,
                seq,
                serde_json::json!({ "room_id": p.room_id }),
            ))
        }),
        OP_SEND => match decode::<SendPayload>(client_msg.d) {
            Ok(p) => state
                .chat
                .send(
                    &session.user_id,
                    &p.room_id,
                    OutgoingMessage {
                        message_type: p.message_type,
                        content: p.content,
                        content_type: p.content_type,
                    },
                )
                .await
                .map(|_| None),
            Err(e) => Err(e),
        },
        OP_DEBUG_SEND => match decode::<SendPayload>(client_msg.d) {
            Ok(p) => state
                .chat
                .debug_send(&session.user_id, &p.room_id, &p.content)
                .await
                .map(|_| None),
            Err(e) => Err(e),
        },
        OP_CONNECT => {
            let _ = send_close(ws_tx, CLOSE_UNKNOWN_ERROR, "Already connected").await;
            return Flow::Close;
        }
        _ => {
            let _ = send_close(ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
            return Flow::Close;
        }
    };

    let frame = match reply {
        Ok(Some(frame)) => frame,
        Ok(None) => return Flow::Continue,
        Err(e) => {
            tracing::debug!(
                session_id = %session.session_id,
                op = client_msg.op,
                code = %e.code,
                "gateway command rejected"
            );
            GatewayMessage::error(&e.code, &e.message)
        }
    };

    match send_message(ws_tx, &frame).await {
        Ok(()) => Flow::Continue,
        Err(_) => Flow::Close,
    }
}

/// Follow a room's chat topic. Only ACTIVE participants may listen in.
async fn subscribe_room(
    state: &AppState,
    session: &mut GatewaySession,
    room_id: &str,
) -> Result<Option<GatewayMessage>, ApiError> {
    guards::require_active_participant(state.directory.participants.as_ref(), room_id, &session.user_id)
        .await?;
    session.subscribe(room_id);

    let seq = session.next_seq();
    Ok(Some(GatewayMessage::dispatch(
        EventName::SUBSCRIBED,
        seq,
        serde_json::json!({ "room_id": room_id }),
    )))
}

async fn forward_envelope(session: &mut GatewaySession, ws_tx: &mut WsSink, envelope: &Envelope) -> Flow {
    if envelope.topic == Topic::UserKick {
        if envelope.payload == session.user_id {
            tracing::info!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                "forced disconnect"
            );
            let _ = send_close(ws_tx, CLOSE_FORCED_DISCONNECT, "Disconnected").await;
            return Flow::Close;
        }
        return Flow::Continue;
    }

    if !session.wants(&envelope.topic) {
        return Flow::Continue;
    }

    let event: TopicEvent = match serde_json::from_str(&envelope.payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(?e, topic = %envelope.topic, "dropping malformed broker payload");
            return Flow::Continue;
        }
    };

    // Stop following a room once this user is out of it or it has ended.
    if let Topic::ChatRoom(room_id) = &envelope.topic {
        if ends_room_subscription(&event, &session.user_id) {
            session.unsubscribe(room_id);
        }
    }

    let seq = session.next_seq();
    let msg = GatewayMessage::dispatch(&event.event, seq, event.data);
    match send_message(ws_tx, &msg).await {
        Ok(()) => Flow::Continue,
        Err(_) => Flow::Close,
    }
}

fn ends_room_subscription(event: &TopicEvent, user_id: &str) -> bool {
    match event.event.as_str() {
        EventName::ROOM_UPDATE => event.data.get("status").and_then(Value::as_str) == Some("FINISHED"),
        EventName::PARTICIPANT_UPDATE => {
            event.data.get("user_id").and_then(Value::as_str) == Some(user_id)
                && event.data.get("connection_status").and_then(Value::as_str) != Some("ACTIVE")
        }
        _ => false,
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|e| ApiError::bad_request(format!("Invalid payload: {e}")))
}

async fn send_message(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, data: Value) -> TopicEvent {
        TopicEvent {
            event: name.to_string(),
            data,
        }
    }

    #[test]
    fn finished_room_ends_subscription() {
        let finished = event(EventName::ROOM_UPDATE, serde_json::json!({ "status": "FINISHED" }));
        let playing = event(EventName::ROOM_UPDATE, serde_json::json!({ "status": "PLAYING" }));
        assert!(ends_room_subscription(&finished, "u1"));
        assert!(!ends_room_subscription(&playing, "u1"));
    }

    #[test]
    fn own_exit_ends_subscription() {
        let kicked = event(
            EventName::PARTICIPANT_UPDATE,
            serde_json::json!({ "user_id": "u1", "connection_status": "EXITED", "is_kicked": true }),
        );
        assert!(ends_room_subscription(&kicked, "u1"));
        assert!(!ends_room_subscription(&kicked, "u2"));

        let entered = event(
            EventName::PARTICIPANT_UPDATE,
            serde_json::json!({ "user_id": "u1", "connection_status": "ACTIVE" }),
        );
        assert!(!ends_room_subscription(&entered, "u1"));
    }
}
