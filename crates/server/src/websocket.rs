//! The `/ws` upgrade endpoint: one client connection, one session, binary
//! envelope frames in both directions (spec §3.5, §6.1).

use crate::state::AppState;
use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use voice_agent_core::{Envelope, Payload};
use voice_agent_session::ConnectionId;
use voice_agent_transport::OutboundSink;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Adapts the axum WebSocket write half to the Transport Hub's sink
/// contract.
struct WsSink {
    sender: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl OutboundSink for WsSink {
    async fn send(&mut self, frame: Vec<u8>) -> bool {
        self.sender.send(WsMessage::Binary(frame)).await.is_ok()
    }

    async fn close(&mut self) {
        let _ = self.sender.close().await;
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    let session_id = state.registry.create(connection_id);

    let (sender, mut receiver) = socket.split();
    state.transport.register(session_id, WsSink { sender });

    let ack = Envelope::new(session_id, Payload::ConnectionLifecycleAck { session_id });
    match ack.encode() {
        Ok(bytes) => {
            state.transport.send(session_id, bytes);
        }
        Err(err) => tracing::error!(%session_id, %err, "failed to encode connection ack"),
    }

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(%session_id, %err, "websocket read error");
                break;
            }
        };

        match message {
            WsMessage::Binary(bytes) => {
                if let Err(err) = dispatch(&state, session_id, &bytes).await {
                    tracing::warn!(%session_id, %err, "failed to decode inbound envelope");
                }
            }
            WsMessage::Close(_) => break,
            _ => continue,
        }
    }

    state.orchestrator.handle_disconnect(session_id).await;
}

async fn dispatch(state: &AppState, session_id: voice_agent_core::SessionId, bytes: &[u8]) -> Result<(), voice_agent_core::CodecError> {
    let envelope = Envelope::decode(bytes)?;
    state.registry.touch(session_id);

    match envelope.payload {
        Payload::AudioInputStart { sampling_rate, language, voice_id } => {
            let _ = state.orchestrator.handle_audio_input_start(session_id, sampling_rate, language, voice_id).await;
        }
        Payload::AudioInputChunk { audio } => {
            state.orchestrator.handle_audio_input_chunk(session_id, audio);
        }
        Payload::AudioInputEnd => {
            state.orchestrator.handle_audio_input_end(session_id).await;
        }
        other => {
            tracing::warn!(%session_id, event_type = other.event_type(), "ignoring unexpected client-bound payload from client");
        }
    }
    Ok(())
}
