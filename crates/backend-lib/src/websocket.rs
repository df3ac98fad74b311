// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! Signaling handler.
//!
//! One `SignalingHandler` exists per WebSocket connection. It turns inbound
//! text frames into [`ClientMessage`]s, validates them and drives the
//! [`RoomRegistry`]. Outbound events never pass through here: the registry
//! pushes them straight onto the connection's event channel.
//!
//! Every error returned from [`SignalingHandler::handle_text`] is meant to be
//! logged and dropped by the caller. A bad frame never ends the connection.

use callroom_common::{ClientMessage, RelayedSignal, SignalKind};

use crate::error::AppError;
use crate::room::{ConnId, JoinOutcome, RoomRegistry};
use crate::validation::validate_client_message;

/// Per-connection message handler
pub struct SignalingHandler {
    registry: RoomRegistry,
    conn: ConnId,
    max_chat_length: usize,
}

impl SignalingHandler {
    pub fn new(registry: RoomRegistry, conn: ConnId, max_chat_length: usize) -> Self {
        Self {
            registry,
            conn,
            max_chat_length,
        }
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    /// Parse, validate and dispatch one text frame
    pub async fn handle_text(&self, text: &str) -> Result<(), AppError> {
        let message = ClientMessage::parse(text)?;
        self.handle_message(message).await
    }

    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), AppError> {
        validate_client_message(&message, self.max_chat_length)
            .map_err(|e| AppError::MalformedMessage(e.to_string()))?;

        match message {
            ClientMessage::JoinRoom { room_id, user_id } => {
                let outcome = self
                    .registry
                    .join(self.conn, room_id.clone(), user_id)
                    .await?;
                if outcome == JoinOutcome::Full {
                    // the room-full event has already been sent
                    return Err(AppError::RoomFull(room_id));
                }
            },
            // the room id, when given, is informational
            ClientMessage::LeaveRoom { .. } => self.registry.leave(self.conn).await?,
            ClientMessage::ChatMessage {
                sender, content, ..
            } => {
                self.registry.send_chat(self.conn, sender, content).await?;
            },
            ClientMessage::WebrtcOffer { offer, extra } => {
                self.relay(SignalKind::Offer, offer, extra).await?;
            },
            ClientMessage::WebrtcAnswer { answer, extra } => {
                self.relay(SignalKind::Answer, answer, extra).await?;
            },
            ClientMessage::WebrtcIceCandidate { candidate, extra } => {
                self.relay(SignalKind::IceCandidate, candidate, extra).await?;
            },
        }

        Ok(())
    }

    async fn relay(
        &self,
        kind: SignalKind,
        payload: serde_json::Value,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<usize, AppError> {
        self.registry
            .relay(self.conn, RelayedSignal::new(kind, payload, extra))
            .await
    }
}
