// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between call-room clients and the signaling server.
//!
//! Every frame on the `/ws` channel is a single JSON object whose `type`
//! field selects the variant. Field names are camelCase on the wire, message
//! kinds are kebab-case (`join-room`, `webrtc-ice-candidate`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum number of occupants a room admits.
pub const ROOM_CAPACITY: usize = 2;

/// Message kinds a client is allowed to send.
pub const CLIENT_MESSAGE_TYPES: [&str; 6] = [
    "join-room",
    "leave-room",
    "chat-message",
    "webrtc-offer",
    "webrtc-answer",
    "webrtc-ice-candidate",
];

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join (or re-join) a room
    /// # Fields
    /// * `room_id` - Code of the room to join
    /// * `user_id` - Stable identity of the caller; generated by the server when absent
    JoinRoom {
        room_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Leave the currently joined room
    LeaveRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    /// Post a chat line to the currently joined room
    ChatMessage {
        sender: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    /// SDP offer, relayed untouched to the other participants
    WebrtcOffer {
        offer: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// SDP answer, relayed untouched to the other participants
    WebrtcAnswer {
        answer: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// ICE candidate, relayed untouched to the other participants
    WebrtcIceCandidate {
        candidate: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

/// Why an inbound frame could not be turned into a [`ClientMessage`]
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown message type `{0}`")]
    UnknownType(String),
}

impl ClientMessage {
    /// Parse one text frame.
    ///
    /// The `type` tag is inspected before the body so that kinds the server
    /// does not accept (including server-only kinds such as `room-full`) are
    /// reported as [`ProtocolError::UnknownType`] rather than as malformed.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        if !CLIENT_MESSAGE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_owned()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// The wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::LeaveRoom { .. } => "leave-room",
            ClientMessage::ChatMessage { .. } => "chat-message",
            ClientMessage::WebrtcOffer { .. } => "webrtc-offer",
            ClientMessage::WebrtcAnswer { .. } => "webrtc-answer",
            ClientMessage::WebrtcIceCandidate { .. } => "webrtc-ice-candidate",
        }
    }
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Someone (possibly the receiver) joined the room
    UserJoined {
        room_id: String,
        participant_count: usize,
        user_id: String,
    },
    /// Someone left the room
    UserLeft {
        room_id: String,
        participant_count: usize,
        user_id: String,
    },
    /// The join attempt was rejected because the room is at capacity
    RoomFull { room_id: String },
    /// A stored chat line
    ChatMessage {
        room_id: String,
        sender: String,
        content: String,
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },
    WebrtcOffer {
        offer: Value,
        user_id: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    WebrtcAnswer {
        answer: Value,
        user_id: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    WebrtcIceCandidate {
        candidate: Value,
        user_id: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

/// Which WebRTC negotiation step a relayed payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// A WebRTC payload on its way from one participant to the others.
///
/// The server never looks inside `payload`; `extra` carries any further
/// fields the client attached so they reach the peer unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedSignal {
    pub kind: SignalKind,
    pub payload: Value,
    pub extra: Map<String, Value>,
}

impl RelayedSignal {
    pub fn new(kind: SignalKind, payload: Value, extra: Map<String, Value>) -> Self {
        Self { kind, payload, extra }
    }

    /// Turn the payload into the outbound event, attributed to `user_id`.
    /// A client-supplied `userId` is discarded.
    pub fn stamped(mut self, user_id: &str) -> ServerEvent {
        self.extra.remove("userId");
        let user_id = user_id.to_owned();
        match self.kind {
            SignalKind::Offer => ServerEvent::WebrtcOffer {
                offer: self.payload,
                user_id,
                extra: self.extra,
            },
            SignalKind::Answer => ServerEvent::WebrtcAnswer {
                answer: self.payload,
                user_id,
                extra: self.extra,
            },
            SignalKind::IceCandidate => ServerEvent::WebrtcIceCandidate {
                candidate: self.payload,
                user_id,
                extra: self.extra,
            },
        }
    }
}

/// A room as kept by the session store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    /// Mirrors the live membership size; the registry is authoritative
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A chat line as kept by the session store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: String,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Directory view of a room
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Open,
    Full,
}

impl RoomStatus {
    pub fn for_occupancy(participants: usize) -> Self {
        if participants >= ROOM_CAPACITY {
            RoomStatus::Full
        } else {
            RoomStatus::Open
        }
    }
}

/// Entry of `GET /api/rooms`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoomListing {
    pub id: String,
    pub participants: usize,
    pub status: RoomStatus,
}

impl RoomListing {
    pub fn new(id: String, participants: usize) -> Self {
        Self {
            id,
            participants,
            status: RoomStatus::for_occupancy(participants),
        }
    }
}

/// Body of `POST /api/rooms`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
    Ok,
    Full,
}

/// Body of the directory join/leave responses
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: JoinStatus,
}
