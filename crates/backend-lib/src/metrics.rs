// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const FRAME_DROPPED: &str = "ws.frame_dropped";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_DELETED: &str = "room.deleted";
pub const ROOM_ACTIVE: &str = "room.active";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_FULL: &str = "room.full";
pub const CHAT_MESSAGE: &str = "chat.message";
pub const SIGNAL_RELAYED: &str = "signal.relayed";
pub const RESERVATION_CREATED: &str = "reservation.created";
pub const RESERVATION_EXPIRED: &str = "reservation.expired";
