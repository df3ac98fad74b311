//! HTTP handlers.
pub mod rooms;
