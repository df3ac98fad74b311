// ============================
// callroom-backend/src/lib.rs
// ============================
//! Signaling server for two-party call rooms: room registry, WebRTC relay,
//! in-room chat and the room directory API.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod room;
mod room_actor;
pub mod storage;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use std::sync::Arc;

pub use crate::config::{load_settings, LogFormat, Settings};
pub use crate::error::AppError;
pub use crate::room::{
    ConnId, ConnectionState, JoinOutcome, RegistryConfig, RoomOccupancy, RoomRegistry,
};
pub use crate::storage::{MemoryStore, SessionStore};
pub use crate::ws_router::create_router;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Room registry handle
    pub registry: RoomRegistry,
    /// Session store backend
    pub store: Arc<dyn SessionStore>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create application state around `store`, spawning the room registry.
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn SessionStore>, settings: Settings) -> Self {
        let registry = RoomRegistry::spawn(store.clone(), RegistryConfig::from(&settings));

        Self {
            registry,
            store,
            settings: Arc::new(settings),
        }
    }

    /// Application state backed by a fresh [`MemoryStore`]
    pub fn in_memory(settings: Settings) -> Self {
        Self::new(Arc::new(MemoryStore::new()), settings)
    }
}
