//! Shared helpers for the registry, signaling and directory suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callroom_backend::{
    AppError, ConnId, MemoryStore, RegistryConfig, RoomRegistry, SessionStore,
};
use callroom_common::{Room, RoomMessage, ServerEvent};
use tokio::sync::mpsc;

pub type Events = mpsc::UnboundedReceiver<ServerEvent>;

/// Registry over a fresh in-memory store, with default timings
pub fn spawn_registry() -> (RoomRegistry, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let registry = RoomRegistry::spawn(store.clone(), RegistryConfig::default());
    (registry, store)
}

/// Registry whose reservations lapse after `ttl`
pub fn spawn_registry_with_ttl(ttl: Duration) -> (RoomRegistry, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = RegistryConfig {
        reservation_ttl: ttl,
        sweep_interval: Duration::from_millis(10),
    };
    (RoomRegistry::spawn(store.clone(), config), store)
}

/// Register a connection and hand back its event receiver
pub async fn connect(registry: &RoomRegistry) -> (ConnId, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = registry.connect(tx).await.unwrap();
    (conn, rx)
}

/// Everything queued for a connection so far
pub fn drain(rx: &mut Events) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn user_joined(room_id: &str, participant_count: usize, user_id: &str) -> ServerEvent {
    ServerEvent::UserJoined {
        room_id: room_id.to_string(),
        participant_count,
        user_id: user_id.to_string(),
    }
}

pub fn user_left(room_id: &str, participant_count: usize, user_id: &str) -> ServerEvent {
    ServerEvent::UserLeft {
        room_id: room_id.to_string(),
        participant_count,
        user_id: user_id.to_string(),
    }
}

/// Memory store that can be told to fail room creation or message writes
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_rooms: AtomicBool,
    pub fail_messages: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), AppError> {
        if flag.load(Ordering::SeqCst) {
            Err(AppError::Storage("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn create_room(&self, id: &str) -> Result<Room, AppError> {
        Self::check(&self.fail_rooms)?;
        self.inner.create_room(id).await
    }

    async fn get_room(&self, id: &str) -> Result<Option<Room>, AppError> {
        self.inner.get_room(id).await
    }

    async fn update_participant_count(
        &self,
        id: &str,
        count: usize,
    ) -> Result<Option<Room>, AppError> {
        self.inner.update_participant_count(id, count).await
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, AppError> {
        self.inner.list_rooms().await
    }

    async fn delete_room(&self, id: &str) -> Result<(), AppError> {
        self.inner.delete_room(id).await
    }

    async fn create_message(
        &self,
        room_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<RoomMessage, AppError> {
        Self::check(&self.fail_messages)?;
        self.inner.create_message(room_id, sender, content).await
    }

    async fn get_messages_by_room(&self, room_id: &str) -> Result<Vec<RoomMessage>, AppError> {
        self.inner.get_messages_by_room(room_id).await
    }
}
