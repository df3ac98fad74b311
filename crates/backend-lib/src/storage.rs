// ============================
// callroom-backend/src/storage.rs
// ============================
//! Session store abstraction with an in-memory implementation.
use async_trait::async_trait;
use callroom_common::{Room, RoomMessage};
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

/// Trait for session storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a room record with zero participants.
    ///
    /// Creating an id that already exists leaves the stored record untouched
    /// and returns it.
    async fn create_room(&self, id: &str) -> Result<Room, AppError>;

    /// Look up a room record
    async fn get_room(&self, id: &str) -> Result<Option<Room>, AppError>;

    /// Overwrite the stored participant count. Returns `None` for unknown ids.
    async fn update_participant_count(
        &self,
        id: &str,
        count: usize,
    ) -> Result<Option<Room>, AppError>;

    /// All room records, ordered by creation time then id
    async fn list_rooms(&self) -> Result<Vec<Room>, AppError>;

    /// Remove a room and every message stored for it. Unknown ids are a no-op.
    async fn delete_room(&self, id: &str) -> Result<(), AppError>;

    /// Append a chat message; the store assigns the id and timestamp.
    async fn create_message(
        &self,
        room_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<RoomMessage, AppError>;

    /// Messages for a room in timestamp order
    async fn get_messages_by_room(&self, room_id: &str) -> Result<Vec<RoomMessage>, AppError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,
    messages: DashMap<String, Vec<RoomMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_room(&self, id: &str) -> Result<Room, AppError> {
        let room = self
            .rooms
            .entry(id.to_string())
            .or_insert_with(|| Room {
                id: id.to_string(),
                participant_count: 0,
                created_at: Utc::now(),
            })
            .value()
            .clone();
        Ok(room)
    }

    async fn get_room(&self, id: &str) -> Result<Option<Room>, AppError> {
        Ok(self.rooms.get(id).map(|room| room.value().clone()))
    }

    async fn update_participant_count(
        &self,
        id: &str,
        count: usize,
    ) -> Result<Option<Room>, AppError> {
        Ok(self.rooms.get_mut(id).map(|mut room| {
            room.participant_count = count;
            room.value().clone()
        }))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, AppError> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|entry| entry.value().clone()).collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rooms)
    }

    async fn delete_room(&self, id: &str) -> Result<(), AppError> {
        self.rooms.remove(id);
        self.messages.remove(id);
        Ok(())
    }

    async fn create_message(
        &self,
        room_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<RoomMessage, AppError> {
        let message = RoomMessage {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.messages
            .entry(room_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get_messages_by_room(&self, room_id: &str) -> Result<Vec<RoomMessage>, AppError> {
        let mut messages = self
            .messages
            .get(room_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        // stable sort keeps insertion order for equal timestamps
        messages.sort_by_key(|message| message.timestamp);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_room_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.create_room("abc").await.unwrap();
        store.update_participant_count("abc", 2).await.unwrap();

        let second = store.create_room("abc").await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.participant_count, 2);
        assert_eq!(store.list_rooms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_room() {
        let store = MemoryStore::new();
        assert!(store.update_participant_count("nope", 1).await.unwrap().is_none());
        assert!(store.get_room("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_messages_are_ordered_and_scoped() {
        let store = MemoryStore::new();
        store.create_room("a").await.unwrap();
        store.create_room("b").await.unwrap();

        let first = store.create_message("a", "alice", "hello").await.unwrap();
        let second = store.create_message("a", "bob", "hi").await.unwrap();
        store.create_message("b", "carol", "elsewhere").await.unwrap();

        let messages = store.get_messages_by_room("a").await.unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_ne!(messages[0].id, messages[1].id);
        assert!(store.get_messages_by_room("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_room_cascades_messages() {
        let store = MemoryStore::new();
        store.create_room("a").await.unwrap();
        store.create_message("a", "alice", "bye").await.unwrap();

        store.delete_room("a").await.unwrap();
        assert!(store.get_room("a").await.unwrap().is_none());
        assert!(store.get_messages_by_room("a").await.unwrap().is_empty());

        // deleting twice is fine
        store.delete_room("a").await.unwrap();
    }
}
