// ============================
// callroom-backend/src/room.rs
// ============================
//! Room registry handle and the types it hands out.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use callroom_common::{JoinStatus, RelayedSignal, Room, RoomListing, RoomMessage, ServerEvent};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::config::Settings;
use crate::error::AppError;
use crate::room_actor::{spawn_registry_actor, RegistryCmd};
use crate::storage::SessionStore;

/// Registry-assigned handle of a live WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub(crate) u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of a signaling join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The user was already in this room; the session now lives on the new connection
    AlreadyInRoom,
    /// The user left another room to get here
    MovedFromOtherRoom,
    Full,
}

/// Where a connection stands, as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Joined { room_id: String, user_id: String },
}

/// Entry of [`RoomRegistry::list_open_rooms`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOccupancy {
    pub id: String,
    pub participant_count: usize,
}

/// Timing knobs of the registry actor
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub reservation_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl From<&Settings> for RegistryConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            reservation_ttl: settings.reservation_ttl(),
            sweep_interval: settings.sweep_interval(),
        }
    }
}

/// Handle that other components keep. Every call is one turn of the registry actor.
#[derive(Clone)]
pub struct RoomRegistry {
    cmd_tx: mpsc::UnboundedSender<RegistryCmd>,
}

impl RoomRegistry {
    /// Spawn the registry actor on the current runtime
    pub fn spawn(store: Arc<dyn SessionStore>, config: RegistryConfig) -> Self {
        Self {
            cmd_tx: spawn_registry_actor(store, config),
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCmd,
    ) -> Result<T, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(build(resp_tx))?;
        Ok(resp_rx.await?)
    }

    /// Register a live connection; `events` receives everything addressed to it
    pub async fn connect(
        &self,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<ConnId, AppError> {
        self.request(|resp_tx| RegistryCmd::Connect { events, resp_tx })
            .await
    }

    pub async fn join(
        &self,
        conn: ConnId,
        room_id: String,
        user_id: Option<String>,
    ) -> Result<JoinOutcome, AppError> {
        self.request(|resp_tx| RegistryCmd::Join {
            conn,
            room_id,
            user_id,
            resp_tx,
        })
        .await?
    }

    /// Leave the bound room, if any
    pub async fn leave(&self, conn: ConnId) -> Result<(), AppError> {
        self.request(|resp_tx| RegistryCmd::Leave { conn, resp_tx })
            .await
    }

    /// Leave and forget the connection. Safe to call more than once.
    pub async fn disconnect(&self, conn: ConnId) -> Result<(), AppError> {
        self.request(|resp_tx| RegistryCmd::Disconnect { conn, resp_tx })
            .await
    }

    /// Store a chat line and fan it out to the sender's room.
    /// Returns `None` when the connection is not in a room.
    pub async fn send_chat(
        &self,
        conn: ConnId,
        sender: String,
        content: String,
    ) -> Result<Option<RoomMessage>, AppError> {
        self.request(|resp_tx| RegistryCmd::Chat {
            conn,
            sender,
            content,
            resp_tx,
        })
        .await?
    }

    /// Forward a WebRTC payload to the other members; returns how many received it
    pub async fn relay(&self, conn: ConnId, signal: RelayedSignal) -> Result<usize, AppError> {
        self.request(|resp_tx| RegistryCmd::Relay {
            conn,
            signal,
            resp_tx,
        })
        .await
    }

    /// Rooms with at least one signaling member, sorted by id
    pub async fn list_open_rooms(&self) -> Result<Vec<RoomOccupancy>, AppError> {
        self.request(|resp_tx| RegistryCmd::ListOpen { resp_tx })
            .await
    }

    /// Directory view: occupied, reserved and idle rooms with their status
    pub async fn directory(&self) -> Result<Vec<RoomListing>, AppError> {
        self.request(|resp_tx| RegistryCmd::Directory { resp_tx })
            .await?
    }

    pub async fn create_room(&self, room_id: String) -> Result<Room, AppError> {
        self.request(|resp_tx| RegistryCmd::CreateRoom { room_id, resp_tx })
            .await?
    }

    /// Hold an anonymous slot in a room until it is claimed, released or expires
    pub async fn reserve(&self, room_id: String) -> Result<JoinStatus, AppError> {
        self.request(|resp_tx| RegistryCmd::Reserve { room_id, resp_tx })
            .await
    }

    /// Drop the most recent reservation of a room
    pub async fn release(&self, room_id: String) -> Result<(), AppError> {
        self.request(|resp_tx| RegistryCmd::Release { room_id, resp_tx })
            .await
    }

    pub async fn connection_state(&self, conn: ConnId) -> Result<ConnectionState, AppError> {
        self.request(|resp_tx| RegistryCmd::State { conn, resp_tx })
            .await
    }
}
