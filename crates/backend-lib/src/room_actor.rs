// ============================
// callroom-backend/src/room_actor.rs
// ============================
//! The registry actor. One task owns every membership set, the user session
//! map, connection bindings and directory reservations; commands are handled
//! one at a time, storage awaits included.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use callroom_common::{
    JoinStatus, RelayedSignal, Room, RoomListing, RoomMessage, ServerEvent, ROOM_CAPACITY,
};
use metrics::{counter, gauge};
use rand::{distr::Alphanumeric, Rng};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::metrics::{
    CHAT_MESSAGE, RESERVATION_CREATED, RESERVATION_EXPIRED, ROOM_ACTIVE, ROOM_CREATED,
    ROOM_DELETED, ROOM_FULL, ROOM_JOINED, SIGNAL_RELAYED,
};
use crate::room::{ConnId, ConnectionState, JoinOutcome, RegistryConfig, RoomOccupancy};
use crate::storage::SessionStore;

const GENERATED_USER_ID_LENGTH: usize = 12;

/// Message sent *into* the actor
pub(crate) enum RegistryCmd {
    Connect {
        events: mpsc::UnboundedSender<ServerEvent>,
        resp_tx: oneshot::Sender<ConnId>,
    },
    Join {
        conn: ConnId,
        room_id: String,
        user_id: Option<String>,
        resp_tx: oneshot::Sender<Result<JoinOutcome, AppError>>,
    },
    Leave {
        conn: ConnId,
        resp_tx: oneshot::Sender<()>,
    },
    Disconnect {
        conn: ConnId,
        resp_tx: oneshot::Sender<()>,
    },
    Chat {
        conn: ConnId,
        sender: String,
        content: String,
        resp_tx: oneshot::Sender<Result<Option<RoomMessage>, AppError>>,
    },
    Relay {
        conn: ConnId,
        signal: RelayedSignal,
        resp_tx: oneshot::Sender<usize>,
    },
    ListOpen {
        resp_tx: oneshot::Sender<Vec<RoomOccupancy>>,
    },
    Directory {
        resp_tx: oneshot::Sender<Result<Vec<RoomListing>, AppError>>,
    },
    CreateRoom {
        room_id: String,
        resp_tx: oneshot::Sender<Result<Room, AppError>>,
    },
    Reserve {
        room_id: String,
        resp_tx: oneshot::Sender<JoinStatus>,
    },
    Release {
        room_id: String,
        resp_tx: oneshot::Sender<()>,
    },
    State {
        conn: ConnId,
        resp_tx: oneshot::Sender<ConnectionState>,
    },
}

#[derive(Debug, Clone)]
struct Binding {
    room_id: String,
    user_id: String,
}

struct Connection {
    events: mpsc::UnboundedSender<ServerEvent>,
    binding: Option<Binding>,
}

#[derive(Default)]
struct Occupants {
    /// Signaling members in registration order
    members: Vec<ConnId>,
    /// Expiry instants of directory reservations, oldest first
    reservations: VecDeque<Instant>,
}

impl Occupants {
    fn occupancy(&self) -> usize {
        self.members.len() + self.reservations.len()
    }

    fn is_vacant(&self) -> bool {
        self.members.is_empty() && self.reservations.is_empty()
    }
}

struct UserSession {
    room_id: String,
    conn: ConnId,
}

pub(crate) struct RoomActor {
    store: Arc<dyn SessionStore>,
    config: RegistryConfig,
    next_conn: u64,
    connections: HashMap<ConnId, Connection>,
    rooms: HashMap<String, Occupants>,
    sessions: HashMap<String, UserSession>,
}

impl RoomActor {
    pub(crate) fn new(store: Arc<dyn SessionStore>, config: RegistryConfig) -> Self {
        RoomActor {
            store,
            config,
            next_conn: 0,
            connections: HashMap::new(),
            rooms: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RegistryCmd>) {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        self.purge_expired(Instant::now());
                        self.handle(cmd).await;
                    },
                    None => break,
                },
                _ = sweep.tick() => self.purge_expired(Instant::now()),
            }
        }

        debug!("room registry stopped");
    }

    async fn handle(&mut self, cmd: RegistryCmd) {
        // a dropped reply receiver only means the caller went away
        match cmd {
            RegistryCmd::Connect { events, resp_tx } => {
                let _ = resp_tx.send(self.connect(events));
            },
            RegistryCmd::Join {
                conn,
                room_id,
                user_id,
                resp_tx,
            } => {
                let result = self.join(conn, room_id, user_id).await;
                let _ = resp_tx.send(result);
            },
            RegistryCmd::Leave { conn, resp_tx } => {
                self.leave(conn).await;
                let _ = resp_tx.send(());
            },
            RegistryCmd::Disconnect { conn, resp_tx } => {
                self.disconnect(conn).await;
                let _ = resp_tx.send(());
            },
            RegistryCmd::Chat {
                conn,
                sender,
                content,
                resp_tx,
            } => {
                let result = self.chat(conn, sender, content).await;
                let _ = resp_tx.send(result);
            },
            RegistryCmd::Relay {
                conn,
                signal,
                resp_tx,
            } => {
                let _ = resp_tx.send(self.relay(conn, signal));
            },
            RegistryCmd::ListOpen { resp_tx } => {
                let _ = resp_tx.send(self.list_open_rooms());
            },
            RegistryCmd::Directory { resp_tx } => {
                let result = self.directory().await;
                let _ = resp_tx.send(result);
            },
            RegistryCmd::CreateRoom { room_id, resp_tx } => {
                let result = self.create_room(&room_id).await;
                let _ = resp_tx.send(result);
            },
            RegistryCmd::Reserve { room_id, resp_tx } => {
                let _ = resp_tx.send(self.reserve(room_id, Instant::now()));
            },
            RegistryCmd::Release { room_id, resp_tx } => {
                self.release(&room_id);
                let _ = resp_tx.send(());
            },
            RegistryCmd::State { conn, resp_tx } => {
                let _ = resp_tx.send(self.connection_state(conn));
            },
        }
    }

    fn connect(&mut self, events: mpsc::UnboundedSender<ServerEvent>) -> ConnId {
        self.next_conn += 1;
        let conn = ConnId(self.next_conn);
        self.connections.insert(
            conn,
            Connection {
                events,
                binding: None,
            },
        );
        debug!(%conn, "connection registered");
        conn
    }

    fn binding(&self, conn: ConnId) -> Option<&Binding> {
        self.connections
            .get(&conn)
            .and_then(|connection| connection.binding.as_ref())
    }

    fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map_or(0, |occupants| occupants.members.len())
    }

    async fn join(
        &mut self,
        conn: ConnId,
        room_id: String,
        user_id: Option<String>,
    ) -> Result<JoinOutcome, AppError> {
        if !self.connections.contains_key(&conn) {
            return Err(AppError::Internal(format!("unknown connection {conn}")));
        }

        let user_id = user_id.unwrap_or_else(generate_user_id);
        let mut outcome = JoinOutcome::Joined;

        if let Some(session) = self.sessions.get(&user_id) {
            let previous = session.conn;
            if session.room_id == room_id {
                self.rebind(conn, previous, &room_id, &user_id).await;
                return Ok(JoinOutcome::AlreadyInRoom);
            }

            info!(%conn, %user_id, from = %session.room_id, to = %room_id, "user switching rooms");
            self.leave(previous).await;
            outcome = JoinOutcome::MovedFromOtherRoom;
        }

        let others = self.rooms.get(&room_id).map_or(0, |occupants| {
            let members = occupants.members.iter().filter(|m| **m != conn).count();
            members + occupants.reservations.len().saturating_sub(1)
        });
        if others >= ROOM_CAPACITY {
            info!(%conn, %room_id, %user_id, "room is full, rejecting join");
            counter!(ROOM_FULL).increment(1);
            self.send_to(conn, ServerEvent::RoomFull { room_id });
            return Ok(JoinOutcome::Full);
        }

        if self.binding(conn).is_some() {
            self.leave(conn).await;
        }

        if let Err(e) = self.ensure_stored(&room_id).await {
            warn!(%conn, %room_id, error = %e, "could not create room record");
            return Err(e);
        }

        let occupants = self.rooms.entry(room_id.clone()).or_default();
        occupants.reservations.pop_front();
        occupants.members.push(conn);
        let participant_count = occupants.members.len();

        self.sessions.insert(
            user_id.clone(),
            UserSession {
                room_id: room_id.clone(),
                conn,
            },
        );
        if let Some(connection) = self.connections.get_mut(&conn) {
            connection.binding = Some(Binding {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
            });
        }

        self.persist_count(&room_id, participant_count).await;
        info!(%conn, %room_id, %user_id, participant_count, "user joined room");
        counter!(ROOM_JOINED).increment(1);
        self.update_active_gauge();

        self.broadcast(
            &room_id,
            None,
            ServerEvent::UserJoined {
                room_id: room_id.clone(),
                participant_count,
                user_id,
            },
        );

        Ok(outcome)
    }

    /// Move an existing session in `room_id` onto `conn`, keeping its slot.
    async fn rebind(&mut self, conn: ConnId, previous: ConnId, room_id: &str, user_id: &str) {
        if previous != conn {
            if self.binding(conn).is_some() {
                self.leave(conn).await;
            }

            let occupants = self.rooms.entry(room_id.to_string()).or_default();
            match occupants.members.iter_mut().find(|member| **member == previous) {
                Some(slot) => *slot = conn,
                None => occupants.members.push(conn),
            }

            if let Some(old) = self.connections.get_mut(&previous) {
                old.binding = None;
            }
            self.sessions.insert(
                user_id.to_string(),
                UserSession {
                    room_id: room_id.to_string(),
                    conn,
                },
            );
            if let Some(connection) = self.connections.get_mut(&conn) {
                connection.binding = Some(Binding {
                    room_id: room_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            info!(%conn, %previous, %room_id, %user_id, "session moved to new connection");
        }

        let participant_count = self.member_count(room_id);
        self.send_to(
            conn,
            ServerEvent::UserJoined {
                room_id: room_id.to_string(),
                participant_count,
                user_id: user_id.to_string(),
            },
        );
    }

    async fn leave(&mut self, conn: ConnId) {
        let Some(binding) = self
            .connections
            .get_mut(&conn)
            .and_then(|connection| connection.binding.take())
        else {
            return;
        };
        let Binding { room_id, user_id } = binding;

        if self
            .sessions
            .get(&user_id)
            .is_some_and(|session| session.conn == conn)
        {
            self.sessions.remove(&user_id);
        }

        let Some(occupants) = self.rooms.get_mut(&room_id) else {
            return;
        };
        occupants.members.retain(|member| *member != conn);
        let participant_count = occupants.members.len();
        let vacant = occupants.is_vacant();

        info!(%conn, %room_id, %user_id, participant_count, "user left room");

        if participant_count == 0 {
            if vacant {
                self.rooms.remove(&room_id);
            }
            match self.store.delete_room(&room_id).await {
                Ok(()) => {
                    info!(%room_id, "room deleted");
                    counter!(ROOM_DELETED).increment(1);
                },
                Err(e) => warn!(%room_id, error = %e, "could not delete room"),
            }
        } else {
            self.persist_count(&room_id, participant_count).await;
            self.broadcast(
                &room_id,
                None,
                ServerEvent::UserLeft {
                    room_id: room_id.clone(),
                    participant_count,
                    user_id,
                },
            );
        }

        self.update_active_gauge();
    }

    async fn disconnect(&mut self, conn: ConnId) {
        self.leave(conn).await;
        if self.connections.remove(&conn).is_some() {
            debug!(%conn, "connection removed");
        }
    }

    async fn chat(
        &mut self,
        conn: ConnId,
        sender: String,
        content: String,
    ) -> Result<Option<RoomMessage>, AppError> {
        let Some(binding) = self.binding(conn).cloned() else {
            debug!(%conn, "dropping chat from connection outside any room");
            return Ok(None);
        };

        let message = self
            .store
            .create_message(&binding.room_id, &sender, &content)
            .await
            .inspect_err(|e| {
                warn!(%conn, room_id = %binding.room_id, error = %e, "could not store chat message");
            })?;

        let delivered = self.broadcast(
            &binding.room_id,
            None,
            ServerEvent::ChatMessage {
                room_id: message.room_id.clone(),
                sender: message.sender.clone(),
                content: message.content.clone(),
                timestamp: message.timestamp.timestamp_millis(),
            },
        );
        debug!(%conn, room_id = %binding.room_id, delivered, "chat message sent");
        counter!(CHAT_MESSAGE).increment(1);

        Ok(Some(message))
    }

    fn relay(&self, conn: ConnId, signal: RelayedSignal) -> usize {
        let Some(binding) = self.binding(conn) else {
            debug!(%conn, kind = ?signal.kind, "dropping signal from connection outside any room");
            return 0;
        };

        let kind = signal.kind;
        let delivered = self.broadcast(&binding.room_id, Some(conn), signal.stamped(&binding.user_id));
        debug!(%conn, room_id = %binding.room_id, ?kind, delivered, "signal relayed");
        counter!(SIGNAL_RELAYED).increment(delivered as u64);
        delivered
    }

    fn list_open_rooms(&self) -> Vec<RoomOccupancy> {
        let mut rooms: Vec<RoomOccupancy> = self
            .rooms
            .iter()
            .filter(|(_, occupants)| !occupants.members.is_empty())
            .map(|(id, occupants)| RoomOccupancy {
                id: id.clone(),
                participant_count: occupants.members.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    async fn directory(&self) -> Result<Vec<RoomListing>, AppError> {
        let stored = self.store.list_rooms().await?;

        let mut listings: Vec<RoomListing> = self
            .rooms
            .iter()
            .map(|(id, occupants)| RoomListing::new(id.clone(), occupants.occupancy()))
            .collect();
        listings.extend(
            stored
                .into_iter()
                .filter(|room| !self.rooms.contains_key(&room.id))
                .map(|room| RoomListing::new(room.id, 0)),
        );
        listings.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(listings)
    }

    async fn create_room(&self, room_id: &str) -> Result<Room, AppError> {
        self.ensure_stored(room_id).await
    }

    /// Fetch the store record for `room_id`, creating it when absent
    async fn ensure_stored(&self, room_id: &str) -> Result<Room, AppError> {
        if let Some(room) = self.store.get_room(room_id).await? {
            return Ok(room);
        }

        let room = self.store.create_room(room_id).await?;
        info!(%room_id, "room created");
        counter!(ROOM_CREATED).increment(1);
        Ok(room)
    }

    fn reserve(&mut self, room_id: String, now: Instant) -> JoinStatus {
        let occupants = self.rooms.entry(room_id.clone()).or_default();
        if occupants.occupancy() >= ROOM_CAPACITY {
            debug!(%room_id, "reservation refused, room is full");
            return JoinStatus::Full;
        }

        occupants
            .reservations
            .push_back(now + self.config.reservation_ttl);
        debug!(%room_id, occupancy = occupants.occupancy(), "reservation taken");
        counter!(RESERVATION_CREATED).increment(1);
        JoinStatus::Ok
    }

    fn release(&mut self, room_id: &str) {
        let Some(occupants) = self.rooms.get_mut(room_id) else {
            return;
        };

        if occupants.reservations.pop_back().is_some() {
            debug!(%room_id, "reservation released");
        }
        if occupants.is_vacant() {
            self.rooms.remove(room_id);
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        let mut expired = 0;
        for (room_id, occupants) in self.rooms.iter_mut() {
            let before = occupants.reservations.len();
            occupants.reservations.retain(|expiry| *expiry > now);
            let lapsed = before - occupants.reservations.len();
            if lapsed > 0 {
                debug!(%room_id, lapsed, "reservations expired");
                expired += lapsed;
            }
        }

        if expired > 0 {
            counter!(RESERVATION_EXPIRED).increment(expired as u64);
        }
        self.rooms.retain(|_, occupants| !occupants.is_vacant());
    }

    fn connection_state(&self, conn: ConnId) -> ConnectionState {
        match self.connections.get(&conn) {
            None => ConnectionState::Disconnected,
            Some(Connection { binding: None, .. }) => ConnectionState::Connected,
            Some(Connection {
                binding: Some(binding),
                ..
            }) => ConnectionState::Joined {
                room_id: binding.room_id.clone(),
                user_id: binding.user_id.clone(),
            },
        }
    }

    async fn persist_count(&self, room_id: &str, count: usize) {
        match self.store.update_participant_count(room_id, count).await {
            Ok(Some(_)) => {},
            Ok(None) => debug!(%room_id, "no stored room to update"),
            Err(e) => warn!(%room_id, error = %e, "could not persist participant count"),
        }
    }

    fn send_to(&self, conn: ConnId, event: ServerEvent) -> bool {
        self.connections
            .get(&conn)
            .is_some_and(|connection| connection.events.send(event).is_ok())
    }

    /// Deliver `event` to the members of `room_id` in registration order
    fn broadcast(&self, room_id: &str, except: Option<ConnId>, event: ServerEvent) -> usize {
        let Some(occupants) = self.rooms.get(room_id) else {
            return 0;
        };

        occupants
            .members
            .iter()
            .filter(|member| Some(**member) != except)
            .filter(|member| self.send_to(**member, event.clone()))
            .count()
    }

    fn update_active_gauge(&self) {
        let active = self
            .rooms
            .values()
            .filter(|occupants| !occupants.members.is_empty())
            .count();
        gauge!(ROOM_ACTIVE).set(active as f64);
    }
}

/// Identity handed to callers that join without one
fn generate_user_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_USER_ID_LENGTH)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}

/// Spawn the registry actor and return its command sender
pub(crate) fn spawn_registry_actor(
    store: Arc<dyn SessionStore>,
    config: RegistryConfig,
) -> mpsc::UnboundedSender<RegistryCmd> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let actor = RoomActor::new(store, config);

    tokio::spawn(async move {
        actor.run(cmd_rx).await;
    });

    cmd_tx
}
