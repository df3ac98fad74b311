// ============================
// crates/backend-lib/src/handlers/rooms.rs
// ============================
//! Room directory API.
use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use callroom_common::{CreateRoomRequest, JoinStatus, Room, RoomListing, RoomMessage, StatusResponse};
use rand::Rng;
use tracing::{debug, info};

use crate::error::AppError;
use crate::validation::validate_room_id;
use crate::AppState;

const ROOM_CODE_LENGTH: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Routes mounted under `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}/leave", post(leave_room))
        .route("/rooms/{id}/messages", get(room_messages))
}

/// Generate a 6-character uppercase room code
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| char::from(ROOM_CODE_CHARSET[rng.random_range(0..ROOM_CODE_CHARSET.len())]))
        .collect()
}

async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<RoomListing>>, AppError> {
    Ok(Json(state.registry.directory().await?))
}

/// `POST /api/rooms`. The body is optional; without an id a fresh code is generated.
async fn create_room(State(state): State<AppState>, body: Bytes) -> Result<Json<Room>, AppError> {
    let request: CreateRoomRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateRoomRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidInput(e.to_string()))?
    };

    let room_id = match request.id {
        Some(id) => validate_room_id(&id)?.to_string(),
        None => loop {
            let code = generate_room_code();
            if state.store.get_room(&code).await?.is_none() {
                break code;
            }
        },
    };

    let room = state.registry.create_room(room_id).await?;
    info!(room_id = %room.id, "room created via directory");
    Ok(Json(room))
}

async fn join_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    validate_room_id(&id)?;
    let status = state.registry.reserve(id.clone()).await?;
    debug!(room_id = %id, ?status, "directory join");
    Ok(Json(StatusResponse { status }))
}

async fn leave_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    validate_room_id(&id)?;
    state.registry.release(id).await?;
    Ok(Json(StatusResponse {
        status: JoinStatus::Ok,
    }))
}

async fn room_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RoomMessage>>, AppError> {
    validate_room_id(&id)?;
    Ok(Json(state.store.get_messages_by_room(&id).await?))
}
