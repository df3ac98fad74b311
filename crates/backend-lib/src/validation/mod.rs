// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for signaling frames and directory requests.

use callroom_common::ClientMessage;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_ROOM_ID_LENGTH: usize = 64;
const MAX_USER_ID_LENGTH: usize = 64;
const MAX_SENDER_LENGTH: usize = 100;

static ROOM_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Possible validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    #[error("Invalid sender: {0}")]
    InvalidSender(String),

    #[error("Invalid chat content: {0}")]
    InvalidContent(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a room ID
pub fn validate_room_id(room_id: &str) -> ValidationResult<&str> {
    if room_id.is_empty() {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must not be empty".to_string(),
        ));
    }

    if room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err(ValidationError::InvalidRoomId(format!(
            "Room ID cannot exceed {MAX_ROOM_ID_LENGTH} characters"
        )));
    }

    if !ROOM_ID_REGEX.is_match(room_id) {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must contain only alphanumeric characters, underscores and hyphens"
                .to_string(),
        ));
    }

    Ok(room_id)
}

/// Validate a client-supplied user ID
pub fn validate_user_id(user_id: &str) -> ValidationResult<&str> {
    let length = user_id.chars().count();
    if length == 0 || length > MAX_USER_ID_LENGTH {
        return Err(ValidationError::InvalidUserId(format!(
            "User ID must be between 1 and {MAX_USER_ID_LENGTH} characters"
        )));
    }

    if user_id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidUserId(
            "User ID contains control characters".to_string(),
        ));
    }

    Ok(user_id)
}

/// Validate the display name attached to a chat message
pub fn validate_sender(sender: &str) -> ValidationResult<&str> {
    let length = sender.chars().count();
    if length == 0 || length > MAX_SENDER_LENGTH {
        return Err(ValidationError::InvalidSender(format!(
            "Sender must be between 1 and {MAX_SENDER_LENGTH} characters"
        )));
    }

    Ok(sender)
}

/// Validate chat content against the configured length limit
pub fn validate_content(content: &str, max_length: usize) -> ValidationResult<&str> {
    if content.trim().is_empty() {
        return Err(ValidationError::InvalidContent(
            "Message must not be blank".to_string(),
        ));
    }

    if content.chars().count() > max_length {
        return Err(ValidationError::InvalidContent(format!(
            "Message cannot exceed {max_length} characters"
        )));
    }

    Ok(content)
}

/// Validate the fields of a parsed client frame
pub fn validate_client_message(
    message: &ClientMessage,
    max_chat_length: usize,
) -> ValidationResult<()> {
    match message {
        ClientMessage::JoinRoom { room_id, user_id } => {
            validate_room_id(room_id)?;
            if let Some(user_id) = user_id {
                validate_user_id(user_id)?;
            }
        },
        ClientMessage::LeaveRoom { room_id } => {
            if let Some(room_id) = room_id {
                validate_room_id(room_id)?;
            }
        },
        ClientMessage::ChatMessage { sender, content, .. } => {
            validate_sender(sender)?;
            validate_content(content, max_chat_length)?;
        },
        // SDP and ICE payloads are opaque
        ClientMessage::WebrtcOffer { .. }
        | ClientMessage::WebrtcAnswer { .. }
        | ClientMessage::WebrtcIceCandidate { .. } => {},
    }

    Ok(())
}
