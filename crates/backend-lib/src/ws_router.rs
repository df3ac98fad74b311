// ============================
// callroom-backend/src/ws_router.rs
// ============================
//! HTTP router and WebSocket connection handling.
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use callroom_common::ServerEvent;
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::handlers;
use crate::metrics::{FRAME_DROPPED, WS_ACTIVE, WS_CONNECTION};
use crate::room::ConnId;
use crate::websocket::SignalingHandler;
use crate::AppState;

/// Create the application router: `/ws`, `/health` and the `/api` directory
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .nest("/api", handlers::rooms::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Handler for WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = match state.registry.connect(event_tx).await {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, "could not register connection");
            return;
        },
    };

    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);
    info!(%conn, "websocket connected");

    // Task 1: serialize registry events onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(%conn, error = %e, "could not serialize event");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Task 2: feed inbound frames to the signaling handler
    let handler = SignalingHandler::new(
        state.registry.clone(),
        conn,
        state.settings.max_chat_length,
    );
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Err(e) = handler.handle_text(text.as_str()).await {
                        log_dropped(handler.conn(), &e);
                    }
                },
                Ok(Message::Binary(_)) => {
                    debug!(%conn, "ignoring binary frame");
                    counter!(FRAME_DROPPED).increment(1);
                },
                Ok(Message::Close(_)) => break,
                // ping/pong are answered by axum
                Ok(_) => {},
                Err(e) => {
                    debug!(%conn, error = %e, "websocket read failed");
                    break;
                },
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = state.registry.disconnect(conn).await {
        warn!(%conn, error = %e, "could not disconnect from registry");
    }

    gauge!(WS_ACTIVE).decrement(1.0);
    info!(%conn, "websocket disconnected");
}

fn log_dropped(conn: ConnId, err: &AppError) {
    counter!(FRAME_DROPPED).increment(1);
    if err.is_protocol_outcome() {
        debug!(%conn, error = %err, "frame dropped");
    } else {
        warn!(%conn, code = err.error_code(), error = %err, "frame dropped");
    }
}
