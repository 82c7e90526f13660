use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::backend::ReviewBackend;
use crate::error::SimulationError;
use crate::review::models::{GameKind, GameState};
use crate::session::{RenderState, SessionError, SessionHandle};

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub backend: Arc<dyn ReviewBackend>,
    /// Used by `/api/live` when the query names no game.
    pub default_game: GameKind,
}

type ApiError = (StatusCode, String);

/// Build the Axum router for the review API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/view", get(view_handler))
        .route("/ws/view", get(view_ws_handler))
        .route("/api/match", delete(close_match_handler))
        .route("/api/match/refresh", post(refresh_handler))
        .route("/api/match/:id", post(select_match_handler))
        .route("/api/playback/start", post(start_playback_handler))
        .route("/api/playback/stop", post(stop_playback_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/simulate/reset", post(reset_simulation_handler))
        .route("/api/live", get(live_matches_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn session_error(e: SessionError) -> ApiError {
    let status = match &e {
        SessionError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Simulation(SimulationError::Busy | SimulationError::NoMatch) => {
            StatusCode::CONFLICT
        }
        SessionError::Simulation(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

fn accepted(result: Result<(), SessionError>) -> Result<StatusCode, ApiError> {
    result.map(|_| StatusCode::ACCEPTED).map_err(session_error)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// GET /api/view
async fn view_handler(State(state): State<Arc<AppState>>) -> Json<RenderState> {
    Json(state.session.view())
}

/// POST /api/match/:id
async fn select_match_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let match_id = match_id.trim();
    if match_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "match id is empty".to_string()));
    }
    accepted(state.session.select_match(match_id).await)
}

/// POST /api/match/refresh
async fn refresh_handler(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    accepted(state.session.refresh().await)
}

/// DELETE /api/match: drop the active review
async fn close_match_handler(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    accepted(state.session.close().await)
}

async fn start_playback_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    accepted(state.session.start_playback().await)
}

async fn stop_playback_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    accepted(state.session.stop_playback().await)
}

/// POST /api/simulate with a partial GameState body
async fn simulate_handler(
    State(state): State<Arc<AppState>>,
    Json(modification): Json<GameState>,
) -> Result<StatusCode, ApiError> {
    accepted(state.session.simulate(modification).await)
}

async fn reset_simulation_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    accepted(state.session.reset_simulation().await)
}

#[derive(Debug, Deserialize)]
struct LiveQuery {
    game: Option<GameKind>,
}

/// GET /api/live?game=lol
async fn live_matches_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LiveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let game = query.game.unwrap_or(state.default_game);
    state
        .backend
        .list_live_matches(game)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))
}

/// GET /ws/view: pushes the render state on connect and after every change.
async fn view_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_view(socket, state))
}

async fn stream_view(socket: WebSocket, state: Arc<AppState>) {
    debug!("View WebSocket client connected");
    let (mut sender, mut receiver) = socket.split();
    let mut view = state.session.subscribe();
    view.mark_changed();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    debug!("Session stopped, closing view WebSocket");
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                }
                let current = view.borrow_and_update().clone();
                let json = match serde_json::to_string(&current) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize render state: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    debug!("View WebSocket client disconnected (send failed)");
                    return;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("View WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("View WebSocket error: {}", e);
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
