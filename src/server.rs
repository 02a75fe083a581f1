//! HTTP surface: the WebSocket upgrade plus a couple of read-only routes.

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::registry::Registry;
use crate::types::{QuizSummary, QuizWithId, UserId};
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub quizzes: Arc<Vec<QuizWithId>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizListItem {
    pub id: String,
    #[serde(flatten)]
    pub summary: QuizSummary,
}

/// Build the router with its cross-cutting layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/quizzes", get(list_quizzes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrade to a room session. `userId` identifies a returning player; a guest
/// id is minted when it is missing.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    let user_id = resolve_user_id(params.user_id);
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state, user_id))
}

/// The caller's id, or a fresh `guest-<uuid>` when none was supplied.
pub fn resolve_user_id(requested: Option<String>) -> UserId {
    requested
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("guest-{}", uuid::Uuid::new_v4()))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rooms: state.registry.len(),
    })
}

async fn list_quizzes(State(state): State<AppState>) -> Json<Vec<QuizListItem>> {
    Json(
        state
            .quizzes
            .iter()
            .map(|q| QuizListItem {
                id: q.id.clone(),
                summary: q.quiz.summary(),
            })
            .collect(),
    )
}
