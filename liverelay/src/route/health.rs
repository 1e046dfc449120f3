use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new().route(api::path::HEALTH, get(health))
}

async fn health(State(state): State<AppState>) -> Json<api::response::Health> {
    Json(state.stream_manager.health().await)
}
