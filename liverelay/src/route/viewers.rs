use api::response::ViewerList;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::VIEWERS, get(index))
        .route(&api::path::viewers(":camera"), get(show))
}

async fn index(State(state): State<AppState>) -> Json<ViewerList> {
    let viewers = state.stream_manager.viewers().list(None).await;
    Json(ViewerList {
        camera_id: None,
        count: viewers.len(),
        viewers,
    })
}

async fn show(State(state): State<AppState>, Path(camera): Path<String>) -> Json<ViewerList> {
    let viewers = state.stream_manager.viewers().list(Some(&camera)).await;
    Json(ViewerList {
        camera_id: Some(camera),
        count: viewers.len(),
        viewers,
    })
}
