use std::net::SocketAddr;

use api::request::StartStream;
use api::response::{StopReason, StreamInfo, StreamList};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{HeaderMap, StatusCode};

use crate::error::AppError;
use crate::network;
use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::STREAMS, get(index))
        .route(&api::path::stream(":camera"), get(show))
        .route(&api::path::stream_start(":camera"), post(start))
        .route(&api::path::stream_stop(":camera"), post(stop))
}

async fn start(
    State(state): State<AppState>,
    Path(camera): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> crate::result::Result<Response> {
    let req: StartStream = if body.iter().all(u8::is_ascii_whitespace) {
        StartStream::default()
    } else {
        serde_json::from_slice(&body).map_err(AppError::invalid_message)?
    };
    let address = network::camera_address(
        &state.config.camera,
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
    );
    let (started, created) = state.stream_manager.start(&camera, req, address).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(started)).into_response())
}

/// Stopping an unknown camera succeeds; the last summary is returned when
/// one was kept, e.g. after a keepalive stop.
async fn stop(State(state): State<AppState>, Path(camera): Path<String>) -> Response {
    let manager = &state.stream_manager;
    match manager.stop(&camera, StopReason::Requested).await {
        Some(summary) => Json(summary).into_response(),
        None => match manager.last_summary(&camera).await {
            Some(summary) => Json(summary).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    }
}

async fn show(
    State(state): State<AppState>,
    Path(camera): Path<String>,
) -> crate::result::Result<Json<StreamInfo>> {
    state
        .stream_manager
        .info(&camera)
        .await
        .map(Json)
        .ok_or_else(|| AppError::stream_not_found(camera))
}

async fn index(State(state): State<AppState>) -> Json<StreamList> {
    let streams = state.stream_manager.list().await;
    Json(StreamList {
        count: streams.len(),
        streams,
    })
}
