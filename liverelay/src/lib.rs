use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use relay::RelayClient;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Level};

use crate::camera::{CameraControl, MqttCamera};
use crate::config::Config;
use crate::route::{health, streams, viewers, AppState};
use crate::stream::manager::Manager;

pub mod camera;
pub mod config;

mod error;
mod metrics;
mod network;
mod result;
mod route;
mod signaling;
mod stream;
mod viewer;

/// External collaborators of the service.
pub struct Services {
    pub relay: RelayClient,
    pub control: Arc<dyn CameraControl>,
}

/// Connects to the relay and the MQTT broker, then serves until `signal`.
pub async fn serve<F>(cfg: Config, listener: TcpListener, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let relay = match RelayClient::connect(&cfg.relay.url, cfg.relay.timeout()).await {
        Ok(relay) => {
            match relay.ping().await {
                Ok(()) => info!("relay {} is up", cfg.relay.url),
                Err(e) => warn!("relay ping failed: {}", e),
            }
            relay
        }
        Err(e) => {
            error!("relay {} unreachable: {}", cfg.relay.url, e);
            RelayClient::disconnected(cfg.relay.timeout())
        }
    };
    let control = Arc::new(MqttCamera::new(cfg.mqtt.clone())?);
    serve_with(cfg, listener, signal, Services { relay, control }).await;
    Ok(())
}

pub async fn serve_with<F>(cfg: Config, listener: TcpListener, signal: F, services: Services)
where
    F: Future<Output = ()> + Send + 'static,
{
    let app_state = AppState {
        stream_manager: Arc::new(Manager::new(
            cfg.clone(),
            services.relay,
            services.control,
        )),
        config: cfg.clone(),
    };
    let app = Router::new()
        .merge(streams::route())
        .merge(viewers::route())
        .merge(health::route())
        .merge(signaling::route())
        .route(api::path::METRICS, get(metrics))
        .with_state(app_state.clone())
        .layer(if cfg.http.cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let span = info_span!(
                        "http_request",
                        uri = ?request.uri(),
                        method = ?request.method(),
                        span_id = tracing::field::Empty,
                    );
                    span.record(
                        "span_id",
                        span.id().unwrap_or(tracing::Id::from_u64(42)).into_u64(),
                    );
                    span
                })
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO))
                .on_failure(tower_http::trace::DefaultOnFailure::new().level(Level::INFO)),
        );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await
    .unwrap_or_else(|e| error!("Application error: {e}"));
    app_state.stream_manager.shutdown().await;
}

pub fn metrics_register() {
    for collector in [
        Box::new(metrics::STREAM.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(metrics::VIEWER.clone()),
        Box::new(metrics::KEEPALIVE_SENT.clone()),
        Box::new(metrics::KEEPALIVE_FAILED.clone()),
        Box::new(metrics::KEEPALIVE_EXHAUSTED.clone()),
        Box::new(metrics::REEMB_NOT_CONFIRMED.clone()),
    ] {
        if let Err(e) = metrics::REGISTRY.register(collector) {
            warn!("metrics register: {}", e);
        }
    }
}

async fn metrics() -> crate::result::Result<String> {
    Ok(metrics::ENCODER.encode_to_string(&metrics::REGISTRY.gather())?)
}
