use std::sync::Arc;

use api::signaling::{ClientMessage, IceCandidate, ServerMessage};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use relay::RelayEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::result::Result;
use crate::route::AppState;
use crate::stream::manager::Manager;

pub fn route() -> Router<AppState> {
    Router::new().route(api::path::SIGNALING, get(upgrade))
}

async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let manager = state.stream_manager.clone();
    ws.on_upgrade(move |socket| Connection::new(manager).run(socket))
}

/// One viewer's signaling socket.
struct Connection {
    manager: Arc<Manager>,
    viewer_id: Option<String>,
    events: Option<BoxStream<'static, RelayEvent>>,
    notify_tx: mpsc::UnboundedSender<ServerMessage>,
    notify_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

async fn next_event(events: &mut Option<BoxStream<'static, RelayEvent>>) -> Option<RelayEvent> {
    match events {
        Some(events) => events.next().await,
        None => None,
    }
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> Result<()> {
    let text = serde_json::to_string(msg)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

impl Connection {
    fn new(manager: Arc<Manager>) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            manager,
            viewer_id: None,
            events: None,
            notify_tx,
            notify_rx,
        }
    }

    async fn run(mut self, mut socket: WebSocket) {
        debug!("signaling connection opened");
        loop {
            tokio::select! {
                msg = socket.recv() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle(&mut socket, &text).await {
                            warn!(viewer_id = ?self.viewer_id, "signaling error: {}", e);
                            let _ = send(&mut socket, &ServerMessage::error(&e)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("signaling socket error: {}", e);
                        break;
                    }
                },
                Some(msg) = self.notify_rx.recv() => {
                    let closing = matches!(msg, ServerMessage::Error { .. });
                    let _ = send(&mut socket, &msg).await;
                    if closing {
                        // the stream already detached this viewer
                        self.viewer_id = None;
                        break;
                    }
                }
                event = next_event(&mut self.events), if self.events.is_some() => match event {
                    Some(event) => {
                        if let Err(e) = self.relay_event(&mut socket, event).await {
                            debug!("forwarding relay event failed: {}", e);
                            break;
                        }
                    }
                    None => self.events = None,
                },
            }
        }

        let _ = socket.send(Message::Close(None)).await;
        if let Some(viewer_id) = self.viewer_id.take() {
            self.manager.leave(&viewer_id).await;
        }
        debug!("signaling connection closed");
    }

    async fn handle(&mut self, socket: &mut WebSocket, text: &str) -> Result<()> {
        let msg: ClientMessage = serde_json::from_str(text).map_err(AppError::invalid_message)?;
        match msg {
            ClientMessage::Viewer {
                camera_id,
                stream_id,
                sdp_offer,
            } => {
                if self.viewer_id.is_some() {
                    return Err(AppError::invalid_message("viewer already joined"));
                }
                let joined = self
                    .manager
                    .join(
                        &camera_id,
                        stream_id.as_deref(),
                        &sdp_offer,
                        self.notify_tx.clone(),
                    )
                    .await?;
                self.viewer_id = Some(joined.viewer_id.clone());
                self.events = Some(joined.events);
                send(
                    socket,
                    &ServerMessage::ViewerResponse {
                        viewer_id: joined.viewer_id,
                        sdp_answer: joined.answer,
                    },
                )
                .await
            }
            ClientMessage::OnIceCandidate { candidate } => {
                let viewer_id = self
                    .viewer_id
                    .as_deref()
                    .ok_or_else(|| AppError::invalid_message("candidate before viewer"))?;
                self.manager.add_candidate(viewer_id, candidate).await
            }
            ClientMessage::Stop => {
                self.events = None;
                if let Some(viewer_id) = self.viewer_id.take() {
                    info!(viewer_id = %viewer_id, "viewer requested stop");
                    self.manager.leave(&viewer_id).await;
                }
                Ok(())
            }
        }
    }

    async fn relay_event(&mut self, socket: &mut WebSocket, event: RelayEvent) -> Result<()> {
        if let Some(candidate) = event.candidate() {
            let candidate: IceCandidate = serde_json::from_value(candidate.clone())?;
            return send(socket, &ServerMessage::IceCandidate { candidate }).await;
        }
        if let (Some(state), Some(viewer_id)) = (event.state(), self.viewer_id.as_deref()) {
            self.manager.set_ice_state(viewer_id, state).await;
        }
        Ok(())
    }
}
