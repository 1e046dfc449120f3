use std::collections::HashMap;
use std::sync::Arc;

use api::response::ViewerInfo;
use api::signaling::ServerMessage;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::AppError;
use crate::metrics;
use crate::result::Result;

/// One browser attached to a camera stream.
#[derive(Debug)]
pub struct Viewer {
    pub id: String,
    pub camera_id: String,
    pub endpoint: Option<String>,
    pub ice_state: Option<String>,
    /// Answer returned to the browser.
    pub answer: Option<String>,
    pub connected_at: i64,
    pub disconnected_at: Option<i64>,
    notify: mpsc::UnboundedSender<ServerMessage>,
}

impl Viewer {
    /// Pushes a message to the viewer's socket, if it is still open.
    pub fn notify(&self, msg: ServerMessage) {
        let _ = self.notify.send(msg);
    }

    /// Time attached, up to the disconnect if there was one.
    pub fn connected_ms(&self) -> i64 {
        let until = self
            .disconnected_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        (until - self.connected_at).max(0)
    }

    fn disconnect(mut self) -> Self {
        self.disconnected_at = Some(chrono::Utc::now().timestamp_millis());
        self
    }

    pub fn info(&self) -> ViewerInfo {
        ViewerInfo {
            viewer_id: self.id.clone(),
            camera_id: self.camera_id.clone(),
            endpoint: self.endpoint.clone().unwrap_or_default(),
            ice_state: self.ice_state.clone(),
            sdp_answer: self.answer.clone(),
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
        }
    }
}

/// Viewer sessions of every camera, keyed by viewer id.
#[derive(Clone, Default)]
pub struct Registry {
    viewers: Arc<RwLock<HashMap<String, Viewer>>>,
}

impl Registry {
    /// Takes a slot on `camera_id` unless `max` viewers already hold one.
    pub async fn reserve(
        &self,
        camera_id: &str,
        max: usize,
        notify: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<String> {
        let mut viewers = self.viewers.write().await;
        let count = viewers.values().filter(|v| v.camera_id == camera_id).count();
        if count >= max {
            return Err(AppError::viewer_capacity_exceeded(camera_id));
        }
        let id = uuid::Uuid::new_v4().to_string();
        viewers.insert(
            id.clone(),
            Viewer {
                id: id.clone(),
                camera_id: camera_id.to_string(),
                endpoint: None,
                ice_state: None,
                answer: None,
                connected_at: chrono::Utc::now().timestamp_millis(),
                disconnected_at: None,
                notify,
            },
        );
        metrics::VIEWER.inc();
        debug!(camera_id, viewer_id = %id, "viewer slot reserved ({}/{})", count + 1, max);
        Ok(id)
    }

    pub async fn set_endpoint(&self, viewer_id: &str, endpoint: String) {
        if let Some(viewer) = self.viewers.write().await.get_mut(viewer_id) {
            viewer.endpoint = Some(endpoint);
        }
    }

    pub async fn set_answer(&self, viewer_id: &str, answer: String) {
        if let Some(viewer) = self.viewers.write().await.get_mut(viewer_id) {
            viewer.answer = Some(answer);
        }
    }

    pub async fn set_ice_state(&self, viewer_id: &str, state: String) {
        if let Some(viewer) = self.viewers.write().await.get_mut(viewer_id) {
            viewer.ice_state = Some(state);
        }
    }

    pub async fn endpoint(&self, viewer_id: &str) -> Option<String> {
        self.viewers
            .read()
            .await
            .get(viewer_id)
            .and_then(|v| v.endpoint.clone())
    }

    pub async fn remove(&self, viewer_id: &str) -> Option<Viewer> {
        let viewer = self.viewers.write().await.remove(viewer_id)?;
        metrics::VIEWER.dec();
        Some(viewer.disconnect())
    }

    /// Detaches every viewer of `camera_id` in one step.
    pub async fn remove_camera(&self, camera_id: &str) -> Vec<Viewer> {
        let mut viewers = self.viewers.write().await;
        let ids: Vec<String> = viewers
            .values()
            .filter(|v| v.camera_id == camera_id)
            .map(|v| v.id.clone())
            .collect();
        let removed: Vec<Viewer> = ids
            .iter()
            .filter_map(|id| viewers.remove(id))
            .map(Viewer::disconnect)
            .collect();
        metrics::VIEWER.sub(removed.len() as f64);
        removed
    }

    pub async fn count(&self, camera_id: &str) -> usize {
        self.viewers
            .read()
            .await
            .values()
            .filter(|v| v.camera_id == camera_id)
            .count()
    }

    pub async fn total(&self) -> usize {
        self.viewers.read().await.len()
    }

    pub async fn list(&self, camera_id: Option<&str>) -> Vec<ViewerInfo> {
        let mut list: Vec<ViewerInfo> = self
            .viewers
            .read()
            .await
            .values()
            .filter(|v| camera_id.map_or(true, |c| v.camera_id == c))
            .map(Viewer::info)
            .collect();
        list.sort_by_key(|v| v.connected_at);
        list
    }
}
