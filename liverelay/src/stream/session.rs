use api::response::{
    Bandwidth, Ports, Ssrcs, StopReason, StopSummary, StreamInfo, StreamStarted, StreamState,
    ViewerInfo,
};
use camsdp::{MediaInfo, MediaKind};
use tokio::sync::RwLock;

use super::keepalive::{Keepalive, KeepaliveRecord};

/// Relay and camera state of one camera's stream.
pub struct StreamSession {
    pub camera_id: String,
    pub session_id: String,
    pub stream_id: String,
    pub media: MediaInfo,
    pub bandwidth: Bandwidth,
    pub address: Option<String>,
    pub started_at: i64,
    pub keepalive_record: KeepaliveRecord,
    pub(super) inner: RwLock<Inner>,
}

#[derive(Default)]
pub(super) struct Inner {
    pub state: StreamState,
    pub pipeline: Option<String>,
    pub endpoint: Option<String>,
    pub reemb_confirmed: bool,
    /// Offer built for the camera and the enhanced answer it was sent.
    pub offer: Option<String>,
    pub answer: Option<String>,
    pub keepalive: Option<Keepalive>,
}

fn prefix(s: &str) -> &str {
    match s.char_indices().nth(8) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

impl StreamSession {
    pub fn new(
        camera_id: &str,
        media: MediaInfo,
        bandwidth: Bandwidth,
        address: Option<String>,
    ) -> Self {
        let stream_id = uuid::Uuid::new_v4().to_string();
        Self {
            camera_id: camera_id.to_string(),
            session_id: format!("stream-{}-{}", prefix(camera_id), prefix(&stream_id)),
            stream_id,
            media,
            bandwidth,
            address,
            started_at: chrono::Utc::now().timestamp_millis(),
            keepalive_record: KeepaliveRecord::default(),
            inner: RwLock::new(Inner {
                state: StreamState::Starting,
                ..Default::default()
            }),
        }
    }

    pub async fn state(&self) -> StreamState {
        self.inner.read().await.state
    }

    pub async fn set_state(&self, state: StreamState) {
        self.inner.write().await.state = state;
    }

    fn duration_seconds(&self, until: i64) -> f64 {
        (until - self.started_at).max(0) as f64 / 1000.0
    }

    pub async fn started(&self) -> StreamStarted {
        StreamStarted {
            session_id: self.session_id.clone(),
            stream_id: self.stream_id.clone(),
            camera_id: self.camera_id.clone(),
            state: self.state().await,
            started_at: self.started_at,
        }
    }

    pub async fn info(&self, viewers: Vec<ViewerInfo>) -> StreamInfo {
        let inner = self.inner.read().await;
        StreamInfo {
            camera_id: self.camera_id.clone(),
            session_id: self.session_id.clone(),
            stream_id: self.stream_id.clone(),
            state: inner.state,
            started_at: self.started_at,
            duration_seconds: self.duration_seconds(chrono::Utc::now().timestamp_millis()),
            pipeline: inner.pipeline.clone(),
            endpoint: inner.endpoint.clone(),
            address: self.address.clone(),
            cname: self.media.cname.clone(),
            ports: Ports {
                audio: self.media.audio_port,
                video: self.media.video_port,
                audio_rtcp: self.media.rtcp_port(MediaKind::Audio),
                video_rtcp: self.media.rtcp_port(MediaKind::Video),
            },
            ssrc: Ssrcs {
                audio: self.media.audio_ssrc,
                video: self.media.video_ssrc,
            },
            bandwidth: self.bandwidth,
            reemb_confirmed: inner.reemb_confirmed,
            sdp_offer: inner.offer.clone(),
            sdp_answer: inner.answer.clone(),
            keepalive_stats: self.keepalive_record.snapshot().await,
            viewer_count: viewers.len(),
            viewers,
        }
    }

    pub async fn summary(&self, reason: StopReason, viewers: Vec<ViewerInfo>) -> StopSummary {
        let stopped_at = chrono::Utc::now().timestamp_millis();
        StopSummary {
            camera_id: self.camera_id.clone(),
            session_id: self.session_id.clone(),
            stream_id: self.stream_id.clone(),
            state: self.state().await,
            reason,
            started_at: self.started_at,
            stopped_at,
            duration_seconds: self.duration_seconds(stopped_at),
            keepalive_stats: self.keepalive_record.snapshot().await,
            viewers,
        }
    }
}
