use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
    Failed,
}

impl StreamState {
    pub fn is_live(&self) -> bool {
        matches!(self, StreamState::Starting | StreamState::Active)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Starting => "starting",
            StreamState::Active => "active",
            StreamState::Stopping => "stopping",
            StreamState::Stopped => "stopped",
            StreamState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a stream left the active state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Requested,
    KeepaliveExhausted,
    Shutdown,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StreamStarted {
    pub session_id: String,
    pub stream_id: String,
    pub camera_id: String,
    pub state: StreamState,
    pub started_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeepaliveStats {
    pub count: u64,
    /// Consecutive failures since the last successful send.
    pub errors: u32,
    pub total_errors: u64,
    pub last_success: Option<i64>,
    pub last_error: Option<String>,
    pub last_error_at: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StopSummary {
    pub camera_id: String,
    pub session_id: String,
    pub stream_id: String,
    pub state: StreamState,
    pub reason: StopReason,
    pub started_at: i64,
    pub stopped_at: i64,
    pub duration_seconds: f64,
    pub keepalive_stats: KeepaliveStats,
    /// Viewers detached by the stop.
    #[serde(default)]
    pub viewers: Vec<ViewerInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Ports {
    pub audio: u16,
    pub video: u16,
    pub audio_rtcp: u16,
    pub video_rtcp: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Ssrcs {
    pub audio: u32,
    pub video: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bandwidth {
    pub max: u32,
    pub min: u32,
}

/// Snapshot of one stream session.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub camera_id: String,
    pub session_id: String,
    pub stream_id: String,
    pub state: StreamState,
    pub started_at: i64,
    pub duration_seconds: f64,
    pub pipeline: Option<String>,
    pub endpoint: Option<String>,
    pub address: Option<String>,
    pub cname: String,
    pub ports: Ports,
    pub ssrc: Ssrcs,
    pub bandwidth: Bandwidth,
    pub reemb_confirmed: bool,
    pub sdp_offer: Option<String>,
    /// Answer forwarded to the camera, after enhancement.
    pub sdp_answer: Option<String>,
    pub keepalive_stats: KeepaliveStats,
    pub viewer_count: usize,
    pub viewers: Vec<ViewerInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StreamList {
    pub streams: Vec<StreamInfo>,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ViewerInfo {
    pub viewer_id: String,
    pub camera_id: String,
    pub endpoint: String,
    pub ice_state: Option<String>,
    pub sdp_answer: Option<String>,
    pub connected_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ViewerList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    pub viewers: Vec<ViewerInfo>,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: String,
    pub relay_connected: bool,
    pub camera_control_connected: bool,
    pub active_streams: usize,
    pub total_viewers: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
