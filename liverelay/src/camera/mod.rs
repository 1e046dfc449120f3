//! Control channel to the cameras.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

mod mqtt;
#[cfg(test)]
pub(crate) mod testing;

pub use mqtt::MqttCamera;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    Disconnected,
    Timeout,
    Publish(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Disconnected => write!(f, "camera control channel is disconnected"),
            CameraError::Timeout => write!(f, "camera control publish timed out"),
            CameraError::Publish(err) => write!(f, "camera control publish failed: {}", err),
        }
    }
}

impl std::error::Error for CameraError {}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum MessageKind {
    Play {
        /// The relay's answer, rewritten for the camera. The firmware reads
        /// it from this field.
        #[serde(rename = "sdpOffer")]
        sdp: String,
    },
    Keepalive {
        #[serde(rename = "keepaliveCount")]
        count: u64,
    },
    Stop,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Play { .. } => "play",
            MessageKind::Keepalive { .. } => "keepalive",
            MessageKind::Stop => "stop",
        }
    }
}

/// Envelope shared by every camera control message.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CameraMessage {
    pub request_id: String,
    pub creation_timestamp: String,
    /// The camera the message is addressed to.
    pub source_id: String,
    pub source_type: String,
    pub stream_id: String,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl CameraMessage {
    pub fn new(camera_id: &str, stream_id: &str, source_type: &str, kind: MessageKind) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            creation_timestamp: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                .to_string(),
            source_id: camera_id.to_string(),
            source_type: source_type.to_string(),
            stream_id: stream_id.to_string(),
            kind,
        }
    }
}

#[async_trait]
pub trait CameraControl: Send + Sync {
    /// Delivers one message to the camera named by `message.source_id`.
    async fn send(&self, message: CameraMessage) -> Result<(), CameraError>;

    fn is_connected(&self) -> bool;

    async fn close(&self) {}
}
