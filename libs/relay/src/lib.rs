//! Client for a Kurento-compatible media relay.
//!
//! One persistent WebSocket carries JSON-RPC 2.0 requests, their responses
//! (matched by id, in any order) and relay-pushed `onEvent` notifications,
//! which are fanned out to every local subscriber of the emitting object.

mod client;
mod error;
mod protocol;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{EventStream, RelayClient};
pub use error::RelayError;
pub use protocol::RelayEvent;

pub const MEDIA_PIPELINE: &str = "MediaPipeline";
pub const RTP_ENDPOINT: &str = "RtpEndpoint";
pub const WEBRTC_ENDPOINT: &str = "WebRtcEndpoint";
