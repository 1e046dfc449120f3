pub const METRICS: &str = "/metrics";
pub const HEALTH: &str = "/health";
pub const SIGNALING: &str = "/signaling";
pub const STREAMS: &str = "/streams";
pub const VIEWERS: &str = "/viewers";

pub fn stream(camera: &str) -> String {
    format!("/streams/{}", camera)
}

pub fn stream_start(camera: &str) -> String {
    format!("/streams/{}/start", camera)
}

pub fn stream_stop(camera: &str) -> String {
    format!("/streams/{}/stop", camera)
}

pub fn viewers(camera: &str) -> String {
    format!("/viewers/{}", camera)
}
