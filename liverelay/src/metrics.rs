use lazy_static::lazy_static;
use prometheus::{Gauge, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref STREAM: Gauge = Gauge::new("stream", "active stream number").unwrap();
    pub static ref VIEWER: Gauge = Gauge::new("viewer", "connected viewer number").unwrap();
    pub static ref KEEPALIVE_SENT: IntCounter =
        IntCounter::new("keepalive_sent", "keepalives delivered to cameras").unwrap();
    pub static ref KEEPALIVE_FAILED: IntCounter =
        IntCounter::new("keepalive_failed", "keepalives that could not be delivered").unwrap();
    pub static ref KEEPALIVE_EXHAUSTED: IntCounter = IntCounter::new(
        "keepalive_exhausted",
        "streams stopped after consecutive keepalive failures"
    )
    .unwrap();
    pub static ref REEMB_NOT_CONFIRMED: IntCounter = IntCounter::new(
        "reemb_not_confirmed",
        "relay answers without a=direction:passive"
    )
    .unwrap();
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("camrelay".to_string()), None).unwrap();
    pub static ref ENCODER: TextEncoder = TextEncoder::new();
}
