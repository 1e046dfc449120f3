use std::sync::Arc;
use std::time::Duration;

use api::response::KeepaliveStats;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::camera::{CameraControl, CameraMessage, MessageKind};
use crate::metrics;

/// Sent once when a camera misses `threshold` keepalives in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub camera_id: String,
    pub stream_id: String,
}

/// Keepalive statistics, shared between the driver and readers.
#[derive(Clone, Default)]
pub struct KeepaliveRecord(Arc<RwLock<KeepaliveStats>>);

impl KeepaliveRecord {
    pub async fn snapshot(&self) -> KeepaliveStats {
        self.0.read().await.clone()
    }

    async fn success(&self) {
        let mut stats = self.0.write().await;
        stats.count += 1;
        stats.errors = 0;
        stats.last_success = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Returns the consecutive failure count.
    async fn failure(&self, err: String) -> u32 {
        let mut stats = self.0.write().await;
        stats.errors += 1;
        stats.total_errors += 1;
        stats.last_error = Some(err);
        stats.last_error_at = Some(chrono::Utc::now().timestamp_millis());
        stats.errors
    }
}

pub struct Target {
    pub camera_id: String,
    pub stream_id: String,
    pub source_type: String,
}

/// Periodic keepalive towards one camera stream.
pub struct Keepalive {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Keepalive {
    pub fn spawn(
        control: Arc<dyn CameraControl>,
        target: Target,
        interval: Duration,
        threshold: u32,
        record: KeepaliveRecord,
        fatal: mpsc::UnboundedSender<Exhausted>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(
            control,
            target,
            interval,
            threshold,
            record,
            fatal,
            shutdown_rx,
        ));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// No keepalive is sent after this returns.
    pub fn stop(self) {
        let _ = self.shutdown_tx.try_send(());
        self.handle.abort();
    }
}

async fn run(
    control: Arc<dyn CameraControl>,
    target: Target,
    interval: Duration,
    threshold: u32,
    record: KeepaliveRecord,
    fatal: mpsc::UnboundedSender<Exhausted>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(camera_id = %target.camera_id, "keepalive stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        let count = record.snapshot().await.count;
        let message = CameraMessage::new(
            &target.camera_id,
            &target.stream_id,
            &target.source_type,
            MessageKind::Keepalive { count },
        );
        match control.send(message).await {
            Ok(()) => {
                metrics::KEEPALIVE_SENT.inc();
                record.success().await;
                debug!(camera_id = %target.camera_id, "keepalive {} sent", count);
            }
            Err(e) => {
                metrics::KEEPALIVE_FAILED.inc();
                let errors = record.failure(e.to_string()).await;
                warn!(
                    camera_id = %target.camera_id,
                    "keepalive failed ({}/{}): {}", errors, threshold, e
                );
                if errors >= threshold {
                    metrics::KEEPALIVE_EXHAUSTED.inc();
                    error!(
                        camera_id = %target.camera_id,
                        stream_id = %target.stream_id,
                        "camera stopped answering keepalives"
                    );
                    let _ = fatal.send(Exhausted {
                        camera_id: target.camera_id.clone(),
                        stream_id: target.stream_id.clone(),
                    });
                    break;
                }
            }
        }
    }
}
