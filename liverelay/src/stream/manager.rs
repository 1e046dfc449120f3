use std::collections::HashMap;
use std::sync::Arc;

use api::request::StartStream;
use api::response::{
    Bandwidth, Health, StopReason, StopSummary, StreamInfo, StreamStarted, StreamState,
};
use api::signaling::{IceCandidate, ServerMessage};
use camsdp::{
    build_offer, build_viewer_answer, enhance_answer, truncate_for_log, validate_answer, MediaInfo,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use relay::{RelayClient, RelayEvent};
use serde_json::json;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::camera::{CameraControl, CameraMessage, MessageKind};
use crate::config::Config;
use crate::error::AppError;
use crate::metrics;
use crate::result::Result;
use crate::viewer::{Registry, Viewer};

use super::keepalive::{Exhausted, Keepalive, Target};
use super::session::StreamSession;

const SDP_LOG_LINES: usize = 40;

/// Result of a viewer joining a stream.
pub struct Joined {
    pub viewer_id: String,
    pub answer: String,
    /// ICE candidates and state changes of the viewer's relay endpoint. Ends
    /// when the endpoint is released.
    pub events: BoxStream<'static, RelayEvent>,
}

#[derive(Clone)]
pub struct Manager {
    sessions: Arc<RwLock<HashMap<String, Arc<StreamSession>>>>,
    /// Serializes start/stop (write) against viewer joins (read) per camera.
    locks: Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>,
    summaries: Arc<RwLock<HashMap<String, StopSummary>>>,
    viewers: Registry,
    relay: RelayClient,
    control: Arc<dyn CameraControl>,
    config: Config,
    fatal_tx: mpsc::UnboundedSender<Exhausted>,
    shutdown_tx: mpsc::Sender<()>,
}

impl Manager {
    pub fn new(config: Config, relay: RelayClient, control: Arc<dyn CameraControl>) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let manager = Manager {
            sessions: Default::default(),
            locks: Default::default(),
            summaries: Default::default(),
            viewers: Registry::default(),
            relay,
            control,
            config,
            fatal_tx,
            shutdown_tx,
        };
        tokio::spawn(Self::supervise(manager.clone(), fatal_rx, shutdown_rx));
        manager
    }

    /// Stops streams whose keepalive driver gave up.
    async fn supervise(
        manager: Manager,
        mut fatal_rx: mpsc::UnboundedReceiver<Exhausted>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            let exhausted = tokio::select! {
                _ = shutdown_rx.recv() => break,
                exhausted = fatal_rx.recv() => match exhausted {
                    Some(exhausted) => exhausted,
                    None => break,
                },
            };
            let lock = manager.camera_lock(&exhausted.camera_id).await;
            let stopped = {
                let _guard = lock.write().await;
                manager
                    .stop_locked(
                        &exhausted.camera_id,
                        StopReason::KeepaliveExhausted,
                        Some(&exhausted.stream_id),
                    )
                    .await
            };
            manager.prune_lock(&exhausted.camera_id, lock).await;
            match stopped {
                Some(summary) => warn!(
                    "{}, stream {} stopped after {} failures",
                    AppError::KeepaliveExhausted(summary.camera_id),
                    summary.session_id,
                    summary.keepalive_stats.errors
                ),
                None => debug!(
                    camera_id = %exhausted.camera_id,
                    "stale keepalive report for stream {}", exhausted.stream_id
                ),
            }
        }
    }

    async fn camera_lock(&self, camera_id: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .await
            .entry(camera_id.to_string())
            .or_default()
            .clone()
    }

    /// Forgets the lock of `camera_id` once no caller holds it.
    async fn prune_lock(&self, camera_id: &str, lock: Arc<RwLock<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks
            .get(camera_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(camera_id);
        }
    }

    async fn session(&self, camera_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.read().await.get(camera_id).cloned()
    }

    /// Starts streaming `camera_id`, or returns its live session. The flag is
    /// true when a new session was created.
    pub async fn start(
        &self,
        camera_id: &str,
        req: StartStream,
        address: Option<String>,
    ) -> Result<(StreamStarted, bool)> {
        let lock = self.camera_lock(camera_id).await;
        let started = {
            let _guard = lock.write().await;
            self.start_locked(camera_id, req, address).await
        };
        self.prune_lock(camera_id, lock).await;
        started
    }

    async fn start_locked(
        &self,
        camera_id: &str,
        req: StartStream,
        address: Option<String>,
    ) -> Result<(StreamStarted, bool)> {
        if let Some(session) = self.session(camera_id).await {
            if session.state().await.is_live() {
                debug!(camera_id, "stream already {}", session.state().await);
                return Ok((session.started().await, false));
            }
        }

        let bandwidth = Bandwidth {
            max: req.max_bandwidth.unwrap_or(self.config.stream.max_bandwidth),
            min: req.min_bandwidth.unwrap_or(self.config.stream.min_bandwidth),
        };
        if bandwidth.min > bandwidth.max {
            return Err(AppError::invalid_message(format!(
                "minBandwidth {} exceeds maxBandwidth {}",
                bandwidth.min, bandwidth.max
            )));
        }

        let camera = &self.config.camera;
        let media = MediaInfo::new(
            camera.audio_ssrc,
            camera.video_ssrc,
            camera.audio_port,
            camera.video_port,
        );
        let session = Arc::new(StreamSession::new(camera_id, media, bandwidth, address));
        info!(
            camera_id,
            session_id = %session.session_id,
            stream_id = %session.stream_id,
            "starting stream"
        );
        self.sessions
            .write()
            .await
            .insert(camera_id.to_string(), session.clone());

        if let Err(e) = self.establish(&session).await {
            error!(camera_id, "stream start failed: {}", e);
            session.set_state(StreamState::Failed).await;
            self.release_stream(&session).await;
            self.sessions.write().await.remove(camera_id);
            return Err(e);
        }

        metrics::STREAM.inc();
        info!(camera_id, session_id = %session.session_id, "stream active");
        Ok((session.started().await, true))
    }

    async fn establish(&self, session: &StreamSession) -> Result<()> {
        let pipeline = self.relay.create_pipeline().await?;
        session.inner.write().await.pipeline = Some(pipeline.clone());
        let endpoint = self.relay.create_rtp_endpoint(&pipeline).await?;
        session.inner.write().await.endpoint = Some(endpoint.clone());

        self.relay
            .set_max_video_recv_bandwidth(&endpoint, session.bandwidth.max)
            .await?;
        self.relay
            .set_min_video_recv_bandwidth(&endpoint, session.bandwidth.min)
            .await?;

        let offer = build_offer(&session.media);
        debug!("camera offer:\n{}", truncate_for_log(&offer, SDP_LOG_LINES));
        let answer = self.relay.process_offer(&endpoint, &offer).await?;
        debug!("relay answer:\n{}", truncate_for_log(&answer, SDP_LOG_LINES));

        session.inner.write().await.offer = Some(offer);
        let enhanced = enhance_answer(&answer, &session.media, session.address.as_deref())?;
        let reemb_confirmed = enhanced.reemb.is_confirmed();
        if !reemb_confirmed {
            metrics::REEMB_NOT_CONFIRMED.inc();
            warn!(
                camera_id = %session.camera_id,
                "relay did not confirm REMB feedback: {:?}", enhanced.reemb
            );
        }
        let validation = validate_answer(&enhanced.sdp);
        if !validation.is_complete() {
            warn!(
                camera_id = %session.camera_id,
                "camera answer is missing {:?}",
                validation.missing()
            );
        }
        {
            let mut inner = session.inner.write().await;
            inner.reemb_confirmed = reemb_confirmed;
            inner.answer = Some(enhanced.sdp.clone());
        }

        let play = CameraMessage::new(
            &session.camera_id,
            &session.stream_id,
            &self.config.mqtt.source_type,
            MessageKind::Play { sdp: enhanced.sdp },
        );
        self.control
            .send(play)
            .await
            .map_err(AppError::camera_control)?;

        let keepalive = Keepalive::spawn(
            self.control.clone(),
            Target {
                camera_id: session.camera_id.clone(),
                stream_id: session.stream_id.clone(),
                source_type: self.config.mqtt.source_type.clone(),
            },
            self.config.keepalive.interval(),
            self.config.keepalive.threshold,
            session.keepalive_record.clone(),
            self.fatal_tx.clone(),
        );
        let mut inner = session.inner.write().await;
        inner.keepalive = Some(keepalive);
        inner.state = StreamState::Active;
        Ok(())
    }

    /// Best-effort release of the camera endpoint and pipeline.
    async fn release_stream(&self, session: &StreamSession) {
        let (endpoint, pipeline) = {
            let mut inner = session.inner.write().await;
            (inner.endpoint.take(), inner.pipeline.take())
        };
        for object in [endpoint, pipeline].into_iter().flatten() {
            if let Err(e) = self.relay.release(&object).await {
                warn!(camera_id = %session.camera_id, "release {} failed: {}", object, e);
            }
        }
    }

    async fn release_viewer(&self, viewer: &Viewer) {
        if let Some(endpoint) = &viewer.endpoint {
            if let Err(e) = self.relay.release(endpoint).await {
                warn!(viewer_id = %viewer.id, "release {} failed: {}", endpoint, e);
            }
        }
    }

    /// Stops the stream of `camera_id`. `None` when there was nothing to stop.
    pub async fn stop(&self, camera_id: &str, reason: StopReason) -> Option<StopSummary> {
        let lock = self.camera_lock(camera_id).await;
        let summary = {
            let _guard = lock.write().await;
            self.stop_locked(camera_id, reason, None).await
        };
        self.prune_lock(camera_id, lock).await;
        summary
    }

    async fn stop_locked(
        &self,
        camera_id: &str,
        reason: StopReason,
        stream_id: Option<&str>,
    ) -> Option<StopSummary> {
        let session = self.session(camera_id).await?;
        if stream_id.is_some_and(|id| id != session.stream_id) {
            return None;
        }
        if session.state().await != StreamState::Active {
            return None;
        }
        info!(camera_id, session_id = %session.session_id, "stopping stream: {:?}", reason);
        session.set_state(StreamState::Stopping).await;

        let viewers = self.viewers.remove_camera(camera_id).await;
        for viewer in viewers.iter() {
            viewer.notify(ServerMessage::error("stream stopped"));
            self.release_viewer(viewer).await;
        }
        let detached = viewers.iter().map(Viewer::info).collect();
        if !viewers.is_empty() {
            debug!(camera_id, "released {} viewers", viewers.len());
        }

        self.release_stream(&session).await;

        let stop = CameraMessage::new(
            camera_id,
            &session.stream_id,
            &self.config.mqtt.source_type,
            MessageKind::Stop,
        );
        if let Err(e) = self.control.send(stop).await {
            warn!(camera_id, "camera stop failed: {}", e);
        }

        if let Some(keepalive) = session.inner.write().await.keepalive.take() {
            keepalive.stop();
        }

        session.set_state(StreamState::Stopped).await;
        self.sessions.write().await.remove(camera_id);
        metrics::STREAM.dec();

        let summary = session.summary(reason, detached).await;
        self.summaries
            .write()
            .await
            .insert(camera_id.to_string(), summary.clone());
        Some(summary)
    }

    /// Summary of the last stream of `camera_id` that stopped.
    pub async fn last_summary(&self, camera_id: &str) -> Option<StopSummary> {
        self.summaries.read().await.get(camera_id).cloned()
    }

    /// Attaches a viewer to the active stream of `camera_id`.
    pub async fn join(
        &self,
        camera_id: &str,
        stream_id: Option<&str>,
        offer: &str,
        notify: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Joined> {
        let lock = self.camera_lock(camera_id).await;
        let joined = {
            let _guard = lock.read().await;
            self.join_locked(camera_id, stream_id, offer, notify).await
        };
        self.prune_lock(camera_id, lock).await;
        joined
    }

    async fn join_locked(
        &self,
        camera_id: &str,
        stream_id: Option<&str>,
        offer: &str,
        notify: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Joined> {
        let session = self
            .session(camera_id)
            .await
            .ok_or_else(|| AppError::stream_not_found(camera_id))?;
        let (pipeline, camera_endpoint) = {
            let inner = session.inner.read().await;
            match (inner.state, &inner.pipeline, &inner.endpoint) {
                (StreamState::Active, Some(p), Some(e)) => (p.clone(), e.clone()),
                _ => return Err(AppError::stream_not_active(camera_id)),
            }
        };
        if stream_id.is_some_and(|id| id != session.stream_id) {
            return Err(AppError::stream_not_active(camera_id));
        }

        let viewer_id = self
            .viewers
            .reserve(camera_id, self.config.stream.max_viewers, notify)
            .await?;
        match self
            .attach(&viewer_id, &pipeline, &camera_endpoint, offer)
            .await
        {
            Ok((answer, events)) => {
                info!(camera_id, viewer_id = %viewer_id, "viewer joined");
                Ok(Joined {
                    viewer_id,
                    answer,
                    events,
                })
            }
            Err(e) => {
                warn!(camera_id, viewer_id = %viewer_id, "viewer join failed: {}", e);
                if let Some(viewer) = self.viewers.remove(&viewer_id).await {
                    self.release_viewer(&viewer).await;
                }
                Err(e)
            }
        }
    }

    async fn attach(
        &self,
        viewer_id: &str,
        pipeline: &str,
        camera_endpoint: &str,
        offer: &str,
    ) -> Result<(String, BoxStream<'static, RelayEvent>)> {
        let endpoint = self.relay.create_webrtc_endpoint(pipeline).await?;
        self.viewers.set_endpoint(viewer_id, endpoint.clone()).await;

        let candidates = self
            .relay
            .subscribe(&endpoint, &[self.config.relay.candidate_event.as_str()])
            .await?;
        let events = match self
            .relay
            .subscribe(&endpoint, &[self.config.relay.state_event.as_str()])
            .await
        {
            Ok(states) => stream::select(candidates, states).boxed(),
            Err(e) => {
                debug!("no {} events on {}: {}", self.config.relay.state_event, endpoint, e);
                candidates.boxed()
            }
        };

        let bounds = &self.config.stream;
        self.relay
            .set_max_video_send_bandwidth(&endpoint, bounds.viewer_max_bandwidth)
            .await?;
        self.relay
            .set_min_video_send_bandwidth(&endpoint, bounds.viewer_min_bandwidth)
            .await?;
        self.relay
            .connect_endpoints(camera_endpoint, &endpoint)
            .await?;

        let answer = self.relay.process_offer(&endpoint, offer).await?;
        debug!("viewer answer:\n{}", truncate_for_log(&answer, SDP_LOG_LINES));
        self.relay.gather_candidates(&endpoint).await?;
        let answer = build_viewer_answer(answer);
        self.viewers.set_answer(viewer_id, answer.clone()).await;
        Ok((answer, events))
    }

    pub async fn leave(&self, viewer_id: &str) {
        if let Some(viewer) = self.viewers.remove(viewer_id).await {
            info!(
                camera_id = %viewer.camera_id,
                viewer_id,
                "viewer left after {} ms",
                viewer.connected_ms()
            );
            self.release_viewer(&viewer).await;
        }
    }

    pub async fn add_candidate(&self, viewer_id: &str, candidate: IceCandidate) -> Result<()> {
        let endpoint = self
            .viewers
            .endpoint(viewer_id)
            .await
            .ok_or_else(|| AppError::invalid_message("viewer has no relay endpoint"))?;
        let candidate = json!({
            "__module__": "kurento",
            "__type__": "IceCandidate",
            "candidate": candidate.candidate,
            "sdpMid": candidate.sdp_mid,
            "sdpMLineIndex": candidate.sdp_m_line_index,
        });
        self.relay.add_ice_candidate(&endpoint, candidate).await?;
        Ok(())
    }

    pub async fn set_ice_state(&self, viewer_id: &str, state: &str) {
        debug!(viewer_id, "ice state {}", state);
        self.viewers.set_ice_state(viewer_id, state.to_string()).await;
    }

    pub async fn info(&self, camera_id: &str) -> Option<StreamInfo> {
        let session = self.session(camera_id).await?;
        let viewers = self.viewers.list(Some(camera_id)).await;
        Some(session.info(viewers).await)
    }

    pub async fn list(&self) -> Vec<StreamInfo> {
        let sessions: Vec<Arc<StreamSession>> =
            self.sessions.read().await.values().cloned().collect();
        let mut streams = Vec::with_capacity(sessions.len());
        for session in sessions {
            let viewers = self.viewers.list(Some(&session.camera_id)).await;
            streams.push(session.info(viewers).await);
        }
        streams.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        streams
    }

    pub fn viewers(&self) -> &Registry {
        &self.viewers
    }

    pub async fn health(&self) -> Health {
        let relay_connected = self.relay.is_connected();
        let camera_control_connected = self.control.is_connected();
        Health {
            status: if relay_connected && camera_control_connected {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            relay_connected,
            camera_control_connected,
            active_streams: self.sessions.read().await.len(),
            total_viewers: self.viewers.total().await,
        }
    }

    /// Stops every stream, then closes the relay and camera connections.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.try_send(());
        let cameras: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for camera_id in cameras {
            self.stop(&camera_id, StopReason::Shutdown).await;
        }
        self.relay.close();
        self.control.close().await;
        info!("stream manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::Recorder;
    use relay::mock::MockRelay;

    async fn manager(config: Config) -> (Manager, MockRelay, Arc<Recorder>) {
        let (client, mock) = MockRelay::spawn().await;
        let recorder = Arc::new(Recorder::default());
        (Manager::new(config, client, recorder.clone()), mock, recorder)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (manager, mock, recorder) = manager(Config::default()).await;
        let (first, created) = manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.state, StreamState::Active);

        let (second, created) = manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(mock.created(relay::MEDIA_PIPELINE).await, 1);
        assert_eq!(recorder.kinds(), vec!["play"]);

        let info = manager.info("cam1").await.unwrap();
        let offer = info.sdp_offer.unwrap();
        assert!(offer.contains("a=direction:active"));
        let answer = info.sdp_answer.unwrap();
        assert!(answer.contains("a=direction:passive"));
        assert!(answer.contains("x-skl-ssrca"));
    }

    #[tokio::test]
    async fn test_start_failure_releases_partial_objects() {
        let (manager, mock, recorder) = manager(Config::default()).await;
        mock.fail("processOffer").await;
        let err = manager
            .start("cam2", StartStream::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "relayError");
        assert!(manager.info("cam2").await.is_none());
        assert_eq!(mock.live_objects().await, 0);
        assert!(recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_camera_refusal_fails_start() {
        let (manager, mock, recorder) = manager(Config::default()).await;
        recorder.set_failing(true);
        let err = manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "cameraControl");
        assert!(manager.info("cam1").await.is_none());
        assert_eq!(mock.live_objects().await, 0);
    }

    #[tokio::test]
    async fn test_bandwidth_override() {
        let (manager, mock, _) = manager(Config::default()).await;
        let err = manager
            .start(
                "cam1",
                StartStream {
                    max_bandwidth: Some(100),
                    min_bandwidth: Some(200),
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalidMessage");
        assert_eq!(mock.created(relay::MEDIA_PIPELINE).await, 0);

        manager
            .start(
                "cam1",
                StartStream {
                    max_bandwidth: Some(3000),
                    min_bandwidth: None,
                },
                None,
            )
            .await
            .unwrap();
        let params = mock.last_params("setMaxVideoRecvBandwidth").await.unwrap();
        assert_eq!(params["operationParams"]["maxVideoRecvBandwidth"], 3000);
        let info = manager.info("cam1").await.unwrap();
        assert_eq!(info.bandwidth, Bandwidth { max: 3000, min: 500 });
    }

    #[tokio::test]
    async fn test_stop_releases_viewers_first() {
        let (manager, mock, recorder) = manager(Config::default()).await;
        manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let joined = manager.join("cam1", None, "v=0\r\n", tx).await.unwrap();
        assert!(!joined.answer.is_empty());
        let info = manager.info("cam1").await.unwrap();
        assert_eq!(info.viewer_count, 1);
        assert_eq!(info.viewers[0].sdp_answer.as_deref(), Some(joined.answer.as_str()));
        assert!(info.viewers[0].disconnected_at.is_none());

        let summary = manager.stop("cam1", StopReason::Requested).await.unwrap();
        assert_eq!(summary.state, StreamState::Stopped);
        assert_eq!(summary.reason, StopReason::Requested);
        assert_eq!(summary.viewers.len(), 1);
        assert_eq!(summary.viewers[0].viewer_id, joined.viewer_id);
        assert!(summary.viewers[0].disconnected_at.is_some());
        assert_eq!(rx.recv().await, Some(ServerMessage::error("stream stopped")));

        let released = mock.released().await;
        assert_eq!(released.len(), 3);
        assert!(released[0].ends_with(relay::WEBRTC_ENDPOINT));
        assert!(released[1].ends_with(relay::RTP_ENDPOINT));
        assert!(released[2].ends_with(relay::MEDIA_PIPELINE));
        assert_eq!(recorder.kinds(), vec!["play", "stop"]);

        // second stop is a no-op
        assert!(manager.stop("cam1", StopReason::Requested).await.is_none());
        assert_eq!(mock.released().await.len(), 3);
        assert!(manager.last_summary("cam1").await.is_some());
        assert!(manager.stop("unknown", StopReason::Requested).await.is_none());
    }

    #[tokio::test]
    async fn test_join_requires_active_stream() {
        let (manager, _mock, _) = manager(Config::default()).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = manager
            .join("cam1", None, "v=0\r\n", tx.clone())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "streamNotFound");

        manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap();
        let err = manager
            .join("cam1", Some("other-stream"), "v=0\r\n", tx)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "streamNotActive");
        assert_eq!(manager.viewers().total().await, 0);
    }

    #[tokio::test]
    async fn test_failed_join_frees_slot() {
        let (manager, mock, _) = manager(Config::default()).await;
        manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap();
        mock.fail("connect").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(manager.join("cam1", None, "v=0\r\n", tx).await.is_err());
        assert_eq!(manager.viewers().count("cam1").await, 0);
        assert_eq!(mock.live(relay::WEBRTC_ENDPOINT).await, 0);
    }

    #[tokio::test]
    async fn test_camera_locks_are_pruned() {
        let (manager, _mock, _) = manager(Config::default()).await;
        for i in 0..100 {
            let (tx, _rx) = mpsc::unbounded_channel();
            let camera = format!("bogus-{}", i);
            assert!(manager.join(&camera, None, "v=0\r\n", tx).await.is_err());
            assert!(manager
                .stop(&format!("other-{}", i), StopReason::Requested)
                .await
                .is_none());
        }
        assert!(manager.locks.lock().await.is_empty());

        manager
            .start("cam1", StartStream::default(), None)
            .await
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        manager.join("cam1", None, "v=0\r\n", tx).await.unwrap();
        manager.stop("cam1", StopReason::Requested).await.unwrap();
        assert!(manager.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let (manager, mock, _) = manager(Config::default()).await;
        let health = manager.health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.active_streams, 0);

        mock.disconnect().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let health = manager.health().await;
        assert_eq!(health.status, "degraded");
        assert!(!health.relay_connected);
    }
}
