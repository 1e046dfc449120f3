use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS, Transport,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CameraControl, CameraError, CameraMessage, MessageKind};
use crate::config::Mqtt;

const MQTT_BUFFER_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type Ack = oneshot::Sender<Result<(), CameraError>>;

/// Publishes waiting for the broker's PUBACK.
///
/// rumqttc assigns packet ids inside the event loop, so a publish is matched
/// to its id when the loop reports it outgoing. Requests leave the client
/// channel in order, which keeps `queued` aligned with those reports.
#[derive(Default)]
struct Acks {
    queued: VecDeque<Ack>,
    inflight: HashMap<u16, Ack>,
}

impl Acks {
    fn outgoing(&mut self, pkid: u16) {
        if let Some(ack) = self.queued.pop_front() {
            self.inflight.retain(|_, ack| !ack.is_closed());
            self.inflight.insert(pkid, ack);
        }
    }

    fn acked(&mut self, pkid: u16) {
        if let Some(ack) = self.inflight.remove(&pkid) {
            let _ = ack.send(Ok(()));
        }
    }

    fn fail_all(&mut self) -> usize {
        let pending: Vec<Ack> = self
            .queued
            .drain(..)
            .chain(self.inflight.drain().map(|(_, ack)| ack))
            .collect();
        let count = pending.len();
        for ack in pending {
            let _ = ack.send(Err(CameraError::Disconnected));
        }
        count
    }
}

/// Publishes camera control messages with QoS 1.
///
/// The broker connection is driven by a background task; a publish is
/// refused while the last connection attempt has not been acknowledged, and
/// only succeeds once the broker acknowledges it.
pub struct MqttCamera {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    acks: Arc<Mutex<Acks>>,
    cfg: Mqtt,
    eventloop: JoinHandle<()>,
}

impl MqttCamera {
    pub fn new(cfg: Mqtt) -> anyhow::Result<Self> {
        let mut options = MqttOptions::parse_url(cfg.url.as_str())?;
        if let Some(ca) = &cfg.ca_cert {
            let ca = std::fs::read(ca)?;
            let client_auth = match (&cfg.client_cert, &cfg.client_key) {
                (Some(cert), Some(key)) => Some((std::fs::read(cert)?, std::fs::read(key)?)),
                _ => None,
            };
            options.set_transport(Transport::tls(ca, client_auth, None));
        }
        debug!("mqtt options: {:?}", options);

        let (client, eventloop) = AsyncClient::new(options, MQTT_BUFFER_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let acks = Arc::new(Mutex::new(Acks::default()));
        let eventloop = tokio::spawn(Self::drive(eventloop, connected.clone(), acks.clone()));
        Ok(Self {
            client,
            connected,
            acks,
            cfg,
            eventloop,
        })
    }

    async fn drive(mut eventloop: EventLoop, connected: Arc<AtomicBool>, acks: Arc<Mutex<Acks>>) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    info!("mqtt connected: {:?}", ack.code);
                    connected.store(true, Ordering::SeqCst);
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    warn!("mqtt broker disconnected us");
                    connected.store(false, Ordering::SeqCst);
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    if let Ok(mut acks) = acks.lock() {
                        acks.outgoing(pkid);
                    }
                }
                Ok(Event::Incoming(Incoming::PubAck(ack))) => {
                    if let Ok(mut acks) = acks.lock() {
                        acks.acked(ack.pkid);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let failed = match acks.lock() {
                        Ok(mut acks) => {
                            connected.store(false, Ordering::SeqCst);
                            // Messages already reported as failed are not
                            // replayed on the next session.
                            eventloop.pending.clear();
                            acks.fail_all()
                        }
                        Err(_) => 0,
                    };
                    if failed > 0 {
                        error!("mqtt connection lost, {} messages unacknowledged: {:?}", failed, e);
                    } else {
                        debug!("mqtt connection error: {:?}", e);
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    fn topic(&self, message: &CameraMessage) -> String {
        let template = match message.kind {
            MessageKind::Play { .. } => &self.cfg.play_topic,
            MessageKind::Keepalive { .. } => &self.cfg.keepalive_topic,
            MessageKind::Stop => &self.cfg.stop_topic,
        };
        template.replace("{camera_id}", &message.source_id)
    }

    /// Hands the publish to the event loop and queues its acknowledgement.
    fn enqueue(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<oneshot::Receiver<Result<(), CameraError>>, CameraError> {
        let (tx, rx) = oneshot::channel();
        let mut acks = self
            .acks
            .lock()
            .map_err(|e| CameraError::Publish(e.to_string()))?;
        if !self.is_connected() {
            return Err(CameraError::Disconnected);
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| match e {
                ClientError::TryRequest(_) => {
                    CameraError::Publish("request queue is full".to_string())
                }
                e => CameraError::Publish(e.to_string()),
            })?;
        acks.queued.push_back(tx);
        Ok(rx)
    }
}

#[async_trait]
impl CameraControl for MqttCamera {
    async fn send(&self, message: CameraMessage) -> Result<(), CameraError> {
        let topic = self.topic(&message);
        let payload =
            serde_json::to_vec(&message).map_err(|e| CameraError::Publish(e.to_string()))?;
        let ack = self.enqueue(&topic, payload)?;
        match tokio::time::timeout(self.cfg.publish_timeout(), ack).await {
            Ok(Ok(Ok(()))) => {
                debug!("published {} to {}", message.kind.as_str(), topic);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(CameraError::Disconnected),
            Err(_) => Err(CameraError::Timeout),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let _ = self.client.disconnect().await;
        self.eventloop.abort();
    }
}

impl Drop for MqttCamera {
    fn drop(&mut self) {
        self.eventloop.abort();
    }
}
