use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::error::RelayError;
use crate::protocol::{Incoming, Request, Response, ON_EVENT};
use crate::{RelayEvent, MEDIA_PIPELINE, RTP_ENDPOINT, WEBRTC_ENDPOINT};

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const PING_INTERVAL_MS: u64 = 240_000;

/// Events for one relay object, closed when the connection is lost or the
/// object is released.
pub type EventStream = UnboundedReceiverStream<RelayEvent>;

type Pending = oneshot::Sender<Result<Value, RelayError>>;

struct Subscriber {
    types: Vec<String>,
    tx: mpsc::UnboundedSender<RelayEvent>,
}

struct Inner {
    next_id: AtomicU64,
    connected: AtomicBool,
    timeout: Duration,
    outbound: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<u64, Pending>>,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    remote_subscriptions: Mutex<HashSet<(String, String)>>,
    session_id: Mutex<Option<String>>,
}

#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

impl RelayClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, RelayError> {
        info!("connecting to relay: {}", url);
        let (ws, _) = connect_async(url).await.map_err(|e| {
            error!("relay connect failed: {}", e);
            RelayError::Unavailable
        })?;
        info!("relay connected");
        Ok(Self::from_socket(ws, timeout))
    }

    /// Runs the client over an already established WebSocket.
    pub fn from_socket<S>(ws: WebSocketStream<S>, timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (write, read) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self::with_outbound(tx, timeout, true);
        tokio::spawn(Self::write_loop(client.inner.clone(), write, rx));
        tokio::spawn(Self::read_loop(client.inner.clone(), read));
        client
    }

    /// A client without a connection. Every call fails with
    /// [`RelayError::Unavailable`].
    pub fn disconnected(timeout: Duration) -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self::with_outbound(tx, timeout, false)
    }

    fn with_outbound(
        outbound: mpsc::UnboundedSender<Message>,
        timeout: Duration,
        connected: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                connected: AtomicBool::new(connected),
                timeout,
                outbound,
                pending: Default::default(),
                subscribers: Default::default(),
                remote_subscriptions: Default::default(),
                session_id: Default::default(),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.session_id.lock().await.clone()
    }

    #[cfg(any(test, feature = "mock"))]
    pub async fn pending_calls(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RelayError> {
        self.call_timeout(method, params, self.inner.timeout).await
    }

    async fn call_timeout(
        &self,
        method: &str,
        mut params: Value,
        timeout: Duration,
    ) -> Result<Value, RelayError> {
        if !self.is_connected() {
            return Err(RelayError::Unavailable);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let (Some(session_id), Value::Object(map)) =
            (self.inner.session_id.lock().await.clone(), &mut params)
        {
            map.entry("sessionId").or_insert(Value::String(session_id));
        }
        let text = serde_json::to_string(&Request::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);
        // The reader clears `connected` before sweeping, so a sweep that ran
        // before our insert is visible here.
        if !self.is_connected() {
            self.inner.pending.lock().await.remove(&id);
            return Err(RelayError::Unavailable);
        }

        trace!("relay -> {}", text);
        if self.inner.outbound.send(Message::Text(text)).is_err() {
            self.inner.pending.lock().await.remove(&id);
            return Err(RelayError::Unavailable);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => {
                let result = result?;
                if let Some(session_id) = result.get("sessionId").and_then(Value::as_str) {
                    let mut current = self.inner.session_id.lock().await;
                    if current.as_deref() != Some(session_id) {
                        debug!("relay session: {}", session_id);
                        *current = Some(session_id.to_string());
                    }
                }
                Ok(result)
            }
            Ok(Err(_)) => Err(RelayError::Unavailable),
            Err(_) => {
                self.inner.pending.lock().await.remove(&id);
                warn!("relay call {} ({}) timed out", id, method);
                Err(RelayError::Timeout)
            }
        }
    }

    /// Subscribes to `types` events of the relay object `handle`.
    ///
    /// The local subscriber is registered before the remote subscription is
    /// requested so no event emitted in between is lost. The relay is asked
    /// only once per `(handle, type)`; later subscribers share it.
    pub async fn subscribe(&self, handle: &str, types: &[&str]) -> Result<EventStream, RelayError> {
        if !self.is_connected() {
            return Err(RelayError::Unavailable);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .await
            .entry(handle.to_string())
            .or_default()
            .push(Subscriber {
                types: types.iter().map(|t| t.to_string()).collect(),
                tx,
            });

        for kind in types {
            let key = (handle.to_string(), kind.to_string());
            if !self.inner.remote_subscriptions.lock().await.insert(key.clone()) {
                continue;
            }
            let params = json!({ "object": handle, "type": kind });
            if let Err(e) = self.call("subscribe", params).await {
                self.inner.remote_subscriptions.lock().await.remove(&key);
                return Err(e);
            }
            debug!("subscribed to {} on {}", kind, handle);
        }
        Ok(UnboundedReceiverStream::new(rx))
    }

    pub async fn create(&self, kind: &str, pipeline: Option<&str>) -> Result<String, RelayError> {
        let constructor = match pipeline {
            Some(pipeline) => json!({ "mediaPipeline": pipeline }),
            None => json!({}),
        };
        let result = self
            .call(
                "create",
                json!({ "type": kind, "constructorParams": constructor, "properties": {} }),
            )
            .await?;
        let handle = value_str(&result)?;
        debug!("created {}: {}", kind, handle);
        Ok(handle)
    }

    pub async fn create_pipeline(&self) -> Result<String, RelayError> {
        self.create(MEDIA_PIPELINE, None).await
    }

    pub async fn create_rtp_endpoint(&self, pipeline: &str) -> Result<String, RelayError> {
        self.create(RTP_ENDPOINT, Some(pipeline)).await
    }

    pub async fn create_webrtc_endpoint(&self, pipeline: &str) -> Result<String, RelayError> {
        self.create(WEBRTC_ENDPOINT, Some(pipeline)).await
    }

    pub async fn invoke(
        &self,
        object: &str,
        operation: &str,
        operation_params: Option<Value>,
    ) -> Result<Value, RelayError> {
        let mut params = json!({ "object": object, "operation": operation });
        if let Some(operation_params) = operation_params {
            params["operationParams"] = operation_params;
        }
        self.call("invoke", params).await
    }

    /// Negotiates `offer` on `endpoint` and returns the relay's answer.
    pub async fn process_offer(&self, endpoint: &str, offer: &str) -> Result<String, RelayError> {
        let result = self
            .invoke(endpoint, "processOffer", Some(json!({ "offer": offer })))
            .await?;
        value_str(&result)
    }

    /// Routes media from `source` into `sink`.
    pub async fn connect_endpoints(&self, source: &str, sink: &str) -> Result<(), RelayError> {
        self.invoke(source, "connect", Some(json!({ "sink": sink })))
            .await
            .map(|_| ())
    }

    pub async fn set_max_video_recv_bandwidth(&self, ep: &str, kbps: u32) -> Result<(), RelayError> {
        self.set_bandwidth(ep, "setMaxVideoRecvBandwidth", "maxVideoRecvBandwidth", kbps)
            .await
    }

    pub async fn set_min_video_recv_bandwidth(&self, ep: &str, kbps: u32) -> Result<(), RelayError> {
        self.set_bandwidth(ep, "setMinVideoRecvBandwidth", "minVideoRecvBandwidth", kbps)
            .await
    }

    pub async fn set_max_video_send_bandwidth(&self, ep: &str, kbps: u32) -> Result<(), RelayError> {
        self.set_bandwidth(ep, "setMaxVideoSendBandwidth", "maxVideoSendBandwidth", kbps)
            .await
    }

    pub async fn set_min_video_send_bandwidth(&self, ep: &str, kbps: u32) -> Result<(), RelayError> {
        self.set_bandwidth(ep, "setMinVideoSendBandwidth", "minVideoSendBandwidth", kbps)
            .await
    }

    async fn set_bandwidth(
        &self,
        ep: &str,
        operation: &str,
        param: &str,
        kbps: u32,
    ) -> Result<(), RelayError> {
        let mut params = serde_json::Map::new();
        params.insert(param.to_string(), json!(kbps));
        self.invoke(ep, operation, Some(Value::Object(params)))
            .await?;
        debug!("{} {} = {} kbps", ep, param, kbps);
        Ok(())
    }

    pub async fn gather_candidates(&self, ep: &str) -> Result<(), RelayError> {
        self.invoke(ep, "gatherCandidates", None).await.map(|_| ())
    }

    pub async fn add_ice_candidate(&self, ep: &str, candidate: Value) -> Result<(), RelayError> {
        self.invoke(ep, "addIceCandidate", Some(json!({ "candidate": candidate })))
            .await
            .map(|_| ())
    }

    /// Releases a relay object. Local subscribers of the object are closed.
    pub async fn release(&self, object: &str) -> Result<(), RelayError> {
        self.inner.subscribers.lock().await.remove(object);
        self.inner
            .remote_subscriptions
            .lock()
            .await
            .retain(|(handle, _)| handle != object);
        self.call("release", json!({ "object": object })).await?;
        debug!("released {}", object);
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), RelayError> {
        self.call_timeout("ping", json!({ "interval": PING_INTERVAL_MS }), PING_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Sends a close frame. Pending calls fail once the relay acknowledges.
    pub fn close(&self) {
        if self.is_connected() {
            let _ = self.inner.outbound.send(Message::Close(None));
        }
    }

    async fn write_loop<S>(
        inner: Arc<Inner>,
        mut write: SplitSink<WebSocketStream<S>, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("relay send failed: {}", e);
                inner.shutdown().await;
                break;
            }
            if closing {
                break;
            }
        }
        debug!("relay writer terminated");
    }

    async fn read_loop<S>(inner: Arc<Inner>, mut read: SplitStream<WebSocketStream<S>>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => inner.dispatch(&text).await,
                Ok(Message::Close(_)) => {
                    info!("relay closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("relay connection error: {}", e);
                    break;
                }
            }
        }
        inner.shutdown().await;
        debug!("relay reader terminated");
    }
}

impl Inner {
    async fn dispatch(&self, text: &str) {
        trace!("relay <- {}", text);
        match serde_json::from_str::<Incoming>(text) {
            Ok(Incoming::Response(response)) => self.resolve(response).await,
            Ok(Incoming::Notification(notification)) => {
                if notification.method != ON_EVENT {
                    debug!("ignoring relay notification: {}", notification.method);
                    return;
                }
                self.publish(notification.params.value).await;
            }
            Err(e) => warn!("unparsable relay message: {}", e),
        }
    }

    async fn resolve(&self, response: Response) {
        let Some(slot) = self.pending.lock().await.remove(&response.id) else {
            warn!("relay response for unknown request {}", response.id);
            return;
        };
        let result = match (response.error, response.result) {
            (Some(err), _) => {
                warn!("relay error on request {}: {} {}", response.id, err.code, err.message);
                Err(RelayError::Rpc {
                    code: err.code,
                    message: err.message,
                })
            }
            (None, result) => Ok(result.unwrap_or(Value::Null)),
        };
        let _ = slot.send(result);
    }

    async fn publish(&self, event: RelayEvent) {
        let mut subscribers = self.subscribers.lock().await;
        let Some(list) = subscribers.get_mut(&event.object) else {
            trace!("no subscriber for {} on {}", event.kind, event.object);
            return;
        };
        list.retain(|sub| !sub.tx.is_closed());
        for sub in list.iter().filter(|sub| sub.types.contains(&event.kind)) {
            let _ = sub.tx.send(event.clone());
        }
        if list.is_empty() {
            subscribers.remove(&event.object);
        }
    }

    async fn shutdown(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let pending: Vec<Pending> = self.pending.lock().await.drain().map(|(_, p)| p).collect();
        if !pending.is_empty() {
            warn!("failing {} pending relay calls", pending.len());
        }
        for slot in pending {
            let _ = slot.send(Err(RelayError::Unavailable));
        }
        self.subscribers.lock().await.clear();
        self.remote_subscriptions.lock().await.clear();
    }
}

fn value_str(result: &Value) -> Result<String, RelayError> {
    result
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::Malformed(format!("expected a string value in {}", result)))
}
