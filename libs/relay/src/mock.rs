//! A scripted relay peer for tests.
//!
//! `MockRelay::spawn` wires a real [`RelayClient`] to an in-process JSON-RPC
//! server over an in-memory duplex pipe, so tests exercise the client's
//! framing, correlation and event fan-out unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{RelayClient, MEDIA_PIPELINE, RTP_ENDPOINT, WEBRTC_ENDPOINT};

pub const SESSION_ID: &str = "mock-session";
pub const FAILURE_CODE: i64 = 40000;
pub const NOT_FOUND_CODE: i64 = 40101;
pub const CANDIDATE_EVENT: &str = "OnIceCandidate";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

pub const VIEWER_ANSWER: &str = "v=0\r\n\
o=- 1 1 IN IP4 10.0.0.2\r\n\
s=Kurento Media Server\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:0\r\n\
a=sendonly\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 103\r\n\
a=mid:1\r\n\
a=rtpmap:103 H264/90000\r\n\
a=sendonly\r\n";

#[derive(Default)]
struct State {
    next: u64,
    objects: HashMap<String, String>,
    created: HashMap<String, usize>,
    released: Vec<String>,
    calls: Vec<(String, Value)>,
    failing: HashSet<String>,
    muted: HashSet<String>,
    subscriptions: Vec<(String, String)>,
    omit_passive: bool,
    closed: bool,
}

#[derive(Clone)]
pub struct MockRelay {
    state: Arc<Mutex<State>>,
    tx: mpsc::UnboundedSender<Message>,
}

impl MockRelay {
    pub async fn spawn() -> (RelayClient, MockRelay) {
        Self::spawn_with_timeout(DEFAULT_TIMEOUT).await
    }

    pub async fn spawn_with_timeout(timeout: Duration) -> (RelayClient, MockRelay) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_ws, server_ws) = tokio::join!(
            WebSocketStream::from_raw_socket(client_io, Role::Client, None),
            WebSocketStream::from_raw_socket(server_io, Role::Server, None),
        );

        let (mut write, read) = server_ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            use futures_util::SinkExt;
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if write.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        let mock = MockRelay {
            state: Default::default(),
            tx,
        };
        tokio::spawn(mock.clone().serve(read));
        (RelayClient::from_socket(client_ws, timeout), mock)
    }

    /// Makes every call whose method, `create:<type>` or invoke operation
    /// equals `key` fail with [`FAILURE_CODE`].
    pub async fn fail(&self, key: &str) {
        self.state.lock().await.failing.insert(key.to_string());
    }

    pub async fn recover(&self, key: &str) {
        self.state.lock().await.failing.remove(key);
    }

    /// Calls matching `key` are swallowed without a response.
    pub async fn mute(&self, key: &str) {
        self.state.lock().await.muted.insert(key.to_string());
    }

    /// Answers camera offers without `a=direction:passive`.
    pub async fn omit_passive(&self) {
        self.state.lock().await.omit_passive = true;
    }

    pub async fn created(&self, kind: &str) -> usize {
        self.state.lock().await.created.get(kind).copied().unwrap_or(0)
    }

    pub async fn live_objects(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    pub async fn live(&self, kind: &str) -> usize {
        self.state
            .lock()
            .await
            .objects
            .values()
            .filter(|k| k.as_str() == kind)
            .count()
    }

    pub async fn released(&self) -> Vec<String> {
        self.state.lock().await.released.clone()
    }

    pub async fn calls(&self, key: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub async fn last_params(&self, key: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, params)| params.clone())
    }

    pub async fn subscriptions(&self) -> Vec<(String, String)> {
        self.state.lock().await.subscriptions.clone()
    }

    pub async fn emit(&self, object: &str, kind: &str, data: Value) {
        let _ = self.tx.send(event(object, kind, data));
    }

    pub async fn disconnect(&self) {
        self.state.lock().await.closed = true;
        let _ = self.tx.send(Message::Close(None));
    }

    async fn serve(self, mut read: SplitStream<WebSocketStream<DuplexStream>>) {
        while let Some(Ok(msg)) = read.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(request) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            for reply in self.handle(request).await {
                let _ = self.tx.send(reply);
            }
        }
    }

    async fn handle(&self, request: Value) -> Vec<Message> {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let params = request["params"].clone();
        let key = match method.as_str() {
            "invoke" => params["operation"].as_str().unwrap_or_default().to_string(),
            "create" => format!("create:{}", params["type"].as_str().unwrap_or_default()),
            other => other.to_string(),
        };

        let mut state = self.state.lock().await;
        if state.closed {
            return vec![];
        }
        state.calls.push((key.clone(), params.clone()));
        if state.muted.contains(&key) || state.muted.contains(&method) {
            return vec![];
        }
        if state.failing.contains(&key) || state.failing.contains(&method) {
            return vec![error(&id, FAILURE_CODE, &format!("{} failed", key))];
        }

        let mut events = vec![];
        let outcome = match method.as_str() {
            "create" => Ok(Value::String(state.create(&params))),
            "invoke" => state.invoke(&params, &mut events),
            "subscribe" => state.subscribe(&params),
            "release" => state.release(&params),
            "ping" => Ok(json!("pong")),
            _ => Ok(Value::Null),
        };
        let mut replies = vec![match outcome {
            Ok(value) => Message::Text(
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "value": value, "sessionId": SESSION_ID },
                })
                .to_string(),
            ),
            Err((code, message)) => error(&id, code, &message),
        }];
        replies.extend(events);
        replies
    }
}

impl State {
    fn create(&mut self, params: &Value) -> String {
        let kind = params["type"].as_str().unwrap_or_default().to_string();
        self.next += 1;
        let handle = match params["constructorParams"]["mediaPipeline"].as_str() {
            Some(pipeline) => format!("{}/{}_kurento.{}", pipeline, self.next, kind),
            None => format!("{}_kurento.{}", self.next, kind),
        };
        *self.created.entry(kind.clone()).or_default() += 1;
        self.objects.insert(handle.clone(), kind);
        handle
    }

    fn kind_of(&self, params: &Value) -> Result<(String, String), (i64, String)> {
        let object = params["object"].as_str().unwrap_or_default().to_string();
        match self.objects.get(&object) {
            Some(kind) => Ok((object, kind.clone())),
            None => Err((NOT_FOUND_CODE, format!("Object '{}' not found", object))),
        }
    }

    fn invoke(&mut self, params: &Value, events: &mut Vec<Message>) -> Result<Value, (i64, String)> {
        let (object, kind) = self.kind_of(params)?;
        match params["operation"].as_str().unwrap_or_default() {
            "processOffer" => Ok(Value::String(match kind.as_str() {
                RTP_ENDPOINT => camera_answer(!self.omit_passive),
                _ => VIEWER_ANSWER.to_string(),
            })),
            "connect" => {
                let sink = params["operationParams"]["sink"].as_str().unwrap_or_default();
                if !self.objects.contains_key(sink) {
                    return Err((NOT_FOUND_CODE, format!("Object '{}' not found", sink)));
                }
                Ok(Value::Null)
            }
            "gatherCandidates" => {
                if kind == WEBRTC_ENDPOINT
                    && self
                        .subscriptions
                        .iter()
                        .any(|(o, t)| o == &object && t == CANDIDATE_EVENT)
                {
                    events.push(event(
                        &object,
                        CANDIDATE_EVENT,
                        json!({
                            "candidate": {
                                "candidate": "candidate:1 1 UDP 2015363327 10.0.0.2 40000 typ host",
                                "sdpMid": "0",
                                "sdpMLineIndex": 0,
                            }
                        }),
                    ));
                }
                Ok(Value::Null)
            }
            _ => Ok(Value::Null),
        }
    }

    fn subscribe(&mut self, params: &Value) -> Result<Value, (i64, String)> {
        let (object, _) = self.kind_of(params)?;
        let kind = params["type"].as_str().unwrap_or_default().to_string();
        self.subscriptions.push((object, kind));
        Ok(json!(format!("sub-{}", self.subscriptions.len())))
    }

    fn release(&mut self, params: &Value) -> Result<Value, (i64, String)> {
        let (object, kind) = self.kind_of(params)?;
        self.objects.remove(&object);
        if kind == MEDIA_PIPELINE {
            let prefix = format!("{}/", object);
            self.objects.retain(|handle, _| !handle.starts_with(&prefix));
        }
        self.released.push(object);
        Ok(Value::Null)
    }
}

fn camera_answer(passive: bool) -> String {
    let direction = if passive { "a=direction:passive\r\n" } else { "" };
    format!(
        "v=0\r\n\
         o=- 3895137005 3895137005 IN IP4 10.0.0.2\r\n\
         s=Kurento Media Server\r\n\
         c=IN IP4 10.0.0.2\r\n\
         t=0 0\r\n\
         m=audio 41234 RTP/AVPF 96 0\r\n\
         a=rtpmap:96 opus/48000/2\r\n\
         a=sendrecv\r\n\
         a=rtcp:41235\r\n\
         {direction}\
         a=ssrc:3141592653 cname:relay@kms\r\n\
         m=video 41236 RTP/AVPF 103\r\n\
         a=rtpmap:103 H264/90000\r\n\
         a=rtcp-fb:103 goog-remb\r\n\
         a=recvonly\r\n\
         a=rtcp:41237\r\n\
         {direction}\
         a=ssrc:2718281828 cname:relay@kms\r\n"
    )
}

fn event(object: &str, kind: &str, data: Value) -> Message {
    Message::Text(
        json!({
            "jsonrpc": "2.0",
            "method": "onEvent",
            "params": { "value": { "type": kind, "object": object, "data": data } },
        })
        .to_string(),
    )
}

fn error(id: &Value, code: i64, message: &str) -> Message {
    Message::Text(
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        })
        .to_string(),
    )
}
