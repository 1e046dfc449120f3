#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::signaling::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use liverelay::camera::{CameraControl, CameraError, CameraMessage};
use liverelay::config::Config;
use liverelay::Services;
use relay::mock::MockRelay;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// In-memory camera control channel.
#[derive(Default)]
pub struct Camera {
    sent: Mutex<Vec<Value>>,
    failing: AtomicBool,
}

impl Camera {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, kind: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["messageType"] == kind)
            .collect()
    }
}

#[async_trait]
impl CameraControl for Camera {
    async fn send(&self, message: CameraMessage) -> Result<(), CameraError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CameraError::Timeout);
        }
        self.sent
            .lock()
            .unwrap()
            .push(serde_json::to_value(&message).unwrap());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

pub struct Server {
    pub addr: SocketAddr,
    pub mock: MockRelay,
    pub camera: Arc<Camera>,
}

impl Server {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn start(&self, camera: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url(&api::path::stream_start(camera)))
            .send()
            .await
            .unwrap()
    }

    pub async fn stop(&self, camera: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url(&api::path::stream_stop(camera)))
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(self.url(path)).await.unwrap()
    }

    pub async fn viewer_count(&self, camera: &str) -> u64 {
        let body: Value = self
            .get(&api::path::viewers(camera))
            .await
            .json()
            .await
            .unwrap();
        body["count"].as_u64().unwrap()
    }

    pub async fn ws(&self) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!(
            "ws://{}{}",
            self.addr,
            api::path::SIGNALING
        ))
        .await
        .unwrap();
        ws
    }
}

pub async fn spawn(cfg: Config) -> Server {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (relay, mock) = MockRelay::spawn().await;
    let camera = Arc::new(Camera::default());
    let services = Services {
        relay,
        control: camera.clone(),
    };
    tokio::spawn(liverelay::serve_with(
        cfg,
        listener,
        std::future::pending(),
        services,
    ));
    Server { addr, mock, camera }
}

pub async fn send(ws: &mut Ws, msg: &ClientMessage) {
    ws.send(Message::Text(serde_json::to_string(msg).unwrap()))
        .await
        .unwrap();
}

/// Next server message; `None` once the server closed the socket.
pub async fn recv(ws: &mut Ws) -> Option<ServerMessage> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no signaling message within 5s");
        match msg {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

pub fn viewer(camera: &str) -> ClientMessage {
    ClientMessage::Viewer {
        camera_id: camera.to_string(),
        stream_id: None,
        sdp_offer: "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n".to_string(),
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
