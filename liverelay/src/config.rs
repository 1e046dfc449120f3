use std::{env, net::IpAddr, net::SocketAddr, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub relay: Relay,
    #[serde(default)]
    pub mqtt: Mqtt,
    #[serde(default)]
    pub camera: Camera,
    #[serde(default)]
    pub stream: Stream,
    #[serde(default)]
    pub keepalive: Keepalive,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relay {
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// Per call, in milliseconds
    #[serde(default = "default_relay_timeout")]
    pub timeout: u64,
    #[serde(default = "default_candidate_event")]
    pub candidate_event: String,
    /// Subscribed best-effort; older relays do not emit it.
    #[serde(default = "default_state_event")]
    pub state_event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mqtt {
    /// `mqtt://host:1883?client_id=...` or `mqtts://...`
    #[serde(default = "default_mqtt_url")]
    pub url: String,
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub client_cert: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default = "default_play_topic")]
    pub play_topic: String,
    #[serde(default = "default_stop_topic")]
    pub stop_topic: String,
    #[serde(default = "default_keepalive_topic")]
    pub keepalive_topic: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    /// In milliseconds
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    #[serde(default = "default_audio_port")]
    pub audio_port: u16,
    #[serde(default = "default_video_port")]
    pub video_port: u16,
    #[serde(default = "default_audio_ssrc")]
    pub audio_ssrc: u32,
    #[serde(default = "default_video_ssrc")]
    pub video_ssrc: u32,
    /// Written into the camera's answer for requests from outside the
    /// local network.
    #[serde(default)]
    pub external_ip: Option<String>,
    #[serde(default)]
    pub local_ip: Option<String>,
    /// Requesters whose address starts with this prefix get `local_ip`.
    #[serde(default)]
    pub local_network: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Camera-facing receive bounds, kbps
    #[serde(default = "default_max_bandwidth")]
    pub max_bandwidth: u32,
    #[serde(default = "default_min_bandwidth")]
    pub min_bandwidth: u32,
    /// Viewer-facing send bounds, kbps
    #[serde(default = "default_max_bandwidth")]
    pub viewer_max_bandwidth: u32,
    #[serde(default = "default_min_bandwidth")]
    pub viewer_min_bandwidth: u32,
    #[serde(default = "default_max_viewers")]
    pub max_viewers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keepalive {
    /// In milliseconds
    #[serde(default = "default_keepalive_interval")]
    pub interval: u64,
    /// Consecutive failures that end the stream
    #[serde(default = "default_keepalive_threshold")]
    pub threshold: u32,
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("8080"))
    ))
    .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)))
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_relay_url() -> String {
    env::var("RELAY_URL").unwrap_or("ws://localhost:8888/kurento".to_string())
}

fn default_relay_timeout() -> u64 {
    10_000
}

fn default_candidate_event() -> String {
    "OnIceCandidate".to_string()
}

fn default_state_event() -> String {
    "IceComponentStateChange".to_string()
}

fn default_mqtt_url() -> String {
    "mqtt://localhost:1883?client_id=camrelay".to_string()
}

fn default_play_topic() -> String {
    "prod/honeycomb/{camera_id}/stream/play".to_string()
}

fn default_stop_topic() -> String {
    "prod/honeycomb/{camera_id}/stream/stop".to_string()
}

fn default_keepalive_topic() -> String {
    "prod/honeycomb/{camera_id}/stream/keepalive".to_string()
}

fn default_source_type() -> String {
    "hive-cam".to_string()
}

fn default_publish_timeout() -> u64 {
    2_000
}

fn default_audio_port() -> u16 {
    5008
}

fn default_video_port() -> u16 {
    5006
}

fn default_audio_ssrc() -> u32 {
    229236353
}

fn default_video_ssrc() -> u32 {
    1607797317
}

fn default_max_bandwidth() -> u32 {
    5000
}

fn default_min_bandwidth() -> u32 {
    500
}

fn default_max_viewers() -> usize {
    10
}

fn default_keepalive_interval() -> u64 {
    4_000
}

fn default_keepalive_threshold() -> u32 {
    3
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            timeout: default_relay_timeout(),
            candidate_event: default_candidate_event(),
            state_event: default_state_event(),
        }
    }
}

impl Default for Mqtt {
    fn default() -> Self {
        Self {
            url: default_mqtt_url(),
            ca_cert: None,
            client_cert: None,
            client_key: None,
            play_topic: default_play_topic(),
            stop_topic: default_stop_topic(),
            keepalive_topic: default_keepalive_topic(),
            source_type: default_source_type(),
            publish_timeout: default_publish_timeout(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            audio_port: default_audio_port(),
            video_port: default_video_port(),
            audio_ssrc: default_audio_ssrc(),
            video_ssrc: default_video_ssrc(),
            external_ip: None,
            local_ip: None,
            local_network: None,
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            max_bandwidth: default_max_bandwidth(),
            min_bandwidth: default_min_bandwidth(),
            viewer_max_bandwidth: default_max_bandwidth(),
            viewer_min_bandwidth: default_min_bandwidth(),
            max_viewers: default_max_viewers(),
        }
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            interval: default_keepalive_interval(),
            threshold: default_keepalive_threshold(),
        }
    }
}

impl Relay {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl Mqtt {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout)
    }
}

impl Keepalive {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let relay = url::Url::parse(&self.relay.url)
            .map_err(|e| anyhow::anyhow!("relay url error: {}", e))?;
        if !matches!(relay.scheme(), "ws" | "wss") {
            return Err(anyhow::anyhow!(
                "relay url must be ws:// or wss://, got {}",
                self.relay.url
            ));
        }
        if self.relay.timeout == 0 {
            return Err(anyhow::anyhow!("relay timeout must be positive"));
        }

        let mqtt = url::Url::parse(&self.mqtt.url)
            .map_err(|e| anyhow::anyhow!("mqtt url error: {}", e))?;
        if !matches!(mqtt.scheme(), "mqtt" | "mqtts" | "tcp" | "ssl") {
            return Err(anyhow::anyhow!("unsupported mqtt scheme: {}", mqtt.scheme()));
        }
        if self.mqtt.client_cert.is_some() != self.mqtt.client_key.is_some() {
            return Err(anyhow::anyhow!(
                "mqtt client_cert and client_key must be set together"
            ));
        }

        for (name, port) in [
            ("audio_port", self.camera.audio_port),
            ("video_port", self.camera.video_port),
        ] {
            // RTCP goes to port + 1
            if port == 0 || port == u16::MAX {
                return Err(anyhow::anyhow!("camera {} {} is out of range", name, port));
            }
        }

        for ip in [&self.camera.external_ip, &self.camera.local_ip]
            .into_iter()
            .flatten()
        {
            IpAddr::from_str(ip).map_err(|e| anyhow::anyhow!("camera ip {}: {}", ip, e))?;
        }

        if self.stream.min_bandwidth > self.stream.max_bandwidth {
            return Err(anyhow::anyhow!(
                "stream min_bandwidth {} exceeds max_bandwidth {}",
                self.stream.min_bandwidth,
                self.stream.max_bandwidth
            ));
        }
        if self.stream.viewer_min_bandwidth > self.stream.viewer_max_bandwidth {
            return Err(anyhow::anyhow!(
                "stream viewer_min_bandwidth {} exceeds viewer_max_bandwidth {}",
                self.stream.viewer_min_bandwidth,
                self.stream.viewer_max_bandwidth
            ));
        }
        if self.stream.max_viewers == 0 {
            return Err(anyhow::anyhow!("stream max_viewers must be positive"));
        }

        if self.keepalive.interval == 0 {
            return Err(anyhow::anyhow!("keepalive interval must be positive"));
        }
        if self.keepalive.threshold == 0 {
            return Err(anyhow::anyhow!("keepalive threshold must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.keepalive.interval(), Duration::from_secs(4));
        assert_eq!(cfg.keepalive.threshold, 3);
        assert_eq!(cfg.stream.max_viewers, 10);
        assert_eq!(cfg.camera.video_port, 5006);
        assert_eq!(cfg.mqtt.play_topic, "prod/honeycomb/{camera_id}/stream/play");
    }

    #[test]
    fn test_validate_rejects() {
        let mut cfg = Config::default();
        cfg.relay.url = "http://localhost:8888/kurento".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.stream.min_bandwidth = 6000;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.keepalive.threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.camera.external_ip = Some("not-an-ip".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.camera.video_port = 65535;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.camera.audio_port = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.camera.audio_port = 65534;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sample_config() {
        let cfg: Config = toml::from_str(include_str!("../../conf/camrelay.toml")).unwrap();
        assert!(cfg.http.cors);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_section() {
        let cfg: Config = toml::from_str(
            r#"
            [keepalive]
            interval = 1000

            [camera]
            external_ip = "203.0.113.7"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.keepalive.interval, 1000);
        assert_eq!(cfg.keepalive.threshold, 3);
        assert_eq!(cfg.camera.external_ip.as_deref(), Some("203.0.113.7"));
        assert!(cfg.validate().is_ok());
    }
}
