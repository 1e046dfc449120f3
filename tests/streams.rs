use std::time::Duration;

use api::response::{StopReason, StopSummary, StreamInfo, StreamStarted, StreamState};
use liverelay::config::Config;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_start_is_idempotent() {
    let server = common::spawn(Config::default()).await;

    let res = server.start("cam1").await;
    assert_eq!(http::StatusCode::CREATED, res.status());
    let first = res.json::<StreamStarted>().await.unwrap();
    assert_eq!(first.state, StreamState::Active);
    assert_eq!(first.camera_id, "cam1");

    let res = server.get(&api::path::stream("cam1")).await;
    assert_eq!(http::StatusCode::OK, res.status());
    let info = res.json::<StreamInfo>().await.unwrap();
    assert_eq!(info.state, StreamState::Active);
    assert_eq!(info.session_id, first.session_id);
    assert!(info.reemb_confirmed);

    let res = server.start("cam1").await;
    assert_eq!(http::StatusCode::OK, res.status());
    let second = res.json::<StreamStarted>().await.unwrap();
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(server.mock.created(relay::MEDIA_PIPELINE).await, 1);

    let plays = server.camera.sent_of("play");
    assert_eq!(plays.len(), 1);
    let sdp = plays[0]["sdpOffer"].as_str().unwrap();
    assert!(sdp.contains("a=x-skl-ssrcv:1607797317"));
    assert!(sdp.contains("a=x-skl-ssrca:229236353"));
    assert_eq!(plays[0]["streamId"], first.stream_id.as_str());
    assert_eq!(plays[0]["sourceId"], "cam1");

    // the session keeps what was negotiated
    assert_eq!(info.sdp_answer.as_deref(), Some(sdp));
    assert!(info.sdp_offer.unwrap().starts_with("v=0"));
}

#[tokio::test]
async fn test_start_without_relay() {
    let server = common::spawn(Config::default()).await;
    server.mock.disconnect().await;
    assert!(
        common::eventually(|| async {
            let body: Value = server.get(api::path::HEALTH).await.json().await.unwrap();
            body["relayConnected"] == false
        })
        .await
    );

    let res = server.start("cam2").await;
    assert_eq!(http::StatusCode::SERVICE_UNAVAILABLE, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "relayUnavailable");

    let res = server.get(&api::path::stream("cam2")).await;
    assert_eq!(http::StatusCode::NOT_FOUND, res.status());
    assert!(server.camera.sent().is_empty());
}

#[tokio::test]
async fn test_failed_start_leaves_nothing_behind() {
    let server = common::spawn(Config::default()).await;
    server.mock.fail("create:RtpEndpoint").await;

    let res = server.start("cam2").await;
    assert_eq!(http::StatusCode::BAD_GATEWAY, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "relayError");

    let res = server.get(&api::path::stream("cam2")).await;
    assert_eq!(http::StatusCode::NOT_FOUND, res.status());
    assert_eq!(server.mock.created(relay::MEDIA_PIPELINE).await, 1);
    assert_eq!(server.mock.live_objects().await, 0);

    // not retried, but a later start works
    server.mock.recover("create:RtpEndpoint").await;
    let res = server.start("cam2").await;
    assert_eq!(http::StatusCode::CREATED, res.status());
}

#[tokio::test]
async fn test_keepalive_exhaustion_stops_stream() {
    let mut cfg = Config::default();
    cfg.keepalive.interval = 50;
    let server = common::spawn(cfg).await;

    let res = server.start("cam1").await;
    assert_eq!(http::StatusCode::CREATED, res.status());
    assert!(common::eventually(|| async { !server.camera.sent_of("keepalive").is_empty() }).await);

    server.camera.set_failing(true);
    assert!(
        common::eventually(|| async {
            server.get(&api::path::stream("cam1")).await.status() == http::StatusCode::NOT_FOUND
        })
        .await
    );
    assert_eq!(server.mock.live_objects().await, 0);

    let res = server.stop("cam1").await;
    assert_eq!(http::StatusCode::OK, res.status());
    let summary = res.json::<StopSummary>().await.unwrap();
    assert_eq!(summary.state, StreamState::Stopped);
    assert_eq!(summary.reason, StopReason::KeepaliveExhausted);
    assert_eq!(summary.keepalive_stats.errors, 3);
    assert!(summary.keepalive_stats.count >= 1);

    // exactly one automatic stop
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.mock.released().await.len(), 2);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let server = common::spawn(Config::default()).await;

    let res = server.stop("unknown").await;
    assert_eq!(http::StatusCode::NO_CONTENT, res.status());

    server.start("cam1").await;
    let res = server.stop("cam1").await;
    assert_eq!(http::StatusCode::OK, res.status());
    let first = res.json::<StopSummary>().await.unwrap();
    assert_eq!(first.reason, StopReason::Requested);
    assert!(first.duration_seconds >= 0.0);
    assert_eq!(server.mock.released().await.len(), 2);
    assert_eq!(server.camera.sent_of("stop").len(), 1);

    let res = server.stop("cam1").await;
    assert_eq!(http::StatusCode::OK, res.status());
    let second = res.json::<StopSummary>().await.unwrap();
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(server.mock.released().await.len(), 2);
    assert_eq!(server.camera.sent_of("stop").len(), 1);
}

#[tokio::test]
async fn test_concurrent_start_creates_one_pipeline() {
    let server = common::spawn(Config::default()).await;
    let (a, b, c, d) = tokio::join!(
        server.start("cam1"),
        server.start("cam1"),
        server.start("cam1"),
        server.start("cam1"),
    );
    let created = [a.status(), b.status(), c.status(), d.status()]
        .iter()
        .filter(|s| **s == http::StatusCode::CREATED)
        .count();
    assert_eq!(created, 1);
    assert_eq!(server.mock.created(relay::MEDIA_PIPELINE).await, 1);
    assert_eq!(server.camera.sent_of("play").len(), 1);
}

#[tokio::test]
async fn test_missing_passive_is_recorded() {
    let server = common::spawn(Config::default()).await;
    server.mock.omit_passive().await;

    let res = server.start("cam1").await;
    assert_eq!(http::StatusCode::CREATED, res.status());
    let info = server
        .get(&api::path::stream("cam1"))
        .await
        .json::<StreamInfo>()
        .await
        .unwrap();
    assert!(!info.reemb_confirmed);

    let plays = server.camera.sent_of("play");
    let sdp = plays[0]["sdpOffer"].as_str().unwrap();
    assert!(sdp.contains("a=direction:passive"));
}

#[tokio::test]
async fn test_start_body_and_address() {
    let mut cfg = Config::default();
    cfg.camera.local_ip = Some("192.168.1.10".to_string());
    cfg.camera.external_ip = Some("203.0.113.7".to_string());
    let server = common::spawn(cfg).await;

    let res = reqwest::Client::new()
        .post(server.url(&api::path::stream_start("cam1")))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(http::StatusCode::BAD_REQUEST, res.status());

    let res = reqwest::Client::new()
        .post(server.url(&api::path::stream_start("cam1")))
        .json(&api::request::StartStream {
            max_bandwidth: Some(2000),
            min_bandwidth: Some(300),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(http::StatusCode::CREATED, res.status());

    let info = server
        .get(&api::path::stream("cam1"))
        .await
        .json::<StreamInfo>()
        .await
        .unwrap();
    assert_eq!(info.bandwidth.max, 2000);
    assert_eq!(info.bandwidth.min, 300);
    // the test client connects from loopback
    assert_eq!(info.address.as_deref(), Some("192.168.1.10"));
    let sdp = server.camera.sent_of("play")[0]["sdpOffer"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(sdp.contains("c=IN IP4 192.168.1.10"));

    let res = reqwest::Client::new()
        .post(server.url(&api::path::stream_start("cam2")))
        .header("X-Forwarded-For", "198.51.100.9")
        .send()
        .await
        .unwrap();
    assert_eq!(http::StatusCode::CREATED, res.status());
    let info = server
        .get(&api::path::stream("cam2"))
        .await
        .json::<StreamInfo>()
        .await
        .unwrap();
    assert_eq!(info.address.as_deref(), Some("203.0.113.7"));
}

#[tokio::test]
async fn test_listings_and_health() {
    let server = common::spawn(Config::default()).await;
    server.start("cam1").await;
    server.start("cam2").await;

    let body: Value = server.get(api::path::STREAMS).await.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["streams"][0]["cameraId"], "cam1");

    let body: Value = server.get(api::path::HEALTH).await.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeStreams"], 2);
    assert_eq!(body["totalViewers"], 0);

    let body: Value = server.get(api::path::VIEWERS).await.json().await.unwrap();
    assert_eq!(body["count"], 0);
    assert!(body.get("cameraId").is_none());

    let res = server.get(api::path::METRICS).await;
    assert_eq!(http::StatusCode::OK, res.status());
}
