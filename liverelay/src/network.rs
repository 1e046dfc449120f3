use std::net::{IpAddr, SocketAddr};

use http::HeaderMap;

use crate::config::Camera;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The requester's address: first `X-Forwarded-For` hop, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

fn is_local(ip: &str, local_network: Option<&str>) -> bool {
    if ip == "localhost" || ip.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback()) {
        return true;
    }
    local_network.is_some_and(|prefix| !prefix.is_empty() && ip.starts_with(prefix))
}

/// Address written into the answer sent to the camera.
///
/// Local requesters get `local_ip` (falling back to `external_ip`), everyone
/// else gets `external_ip`. `None` leaves the relay's addresses in place.
pub fn camera_address(
    camera: &Camera,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Option<String> {
    let local = client_ip(headers, peer)
        .map(|ip| is_local(&ip, camera.local_network.as_deref()))
        .unwrap_or(false);
    if local {
        camera.local_ip.clone().or_else(|| camera.external_ip.clone())
    } else {
        camera.external_ip.clone()
    }
}
