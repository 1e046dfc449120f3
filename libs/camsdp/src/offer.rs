use rand::Rng;

use crate::{join_lines, MediaInfo, MediaKind, DIRECTION_ACTIVE};

const SESSION_NAME: &str = "Camera Livestream";
const WILDCARD: &str = "0.0.0.0";

/// Builds the offer the relay negotiates on behalf of the camera.
///
/// Addresses are the wildcard so the relay routes RTCP to wherever RTP
/// actually arrives from. Audio is `sendrecv`, video `sendonly`, and both
/// sections carry `a=direction:active` to request REMB feedback.
pub fn build_offer(info: &MediaInfo) -> String {
    let mut rng = rand::thread_rng();
    let session_id = rng.gen_range(1_000_000_000u64..=9_999_999_999u64);
    let session_version = rng.gen_range(1_000_000_000u64..=9_999_999_999u64);

    let lines = vec![
        "v=0".to_string(),
        format!(
            "o=- {} {} IN IP4 {}",
            session_id, session_version, WILDCARD
        ),
        format!("s={}", SESSION_NAME),
        format!("c=IN IP4 {}", WILDCARD),
        "t=0 0".to_string(),
        format!("m=audio {} RTP/AVPF 96 0", info.audio_port),
        format!("a=rtcp:{}", info.rtcp_port(MediaKind::Audio)),
        "a=rtpmap:96 opus/48000/2".to_string(),
        "a=rtpmap:0 PCMU/8000".to_string(),
        "a=sendrecv".to_string(),
        DIRECTION_ACTIVE.to_string(),
        format!("a=ssrc:{} cname:{}", info.audio_ssrc, info.cname),
        format!("m=video {} RTP/AVPF 103", info.video_port),
        format!("a=rtcp:{}", info.rtcp_port(MediaKind::Video)),
        "a=rtpmap:103 H264/90000".to_string(),
        "a=fmtp:103 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
            .to_string(),
        "a=rtcp-fb:103 nack".to_string(),
        "a=rtcp-fb:103 nack pli".to_string(),
        "a=rtcp-fb:103 goog-remb".to_string(),
        "a=rtcp-fb:103 ccm fir".to_string(),
        "a=sendonly".to_string(),
        DIRECTION_ACTIVE.to_string(),
        format!("a=ssrc:{} cname:{}", info.video_ssrc, info.cname),
    ];

    join_lines(lines)
}
