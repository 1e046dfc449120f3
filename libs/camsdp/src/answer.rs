use tracing::{debug, warn};

use crate::{
    join_lines, Media, MediaInfo, MediaKind, SdpError, Sections, ATTR_CNAME, ATTR_SSRC_AUDIO,
    ATTR_SSRC_VIDEO, DIRECTION_PASSIVE,
};

/// Whether the relay agreed to send REMB feedback to the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reemb {
    Confirmed,
    /// The answer lacks `a=direction:passive` for these sections. The camera
    /// will receive no bitrate feedback and eventually stop streaming.
    NotConfirmed { missing: Vec<MediaKind> },
}

impl Reemb {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Reemb::Confirmed)
    }
}

#[derive(Debug, Clone)]
pub struct Enhanced {
    pub sdp: String,
    pub reemb: Reemb,
}

/// Rewrites the relay's answer into the form the camera firmware accepts.
///
/// - every `a=ssrc` line in the audio/video sections is rewritten to the
///   camera's fixed SSRC and session CNAME; a section without one gets one
/// - `address`, when given, replaces the addresses on `o=`, `c=` and
///   `a=rtcp` lines
/// - the video section gets `a=direction:passive` after `a=recvonly` if the
///   relay left it out
/// - the `a=x-skl-*` correlation attributes are appended
///
/// The REMB check runs against the relay's answer as received.
pub fn enhance_answer(
    answer: &str,
    info: &MediaInfo,
    address: Option<&str>,
) -> Result<Enhanced, SdpError> {
    let mut sections = Sections::parse(answer)?;

    let mut missing = vec![];
    for kind in [MediaKind::Audio, MediaKind::Video] {
        if !sections.require(kind)?.has_line(DIRECTION_PASSIVE) {
            missing.push(kind);
        }
    }
    let reemb = if missing.is_empty() {
        Reemb::Confirmed
    } else {
        warn!(
            "relay answer has no {} for {:?}, camera will get no REMB feedback",
            DIRECTION_PASSIVE, missing
        );
        Reemb::NotConfirmed { missing }
    };

    if let Some(address) = address {
        for line in sections.session.iter_mut() {
            *line = rewrite_address(line, address);
        }
    }

    for media in sections.medias.iter_mut() {
        if let Some(address) = address {
            for line in media.lines.iter_mut() {
                *line = rewrite_address(line, address);
            }
        }
        let Some(kind) = media.kind else {
            continue;
        };
        rewrite_ssrc(media, info.ssrc(kind), &info.cname);
        if kind == MediaKind::Video && !media.has_line(DIRECTION_PASSIVE) {
            if let Some(pos) = media.lines.iter().position(|l| l == "a=recvonly") {
                media.lines.insert(pos + 1, DIRECTION_PASSIVE.to_string());
            }
        }
    }

    let mut lines: Vec<String> = sections.into_lines().collect();
    lines.push(format!("{}:{}", ATTR_SSRC_AUDIO, info.audio_ssrc));
    lines.push(format!("{}:{}", ATTR_SSRC_VIDEO, info.video_ssrc));
    lines.push(format!("{}:{}", ATTR_CNAME, info.cname));

    debug!(
        "answer enhanced: ssrc audio={} video={}, cname={}",
        info.audio_ssrc, info.video_ssrc, info.cname
    );
    Ok(Enhanced {
        sdp: join_lines(lines),
        reemb,
    })
}

/// The browser-facing leg carries the relay's answer untouched.
pub fn build_viewer_answer(relay_answer: String) -> String {
    relay_answer
}

fn rewrite_ssrc(media: &mut Media, ssrc: u32, cname: &str) {
    let mut found = false;
    for line in media.lines.iter_mut() {
        if line.starts_with("a=ssrc:") {
            let rewritten = rewrite_ssrc_line(line, ssrc, cname);
            *line = rewritten;
            found = true;
        }
    }
    if !found {
        media.lines.push(format!("a=ssrc:{} cname:{}", ssrc, cname));
    }
}

fn rewrite_ssrc_line(line: &str, ssrc: u32, cname: &str) -> String {
    let attribute = line.split_once(' ').map(|(_, attr)| attr).unwrap_or("");
    if attribute.is_empty() || attribute.starts_with("cname:") {
        format!("a=ssrc:{} cname:{}", ssrc, cname)
    } else {
        format!("a=ssrc:{} {}", ssrc, attribute)
    }
}

fn rewrite_address(line: &str, address: &str) -> String {
    let mut parts: Vec<&str> = line.split(' ').collect();
    let index = if line.starts_with("c=IN IP4 ") {
        2
    } else if line.starts_with("o=") && parts.len() >= 6 && parts[4] == "IP4" {
        5
    } else if line.starts_with("a=rtcp:") && parts.len() >= 4 && parts[2] == "IP4" {
        3
    } else {
        return line.to_string();
    };
    parts[index] = address;
    parts.join(" ")
}

/// Presence report of the attributes the camera depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub has_goog_remb: bool,
    pub has_ssrc_audio: bool,
    pub has_ssrc_video: bool,
    pub has_cname: bool,
    pub has_audio: bool,
    pub has_video: bool,
    pub has_h264: bool,
}

impl Validation {
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.has_goog_remb, "goog-remb"),
            (self.has_ssrc_audio, "x-skl-ssrca"),
            (self.has_ssrc_video, "x-skl-ssrcv"),
            (self.has_cname, "x-skl-cname"),
            (self.has_audio, "m=audio"),
            (self.has_video, "m=video"),
            (self.has_h264, "H264"),
        ]
        .into_iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

pub fn validate_answer(sdp: &str) -> Validation {
    Validation {
        has_goog_remb: sdp.contains("goog-remb"),
        has_ssrc_audio: sdp.contains("x-skl-ssrca:"),
        has_ssrc_video: sdp.contains("x-skl-ssrcv:"),
        has_cname: sdp.contains("x-skl-cname:"),
        has_audio: sdp.contains("m=audio"),
        has_video: sdp.contains("m=video"),
        has_h264: sdp.contains("H264"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY_ANSWER: &str = "v=0\r\n\
        o=- 3895137005 3895137005 IN IP4 192.168.1.10\r\n\
        s=Kurento Media Server\r\n\
        c=IN IP4 192.168.1.10\r\n\
        t=0 0\r\n\
        m=audio 41234 RTP/AVPF 96 0\r\n\
        a=rtpmap:96 opus/48000/2\r\n\
        a=sendrecv\r\n\
        a=rtcp:41235 IN IP4 192.168.1.10\r\n\
        a=direction:passive\r\n\
        a=ssrc:111 cname:user0@host-0\r\n\
        m=video 41236 RTP/AVPF 103\r\n\
        a=rtpmap:103 H264/90000\r\n\
        a=rtcp-fb:103 goog-remb\r\n\
        a=recvonly\r\n\
        a=direction:passive\r\n\
        a=ssrc:222 cname:user0@host-0\r\n\
        a=ssrc:222 msid:kms video\r\n";

    fn info() -> MediaInfo {
        MediaInfo {
            audio_ssrc: 229236353,
            video_ssrc: 1607797317,
            cname: "user1234567890@host-deadbeef".to_string(),
            audio_port: 5008,
            video_port: 5006,
        }
    }

    #[test]
    fn test_enhance_rewrites_ssrc() {
        let enhanced = enhance_answer(RELAY_ANSWER, &info(), None).unwrap();
        let sdp = enhanced.sdp;
        assert!(sdp.contains("a=ssrc:229236353 cname:user1234567890@host-deadbeef\r\n"));
        assert!(sdp.contains("a=ssrc:1607797317 cname:user1234567890@host-deadbeef\r\n"));
        assert!(sdp.contains("a=ssrc:1607797317 msid:kms video\r\n"));
        assert!(!sdp.contains("a=ssrc:111"));
        assert!(!sdp.contains("a=ssrc:222"));
        assert!(!sdp.contains("user0@host-0"));
        assert_eq!(enhanced.reemb, Reemb::Confirmed);
    }

    #[test]
    fn test_enhance_adds_missing_ssrc() {
        let answer = "v=0\r\nm=audio 1 RTP/AVPF 96\r\na=direction:passive\r\nm=video 2 RTP/AVPF 103\r\na=recvonly\r\na=direction:passive\r\n";
        let sdp = enhance_answer(answer, &info(), None).unwrap().sdp;
        let sections = Sections::parse(&sdp).unwrap();
        assert!(sections
            .media(MediaKind::Audio)
            .unwrap()
            .has_line("a=ssrc:229236353 cname:user1234567890@host-deadbeef"));
        assert!(sections
            .media(MediaKind::Video)
            .unwrap()
            .lines
            .iter()
            .any(|l| l.starts_with("a=ssrc:1607797317 ")));
    }

    #[test]
    fn test_enhance_appends_correlation_attributes() {
        let sdp = enhance_answer(RELAY_ANSWER, &info(), None).unwrap().sdp;
        assert!(sdp.ends_with(
            "a=x-skl-ssrca:229236353\r\n\
             a=x-skl-ssrcv:1607797317\r\n\
             a=x-skl-cname:user1234567890@host-deadbeef\r\n"
        ));
        assert!(validate_answer(&sdp).is_complete());
    }

    #[test]
    fn test_enhance_without_passive_is_not_fatal() {
        let answer = RELAY_ANSWER.replace("a=direction:passive\r\n", "");
        let enhanced = enhance_answer(&answer, &info(), None).unwrap();
        assert_eq!(
            enhanced.reemb,
            Reemb::NotConfirmed {
                missing: vec![MediaKind::Audio, MediaKind::Video]
            }
        );
        assert!(!enhanced.reemb.is_confirmed());
        // Video still gets the passive marker the camera expects.
        assert!(enhanced.sdp.contains("a=recvonly\r\na=direction:passive\r\n"));
    }

    #[test]
    fn test_enhance_partial_passive() {
        let answer = RELAY_ANSWER.replacen("a=direction:passive\r\n", "", 1);
        let enhanced = enhance_answer(&answer, &info(), None).unwrap();
        assert_eq!(
            enhanced.reemb,
            Reemb::NotConfirmed {
                missing: vec![MediaKind::Audio]
            }
        );
    }

    #[test]
    fn test_enhance_rewrites_addresses() {
        let sdp = enhance_answer(RELAY_ANSWER, &info(), Some("203.0.113.7"))
            .unwrap()
            .sdp;
        assert!(sdp.contains("o=- 3895137005 3895137005 IN IP4 203.0.113.7\r\n"));
        assert!(sdp.contains("c=IN IP4 203.0.113.7\r\n"));
        assert!(sdp.contains("a=rtcp:41235 IN IP4 203.0.113.7\r\n"));
        assert!(!sdp.contains("192.168.1.10"));
        // ports are untouched
        assert!(sdp.contains("m=audio 41234 RTP/AVPF 96 0\r\n"));
    }

    #[test]
    fn test_enhance_rejects_malformed() {
        assert_eq!(
            enhance_answer("", &info(), None).unwrap_err(),
            SdpError::Empty
        );
        assert_eq!(
            enhance_answer("v=0\r\nm=audio 1 RTP/AVPF 0\r\n", &info(), None).unwrap_err(),
            SdpError::MissingMedia(MediaKind::Video)
        );
    }

    #[test]
    fn test_viewer_answer_is_untouched() {
        assert_eq!(build_viewer_answer(RELAY_ANSWER.to_string()), RELAY_ANSWER);
    }

    #[test]
    fn test_validate_reports_missing() {
        let validation = validate_answer(RELAY_ANSWER);
        assert!(!validation.is_complete());
        assert_eq!(
            validation.missing(),
            vec!["x-skl-ssrca", "x-skl-ssrcv", "x-skl-cname"]
        );
    }
}
