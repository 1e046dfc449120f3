//! SDP negotiation for RTP cameras that stream through a WebRTC media relay.
//!
//! The camera firmware only accepts answers that echo its own fixed SSRCs and
//! carry the vendor correlation attributes (`a=x-skl-*`). Adaptive bitrate
//! feedback (REMB) is only sent by the relay when the offer marks media
//! sections `a=direction:active` and the relay answers `a=direction:passive`.

use std::fmt;

use rand::Rng;

mod answer;
mod offer;

pub use answer::{build_viewer_answer, enhance_answer, validate_answer, Enhanced, Reemb, Validation};
pub use offer::build_offer;

pub const CRLF: &str = "\r\n";

pub const DIRECTION_ACTIVE: &str = "a=direction:active";
pub const DIRECTION_PASSIVE: &str = "a=direction:passive";

pub const ATTR_SSRC_AUDIO: &str = "a=x-skl-ssrca";
pub const ATTR_SSRC_VIDEO: &str = "a=x-skl-ssrcv";
pub const ATTR_CNAME: &str = "a=x-skl-cname";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    fn from_media_line(line: &str) -> Option<Self> {
        let kind = line.strip_prefix("m=")?.split(' ').next()?;
        match kind {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed per-camera media parameters shared by the offer and the answer
/// rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub audio_ssrc: u32,
    pub video_ssrc: u32,
    pub cname: String,
    pub audio_port: u16,
    pub video_port: u16,
}

impl MediaInfo {
    pub fn new(audio_ssrc: u32, video_ssrc: u32, audio_port: u16, video_port: u16) -> Self {
        Self {
            audio_ssrc,
            video_ssrc,
            cname: generate_cname(),
            audio_port,
            video_port,
        }
    }

    pub fn ssrc(&self, kind: MediaKind) -> u32 {
        match kind {
            MediaKind::Audio => self.audio_ssrc,
            MediaKind::Video => self.video_ssrc,
        }
    }

    pub fn rtcp_port(&self, kind: MediaKind) -> u16 {
        match kind {
            MediaKind::Audio => self.audio_port.wrapping_add(1),
            MediaKind::Video => self.video_port.wrapping_add(1),
        }
    }
}

/// `user<10 digits>@host-<8 hex>`
pub fn generate_cname() -> String {
    let user = rand::thread_rng().gen_range(1_000_000_000u64..=9_999_999_999u64);
    let host = uuid::Uuid::new_v4().simple().to_string();
    format!("user{}@host-{}", user, &host[..8])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    Empty,
    MissingVersion,
    MissingMedia(MediaKind),
}

impl fmt::Display for SdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpError::Empty => write!(f, "sdp is empty"),
            SdpError::MissingVersion => write!(f, "sdp does not start with a version line"),
            SdpError::MissingMedia(kind) => write!(f, "sdp has no {} media section", kind),
        }
    }
}

impl std::error::Error for SdpError {}

/// Keeps the first `max_lines` lines of an SDP for log output.
pub fn truncate_for_log(sdp: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = sdp.lines().collect();
    if lines.len() <= max_lines {
        return sdp.to_string();
    }
    let mut out = lines[..max_lines].join(CRLF);
    out.push_str(&format!("{}... ({} more lines)", CRLF, lines.len() - max_lines));
    out
}

/// A parsed SDP, split into the session block and its media sections.
#[derive(Debug, Clone, Default)]
pub(crate) struct Sections {
    pub session: Vec<String>,
    pub medias: Vec<Media>,
}

#[derive(Debug, Clone)]
pub(crate) struct Media {
    pub kind: Option<MediaKind>,
    pub lines: Vec<String>,
}

impl Media {
    pub fn has_line(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l == line)
    }
}

impl Sections {
    pub fn parse(raw: &str) -> Result<Self, SdpError> {
        let mut lines = raw
            .split(|c| c == '\r' || c == '\n')
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .peekable();

        match lines.peek() {
            None => return Err(SdpError::Empty),
            Some(first) if !first.starts_with("v=") => return Err(SdpError::MissingVersion),
            _ => {}
        }

        let mut sections = Sections::default();
        for line in lines {
            if line.starts_with("m=") {
                sections.medias.push(Media {
                    kind: MediaKind::from_media_line(line),
                    lines: vec![line.to_string()],
                });
            } else if let Some(media) = sections.medias.last_mut() {
                media.lines.push(line.to_string());
            } else {
                sections.session.push(line.to_string());
            }
        }
        Ok(sections)
    }

    pub fn media(&self, kind: MediaKind) -> Option<&Media> {
        self.medias.iter().find(|m| m.kind == Some(kind))
    }

    pub fn require(&self, kind: MediaKind) -> Result<&Media, SdpError> {
        self.media(kind).ok_or(SdpError::MissingMedia(kind))
    }

    pub fn into_lines(self) -> impl Iterator<Item = String> {
        self.session
            .into_iter()
            .chain(self.medias.into_iter().flat_map(|m| m.lines))
    }
}

pub(crate) fn join_lines<I>(lines: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push_str(CRLF);
    }
    out
}
