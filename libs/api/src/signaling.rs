//! Messages exchanged with a viewer over the signaling socket, one JSON
//! object per text frame.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Viewer {
        camera_id: String,
        #[serde(default)]
        stream_id: Option<String>,
        sdp_offer: String,
    },
    OnIceCandidate {
        candidate: IceCandidate,
    },
    Stop,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ViewerResponse {
        viewer_id: String,
        sdp_answer: String,
    },
    IceCandidate {
        candidate: IceCandidate,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error<T: ToString>(t: T) -> Self {
        ServerMessage::Error {
            message: t.to_string(),
        }
    }
}
