use serde::{Deserialize, Serialize};

/// Optional body of `POST /streams/{camera}/start`, in kbps.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartStream {
    #[serde(default)]
    pub max_bandwidth: Option<u32>,
    #[serde(default)]
    pub min_bandwidth: Option<u32>,
}
