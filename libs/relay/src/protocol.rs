use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const JSONRPC: &str = "2.0";
pub(crate) const ON_EVENT: &str = "onEvent";

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Notification {
    pub method: String,
    pub params: NotificationParams,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NotificationParams {
    pub value: RelayEvent,
}

/// Anything the relay sends us. Notifications carry no `id`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Incoming {
    Notification(Notification),
    Response(Response),
}

/// An event pushed by the relay for one of its objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    #[serde(rename = "type")]
    pub kind: String,
    /// Handle of the object that emitted the event.
    pub object: String,
    #[serde(default)]
    pub data: Value,
}

impl RelayEvent {
    /// The `{candidate, sdpMid, sdpMLineIndex}` payload of an ICE candidate
    /// event.
    pub fn candidate(&self) -> Option<&Value> {
        self.data.get("candidate")
    }

    pub fn state(&self) -> Option<&str> {
        self.data.get("state").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let req = Request::new(7, "create", json!({"type": "MediaPipeline"}));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "create",
                "params": {"type": "MediaPipeline"},
            })
        );
    }

    #[test]
    fn test_incoming_event() {
        let raw = r#"{"jsonrpc":"2.0","method":"onEvent","params":{"value":{
            "type":"OnIceCandidate","object":"p/ep",
            "data":{"candidate":{"candidate":"candidate:1 1 UDP 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}}}}"#;
        match serde_json::from_str::<Incoming>(raw).unwrap() {
            Incoming::Notification(n) => {
                assert_eq!(n.method, ON_EVENT);
                assert_eq!(n.params.value.object, "p/ep");
                assert_eq!(n.params.value.candidate().unwrap()["sdpMid"], "0");
            }
            Incoming::Response(_) => panic!("parsed as response"),
        }
    }

    #[test]
    fn test_incoming_response() {
        let raw = r#"{"jsonrpc":"2.0","id":3,"error":{"code":40101,"message":"Object not found"}}"#;
        match serde_json::from_str::<Incoming>(raw).unwrap() {
            Incoming::Response(r) => {
                assert_eq!(r.id, 3);
                assert!(r.result.is_none());
                assert_eq!(r.error.unwrap().code, 40101);
            }
            Incoming::Notification(_) => panic!("parsed as notification"),
        }
    }
}
