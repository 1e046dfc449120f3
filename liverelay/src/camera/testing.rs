use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CameraControl, CameraError, CameraMessage};

/// Records every message; refuses them while `failing` is set.
#[derive(Default)]
pub struct Recorder {
    pub sent: Mutex<Vec<CameraMessage>>,
    pub failing: AtomicBool,
}

impl Recorder {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.kind.as_str())
            .collect()
    }
}

#[async_trait]
impl CameraControl for Recorder {
    async fn send(&self, message: CameraMessage) -> Result<(), CameraError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CameraError::Timeout);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}
