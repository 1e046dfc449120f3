use std::sync::Arc;

use crate::config::Config;
use crate::stream::manager::Manager;

pub mod health;
pub mod streams;
pub mod viewers;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stream_manager: Arc<Manager>,
}
