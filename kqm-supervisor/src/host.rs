//! Host presentation seam
//!
//! When the supervisor runs inside a desktop shell, status reports from the
//! server worker (such as the URL clients should connect to) are shown there.

use serde_json::Value;
use tracing::info;

pub trait HostPresenter: Send {
    fn set_status(&mut self, key: &str, value: &Value);
}

/// Presenter for headless runs: writes the status to the log
#[derive(Debug, Default)]
pub struct LogPresenter;

impl HostPresenter for LogPresenter {
    fn set_status(&mut self, key: &str, value: &Value) {
        match value {
            Value::String(s) => info!("Host status {}: {}", key, s),
            other => info!("Host status {}: {}", key, other),
        }
    }
}
