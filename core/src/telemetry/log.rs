use log::{debug, info, warn};

/// Run-scoped logger; every line carries the run label.
#[derive(Debug, Clone)]
pub struct LogManager {
    label: String,
}

impl LogManager {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.label, message);
    }

    pub fn anomaly(&self, message: &str) {
        warn!("[{}] {}", self.label, message);
    }

    pub fn detail(&self, message: &str) {
        debug!("[{}] {}", self.label, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("beam")
    }
}
