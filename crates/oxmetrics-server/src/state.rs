use crate::flush::FlushTrigger;
use oxmetrics_storage::MetricStorage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn MetricStorage>,
    /// Set when the file store flushes on every write.
    pub flush: Option<FlushTrigger>,
    pub key: Arc<String>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn MetricStorage>,
        flush: Option<FlushTrigger>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            flush,
            key: Arc::new(key.into()),
        }
    }

    /// Called after every successful mutating request.
    pub fn written(&self) {
        if let Some(trigger) = &self.flush {
            trigger.notify();
        }
    }
}
