use std::sync::Arc;

use crate::observability::Metrics;
use crate::preferences::Preferences;
use crate::records::UploadStore;
use crate::registry::ActiveOperationRegistry;

/// Shared handles the control API works on
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UploadStore>,
    pub registry: Arc<ActiveOperationRegistry>,
    pub preferences: Arc<dyn Preferences>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn UploadStore>,
        registry: Arc<ActiveOperationRegistry>,
        preferences: Arc<dyn Preferences>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            registry,
            preferences,
            metrics,
        }
    }
}
