//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::repository::FullRepository;
use crate::services::TrackingService;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store shared by every service
    pub repository: Arc<dyn FullRepository>,
    /// Tracking services wired to `repository`
    pub tracking: TrackingService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Create application state around a repository.
    pub fn new(repository: Arc<dyn FullRepository>, config: AppConfig) -> Self {
        let tracking = TrackingService::new(repository.clone(), config.tracking.clone());
        Self {
            repository,
            tracking,
            config: Arc::new(config),
        }
    }

    /// Name of the session cookie.
    pub fn cookie_name(&self) -> &str {
        &self.config.session.cookie_name
    }
}
