#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sensory_search::config::{AppConfig, TrackingConfig};
use sensory_search::db::LocalRepository;
use sensory_search::services::TrackingService;

/// Process environment is global; tests touching it take this lock.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with the given variables set (`Some`) or removed (`None`),
/// restoring the previous values afterwards, even on panic.
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _restore = EnvRestore::apply(changes);
    f()
}

struct EnvRestore {
    previous: Vec<(String, Option<String>)>,
}

impl EnvRestore {
    fn apply(changes: &[(&str, Option<&str>)]) -> Self {
        let mut previous = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            if !previous.iter().any(|(k, _): &(String, Option<String>)| k == key) {
                previous.push((key.to_string(), std::env::var(key).ok()));
            }
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
        Self { previous }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..) {
            match value {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Fresh in-memory store plus services over it.
pub fn tracking(config: TrackingConfig) -> (Arc<LocalRepository>, TrackingService) {
    let repo = Arc::new(LocalRepository::new());
    let service = TrackingService::new(repo.clone(), config);
    (repo, service)
}

/// Default configuration with a short storage timeout so failure tests stay fast.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.tracking.storage_timeout_ms = 200;
    config
}
