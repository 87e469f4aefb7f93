//! Fingerprint retention.
//!
//! Fingerprints only need to outlive the day they dedupe, so anything older
//! than the retention window is swept on a fixed interval.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{TrackingResult, TrackingService};

/// Purge fingerprints older than the configured retention, as of `now`.
pub async fn purge_expired(service: &TrackingService, now: DateTime<Utc>) -> TrackingResult<usize> {
    let cutoff = now - service.config().fingerprint_retention();
    service.dedup.purge_before(cutoff).await
}

/// Run [`purge_expired`] every `purge_interval_secs` until the task is aborted.
///
/// Failures are logged and the next tick tries again.
pub fn spawn_sweeper(service: TrackingService) -> JoinHandle<()> {
    let period = service.config().purge_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match purge_expired(&service, Utc::now()).await {
                Ok(0) => log::debug!("Fingerprint sweep: nothing to purge"),
                Ok(purged) => log::info!("Fingerprint sweep purged {} entries", purged),
                Err(e) => log::warn!("Fingerprint sweep failed: {}", e),
            }
        }
    })
}
