//! Fingerprint deduplication.
//!
//! A fingerprint names one (entity, day, session, event type) combination.
//! The store keeps the SHA-256 of it, so raw session ids never reach the
//! fingerprint table and every key has a fixed width.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use super::{bounded, TrackingResult};
use crate::api::EventType;
use crate::db::repository::{FullRepository, MetricsRepository};

/// Compose the fingerprint of one event.
///
/// Entity and session ids are free text and may contain `:`, so both carry
/// their byte length in front.
pub fn fingerprint(entity_id: &str, date: NaiveDate, session_id: &str, event: EventType) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        entity_id.len(),
        entity_id,
        date.format("%Y-%m-%d"),
        session_id.len(),
        session_id,
        event.as_str()
    )
}

/// Key under which a fingerprint is stored.
pub fn storage_key(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

/// Remembers which fingerprints were already counted.
///
/// Fails open: when the store cannot answer, a key is treated as unseen.
#[derive(Clone)]
pub struct Deduplicator {
    repository: Arc<dyn FullRepository>,
    timeout: Duration,
}

impl Deduplicator {
    pub fn new(repository: Arc<dyn FullRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    /// Whether `key` was recorded and not yet purged.
    pub async fn seen(&self, key: &str) -> bool {
        let stored = storage_key(key);
        match bounded(
            self.timeout,
            "has_fingerprint",
            self.repository.has_fingerprint(&stored),
        )
        .await
        {
            Ok(seen) => seen,
            Err(e) => {
                log::warn!("Fingerprint check failed for {}, treating as unseen: {}", key, e);
                false
            }
        }
    }

    /// Record `key` now.
    pub async fn record(&self, key: &str) -> TrackingResult<()> {
        self.check_and_record_at(key, Utc::now()).await.map(|_| ())
    }

    /// Record `key` unless present. Returns true when it was new.
    ///
    /// The check and insert are one store operation, so two concurrent
    /// callers with the same key see exactly one `true`.
    pub async fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Utc::now())
            .await
            .unwrap_or_else(|e| {
                log::warn!("Fingerprint record failed for {}, treating as new: {}", key, e);
                true
            })
    }

    /// [`Deduplicator::check_and_record`] with an explicit timestamp and
    /// without the fail-open fallback.
    pub async fn check_and_record_at(&self, key: &str, at: DateTime<Utc>) -> TrackingResult<bool> {
        let stored = storage_key(key);
        bounded(
            self.timeout,
            "record_fingerprint",
            self.repository.record_fingerprint(&stored, at),
        )
        .await
    }

    /// Remove `key` again, e.g. when the count it guarded was never written.
    /// Returns whether it was present.
    pub async fn forget(&self, key: &str) -> TrackingResult<bool> {
        let stored = storage_key(key);
        bounded(
            self.timeout,
            "remove_fingerprint",
            self.repository.remove_fingerprint(&stored),
        )
        .await
    }

    /// Drop fingerprints recorded before `cutoff`.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> TrackingResult<usize> {
        bounded(
            self.timeout,
            "purge_fingerprints",
            self.repository.purge_fingerprints(cutoff),
        )
        .await
    }
}
