//! Error taxonomy of the tracking services.

use crate::db::repository::RepositoryError;

/// Result type for service operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Errors surfaced by the tracking services.
///
/// Every repository failure collapses into [`TrackingError::StorageUnavailable`];
/// callers decide whether that degrades to "not tracked" or becomes a 503.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// The request itself is wrong; nothing was written.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The store failed or did not answer within the storage timeout.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] RepositoryError),

    /// Metrics collection is switched off by configuration.
    #[error("Metrics collection is disabled")]
    Disabled,
}

impl TrackingError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_become_storage_unavailable() {
        let err: TrackingError = RepositoryError::connection("refused").into();
        assert!(matches!(err, TrackingError::StorageUnavailable(_)));
        assert!(err.to_string().starts_with("Storage unavailable"));
    }

    #[test]
    fn test_invalid_input_message() {
        let err = TrackingError::invalid("value must be between 1 and 5");
        assert!(err.is_invalid_input());
        assert_eq!(
            err.to_string(),
            "Invalid input: value must be between 1 and 5"
        );
    }
}
