use std::time::Duration;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Everything that can make a sync attempt fail.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid upstream payload: {0}")]
    InvalidPayload(String),

    #[error("invalid {kind} record at index {index}: {reason}")]
    InvalidRecord {
        kind: &'static str,
        index: usize,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("a sync is already in progress")]
    AlreadyRunning,

    #[error("sync did not complete within {0:?}")]
    Timeout(Duration),

    #[error("sync task failed: {0}")]
    Internal(String),
}

impl SyncError {
    /// Short machine readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Upstream { .. } => "upstream",
            SyncError::Transport(_) => "transport",
            SyncError::InvalidPayload(_) => "invalid_payload",
            SyncError::InvalidRecord { .. } => "invalid_record",
            SyncError::Store(_) => "store",
            SyncError::AlreadyRunning => "already_running",
            SyncError::Timeout(_) => "timeout",
            SyncError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_message_carries_status_and_body() {
        let err = SyncError::Upstream {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "upstream returned status 503: maintenance");
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn store_errors_convert_from_rusqlite() {
        let err: SyncError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), "store");
    }
}
