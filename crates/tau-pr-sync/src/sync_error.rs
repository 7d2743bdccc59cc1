use thiserror::Error;

use crate::linked_pr_record::LinkedPrRecord;
use crate::platform::PlatformError;
use crate::reconciler::ReconcileOutcome;

#[derive(Debug, Error)]
/// Failures that abort a resolve or reconcile invocation.
pub enum SyncError {
    #[error("no SyncWith tag found in pull request title")]
    MissingTag,
    #[error("SyncWith tag '{value}' has no organisation and no default organisation was provided")]
    NoOrg { value: String },
    #[error("malformed SyncWith tag '{value}': {reason}")]
    MalformedTag { value: String, reason: String },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("managed comment {comment_id} holds a corrupt sync payload: {reason}")]
    CorruptState { comment_id: u64, reason: String },
    #[error("failed to write sync state for {} linked pull request(s): {source}", .records.len())]
    StateWrite {
        records: Vec<LinkedPrRecord>,
        #[source]
        source: PlatformError,
    },
    #[error("sync state is stored but the pull request notice failed: {source}")]
    Notice {
        outcome: Box<ReconcileOutcome>,
        #[source]
        source: PlatformError,
    },
    #[error("failed to encode sync payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Platform(PlatformError),
}

impl SyncError {
    /// Maps a read-side platform failure, keeping "not found" distinguishable.
    pub fn from_lookup(error: PlatformError, resource: impl Into<String>) -> Self {
        if error.is_not_found() {
            Self::NotFound {
                resource: resource.into(),
            }
        } else {
            Self::Platform(error)
        }
    }
}

impl From<PlatformError> for SyncError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::NotFound { resource } => Self::NotFound { resource },
            other => Self::Platform(other),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
