use tracing::debug;

use crate::comment_envelope::LinkedPrsEnvelope;
use crate::linked_pr_record::{decode_records, LinkedPrRecord};
use crate::platform::{Issue, IssueComment, Platform};
use crate::sync_error::{SyncError, SyncResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Synchronized set as read from a tracking issue.
pub struct SyncState {
    /// The managed comment, when the issue has one.
    pub comment: Option<IssueComment>,
    /// Records in stored order.
    pub records: Vec<LinkedPrRecord>,
}

/// Returns the first comment on `issue` that parses as a linked-PR envelope.
pub async fn find_managed_comment(
    platform: &dyn Platform,
    issue: &Issue,
) -> SyncResult<Option<(IssueComment, LinkedPrsEnvelope)>> {
    let comments = platform
        .list_issue_comments(&issue.repo, issue.number)
        .await?;
    Ok(comments.into_iter().find_map(|comment| {
        LinkedPrsEnvelope::try_parse(&comment.body).map(|envelope| (comment, envelope))
    }))
}

/// Reads and decodes the synchronized set of `issue`.
///
/// An undecodable payload is [`SyncError::CorruptState`]; it is never reset.
pub async fn read_sync_state(platform: &dyn Platform, issue: &Issue) -> SyncResult<SyncState> {
    let Some((comment, envelope)) = find_managed_comment(platform, issue).await? else {
        debug!(
            issue = issue.number,
            repo = %issue.repo,
            "no managed comment yet"
        );
        return Ok(SyncState::default());
    };
    let records =
        decode_records(&envelope.hidden_payload).map_err(|error| SyncError::CorruptState {
            comment_id: comment.id,
            reason: error.to_string(),
        })?;
    debug!(
        comment_id = comment.id,
        records = records.len(),
        "decoded managed comment"
    );
    Ok(SyncState {
        comment: Some(comment),
        records,
    })
}
