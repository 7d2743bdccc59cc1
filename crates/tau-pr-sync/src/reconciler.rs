//! Read-merge-write cycle that folds a pull request into a tracking issue's
//! synchronized set.
//!
//! The platform offers no compare-and-swap, so concurrent reconciliations of the
//! same issue can race and the last writer wins. Before writing, the managed
//! comment is re-read; when another writer touched it in the meantime the merge is
//! redone from the fresh state, up to `SyncConfig::max_write_attempts` rounds.
//! The final round writes unconditionally.

use tracing::{debug, info, warn};

use crate::comment_envelope::LinkedPrsEnvelope;
use crate::issue_resolver::resolve_trigger;
use crate::linked_pr_record::{normalize_records, records_envelope, LinkedPrRecord};
use crate::platform::{Issue, IssueComment, Platform, PlatformError, PullRequest};
use crate::sync_config::SyncConfig;
use crate::sync_error::{SyncError, SyncResult};
use crate::sync_state_reader::{find_managed_comment, read_sync_state};
use crate::tag_grammar::SYNC_WITH_TAG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the managed comment was written.
pub enum StateWrite {
    Created { comment_id: u64 },
    Edited { comment_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The stored set already matched; nothing was written.
    Unchanged { records: Vec<LinkedPrRecord> },
    Updated {
        records: Vec<LinkedPrRecord>,
        write: StateWrite,
    },
}

impl ReconcileOutcome {
    pub fn records(&self) -> &[LinkedPrRecord] {
        match self {
            Self::Unchanged { records } | Self::Updated { records, .. } => records,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// Adds `candidate` to `records` unless its base repository is already present,
/// then normalizes.
pub fn merge_candidate(
    mut records: Vec<LinkedPrRecord>,
    candidate: &PullRequest,
) -> Vec<LinkedPrRecord> {
    let candidate_repo = candidate.base_repo();
    if records.iter().any(|record| record.repo == candidate_repo) {
        debug!(repo = candidate_repo, "repository already linked");
    } else {
        records.push(LinkedPrRecord::from_pull_request(candidate));
    }
    normalize_records(records)
}

/// Rebuilds every stored record from its live pull request.
async fn refresh_records(
    platform: &dyn Platform,
    records: &[LinkedPrRecord],
) -> SyncResult<Vec<LinkedPrRecord>> {
    let mut refreshed = Vec::with_capacity(records.len());
    for record in records {
        let pr = platform
            .get_pull_request(&record.repo, record.number)
            .await
            .map_err(|error| {
                SyncError::from_lookup(
                    error,
                    format!("pull request {}#{}", record.repo, record.number),
                )
            })?;
        refreshed.push(LinkedPrRecord::from_pull_request(&pr));
    }
    Ok(refreshed)
}

fn same_comment(read: Option<&IssueComment>, current: Option<&IssueComment>) -> bool {
    match (read, current) {
        (None, None) => true,
        (Some(read), Some(current)) => read.id == current.id && read.body == current.body,
        _ => false,
    }
}

async fn write_state(
    platform: &dyn Platform,
    issue: &Issue,
    existing: Option<&IssueComment>,
    envelope: &LinkedPrsEnvelope,
) -> Result<StateWrite, PlatformError> {
    let body = envelope.render();
    match existing {
        Some(comment) => {
            info!(comment_id = comment.id, "editing managed issue comment");
            platform
                .update_issue_comment(&issue.repo, comment.id, &body)
                .await?;
            Ok(StateWrite::Edited {
                comment_id: comment.id,
            })
        }
        None => {
            info!(
                issue = issue.number,
                repo = %issue.repo,
                "creating managed issue comment"
            );
            let created = platform
                .create_issue_comment(&issue.repo, issue.number, &body)
                .await?;
            Ok(StateWrite::Created {
                comment_id: created.id,
            })
        }
    }
}

/// Merges `candidate` into the synchronized set of `issue` and writes the set back
/// when it changed. Also makes sure `candidate` carries a notice pointing at the
/// tracking issue.
///
/// Read failures abort before anything is written. A failed write returns
/// [`SyncError::StateWrite`] carrying the computed set. A notice failure after a
/// successful write returns [`SyncError::Notice`] carrying the outcome.
pub async fn reconcile(
    platform: &dyn Platform,
    config: &SyncConfig,
    issue: &Issue,
    candidate: &PullRequest,
) -> SyncResult<ReconcileOutcome> {
    let max_attempts = config.max_write_attempts.max(1);
    let mut attempt = 0_usize;
    let outcome = loop {
        attempt = attempt.saturating_add(1);
        let state = read_sync_state(platform, issue).await?;
        let mut previous = state.records.clone();
        previous.sort_by(|left, right| left.repo.cmp(&right.repo));
        let refreshed = refresh_records(platform, &state.records).await?;
        let records = merge_candidate(refreshed, candidate);

        if records == previous {
            info!(
                issue = issue.number,
                repo = %issue.repo,
                "synchronized set unchanged, skipping write"
            );
            break ReconcileOutcome::Unchanged { records };
        }

        let envelope = records_envelope(&records).map_err(SyncError::Encode)?;
        if attempt < max_attempts {
            let current = find_managed_comment(platform, issue)
                .await?
                .map(|(comment, _)| comment);
            if !same_comment(state.comment.as_ref(), current.as_ref()) {
                warn!(
                    attempt,
                    issue = issue.number,
                    "managed comment changed since read, merging again"
                );
                continue;
            }
        }

        let write = write_state(platform, issue, state.comment.as_ref(), &envelope)
            .await
            .map_err(|source| SyncError::StateWrite {
                records: records.clone(),
                source,
            })?;
        break ReconcileOutcome::Updated { records, write };
    };

    match post_pull_request_notice(platform, issue, candidate).await {
        Ok(_) => Ok(outcome),
        Err(source) => {
            warn!(
                issue = issue.number,
                updated = outcome.is_updated(),
                linked = outcome.records().len(),
                error = %source,
                "synchronized set stored, pull request notice failed"
            );
            Err(SyncError::Notice {
                outcome: Box::new(outcome),
                source,
            })
        }
    }
}

/// Text posted on each linked pull request.
pub fn pull_request_notice(issue: &Issue) -> String {
    format!(
        "Tests will be run in sync with other PRs containing `[{SYNC_WITH_TAG}: {}#{}]` in title. \
         You can find related PRs as linked with mentioned [issue]({}).",
        issue.repo, issue.number, issue.html_url
    )
}

/// Posts [`pull_request_notice`] on `pr` unless an equivalent comment exists.
/// Returns whether a comment was created.
pub async fn post_pull_request_notice(
    platform: &dyn Platform,
    issue: &Issue,
    pr: &PullRequest,
) -> Result<bool, PlatformError> {
    let notice = pull_request_notice(issue);
    let repo = pr.base_repo();
    let comments = platform.list_issue_comments(repo, pr.number).await?;
    let already_posted = comments
        .iter()
        .any(|comment| comment.body.contains(&notice));
    if already_posted {
        debug!(
            repo,
            number = pr.number,
            "pull request notice already present"
        );
        return Ok(false);
    }
    platform
        .create_issue_comment(repo, pr.number, &notice)
        .await?;
    info!(repo, number = pr.number, "posted pull request notice");
    Ok(true)
}

#[derive(Debug, Clone)]
/// Result of linking one pull request to its tracking issue.
pub struct LinkReport {
    pub issue: Issue,
    pub outcome: ReconcileOutcome,
}

/// Resolves the tracking issue of `repo_name#pr_number` and reconciles the pull
/// request into it.
pub async fn link_pull_request(
    platform: &dyn Platform,
    config: &SyncConfig,
    repo_name: &str,
    pr_number: u64,
) -> SyncResult<LinkReport> {
    let context = resolve_trigger(platform, config, repo_name, pr_number).await?;
    let outcome = reconcile(platform, config, &context.issue, &context.pull_request).await?;
    info!(
        linked = outcome.records().len(),
        updated = outcome.is_updated(),
        "reconciled synchronized set"
    );
    Ok(LinkReport {
        issue: context.issue,
        outcome,
    })
}
