use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::issue_resolver::resolve_trigger;
use crate::linked_pr_record::LinkedPrRecord;
use crate::platform::Platform;
use crate::sync_config::SyncConfig;
use crate::sync_error::{SyncError, SyncResult};
use crate::sync_state_reader::read_sync_state;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Branch to check out in one repository of a synchronized set.
pub struct CommitMapEntry {
    pub branch: String,
    pub pr_number: u64,
    pub sha: String,
}

/// Repository full name to checkout target, keys sorted.
pub type CommitMap = BTreeMap<String, CommitMapEntry>;

/// Resolves the current head branch and its newest commit for every record.
///
/// Always reads live platform state; the stored `sha` of a record is not used.
pub async fn emit_commit_map(
    platform: &dyn Platform,
    records: &[LinkedPrRecord],
) -> SyncResult<CommitMap> {
    let mut map = CommitMap::new();
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
        let head_repo = pr.head.repo.clone().unwrap_or_else(|| record.repo.clone());
        let sha = platform
            .latest_commit_sha(&head_repo, &pr.head.git_ref)
            .await
            .map_err(|error| {
                SyncError::from_lookup(error, format!("branch {head_repo}:{}", pr.head.git_ref))
            })?;
        debug!(
            repo = %head_repo,
            branch = %pr.head.git_ref,
            sha = %sha,
            "resolved checkout target"
        );
        map.insert(
            head_repo,
            CommitMapEntry {
                branch: pr.head.git_ref,
                pr_number: pr.number,
                sha,
            },
        );
    }
    Ok(map)
}

/// Commit map for the synchronized set of `repo_name#pr_number`.
pub async fn find_commits_for_syncing(
    platform: &dyn Platform,
    config: &SyncConfig,
    repo_name: &str,
    pr_number: u64,
) -> SyncResult<CommitMap> {
    let context = resolve_trigger(platform, config, repo_name, pr_number).await?;
    let state = read_sync_state(platform, &context.issue).await?;
    emit_commit_map(platform, &state.records).await
}
