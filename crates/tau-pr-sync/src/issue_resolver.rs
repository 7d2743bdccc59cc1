use tracing::{debug, info};

use crate::platform::{Issue, Platform, PullRequest};
use crate::sync_config::SyncConfig;
use crate::sync_error::{SyncError, SyncResult};
use crate::tag_grammar::get_sync_target;

/// Locates the tracking issue named by the sync tag in `pr_title`.
///
/// Relative tags resolve against `current_org`. Missing repositories or issues
/// surface as [`SyncError::NotFound`] and are not retried.
pub async fn resolve(
    platform: &dyn Platform,
    pr_title: &str,
    current_org: &str,
) -> SyncResult<Issue> {
    let target = get_sync_target(pr_title, current_org)?;
    debug!(target = %target, "resolved sync tag");

    let repo_name = target.repo_full_name();
    let repository = platform
        .get_repository(&repo_name)
        .await
        .map_err(|error| SyncError::from_lookup(error, format!("repository {repo_name}")))?;
    let issue = platform
        .get_issue(&repository.full_name, target.issue_number)
        .await
        .map_err(|error| SyncError::from_lookup(error, format!("issue {target}")))?;
    info!(
        issue = %format!("{}#{}", issue.repo, issue.number),
        "found tracking issue"
    );
    Ok(issue)
}

/// Pull request that triggered an invocation, with the tracking issue it names.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub pull_request: PullRequest,
    pub issue: Issue,
}

/// Organisation used for relative tags: the configured default, else the owner of
/// the triggering repository.
pub fn effective_default_org<'a>(config: &'a SyncConfig, repo_name: &'a str) -> &'a str {
    let configured = config.default_org.trim();
    if !configured.is_empty() {
        return configured;
    }
    repo_name
        .split_once('/')
        .map(|(owner, _)| owner.trim())
        .unwrap_or_default()
}

/// Loads `repo_name#pr_number` and resolves the tracking issue its title names.
pub async fn resolve_trigger(
    platform: &dyn Platform,
    config: &SyncConfig,
    repo_name: &str,
    pr_number: u64,
) -> SyncResult<TriggerContext> {
    let pull_request = platform
        .get_pull_request(repo_name, pr_number)
        .await
        .map_err(|error| {
            SyncError::from_lookup(error, format!("pull request {repo_name}#{pr_number}"))
        })?;
    let issue = resolve(
        platform,
        &pull_request.title,
        effective_default_org(config, repo_name),
    )
    .await?;
    Ok(TriggerContext {
        pull_request,
        issue,
    })
}
