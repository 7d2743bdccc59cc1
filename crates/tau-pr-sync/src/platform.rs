use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Repository as returned by the hosting platform.
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Tracking issue named by a sync tag.
pub struct Issue {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One side (head or base) of a pull request.
pub struct PullRequestRef {
    /// Branch name.
    pub git_ref: String,
    pub sha: String,
    /// Full name of the repository the branch lives in; `None` when a fork was deleted.
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

impl PullRequest {
    /// Full name of the repository the pull request targets.
    pub fn base_repo(&self) -> &str {
        self.base.repo.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub head_sha: String,
    #[serde(default)]
    pub head_branch: Option<String>,
}

#[derive(Debug, Error)]
/// Failures surfaced by a [`Platform`] implementation.
pub enum PlatformError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("platform {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("platform {operation} request failed: {message}")]
    Transport { operation: String, message: String },
    #[error("failed to decode platform {operation}: {message}")]
    Decode { operation: String, message: String },
}

impl PlatformError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Timeouts, rate limiting and server-side failures.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[async_trait]
/// Narrow view of the collaboration platform consumed by the sync pipeline.
///
/// Every `repo` argument is a repository full name in `org/name` form. Calls are
/// awaited one at a time; implementations own their request timeout and report it
/// as a transient error.
pub trait Platform: Send + Sync {
    async fn get_repository(&self, full_name: &str) -> PlatformResult<Repository>;

    async fn get_issue(&self, repo: &str, number: u64) -> PlatformResult<Issue>;

    async fn get_pull_request(&self, repo: &str, number: u64) -> PlatformResult<PullRequest>;

    /// Comments in creation order.
    async fn list_issue_comments(&self, repo: &str, number: u64)
        -> PlatformResult<Vec<IssueComment>>;

    async fn create_issue_comment(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> PlatformResult<IssueComment>;

    async fn update_issue_comment(
        &self,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> PlatformResult<IssueComment>;

    async fn list_workflows(&self, repo: &str) -> PlatformResult<Vec<Workflow>>;

    /// Runs of one workflow, newest first.
    async fn list_workflow_runs(&self, repo: &str, workflow_id: u64)
        -> PlatformResult<Vec<WorkflowRun>>;

    async fn rerun_workflow_run(&self, repo: &str, run_id: u64) -> PlatformResult<()>;

    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow_id: u64,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> PlatformResult<()>;

    /// Open pull requests whose head commit is `sha`.
    async fn list_open_pull_requests_for_sha(
        &self,
        repo: &str,
        sha: &str,
    ) -> PlatformResult<Vec<PullRequest>>;

    /// Newest commit on `branch` of `repo`.
    async fn latest_commit_sha(&self, repo: &str, branch: &str) -> PlatformResult<String>;
}
