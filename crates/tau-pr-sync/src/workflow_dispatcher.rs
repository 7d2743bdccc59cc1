use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::issue_resolver::resolve_trigger;
use crate::linked_pr_record::LinkedPrRecord;
use crate::platform::{Platform, PlatformError};
use crate::sync_config::SyncConfig;
use crate::sync_error::SyncResult;
use crate::sync_state_reader::read_sync_state;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How the matching workflow is re-triggered in each linked repository.
pub enum DispatchMode {
    /// Re-run the newest run whose head commit is the record's sha.
    #[default]
    Rerun,
    /// Fire `workflow_dispatch` on the head branch of every open pull request at the
    /// record's sha.
    Dispatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub branch: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Per-record result; only `Rerun` and a `Dispatched` with at least one branch
/// mean work was triggered.
pub enum RecordDispatch {
    Ignored,
    Rerun { run_id: u64 },
    /// Branches are dispatched independently; `failures` lists the ones the
    /// platform rejected.
    Dispatched {
        branches: Vec<String>,
        failures: Vec<BranchFailure>,
    },
    WorkflowNotFound { path: String },
    RunNotFound { sha: String },
    NoOpenPullRequest { sha: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDispatchOutcome {
    pub repo: String,
    pub number: u64,
    pub result: RecordDispatch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<RecordDispatchOutcome>,
}

impl DispatchReport {
    pub fn triggered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| match &outcome.result {
                RecordDispatch::Rerun { .. } => true,
                RecordDispatch::Dispatched { branches, .. } => !branches.is_empty(),
                _ => false,
            })
            .count()
    }

    /// Records that were not fully triggered and not deliberately ignored.
    pub fn problems(&self) -> impl Iterator<Item = &RecordDispatchOutcome> {
        self.outcomes.iter().filter(|outcome| match &outcome.result {
            RecordDispatch::Ignored | RecordDispatch::Rerun { .. } => false,
            RecordDispatch::Dispatched { failures, .. } => !failures.is_empty(),
            _ => true,
        })
    }
}

/// Workflow file path of a `${{ github.workflow_ref }}` value:
/// `org/repo/.github/workflows/ci.yml@refs/heads/main` → `.github/workflows/ci.yml`.
pub fn workflow_path_from_ref(workflow_ref: &str) -> &str {
    let without_ref = workflow_ref.split('@').next().unwrap_or_default();
    without_ref.splitn(3, '/').last().unwrap_or_default()
}

async fn dispatch_record(
    platform: &dyn Platform,
    record: &LinkedPrRecord,
    workflow_path: &str,
    mode: DispatchMode,
) -> Result<RecordDispatch, PlatformError> {
    let workflows = platform.list_workflows(&record.repo).await?;
    let Some(workflow) = workflows
        .into_iter()
        .find(|workflow| workflow.path == workflow_path)
    else {
        warn!(
            repo = %record.repo,
            path = workflow_path,
            "workflow not found, skipping"
        );
        return Ok(RecordDispatch::WorkflowNotFound {
            path: workflow_path.to_string(),
        });
    };

    match mode {
        DispatchMode::Rerun => {
            let runs = platform
                .list_workflow_runs(&record.repo, workflow.id)
                .await?;
            let Some(run) = runs.into_iter().find(|run| run.head_sha == record.sha) else {
                warn!(
                    repo = %record.repo,
                    sha = %record.sha,
                    "no workflow run for head commit"
                );
                return Ok(RecordDispatch::RunNotFound {
                    sha: record.sha.clone(),
                });
            };
            platform.rerun_workflow_run(&record.repo, run.id).await?;
            info!(
                run_id = run.id,
                repo = %record.repo,
                number = record.number,
                path = workflow_path,
                "workflow run has been rerun"
            );
            Ok(RecordDispatch::Rerun { run_id: run.id })
        }
        DispatchMode::Dispatch => {
            let pulls = platform
                .list_open_pull_requests_for_sha(&record.repo, &record.sha)
                .await?;
            if pulls.is_empty() {
                warn!(
                    repo = %record.repo,
                    sha = %record.sha,
                    "no open pull request for head commit"
                );
                return Ok(RecordDispatch::NoOpenPullRequest {
                    sha: record.sha.clone(),
                });
            }
            let inputs = BTreeMap::from([("sha".to_string(), record.sha.clone())]);
            let mut branches = Vec::with_capacity(pulls.len());
            let mut failures = Vec::new();
            for pr in pulls {
                let branch = pr.head.git_ref;
                let dispatched = platform
                    .dispatch_workflow(&record.repo, workflow.id, &branch, &inputs)
                    .await;
                match dispatched {
                    Ok(()) => {
                        info!(
                            repo = %record.repo,
                            branch = %branch,
                            path = workflow_path,
                            "workflow dispatched"
                        );
                        branches.push(branch);
                    }
                    Err(error) => {
                        warn!(
                            repo = %record.repo,
                            branch = %branch,
                            error = %error,
                            "workflow dispatch failed for branch"
                        );
                        failures.push(BranchFailure {
                            branch,
                            message: error.to_string(),
                        });
                    }
                }
            }
            Ok(RecordDispatch::Dispatched { branches, failures })
        }
    }
}

/// Re-triggers `workflow_ref` in every linked repository outside `ignore_repos`.
///
/// Failures are isolated per record; one broken repository never blocks the rest.
pub async fn dispatch_or_rerun(
    platform: &dyn Platform,
    records: &[LinkedPrRecord],
    workflow_ref: &str,
    ignore_repos: &BTreeSet<String>,
    mode: DispatchMode,
) -> DispatchReport {
    let workflow_path = workflow_path_from_ref(workflow_ref);
    let mut report = DispatchReport::default();
    for record in records {
        let result = if ignore_repos.contains(&record.repo) {
            info!(repo = %record.repo, "ignoring rerun for repository");
            RecordDispatch::Ignored
        } else {
            match dispatch_record(platform, record, workflow_path, mode).await {
                Ok(result) => result,
                Err(error) => {
                    warn!(
                        repo = %record.repo,
                        error = %error,
                        "workflow trigger failed"
                    );
                    RecordDispatch::Failed {
                        message: error.to_string(),
                    }
                }
            }
        };
        report.outcomes.push(RecordDispatchOutcome {
            repo: record.repo.clone(),
            number: record.number,
            result,
        });
    }
    report
}

/// Resolves the synchronized set of `repo_name#pr_number` and re-triggers
/// `workflow_ref` across it.
pub async fn trigger_workflows(
    platform: &dyn Platform,
    config: &SyncConfig,
    repo_name: &str,
    pr_number: u64,
    workflow_ref: &str,
    ignore_repos: &BTreeSet<String>,
    mode: DispatchMode,
) -> SyncResult<DispatchReport> {
    let context = resolve_trigger(platform, config, repo_name, pr_number).await?;
    let state = read_sync_state(platform, &context.issue).await?;
    Ok(dispatch_or_rerun(platform, &state.records, workflow_ref, ignore_repos, mode).await)
}
