use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::json;
use tau_pr_sync::platform::{
    Issue, IssueComment, PullRequest, PullRequestRef, Repository, Workflow, WorkflowRun,
};
use tau_pr_sync::workflow_dispatcher::RecordDispatch;
use tau_pr_sync::{
    find_commits_for_syncing, link_pull_request, trigger_workflows, DispatchMode, LinkedPrsEnvelope,
    Platform, PlatformError, PlatformResult, ReconcileOutcome, SyncConfig,
};
use tokio::sync::Mutex as AsyncMutex;

const TRACKER: &str = "acme/tracker";
const WORKFLOW_REF: &str = "acme/widgets/.github/workflows/ci.yml@refs/pull/42/merge";

#[derive(Default)]
struct HostState {
    issues: BTreeMap<(String, u64), Issue>,
    pulls: BTreeMap<(String, u64), PullRequest>,
    comments: BTreeMap<(String, u64), Vec<IssueComment>>,
    workflows: BTreeMap<String, Vec<Workflow>>,
    runs: BTreeMap<(String, u64), Vec<WorkflowRun>>,
    branch_heads: BTreeMap<(String, String), String>,
    next_comment_id: u64,
    reruns: Vec<(String, u64)>,
    dispatches: Vec<(String, u64, String)>,
}

/// In-memory code host shared by every pull request of one scenario.
struct InMemoryHost {
    state: AsyncMutex<HostState>,
}

impl InMemoryHost {
    fn new() -> Self {
        let mut state = HostState {
            next_comment_id: 100,
            ..HostState::default()
        };
        state.issues.insert(
            (TRACKER.to_string(), 7),
            Issue {
                repo: TRACKER.to_string(),
                number: 7,
                title: "Coordinate widgets release".to_string(),
                html_url: "https://github.com/acme/tracker/issues/7".to_string(),
            },
        );
        Self {
            state: AsyncMutex::new(state),
        }
    }

    async fn open_pull_request(&self, repo: &str, number: u64, branch: &str, sha: &str) {
        let pr = PullRequest {
            number,
            title: "[SyncWith: tracker#7] Ship the widget API".to_string(),
            html_url: format!("https://github.com/{repo}/pull/{number}"),
            head: PullRequestRef {
                git_ref: branch.to_string(),
                sha: sha.to_string(),
                repo: Some(repo.to_string()),
            },
            base: PullRequestRef {
                git_ref: "main".to_string(),
                sha: "base".to_string(),
                repo: Some(repo.to_string()),
            },
        };
        let mut state = self.state.lock().await;
        state
            .branch_heads
            .insert((repo.to_string(), branch.to_string()), sha.to_string());
        state.pulls.insert((repo.to_string(), number), pr);
        state.workflows.insert(
            repo.to_string(),
            vec![Workflow {
                id: 11,
                name: "CI".to_string(),
                path: ".github/workflows/ci.yml".to_string(),
            }],
        );
        state.runs.entry((repo.to_string(), 11)).or_default().insert(
            0,
            WorkflowRun {
                id: 1_000 + number,
                head_sha: sha.to_string(),
                head_branch: Some(branch.to_string()),
            },
        );
    }

    async fn push_commit(&self, repo: &str, number: u64, sha: &str) {
        let mut state = self.state.lock().await;
        let Some(pr) = state.pulls.get_mut(&(repo.to_string(), number)) else {
            return;
        };
        pr.head.sha = sha.to_string();
        let branch = pr.head.git_ref.clone();
        state
            .branch_heads
            .insert((repo.to_string(), branch), sha.to_string());
    }

    async fn comments_on(&self, repo: &str, number: u64) -> Vec<IssueComment> {
        self.state
            .lock()
            .await
            .comments
            .get(&(repo.to_string(), number))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Platform for InMemoryHost {
    async fn get_repository(&self, full_name: &str) -> PlatformResult<Repository> {
        Ok(Repository {
            full_name: full_name.to_string(),
            html_url: format!("https://github.com/{full_name}"),
        })
    }

    async fn get_issue(&self, repo: &str, number: u64) -> PlatformResult<Issue> {
        self.state
            .lock()
            .await
            .issues
            .get(&(repo.to_string(), number))
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("issue {repo}#{number}")))
    }

    async fn get_pull_request(&self, repo: &str, number: u64) -> PlatformResult<PullRequest> {
        self.state
            .lock()
            .await
            .pulls
            .get(&(repo.to_string(), number))
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("pull request {repo}#{number}")))
    }

    async fn list_issue_comments(
        &self,
        repo: &str,
        number: u64,
    ) -> PlatformResult<Vec<IssueComment>> {
        Ok(self.comments_on(repo, number).await)
    }

    async fn create_issue_comment(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> PlatformResult<IssueComment> {
        let mut state = self.state.lock().await;
        state.next_comment_id += 1;
        let comment = IssueComment {
            id: state.next_comment_id,
            body: body.to_string(),
        };
        state
            .comments
            .entry((repo.to_string(), number))
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn update_issue_comment(
        &self,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> PlatformResult<IssueComment> {
        let mut state = self.state.lock().await;
        let comment = state
            .comments
            .iter_mut()
            .filter(|((comment_repo, _), _)| comment_repo == repo)
            .flat_map(|(_, comments)| comments.iter_mut())
            .find(|comment| comment.id == comment_id)
            .ok_or_else(|| PlatformError::not_found(format!("comment {comment_id} in {repo}")))?;
        comment.body = body.to_string();
        Ok(comment.clone())
    }

    async fn list_workflows(&self, repo: &str) -> PlatformResult<Vec<Workflow>> {
        Ok(self
            .state
            .lock()
            .await
            .workflows
            .get(repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_workflow_runs(
        &self,
        repo: &str,
        workflow_id: u64,
    ) -> PlatformResult<Vec<WorkflowRun>> {
        Ok(self
            .state
            .lock()
            .await
            .runs
            .get(&(repo.to_string(), workflow_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn rerun_workflow_run(&self, repo: &str, run_id: u64) -> PlatformResult<()> {
        self.state
            .lock()
            .await
            .reruns
            .push((repo.to_string(), run_id));
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow_id: u64,
        git_ref: &str,
        _inputs: &BTreeMap<String, String>,
    ) -> PlatformResult<()> {
        self.state
            .lock()
            .await
            .dispatches
            .push((repo.to_string(), workflow_id, git_ref.to_string()));
        Ok(())
    }

    async fn list_open_pull_requests_for_sha(
        &self,
        repo: &str,
        sha: &str,
    ) -> PlatformResult<Vec<PullRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .pulls
            .iter()
            .filter(|((pull_repo, _), pr)| pull_repo == repo && pr.head.sha == sha)
            .map(|(_, pr)| pr.clone())
            .collect())
    }

    async fn latest_commit_sha(&self, repo: &str, branch: &str) -> PlatformResult<String> {
        self.state
            .lock()
            .await
            .branch_heads
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("branch {repo}:{branch}")))
    }
}

fn config() -> SyncConfig {
    SyncConfig::new("token", "")
}

async fn managed_payload(host: &InMemoryHost) -> serde_json::Value {
    let comments = host.comments_on(TRACKER, 7).await;
    assert_eq!(
        comments.len(),
        1,
        "tracking issue holds one managed comment"
    );
    let envelope = LinkedPrsEnvelope::try_parse(&comments[0].body).expect("managed envelope");
    serde_json::from_str(&envelope.hidden_payload).expect("payload json")
}

fn record_json(repo: &str, number: u64, sha: &str) -> serde_json::Value {
    json!({
        "repo": repo,
        "number": number,
        "sha": sha,
        "url": format!("https://github.com/{repo}/pull/{number}")
    })
}

#[tokio::test]
async fn integration_three_repositories_share_one_synchronized_set() {
    let host = InMemoryHost::new();
    host.open_pull_request("acme/widgets", 42, "feature/api", "w1")
        .await;
    host.open_pull_request("acme/gadgets", 5, "feature/api", "g1")
        .await;
    host.open_pull_request("acme/docs", 3, "docs/api", "d1")
        .await;
    let config = config();

    for (repo, number) in [("acme/widgets", 42), ("acme/gadgets", 5), ("acme/docs", 3)] {
        let report = link_pull_request(&host, &config, repo, number)
            .await
            .expect("link");
        assert!(report.outcome.is_updated());
        assert_eq!(report.issue.repo, TRACKER);
    }

    assert_eq!(
        managed_payload(&host).await,
        json!([
            record_json("acme/docs", 3, "d1"),
            record_json("acme/gadgets", 5, "g1"),
            record_json("acme/widgets", 42, "w1")
        ])
    );
    for (repo, number) in [("acme/widgets", 42), ("acme/gadgets", 5), ("acme/docs", 3)] {
        let notices = host.comments_on(repo, number).await;
        assert_eq!(notices.len(), 1);
        assert!(notices[0].body.contains("acme/tracker#7"));
    }

    let relink = link_pull_request(&host, &config, "acme/widgets", 42)
        .await
        .expect("relink");
    assert!(matches!(relink.outcome, ReconcileOutcome::Unchanged { .. }));
    assert_eq!(host.comments_on("acme/widgets", 42).await.len(), 1);

    let ignore = BTreeSet::from(["acme/docs".to_string()]);
    let report = trigger_workflows(
        &host,
        &config,
        "acme/gadgets",
        5,
        WORKFLOW_REF,
        &ignore,
        DispatchMode::Rerun,
    )
    .await
    .expect("trigger");
    assert_eq!(report.triggered(), 2);
    assert_eq!(report.problems().count(), 0);
    let docs = report
        .outcomes
        .iter()
        .find(|outcome| outcome.repo == "acme/docs")
        .expect("docs outcome");
    assert_eq!(docs.result, RecordDispatch::Ignored);
    assert_eq!(
        host.state.lock().await.reruns,
        vec![
            ("acme/gadgets".to_string(), 1_005),
            ("acme/widgets".to_string(), 1_042)
        ]
    );

    let map = find_commits_for_syncing(&host, &config, "acme/docs", 3)
        .await
        .expect("commit map");
    assert_eq!(
        serde_json::to_value(&map).expect("map json"),
        json!({
            "acme/docs": {"branch": "docs/api", "pr_number": 3, "sha": "d1"},
            "acme/gadgets": {"branch": "feature/api", "pr_number": 5, "sha": "g1"},
            "acme/widgets": {"branch": "feature/api", "pr_number": 42, "sha": "w1"}
        })
    );
}

#[tokio::test]
async fn integration_new_commits_refresh_the_set_and_drive_dispatch() {
    let host = InMemoryHost::new();
    host.open_pull_request("acme/widgets", 42, "feature/api", "w1")
        .await;
    host.open_pull_request("acme/gadgets", 5, "feature/api", "g1")
        .await;
    let config = config();
    link_pull_request(&host, &config, "acme/widgets", 42)
        .await
        .expect("link widgets");
    link_pull_request(&host, &config, "acme/gadgets", 5)
        .await
        .expect("link gadgets");

    host.push_commit("acme/widgets", 42, "w2").await;
    let report = link_pull_request(&host, &config, "acme/widgets", 42)
        .await
        .expect("relink after push");
    assert!(report.outcome.is_updated());
    let widgets = report
        .outcome
        .records()
        .iter()
        .find(|record| record.repo == "acme/widgets")
        .expect("widgets record");
    assert_eq!(widgets.sha, "w2");
    assert_eq!(host.comments_on(TRACKER, 7).await.len(), 1);

    let report = trigger_workflows(
        &host,
        &config,
        "acme/widgets",
        42,
        WORKFLOW_REF,
        &BTreeSet::new(),
        DispatchMode::Dispatch,
    )
    .await
    .expect("dispatch");
    assert_eq!(report.triggered(), 2);
    assert_eq!(
        host.state.lock().await.dispatches,
        vec![
            ("acme/gadgets".to_string(), 11, "feature/api".to_string()),
            ("acme/widgets".to_string(), 11, "feature/api".to_string())
        ]
    );

    let map = find_commits_for_syncing(&host, &config, "acme/gadgets", 5)
        .await
        .expect("commit map");
    assert_eq!(map["acme/widgets"].sha, "w2");
}

#[tokio::test]
async fn regression_untagged_pull_request_never_touches_the_tracking_issue() {
    let host = InMemoryHost::new();
    host.open_pull_request("acme/widgets", 42, "feature/api", "w1")
        .await;
    host.state
        .lock()
        .await
        .pulls
        .get_mut(&("acme/widgets".to_string(), 42))
        .expect("pull request")
        .title = "Ship the widget API".to_string();

    let error = link_pull_request(&host, &config(), "acme/widgets", 42)
        .await
        .expect_err("missing tag");
    assert_eq!(
        error.to_string(),
        "no SyncWith tag found in pull request title"
    );
    assert!(host.comments_on(TRACKER, 7).await.is_empty());
    assert!(host.comments_on("acme/widgets", 42).await.is_empty());
}
