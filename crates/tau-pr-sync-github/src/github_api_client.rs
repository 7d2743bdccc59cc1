use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tau_pr_sync::platform::{
    Issue, IssueComment, Platform, PlatformError, PlatformResult, PullRequest, PullRequestRef,
    Repository, Workflow, WorkflowRun,
};
use tracing::{debug, warn};

use crate::retry_policy::{body_excerpt, retry_after_hint, RetryPolicy};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Clone)]
pub struct GithubClientConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl GithubClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            token: token.into(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubRepository {
    full_name: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    title: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepoName {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct GithubPullRef {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
    repo: Option<GithubRepoName>,
}

#[derive(Debug, Deserialize)]
struct GithubPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    html_url: String,
    #[serde(default)]
    state: String,
    head: GithubPullRef,
    base: GithubPullRef,
}

#[derive(Debug, Deserialize)]
struct GithubIssueComment {
    id: u64,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubWorkflowList {
    workflows: Vec<Workflow>,
}

#[derive(Debug, Deserialize)]
struct GithubWorkflowRunList {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

impl From<GithubPullRef> for PullRequestRef {
    fn from(value: GithubPullRef) -> Self {
        Self {
            git_ref: value.git_ref,
            sha: value.sha,
            repo: value.repo.map(|repo| repo.full_name),
        }
    }
}

impl From<GithubPullRequest> for PullRequest {
    fn from(value: GithubPullRequest) -> Self {
        Self {
            number: value.number,
            title: value.title,
            html_url: value.html_url,
            head: value.head.into(),
            base: value.base.into(),
        }
    }
}

impl From<GithubIssueComment> for IssueComment {
    fn from(value: GithubIssueComment) -> Self {
        Self {
            id: value.id,
            body: value.body.unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
/// [`Platform`] backed by the GitHub REST API.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetryPolicy,
}

impl GithubApiClient {
    pub fn new(config: &GithubClientConfig) -> PlatformResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tau-pr-sync"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        let mut auth_value = reqwest::header::HeaderValue::from_str(&auth_header).map_err(|_| {
            PlatformError::Transport {
                operation: "configure client".to_string(),
                message: "invalid github authorization header".to_string(),
            }
        })?;
        auth_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| PlatformError::Transport {
                operation: "configure client".to_string(),
                message: error.to_string(),
            })?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Sends the request built by `request_builder`, re-sending it while the
    /// failure is transient and the retry policy allows. 404 maps to
    /// [`PlatformError::NotFound`] naming `resource`.
    async fn send<F>(
        &self,
        operation: &str,
        resource: &str,
        mut request_builder: F,
    ) -> PlatformResult<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-tau-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            let (error, server_hint) = match response {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Err(PlatformError::not_found(resource));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let server_hint = retry_after_hint(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let error = PlatformError::Status {
                        operation: operation.to_string(),
                        status,
                        body: body_excerpt(&body, ERROR_BODY_MAX_CHARS),
                    };
                    (error, server_hint)
                }
                Err(error) => {
                    let error = PlatformError::Transport {
                        operation: operation.to_string(),
                        message: error.to_string(),
                    };
                    (error, None)
                }
            };

            if !error.is_transient() || !self.retry.allows_retry(attempt) {
                return Err(error);
            }
            let delay = self.retry.backoff(attempt, server_hint);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying github request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn request_json<T, F>(
        &self,
        operation: &str,
        resource: &str,
        request_builder: F,
    ) -> PlatformResult<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send(operation, resource, request_builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|error| PlatformError::Decode {
                operation: operation.to_string(),
                message: error.to_string(),
            })
    }

    async fn request_empty<F>(
        &self,
        operation: &str,
        resource: &str,
        request_builder: F,
    ) -> PlatformResult<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.send(operation, resource, request_builder).await?;
        Ok(())
    }
}

#[async_trait]
impl Platform for GithubApiClient {
    async fn get_repository(&self, full_name: &str) -> PlatformResult<Repository> {
        let url = self.url(&format!("/repos/{full_name}"));
        let repo: GithubRepository = self
            .request_json("get repository", &format!("repository {full_name}"), || {
                self.http.get(&url)
            })
            .await?;
        Ok(Repository {
            full_name: repo.full_name,
            html_url: repo.html_url,
        })
    }

    async fn get_issue(&self, repo: &str, number: u64) -> PlatformResult<Issue> {
        let url = self.url(&format!("/repos/{repo}/issues/{number}"));
        let issue: GithubIssue = self
            .request_json("get issue", &format!("issue {repo}#{number}"), || {
                self.http.get(&url)
            })
            .await?;
        Ok(Issue {
            repo: repo.to_string(),
            number: issue.number,
            title: issue.title,
            html_url: issue.html_url,
        })
    }

    async fn get_pull_request(&self, repo: &str, number: u64) -> PlatformResult<PullRequest> {
        let url = self.url(&format!("/repos/{repo}/pulls/{number}"));
        let pr: GithubPullRequest = self
            .request_json(
                "get pull request",
                &format!("pull request {repo}#{number}"),
                || self.http.get(&url),
            )
            .await?;
        Ok(pr.into())
    }

    async fn list_issue_comments(
        &self,
        repo: &str,
        number: u64,
    ) -> PlatformResult<Vec<IssueComment>> {
        let url = self.url(&format!("/repos/{repo}/issues/{number}/comments"));
        let resource = format!("issue {repo}#{number}");
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let chunk: Vec<GithubIssueComment> = self
                .request_json("list issue comments", &resource, || {
                    self.http.get(&url).query(&[
                        ("sort", "created"),
                        ("direction", "asc"),
                        ("per_page", "100"),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk.into_iter().map(IssueComment::from));
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        debug!(repo, number, comments = rows.len(), "listed issue comments");
        Ok(rows)
    }

    async fn create_issue_comment(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> PlatformResult<IssueComment> {
        let url = self.url(&format!("/repos/{repo}/issues/{number}/comments"));
        let payload = json!({ "body": body });
        let comment: GithubIssueComment = self
            .request_json("create issue comment", &format!("issue {repo}#{number}"), || {
                self.http.post(&url).json(&payload)
            })
            .await?;
        Ok(comment.into())
    }

    async fn update_issue_comment(
        &self,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> PlatformResult<IssueComment> {
        let url = self.url(&format!("/repos/{repo}/issues/comments/{comment_id}"));
        let payload = json!({ "body": body });
        let comment: GithubIssueComment = self
            .request_json(
                "update issue comment",
                &format!("comment {comment_id} in {repo}"),
                || self.http.patch(&url).json(&payload),
            )
            .await?;
        Ok(comment.into())
    }

    async fn list_workflows(&self, repo: &str) -> PlatformResult<Vec<Workflow>> {
        let url = self.url(&format!("/repos/{repo}/actions/workflows"));
        let resource = format!("workflows of {repo}");
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let chunk: GithubWorkflowList = self
                .request_json("list workflows", &resource, || {
                    self.http
                        .get(&url)
                        .query(&[("per_page", "100"), ("page", page_value.as_str())])
                })
                .await?;
            let chunk_len = chunk.workflows.len();
            rows.extend(chunk.workflows);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn list_workflow_runs(
        &self,
        repo: &str,
        workflow_id: u64,
    ) -> PlatformResult<Vec<WorkflowRun>> {
        let url = self.url(&format!("/repos/{repo}/actions/workflows/{workflow_id}/runs"));
        let runs: GithubWorkflowRunList = self
            .request_json(
                "list workflow runs",
                &format!("workflow {workflow_id} in {repo}"),
                || self.http.get(&url).query(&[("per_page", "100")]),
            )
            .await?;
        Ok(runs.workflow_runs)
    }

    async fn rerun_workflow_run(&self, repo: &str, run_id: u64) -> PlatformResult<()> {
        let url = self.url(&format!("/repos/{repo}/actions/runs/{run_id}/rerun"));
        self.request_empty(
            "rerun workflow run",
            &format!("workflow run {run_id} in {repo}"),
            || self.http.post(&url),
        )
        .await
    }

    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow_id: u64,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> PlatformResult<()> {
        let url = self.url(&format!(
            "/repos/{repo}/actions/workflows/{workflow_id}/dispatches"
        ));
        let payload = json!({ "ref": git_ref, "inputs": inputs });
        self.request_empty(
            "dispatch workflow",
            &format!("workflow {workflow_id} in {repo}"),
            || self.http.post(&url).json(&payload),
        )
        .await
    }

    async fn list_open_pull_requests_for_sha(
        &self,
        repo: &str,
        sha: &str,
    ) -> PlatformResult<Vec<PullRequest>> {
        let url = self.url(&format!("/repos/{repo}/commits/{sha}/pulls"));
        let pulls: Vec<GithubPullRequest> = self
            .request_json(
                "list pull requests for commit",
                &format!("commit {sha} in {repo}"),
                || self.http.get(&url).query(&[("per_page", "100")]),
            )
            .await?;
        Ok(pulls
            .into_iter()
            .filter(|pr| pr.state == "open" && pr.head.sha == sha)
            .map(PullRequest::from)
            .collect())
    }

    async fn latest_commit_sha(&self, repo: &str, branch: &str) -> PlatformResult<String> {
        let url = self.url(&format!("/repos/{repo}/commits"));
        let resource = format!("branch {repo}:{branch}");
        let commits: Vec<GithubCommit> = self
            .request_json("list commits", &resource, || {
                self.http
                    .get(&url)
                    .query(&[("sha", branch), ("per_page", "1")])
            })
            .await?;
        commits
            .into_iter()
            .next()
            .map(|commit| commit.sha)
            .ok_or_else(|| PlatformError::not_found(resource))
    }
}
