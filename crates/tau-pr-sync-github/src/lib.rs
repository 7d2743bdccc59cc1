//! GitHub REST adapter for the `tau-pr-sync` platform seam.

pub mod github_api_client;
pub mod retry_policy;

pub use github_api_client::{GithubApiClient, GithubClientConfig};
pub use retry_policy::RetryPolicy;
