use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use tau_pr_sync::{
    find_commits_for_syncing, link_pull_request, trigger_workflows, Platform, ReconcileOutcome,
    SyncConfig,
};
use tau_pr_sync_github::{GithubApiClient, GithubClientConfig};
use tracing::{info, warn};

use crate::{Cli, CliCommand};

fn sync_config(cli: &Cli) -> SyncConfig {
    SyncConfig::new(cli.github_token.clone(), cli.default_org.clone())
        .with_max_write_attempts(cli.max_write_attempts)
}

fn github_client_config(cli: &Cli, config: &SyncConfig) -> GithubClientConfig {
    GithubClientConfig {
        api_base: cli.github_api_base.clone(),
        token: config.credential.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    }
}

/// Builds the GitHub client from `cli` and runs its subcommand, writing machine
/// output to stdout.
pub async fn run_cli(cli: Cli) -> Result<()> {
    let config = sync_config(&cli);
    if config.credential.trim().is_empty() {
        anyhow::bail!("GitHub token is empty; set CI_TOKEN or pass --github-token");
    }
    let client = GithubApiClient::new(&github_client_config(&cli, &config))
        .context("failed to create github api client")?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute_command(&client, &config, &cli.command, &mut out).await
}

/// Runs one subcommand against `platform`.
pub async fn execute_command(
    platform: &dyn Platform,
    config: &SyncConfig,
    command: &CliCommand,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        CliCommand::LinkToIssue {
            repo_name,
            pr_number,
        } => {
            let report = link_pull_request(platform, config, repo_name, *pr_number)
                .await
                .with_context(|| format!("failed to link {repo_name}#{pr_number}"))?;
            let status = match report.outcome {
                ReconcileOutcome::Unchanged { .. } => "unchanged",
                ReconcileOutcome::Updated { .. } => "updated",
            };
            info!(
                issue = %format!("{}#{}", report.issue.repo, report.issue.number),
                status,
                linked = report.outcome.records().len(),
                "link to issue complete"
            );
        }
        CliCommand::TriggerWorkflows {
            repo_name,
            pr_number,
            workflow_ref,
            ignore_repo,
            mode,
        } => {
            let ignore_repos = ignore_repo
                .iter()
                .map(|repo| repo.trim().to_string())
                .collect::<BTreeSet<_>>();
            let report = trigger_workflows(
                platform,
                config,
                repo_name,
                *pr_number,
                workflow_ref,
                &ignore_repos,
                (*mode).into(),
            )
            .await
            .with_context(|| format!("failed to trigger workflows for {repo_name}#{pr_number}"))?;
            for problem in report.problems() {
                warn!(
                    repo = %problem.repo,
                    number = problem.number,
                    result = ?problem.result,
                    "workflow was not fully triggered"
                );
            }
            info!(
                triggered = report.triggered(),
                total = report.outcomes.len(),
                "trigger workflows complete"
            );
        }
        CliCommand::FindCommits {
            repo_name,
            pr_number,
        } => {
            let map = find_commits_for_syncing(platform, config, repo_name, *pr_number)
                .await
                .with_context(|| format!("failed to find commits for {repo_name}#{pr_number}"))?;
            let rendered = serde_json::to_string(&map).context("failed to encode commit map")?;
            writeln!(out, "{rendered}").context("failed to write commit map")?;
        }
    }
    Ok(())
}
