use clap::{Parser, Subcommand};
use tau_pr_sync_github::github_api_client::DEFAULT_GITHUB_API_BASE;

use crate::CliDispatchMode;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_repo_full_name(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    match trimmed.split_once('/') {
        Some((owner, name))
            if !owner.trim().is_empty() && !name.trim().is_empty() && !name.contains('/') =>
        {
            Ok(trimmed.to_string())
        }
        _ => Err(format!("invalid repository '{value}', expected org/repo")),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tau-pr-sync",
    about = "Synchronize pull requests across repositories through a shared tracking issue",
    version
)]
pub struct Cli {
    #[arg(
        long = "github-token",
        env = "CI_TOKEN",
        hide_env_values = true,
        help = "GitHub token used for every API call"
    )]
    pub github_token: String,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_URL",
        default_value = DEFAULT_GITHUB_API_BASE,
        help = "Base URL of the GitHub REST API"
    )]
    pub github_api_base: String,

    #[arg(
        long = "default-org",
        env = "SYNC_DEFAULT_ORG",
        default_value = "",
        help = "Organisation for relative tags; defaults to the triggering repository owner"
    )]
    pub default_org: String,

    #[arg(
        long = "request-timeout-ms",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for a single GitHub API request"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Attempts per GitHub request on throttling, server and transport errors"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "max-write-attempts",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Read-merge-write rounds before the comment is written unconditionally"
    )]
    pub max_write_attempts: usize,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// Record a pull request in the tracking issue named by its SyncWith tag.
    LinkToIssue {
        #[arg(
            value_parser = parse_repo_full_name,
            help = "Repository of the pull request, org/repo"
        )]
        repo_name: String,
        #[arg(value_parser = parse_positive_u64)]
        pr_number: u64,
    },
    /// Re-trigger a workflow in every repository linked to the tracking issue.
    TriggerWorkflows {
        #[arg(
            value_parser = parse_repo_full_name,
            help = "Repository of the pull request, org/repo"
        )]
        repo_name: String,
        #[arg(value_parser = parse_positive_u64)]
        pr_number: u64,
        #[arg(help = "Workflow reference, as in ${{ github.workflow_ref }}")]
        workflow_ref: String,
        #[arg(long = "ignore-repo", help = "Repository to leave untouched; repeatable")]
        ignore_repo: Vec<String>,
        #[arg(long, value_enum, default_value_t = CliDispatchMode::Rerun)]
        mode: CliDispatchMode,
    },
    /// Print the branch and newest commit of every linked pull request as JSON.
    FindCommits {
        #[arg(
            value_parser = parse_repo_full_name,
            help = "Repository of the pull request, org/repo"
        )]
        repo_name: String,
        #[arg(value_parser = parse_positive_u64)]
        pr_number: u64,
    },
}
