use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::sync_error::{SyncError, SyncResult};

/// Title tag naming the tracking issue a pull request is synchronized with.
pub const SYNC_WITH_TAG: &str = "SyncWith";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\w+):\s*([^\]]+)\]").expect("valid tag regex"))
}

/// Extracts every `[Key: Value]` annotation from `title`.
///
/// Values stop at the first `]`; there is no escaping. Repeated keys keep the
/// last value.
pub fn parse_tags(title: &str) -> BTreeMap<String, String> {
    tag_pattern()
        .captures_iter(title)
        .map(|captures| (captures[1].to_string(), captures[2].to_string()))
        .collect()
}

/// Returns the value of the first `[key: ...]` annotation in `title`.
pub fn find_tag<'a>(title: &'a str, key: &str) -> Option<&'a str> {
    tag_pattern()
        .captures_iter(title)
        .find(|captures| &captures[1] == key)
        .and_then(|captures| captures.get(2))
        .map(|value| value.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Tracking issue coordinates named by a sync tag.
pub struct SyncTarget {
    pub org: String,
    pub repo: String,
    pub issue_number: u64,
}

impl SyncTarget {
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }
}

impl std::fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.org, self.repo, self.issue_number)
    }
}

/// Resolves the `[SyncWith: org/repo#N]` or `[SyncWith: repo#N]` tag of `title`.
///
/// The relative form borrows `default_org`, which must then be non-empty.
pub fn get_sync_target(title: &str, default_org: &str) -> SyncResult<SyncTarget> {
    let value = find_tag(title, SYNC_WITH_TAG).ok_or(SyncError::MissingTag)?;
    let malformed = |reason: &str| SyncError::MalformedTag {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (org, repo_and_number) = match value.split_once('/') {
        Some((org, rest)) => {
            if rest.contains('/') {
                return Err(malformed("expected a single '/' between org and repo"));
            }
            (org.trim(), rest)
        }
        None => {
            let default_org = default_org.trim();
            if default_org.is_empty() {
                return Err(SyncError::NoOrg {
                    value: value.to_string(),
                });
            }
            (default_org, value)
        }
    };
    if org.is_empty() {
        return Err(malformed("organisation is empty"));
    }

    let (repo, number) = repo_and_number
        .split_once('#')
        .ok_or_else(|| malformed("expected repo#number"))?;
    let repo = repo.trim();
    if repo.is_empty() {
        return Err(malformed("repository is empty"));
    }
    let issue_number = number
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|number| *number > 0)
        .ok_or_else(|| malformed("issue number must be a positive integer"))?;

    Ok(SyncTarget {
        org: org.to_string(),
        repo: repo.to_string(),
        issue_number,
    })
}
