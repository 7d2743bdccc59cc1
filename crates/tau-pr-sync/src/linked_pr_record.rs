use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::comment_envelope::LinkedPrsEnvelope;
use crate::platform::PullRequest;

const VISIBLE_HEADER: &str = "PRs, synced with the current issue:\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One pull request tracked by a tracking issue.
///
/// Identity is `(repo, number)`; `sha` and `url` are refreshed on every pass.
pub struct LinkedPrRecord {
    /// Base repository full name, `org/name`.
    pub repo: String,
    pub number: u64,
    /// Head commit at recording time.
    pub sha: String,
    pub url: String,
}

impl LinkedPrRecord {
    pub fn from_pull_request(pr: &PullRequest) -> Self {
        Self {
            repo: pr.base_repo().to_string(),
            number: pr.number,
            sha: pr.head.sha.clone(),
            url: pr.html_url.clone(),
        }
    }

    pub fn render_line(&self) -> String {
        format!(
            "- [{}#{}]({}) (SHA: {})",
            self.repo, self.number, self.url, self.sha
        )
    }
}

/// Stable-sorts by `repo` and keeps the first record per repository.
pub fn normalize_records(mut records: Vec<LinkedPrRecord>) -> Vec<LinkedPrRecord> {
    records.sort_by(|left, right| left.repo.cmp(&right.repo));
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.repo.clone()));
    records
}

/// Compact JSON array used as the hidden payload.
pub fn encode_records(records: &[LinkedPrRecord]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}

pub fn decode_records(payload: &str) -> serde_json::Result<Vec<LinkedPrRecord>> {
    serde_json::from_str(payload)
}

pub fn render_visible_text(records: &[LinkedPrRecord]) -> String {
    let mut text = VISIBLE_HEADER.to_string();
    for record in records {
        text.push_str(&record.render_line());
        text.push('\n');
    }
    text
}

/// Builds the managed comment envelope for `records`, normalized first.
pub fn records_envelope(records: &[LinkedPrRecord]) -> serde_json::Result<LinkedPrsEnvelope> {
    let normalized = normalize_records(records.to_vec());
    Ok(LinkedPrsEnvelope::new(
        encode_records(&normalized)?,
        render_visible_text(&normalized),
    ))
}
