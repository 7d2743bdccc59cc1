//! Cross-repository pull request synchronization.
//!
//! Pull requests name a tracking issue with a `[SyncWith: org/repo#N]` title tag.
//! The tracking issue carries one managed comment whose hidden payload lists every
//! linked pull request; this crate parses the tag, reads and reconciles that
//! payload, and drives the consumers (workflow re-runs, commit map) over it.

pub mod comment_envelope;
pub mod commit_map;
pub mod issue_resolver;
pub mod linked_pr_record;
pub mod platform;
pub mod reconciler;
pub mod sync_config;
pub mod sync_error;
pub mod sync_state_reader;
pub mod tag_grammar;
pub mod workflow_dispatcher;


pub use comment_envelope::{CommentEnvelope, EnvelopeKind, LinkedPrsEnvelope};
pub use commit_map::{emit_commit_map, find_commits_for_syncing, CommitMap, CommitMapEntry};
pub use issue_resolver::{resolve, resolve_trigger, TriggerContext};
pub use linked_pr_record::LinkedPrRecord;
pub use platform::{Platform, PlatformError, PlatformResult};
pub use reconciler::{link_pull_request, reconcile, LinkReport, ReconcileOutcome, StateWrite};
pub use sync_config::SyncConfig;
pub use sync_error::{SyncError, SyncResult};
pub use tag_grammar::{get_sync_target, parse_tags, SyncTarget, SYNC_WITH_TAG};
pub use workflow_dispatcher::{
    dispatch_or_rerun, trigger_workflows, BranchFailure, DispatchMode, DispatchReport,
    RecordDispatch,
};
