//! Machine-readable payloads embedded in human-readable issue comments.
//!
//! A managed comment starts with an HTML comment marker carrying the kind tag and
//! the hidden payload, followed by the visible markdown:
//!
//! ```text
//! <!-- LINKED-PR-COMMENT:[{"repo":"acme/widgets",...}] -->
//! PRs, synced with the current issue:
//! ...
//! ```

use std::marker::PhantomData;
use std::sync::OnceLock;

use regex::Regex;

/// Footer appended to comments owned by automation.
pub const CAUTION_FOOTER: &str =
    "\n\n**Note:** Please do not edit this comment; it's generated automatically.";

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<!-- (.*?):(.*?) -->\n(.*)").expect("valid marker regex")
    })
}

/// Identifies one type of managed comment.
pub trait EnvelopeKind {
    /// Sentinel written into the marker line.
    const TAG: &'static str;
    /// Whether rendered comments carry [`CAUTION_FOOTER`].
    const MACHINE_OWNED: bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Tracking-issue comment holding the synchronized pull request set.
pub struct LinkedPrs;

impl EnvelopeKind for LinkedPrs {
    const TAG: &'static str = "LINKED-PR-COMMENT";
    const MACHINE_OWNED: bool = true;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Build report comment; humans may annotate it, so no caution footer.
pub struct BuildReport;

impl EnvelopeKind for BuildReport {
    const TAG: &'static str = "BUILD-REPORT-COMMENT";
    const MACHINE_OWNED: bool = false;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Hidden payload plus visible text of one managed comment of kind `K`.
pub struct CommentEnvelope<K: EnvelopeKind> {
    pub hidden_payload: String,
    pub visible_text: String,
    kind: PhantomData<K>,
}

pub type LinkedPrsEnvelope = CommentEnvelope<LinkedPrs>;

impl<K: EnvelopeKind> CommentEnvelope<K> {
    pub fn new(hidden_payload: impl Into<String>, visible_text: impl Into<String>) -> Self {
        Self {
            hidden_payload: hidden_payload.into(),
            visible_text: visible_text.into(),
            kind: PhantomData,
        }
    }

    /// Decodes `comment_body` when it is a managed comment of this kind.
    ///
    /// `None` means "some other comment", never an error.
    pub fn try_parse(comment_body: &str) -> Option<Self> {
        if !comment_body.contains(K::TAG) {
            return None;
        }
        let captures = marker_pattern().captures(comment_body)?;
        if &captures[1] != K::TAG {
            return None;
        }
        let mut visible_text = captures[3].to_string();
        if K::MACHINE_OWNED {
            if let Some(stripped) = visible_text.strip_suffix(CAUTION_FOOTER) {
                visible_text = stripped.to_string();
            }
        }
        Some(Self::new(&captures[2], visible_text))
    }

    pub fn render(&self) -> String {
        let footer = if K::MACHINE_OWNED { CAUTION_FOOTER } else { "" };
        format!(
            "<!-- {}:{} -->\n{}{footer}",
            K::TAG,
            self.hidden_payload,
            self.visible_text
        )
    }
}
