/// Default number of read-merge-write rounds before the reconciler writes unconditionally.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Clone)]
/// Explicit settings handed to the resolver and reconciler.
pub struct SyncConfig {
    /// Bearer credential for the platform; never logged.
    pub credential: String,
    /// Organisation used for relative `[SyncWith: repo#N]` tags. Empty disables them.
    pub default_org: String,
    pub max_write_attempts: usize,
}

impl SyncConfig {
    pub fn new(credential: impl Into<String>, default_org: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            default_org: default_org.into(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    pub fn with_max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("credential", &"<redacted>")
            .field("default_org", &self.default_org)
            .field("max_write_attempts", &self.max_write_attempts)
            .finish()
    }
}
