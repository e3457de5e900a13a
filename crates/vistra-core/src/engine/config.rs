use thiserror::Error;

/// Default concurrency of the import worker pool.
pub const DEFAULT_IMPORT_CONCURRENCY: usize = 8;
/// The snapshot pool is serialized so copy snapshots have a deterministic
/// order and partial writes never interleave.
pub const SNAPSHOT_CONCURRENCY: usize = 1;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Tuning knobs of the mutation engine and its background pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of concurrent import/decode workers.
    pub import_concurrency: usize,
    /// Whether a cross-parent move that empties a non-root group also
    /// removes that group (observed legacy behavior).
    pub prune_empty_groups: bool,
    /// Maximum retained undo groups; `None` keeps the full history.
    pub undo_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            import_concurrency: DEFAULT_IMPORT_CONCURRENCY,
            prune_empty_groups: true,
            undo_limit: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    import_concurrency: Option<usize>,
    prune_empty_groups: Option<bool>,
    undo_limit: Option<Option<usize>>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import_concurrency(mut self, n: usize) -> Self {
        self.import_concurrency = Some(n);
        self
    }

    pub fn prune_empty_groups(mut self, prune: bool) -> Self {
        self.prune_empty_groups = Some(prune);
        self
    }

    pub fn undo_limit(mut self, limit: Option<usize>) -> Self {
        self.undo_limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::default();
        let import_concurrency = self
            .import_concurrency
            .unwrap_or(defaults.import_concurrency);
        if import_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "import_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        let undo_limit = self.undo_limit.unwrap_or(defaults.undo_limit);
        if undo_limit == Some(0) {
            return Err(ConfigError::Invalid {
                name: "undo_limit",
                reason: "must be at least 1 when bounded".to_string(),
            });
        }
        Ok(EngineConfig {
            import_concurrency,
            prune_empty_groups: self
                .prune_empty_groups
                .unwrap_or(defaults.prune_empty_groups),
            undo_limit,
        })
    }
}
