use std::path::PathBuf;

/// Alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to whoever drives the engine.
///
/// Only configuration and lifecycle calls return these. Per-entity work never
/// fails outward; it logs and skips.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A config value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed to open.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for an [`EngineConfig`](crate::EngineConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// `start` was called on a running engine.
    #[error("engine is already running")]
    AlreadyRunning,

    /// The call needs a running engine.
    #[error("engine is not running")]
    NotRunning,
}
