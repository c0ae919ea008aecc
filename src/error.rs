//! Error types for stitch
//!
//! All modules use `BundleResult<T>` as their return type. `BundleError` is
//! `Clone` because a single failed build is handed to every caller that was
//! waiting on it.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for stitch operations
pub type BundleResult<T> = Result<T, BundleError>;

/// All errors that can occur while building a bundle
#[derive(Error, Debug, Clone)]
pub enum BundleError {
    // Remote resource errors
    #[error("Remote resource token is not whitelisted: {token}")]
    NotWhitelisted { token: String },

    #[error("Remote downloads are disabled, refusing to fetch {token}")]
    RemoteDisabled { token: String },

    #[error("Timed out after {limit_ms}ms fetching {url}")]
    FetchTimeout { url: String, limit_ms: u64 },

    #[error("Remote resource {url} exceeds the {limit} byte limit")]
    FetchTooLarge { url: String, limit: u64 },

    #[error("Failed to fetch {url}: {reason}")]
    FetchTransport { url: String, reason: String },

    // Local resource errors
    #[error("Local file not found: {token} (searched: {searched})")]
    LocalFileNotFound { token: String, searched: String },

    // Pipeline errors
    #[error("{stage} failed for {path}: {reason}")]
    Transform {
        stage: String,
        path: String,
        reason: String,
    },

    #[error("Bundle build failed {context}: {source}")]
    BuildFailed {
        context: String,
        #[source]
        source: Box<BundleError>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid whitelist entry '{token}': {reason}")]
    WhitelistInvalid { token: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BundleError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a transform error for a pipeline stage
    pub fn transform(
        stage: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Transform {
            stage: stage.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a concrete failure as the aggregate build failure
    pub fn build_failed(context: impl Into<String>, source: BundleError) -> Self {
        Self::BuildFailed {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The concrete failure underneath any `BuildFailed` wrapping
    pub fn root_cause(&self) -> &BundleError {
        match self {
            Self::BuildFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::FetchTimeout { .. } | Self::FetchTransport { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.root_cause() {
            Self::NotWhitelisted { .. } => {
                Some("Register the token under [[remote.whitelist]] in the config")
            }
            Self::RemoteDisabled { .. } => Some("Set remote.allow_downloads = true"),
            Self::FetchTooLarge { .. } => Some("Raise remote.max_bytes (0 disables the limit)"),
            Self::FetchTimeout { .. } => Some("Raise remote.timeout_ms (0 disables the limit)"),
            Self::LocalFileNotFound { .. } => {
                Some("Check script.search_paths / style.search_paths in the config")
            }
            _ => None,
        }
    }
}

impl From<toml::de::Error> for BundleError {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(e.to_string())
    }
}

impl From<toml::ser::Error> for BundleError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e.to_string())
    }
}
