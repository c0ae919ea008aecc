//! Audit logging for remote downloads
//!
//! Writes JSON lines to `<state_dir>/stitch/audit.log`. Every decision about
//! a remote token is recorded: fetched, rejected by the whitelist, rejected
//! because downloads are off, or failed in transit.

use crate::config::{schema::Config, ConfigManager};
use crate::error::BundleError;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use url::Url;

/// Outcome of handling one remote token
#[derive(Debug, Clone, Copy)]
pub enum RemoteDecision<'a> {
    Fetched { bytes: usize },
    NotWhitelisted,
    Disabled,
    Failed { error: &'a BundleError },
}

impl RemoteDecision<'_> {
    fn event(&self) -> &'static str {
        match self {
            Self::Fetched { .. } => "remote.fetched",
            Self::NotWhitelisted => "remote.not_whitelisted",
            Self::Disabled => "remote.disabled",
            Self::Failed { .. } => "remote.failed",
        }
    }
}

/// File-based audit logger that appends JSON lines
#[derive(Debug, Clone)]
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new audit logger from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Audit logger writing to an explicit file
    pub fn with_path(enabled: bool, path: PathBuf) -> Self {
        Self { enabled, path }
    }

    /// Logger that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record what happened to a remote token
    pub async fn remote(&self, token: &str, url: Option<&Url>, decision: RemoteDecision<'_>) {
        if !self.enabled {
            return;
        }

        let mut data = serde_json::json!({
            "token": token,
            "url": url.map(Url::as_str),
        });
        match decision {
            RemoteDecision::Fetched { bytes } => data["bytes"] = bytes.into(),
            RemoteDecision::Failed { error } => data["error"] = error.to_string().into(),
            RemoteDecision::NotWhitelisted | RemoteDecision::Disabled => {}
        }

        self.log(decision.event(), &data).await;
    }

    /// Log an audit event as a JSON line
    ///
    /// Drops events on IO failure; a broken audit file never fails a build.
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
