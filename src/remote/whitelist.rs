//! Remote resource whitelist
//!
//! Requests never carry raw URLs. A remote entry is an opaque token that
//! must be registered here against a vetted absolute URL; anything else is
//! rejected before any network activity.

use crate::error::{BundleError, BundleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// One `[[remote.whitelist]]` entry as written in config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Opaque identifier used in bundle requests
    pub token: String,

    /// Absolute http(s) URL the token stands for
    pub url: String,
}

impl WhitelistEntry {
    pub fn new(token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            url: url.into(),
        }
    }
}

/// Immutable token to URL mapping
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: HashMap<String, Url>,
    order: Vec<String>,
}

impl Whitelist {
    /// Validate and load entries.
    ///
    /// Tokens must be non-empty and unique; URLs must be absolute http(s).
    pub fn from_entries(entries: &[WhitelistEntry]) -> BundleResult<Self> {
        let mut whitelist = Self::default();

        for entry in entries {
            let token = entry.token.trim();
            if token.is_empty() {
                return Err(BundleError::WhitelistInvalid {
                    token: entry.token.clone(),
                    reason: "token cannot be empty".to_string(),
                });
            }

            let url = Url::parse(entry.url.trim()).map_err(|e| BundleError::WhitelistInvalid {
                token: token.to_string(),
                reason: format!("'{}' is not an absolute URL: {}", entry.url, e),
            })?;

            if !matches!(url.scheme(), "http" | "https") {
                return Err(BundleError::WhitelistInvalid {
                    token: token.to_string(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }

            if whitelist.entries.contains_key(token) {
                return Err(BundleError::WhitelistInvalid {
                    token: token.to_string(),
                    reason: "duplicate token".to_string(),
                });
            }

            whitelist.order.push(token.to_string());
            whitelist.entries.insert(token.to_string(), url);
        }

        Ok(whitelist)
    }

    /// Exact-match lookup
    pub fn lookup(&self, token: &str) -> BundleResult<&Url> {
        self.entries
            .get(token)
            .ok_or_else(|| BundleError::NotWhitelisted {
                token: token.to_string(),
            })
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Url)> {
        self.order
            .iter()
            .filter_map(|token| self.entries.get(token).map(|url| (token.as_str(), url)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
