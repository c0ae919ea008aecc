//! Configuration schema for stitch
//!
//! Configuration is stored at `~/.config/stitch/config.toml`, optionally
//! overlaid by a project-local `.stitch.toml`.

use crate::remote::WhitelistEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote download security settings
    pub remote: RemoteConfig,

    /// Script bundle settings
    pub script: ScriptConfig,

    /// Stylesheet bundle settings
    pub style: StyleConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append remote download decisions to the audit log
    pub audit_log: bool,

    /// Application root that `~/` search paths and tokens map to
    pub root: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: false,
            root: PathBuf::from("."),
        }
    }
}

/// Remote download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Allow whitelisted remote resources to be downloaded
    pub allow_downloads: bool,

    /// Per-fetch time budget in milliseconds (0 = unlimited)
    pub timeout_ms: u64,

    /// Per-fetch size cap in bytes (0 = unlimited)
    pub max_bytes: u64,

    /// Token to URL mappings that may be fetched
    pub whitelist: Vec<WhitelistEntry>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            allow_downloads: false,
            timeout_ms: 300_000,
            max_bytes: 524_288,
            whitelist: Vec::new(),
        }
    }
}

/// Script bundle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Directories searched, in order, for bare script filenames
    pub search_paths: Vec<String>,

    /// Run unminified output through the minifier's pass-through profile
    pub normalize: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            search_paths: vec!["~/".to_string()],
            normalize: false,
        }
    }
}

/// Stylesheet bundle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Directories searched, in order, for bare stylesheet filenames
    pub search_paths: Vec<String>,

    /// Run unminified output through the minifier's pass-through profile
    pub normalize: bool,

    /// Vendor prefixing of the combined stylesheet
    pub prefix: PrefixConfig,

    /// Named bundles expanded in place before resolution
    pub bundles: BTreeMap<String, Vec<String>>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            search_paths: vec!["~/".to_string()],
            normalize: false,
            prefix: PrefixConfig::default(),
            bundles: BTreeMap::new(),
        }
    }
}

/// Vendor prefix settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixConfig {
    /// Enable vendor prefixing
    pub enabled: bool,

    /// Browserslist queries describing the supported browsers
    pub browsers: Vec<String>,
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            browsers: vec!["last 2 versions".to_string()],
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Evict artifacts older than N days (0 = disabled)
    pub expiration_days: u32,

    /// Keep built bundles on disk so they survive restarts
    pub persist: bool,

    /// Where persisted bundles live. Empty means `<state dir>/bundles`; a
    /// relative or `~/` path is under the application root.
    pub directory: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_days: 7,
            persist: false,
            directory: String::new(),
        }
    }
}
