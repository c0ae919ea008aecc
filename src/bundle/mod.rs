//! Bundle requests and the build orchestrator
//!
//! A build walks through these stages; any failure is terminal and nothing
//! is cached:
//!
//! ```text
//! Expanding ─► Resolving ─► Loading ─► Transforming ─► Concatenating
//!   ─► PostProcessing ─► Minifying ─► Caching ─► Done
//! ```
//!
//! `Expanding` only does work for styles, replacing named bundles with their
//! member paths.

pub mod build;

pub use build::{Bundler, BundlerBuilder};

use crate::fingerprint::{fingerprint, CacheKey};
use crate::remote::FetchLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of resource being bundled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Script,
    Style,
}

impl ResourceKind {
    /// File extension that marks a token as a local file of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Style => "css",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound bundle call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub kind: ResourceKind,
    pub minify: bool,
    /// Path tokens in output order
    pub tokens: Vec<String>,
}

impl BundleRequest {
    pub fn new<I, S>(kind: ResourceKind, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            minify: false,
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn script<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ResourceKind::Script, tokens)
    }

    pub fn style<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ResourceKind::Style, tokens)
    }

    pub fn minified(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    /// Cache key of this request
    pub fn key(&self) -> CacheKey {
        fingerprint(self.kind, self.minify, &self.tokens)
    }
}

/// Settings for a single build.
///
/// `root_folder` changes as local entries resolve and is never shared with
/// another build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub minify: bool,
    pub normalize: bool,
    pub cache_key: CacheKey,
    pub allow_remote: bool,
    pub limits: FetchLimits,
    /// Directory of the most recently resolved local entry
    pub root_folder: Option<PathBuf>,
}

/// Where a build currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Expanding,
    Resolving,
    Loading,
    Transforming,
    Concatenating,
    PostProcessing,
    Minifying,
    Caching,
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Expanding => "expanding",
            Self::Resolving => "resolving",
            Self::Loading => "loading",
            Self::Transforming => "transforming",
            Self::Concatenating => "concatenating",
            Self::PostProcessing => "post-processing",
            Self::Minifying => "minifying",
            Self::Caching => "caching",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}
