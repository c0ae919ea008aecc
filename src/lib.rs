//! Stitch - runtime script and stylesheet bundler
//!
//! Resolves an ordered list of script or stylesheet tokens (local files,
//! wildcard names, whitelisted remote resources), runs each through the
//! transform pipeline, concatenates them in order and caches the artifact
//! until one of its source files changes.

pub mod audit;
pub mod bundle;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod remote;
pub mod resolve;

pub use bundle::{BundleRequest, Bundler, ResourceKind};
pub use error::{BundleError, BundleResult};
