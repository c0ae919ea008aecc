//! Artifact cache
//!
//! Bundles are cached by request fingerprint and tied to the liveness of
//! every local file that contributed to them. Entries are immutable: a
//! changed source evicts the entry and the next request rebuilds it.
//!
//! # Entry Lifecycle
//!
//! | State | Description |
//! |-------|-------------|
//! | Miss | No entry, first caller takes the build slot |
//! | Building | In flight, later callers join and share the outcome |
//! | Live | Cached, all monitors match, not expired |
//! | Stale | A monitor changed or the entry expired, evicted on access |
//!
//! Expired entries nobody asks for again are swept when a later build is
//! published. `FileStore` keeps artifacts on disk across restarts.

pub mod disk;
pub mod monitor;
pub mod single_flight;
pub mod store;

pub use disk::FileStore;
pub use monitor::{FileSignature, SourceMonitor};
pub use single_flight::{BundleCache, Built};
pub use store::{Artifact, CacheEntry, CacheStore, MemoryStore};
