//! Remote resources
//!
//! Whitelist lookup and size/time-capped downloads for path tokens that do
//! not name a local file.

pub mod fetch;
pub mod whitelist;

pub use fetch::{FetchLimits, Fetcher, HttpFetcher};
pub use whitelist::{Whitelist, WhitelistEntry};
