//! CLI command implementations

pub mod bundle;
pub mod config;
pub mod whitelist;

pub use bundle::execute as bundle;
pub use config::execute as config;
pub use whitelist::execute as whitelist;
