//! Request fingerprinting
//!
//! A bundle request is identified by a SHA256 over its resource kind,
//! minify flag and ordered path tokens. Each token is length-prefixed so
//! `["ab", "c"]` and `["a", "bc"]` cannot collide.

use crate::bundle::ResourceKind;
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-addressed cache key for a bundle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Compute the cache key for an ordered token list
pub fn fingerprint<S: AsRef<str>>(kind: ResourceKind, minify: bool, tokens: &[S]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    hasher.update([u8::from(minify)]);

    for token in tokens {
        let token = token.as_ref().as_bytes();
        hasher.update((token.len() as u64).to_le_bytes());
        hasher.update(token);
    }

    CacheKey(hasher.finalize().into())
}
