//! Key-value persistence backends
//!
//! The moderation core only ever talks to [`KeyValueStore`]. Values are UTF-8
//! JSON snapshots addressed by string keys such as `member||{guild}|{user}`.

mod file;
mod memory;

pub use file::YamlFileStore;
pub use memory::MemoryStore;

use crate::error::PaladinResult;
use async_trait::async_trait;

/// A get/set-by-key store with pattern enumeration
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the raw value stored under `key`
    async fn get(&self, key: &str) -> PaladinResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Vec<u8>) -> PaladinResult<()>;

    /// List every key matching a glob pattern such as `member||*`
    async fn keys(&self, pattern: &str) -> PaladinResult<Vec<String>>;

    /// Atomically increment the counter stored under `key` and return the new value
    async fn incr(&self, key: &str) -> PaladinResult<u64>;
}

/// Matches keys against a glob pattern, falling back to literal comparison
/// when the pattern does not compile
pub(crate) enum KeyMatcher {
    Glob(glob::Pattern),
    Literal(String),
}

impl KeyMatcher {
    pub(crate) fn new(pattern: &str) -> Self {
        glob::Pattern::new(pattern)
            .map_or_else(|_| Self::Literal(pattern.to_string()), Self::Glob)
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        match self {
            Self::Glob(pattern) => pattern.matches(key),
            Self::Literal(literal) => literal == key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_matcher_prefix() {
        let pattern = KeyMatcher::new("member||*");
        assert!(pattern.matches("member||1|2"));
        assert!(!pattern.matches("guild||1"));
    }

    #[test]
    fn test_key_matcher_invalid_pattern_is_literal() {
        let pattern = KeyMatcher::new("guild||[");
        assert!(pattern.matches("guild||["));
        assert!(!pattern.matches("guild||1"));
    }
}
