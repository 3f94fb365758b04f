//! Key-value list store used for conversation history
//!
//! Every operation takes the deployment [`Namespace`] explicitly, so tenant
//! isolation in a shared keyspace is a parameter of each call rather than a
//! process-wide default.

mod memory;
mod redis_store;

pub use memory::{Clock, ManualClock, MemoryStore, SystemClock};
pub use redis_store::RedisStore;

use std::fmt;
use std::time::Duration;

use crate::error::{SessionError, SessionResult};

/// Non-empty key prefix for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> SessionResult<Self> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(SessionError::InvalidNamespace("namespace prefix must not be empty".into()));
        }
        if prefix.chars().any(char::is_whitespace) {
            return Err(SessionError::InvalidNamespace(format!(
                "namespace prefix must not contain whitespace: {:?}",
                prefix
            )));
        }
        Ok(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full store key for `key` inside this namespace.
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.0, key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whole seconds of a TTL, at least one. Key expiry has second
/// granularity and a zero TTL would drop the key on write.
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// The list operations history needs, plus a liveness probe.
///
/// Each call is a single store round-trip. Sequences of calls are not
/// atomic with respect to other clients.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Append `value` to the tail of the list at `key`, creating it if needed.
    async fn append(&self, namespace: &Namespace, key: &str, value: &str) -> SessionResult<()>;

    /// Whole list in insertion order; empty when the key is missing or expired.
    async fn read_list(&self, namespace: &Namespace, key: &str) -> SessionResult<Vec<String>>;

    /// (Re)set the time-to-live of `key`. No-op for a missing key.
    async fn expire(&self, namespace: &Namespace, key: &str, ttl: Duration) -> SessionResult<()>;

    /// Append and (re)set the time-to-live as one store operation, so a key
    /// never exists without an expiry.
    async fn append_with_ttl(
        &self,
        namespace: &Namespace,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> SessionResult<()>;

    async fn ping(&self) -> SessionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_key() {
        let ns = Namespace::new("tenant-a:").unwrap();
        assert_eq!(ns.key("history:abc"), "tenant-a:history:abc");
        assert_eq!(ns.to_string(), "tenant-a:");
    }

    #[test]
    fn test_namespace_rejects_blank() {
        assert!(matches!(Namespace::new(""), Err(SessionError::InvalidNamespace(_))));
        assert!(matches!(Namespace::new("   "), Err(SessionError::InvalidNamespace(_))));
        assert!(matches!(Namespace::new("a b:"), Err(SessionError::InvalidNamespace(_))));
    }

    #[test]
    fn test_ttl_seconds_clamps_to_one() {
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(86_400)), 86_400);
    }
}
