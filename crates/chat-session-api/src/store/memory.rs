use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ttl_seconds, KeyValueStore, Namespace};
use crate::error::SessionResult;

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

struct ListEntry {
    values: Vec<String>,
    expires_at: Option<Instant>, // None: no expiry
}

impl ListEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Same whole-second rounding as Redis `EXPIRE`.
fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now + Duration::from_secs(ttl_seconds(ttl))
}

/// In-process list store with Redis-like semantics: lazy expiry on access,
/// appends to an expired key start a fresh list without a TTL.
#[derive(Clone)]
pub struct MemoryStore {
    map: Arc<DashMap<String, ListEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of live keys across all namespaces.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.map.iter().filter(|r| !r.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_if_expired(&self, key: &str, now: Instant) {
        self.map.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn append(&self, namespace: &Namespace, key: &str, value: &str) -> SessionResult<()> {
        let full_key = namespace.key(key);
        self.evict_if_expired(&full_key, self.clock.now());
        self.map
            .entry(full_key)
            .or_insert_with(|| ListEntry {
                values: Vec::new(),
                expires_at: None,
            })
            .values
            .push(value.to_string());
        Ok(())
    }

    async fn read_list(&self, namespace: &Namespace, key: &str) -> SessionResult<Vec<String>> {
        let full_key = namespace.key(key);
        self.evict_if_expired(&full_key, self.clock.now());
        Ok(self
            .map
            .get(&full_key)
            .map(|entry| entry.values.clone())
            .unwrap_or_default())
    }

    async fn expire(&self, namespace: &Namespace, key: &str, ttl: Duration) -> SessionResult<()> {
        let full_key = namespace.key(key);
        let now = self.clock.now();
        self.evict_if_expired(&full_key, now);
        if let Some(mut entry) = self.map.get_mut(&full_key) {
            entry.expires_at = Some(expiry_after(now, ttl));
        }
        Ok(())
    }

    async fn append_with_ttl(
        &self,
        namespace: &Namespace,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> SessionResult<()> {
        let full_key = namespace.key(key);
        let now = self.clock.now();
        self.evict_if_expired(&full_key, now);

        let mut entry = self.map.entry(full_key).or_insert_with(|| ListEntry {
            values: Vec::new(),
            expires_at: None,
        });
        entry.values.push(value.to_string());
        entry.expires_at = Some(expiry_after(now, ttl));
        Ok(())
    }

    async fn ping(&self) -> SessionResult<()> {
        Ok(())
    }
}
