use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info};

use super::{ttl_seconds, KeyValueStore, Namespace};
use crate::error::SessionResult;

/// Redis-backed list store (RPUSH / LRANGE / EXPIRE).
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so each
/// call works on its own handle.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> SessionResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        info!("Redis connection established");
        Ok(Self { manager })
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn append(&self, namespace: &Namespace, key: &str, value: &str) -> SessionResult<()> {
        let full_key = namespace.key(key);
        let mut con = self.manager.clone();
        let len: i64 = redis::cmd("RPUSH")
            .arg(&full_key)
            .arg(value)
            .query_async(&mut con)
            .await?;
        debug!("RPUSH {} -> {} entries", full_key, len);
        Ok(())
    }

    async fn read_list(&self, namespace: &Namespace, key: &str) -> SessionResult<Vec<String>> {
        let mut con = self.manager.clone();
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(namespace.key(key))
            .arg(0)
            .arg(-1)
            .query_async(&mut con)
            .await?;
        Ok(values)
    }

    async fn expire(&self, namespace: &Namespace, key: &str, ttl: Duration) -> SessionResult<()> {
        let mut con = self.manager.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(namespace.key(key))
            .arg(ttl_seconds(ttl))
            .query_async(&mut con)
            .await?;
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
        let mut con = self.manager.clone();
        // MULTI/EXEC: both commands apply or neither does
        let (len,): (i64,) = redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(&full_key)
            .arg(value)
            .cmd("EXPIRE")
            .arg(&full_key)
            .arg(ttl_seconds(ttl))
            .ignore()
            .query_async(&mut con)
            .await?;
        debug!("RPUSH+EXPIRE {} -> {} entries", full_key, len);
        Ok(())
    }

    async fn ping(&self) -> SessionResult<()> {
        let mut con = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }
}
