//! Redis-backed `StatusStore`.
//!
//! `put_if_absent` is `SET key value NX EX ttl` for atomic admission. There
//! is no "owner" concept to compare against, so `put` is a plain
//! unconditional `SET ... EX ttl`.

use std::time::Duration;

use async_trait::async_trait;
use dn_common::{DnError, StatusRecord};
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Result, StatusStore};

pub struct RedisStatusStore {
    conn: Mutex<ConnectionManager>,
}

impl RedisStatusStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| DnError::Infrastructure(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| DnError::Infrastructure(format!("redis connect failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn get(&self, key: &str) -> Result<Option<StatusRecord>> {
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| DnError::Infrastructure(format!("redis GET failed: {e}")))?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| DnError::Infrastructure(format!("status record decode failed: {e}"))),
        }
    }

    async fn put(&self, key: &str, record: &StatusRecord, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| DnError::Infrastructure(format!("status record encode failed: {e}")))?;
        let mut conn = self.conn.lock().await;
        redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| DnError::Infrastructure(format!("redis SET failed: {e}")))?;
        debug!(key, "status record written");
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, record: &StatusRecord, ttl: Duration) -> Result<bool> {
        let json = serde_json::to_string(record)
            .map_err(|e| DnError::Infrastructure(format!("status record encode failed: {e}")))?;
        let mut conn = self.conn.lock().await;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(|e| DnError::Infrastructure(format!("redis SET NX failed: {e}")))?;
        Ok(result.is_some())
    }
}
