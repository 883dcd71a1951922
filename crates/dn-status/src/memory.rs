//! In-memory `StatusStore`, used for unit and integration tests and for
//! running without a Redis dependency.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dn_common::StatusRecord;

use crate::{Result, StatusStore};

#[derive(Default)]
pub struct InMemoryStatusStore {
    entries: DashMap<String, (StatusRecord, Instant)>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(expiry: Instant) -> bool {
        Instant::now() < expiry
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn get(&self, key: &str) -> Result<Option<StatusRecord>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (record, expiry) = entry.value().clone();
        if Self::is_live(expiry) {
            Ok(Some(record))
        } else {
            drop(entry);
            self.entries.remove(key);
            Ok(None)
        }
    }

    async fn put(&self, key: &str, record: &StatusRecord, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (record.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, record: &StatusRecord, ttl: Duration) -> Result<bool> {
        if let Some(existing) = self.entries.get(key) {
            if Self::is_live(existing.value().1) {
                return Ok(false);
            }
        }
        self.entries
            .insert(key.to_string(), (record.clone(), Instant::now() + ttl));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dn_common::StatusRecord;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryStatusStore::new();
        let record = StatusRecord::pending("n1");
        store.put("k1", &record, Duration::from_secs(60)).await.unwrap();
        let fetched = store.get("k1").await.unwrap().unwrap();
        assert_eq!(fetched.notification_id, "n1");
    }

    #[tokio::test]
    async fn get_absent_key_returns_none() {
        let store = InMemoryStatusStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_if_absent_rejects_when_present() {
        let store = InMemoryStatusStore::new();
        let record = StatusRecord::pending("n1");
        assert!(store
            .put_if_absent("k1", &record, Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .put_if_absent("k1", &record, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let store = InMemoryStatusStore::new();
        let record = StatusRecord::pending("n1");
        store
            .put("k1", &record, Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_if_absent_accepts_after_expiry() {
        let store = InMemoryStatusStore::new();
        let record = StatusRecord::pending("n1");
        store
            .put_if_absent("k1", &record, Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store
            .put_if_absent("k1", &record, Duration::from_secs(60))
            .await
            .unwrap());
    }
}
