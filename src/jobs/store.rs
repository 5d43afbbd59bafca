use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::foundation::error::PreviewResult;

/// Generic key-value store with per-record expiry.
///
/// `get` may return `None` at any time once a record expires; callers treat that exactly like a
/// key that never existed.
pub trait KvStore {
    /// Write `value` under `key`, replacing any previous record and its expiry.
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = PreviewResult<()>>;

    /// Read the live record under `key`.
    fn get(&self, key: &str) -> impl Future<Output = PreviewResult<Option<String>>>;

    /// Remove `key`. Removing a missing key is not an error.
    fn del(&self, key: &str) -> impl Future<Output = PreviewResult<()>>;
}

#[derive(Debug)]
struct Record {
    value: String,
    expires_at: Instant,
}

/// In-process [`KvStore`] on tokio's clock, so paused-time tests can expire records.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    records: RefCell<HashMap<String, Record>>,
}

impl MemoryKvStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records that have not expired yet.
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.records
            .borrow()
            .values()
            .filter(|r| r.expires_at > now)
            .count()
    }
}

impl KvStore for MemoryKvStore {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> PreviewResult<()> {
        let now = Instant::now();
        let mut records = self.records.borrow_mut();
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        let pruned = before - records.len();
        if pruned > 0 {
            tracing::debug!(pruned, "expired store records pruned");
        }
        records.insert(
            key.to_owned(),
            Record {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> PreviewResult<Option<String>> {
        let mut records = self.records.borrow_mut();
        let expired = match records.get(key) {
            None => return Ok(None),
            Some(r) => r.expires_at <= Instant::now(),
        };
        if expired {
            records.remove(key);
            tracing::debug!(key, "store record expired");
            return Ok(None);
        }
        Ok(records.get(key).map(|r| r.value.clone()))
    }

    async fn del(&self, key: &str) -> PreviewResult<()> {
        self.records.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jobs/store.rs"]
mod tests;
