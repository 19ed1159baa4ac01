use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use quorum_models::DecisionReport;
use uuid::Uuid;

/// Hot cache of recently saved or read reports, keyed by run id.
///
/// Entries are evicted after the TTL or when capacity is exceeded.
pub struct MemoryCache {
    inner: Cache<Uuid, Arc<DecisionReport>>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<DecisionReport>> {
        self.inner.get(id).await
    }

    pub async fn insert(&self, report: Arc<DecisionReport>) {
        self.inner.insert(report.id, report).await;
    }

    pub async fn invalidate(&self, id: &Uuid) {
        self.inner.invalidate(id).await;
    }
}
