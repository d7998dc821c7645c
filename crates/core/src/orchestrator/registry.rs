//! Concurrency-bounded worker registries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Keyed collection of active workers with a concurrency ceiling.
///
/// Owned by the orchestrator (never process-wide) so independent instances
/// can coexist in tests. Admission is atomic: `try_add` refuses duplicates
/// and refuses to grow past the ceiling, with no partial mutation.
pub struct WorkerRegistry<W> {
    entries: RwLock<HashMap<Uuid, Arc<W>>>,
    limit: usize,
}

impl<W> WorkerRegistry<W> {
    /// Create a registry with the given ceiling, clamped to at least 1.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admit a worker. Returns false, without mutating, when an entry
    /// already exists for the id or the registry is at capacity.
    pub async fn try_add(&self, id: Uuid, worker: Arc<W>) -> bool {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.limit || entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, worker);
        true
    }

    /// Remove an entry. Idempotent.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<W>> {
        self.entries.write().await.remove(&id)
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<W>> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn at_capacity(&self) -> bool {
        self.entries.read().await.len() >= self.limit
    }

    /// Stable snapshot of the current entries for iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<(Uuid, Arc<W>)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, worker)| (*id, Arc::clone(worker)))
            .collect()
    }
}
