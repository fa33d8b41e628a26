//! Process-wide map of in-flight upload operations
//!
//! An entry exists exactly while an operation runs: the worker registers
//! right before `execute` and the returned [`Registration`] removes the
//! entry when dropped, including on early return or panic. Concurrent
//! workers share one registry through an `Arc`, so cancelling an id reaches
//! whichever batch is currently uploading it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::operation::UploadOperation;

type Entries = HashMap<u64, Arc<dyn UploadOperation>>;

#[derive(Default)]
pub struct ActiveOperationRegistry {
    inner: Mutex<Entries>,
}

impl ActiveOperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        // Entries stay consistent under a poisoned lock: every critical
        // section is a single map call.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `operation` under `id` until the guard drops. A leftover entry
    /// for the same id is cancelled and replaced.
    pub fn register(&self, id: u64, operation: Arc<dyn UploadOperation>) -> Registration<'_> {
        let previous = self.entries().insert(id, operation.clone());

        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &operation) {
                info!(upload_id = id, "Cancelling leftover operation for upload");
                previous.cancel();
            }
        }

        debug!(upload_id = id, "Operation registered");
        Registration {
            registry: self,
            id,
            operation,
        }
    }

    /// Signal the in-flight operation for `id`; false if none is running
    pub fn cancel(&self, id: u64) -> bool {
        let operation = self.entries().get(&id).cloned();
        match operation {
            Some(operation) => {
                operation.cancel();
                info!(upload_id = id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel everything and empty the registry (worker shutdown)
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.entries().drain().collect();
        for (_, operation) in &drained {
            operation.cancel();
        }
        drained.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn active_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    fn release(&self, id: u64, operation: &Arc<dyn UploadOperation>) {
        let mut entries = self.entries();
        // A newer registration may have replaced ours; leave it alone
        if entries
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, operation))
        {
            entries.remove(&id);
            debug!(upload_id = id, "Operation deregistered");
        }
    }
}

/// Keeps a registry entry alive; removes it on drop
#[must_use = "the entry is removed as soon as the registration is dropped"]
pub struct Registration<'a> {
    registry: &'a ActiveOperationRegistry,
    id: u64,
    operation: Arc<dyn UploadOperation>,
}

impl Registration<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.release(self.id, &self.operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{ProgressFn, ResultCode};
    use crate::storage::StorageClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct StubOperation {
        id: u64,
        cancelled: AtomicBool,
    }

    impl StubOperation {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                cancelled: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl UploadOperation for StubOperation {
        fn upload_id(&self) -> u64 {
            self.id
        }

        async fn execute(&self, _client: &StorageClient, _progress: ProgressFn<'_>) -> ResultCode {
            ResultCode::Ok
        }

        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_registration_removed_on_drop() {
        let registry = ActiveOperationRegistry::new();

        {
            let guard = registry.register(1, StubOperation::new(1));
            assert_eq!(guard.id(), 1);
            assert!(registry.contains(1));
            assert_eq!(registry.len(), 1);
        }

        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_reaches_registered_operation() {
        let registry = ActiveOperationRegistry::new();
        let op = StubOperation::new(5);

        let _guard = registry.register(5, op.clone());

        assert!(registry.cancel(5));
        assert!(op.is_cancelled());
        assert!(!registry.cancel(6));
    }

    #[test]
    fn test_leftover_entry_is_cancelled_and_replaced() {
        let registry = ActiveOperationRegistry::new();
        let stale = StubOperation::new(3);
        let fresh = StubOperation::new(3);

        let stale_guard = registry.register(3, stale.clone());
        let fresh_guard = registry.register(3, fresh.clone());

        assert!(stale.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert_eq!(registry.len(), 1);

        // Dropping the stale guard must not evict the fresh entry
        drop(stale_guard);
        assert!(registry.contains(3));

        drop(fresh_guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_all_drains() {
        let registry = ActiveOperationRegistry::new();
        let a = StubOperation::new(1);
        let b = StubOperation::new(2);
        let _ga = registry.register(1, a.clone());
        let _gb = registry.register(2, b.clone());

        assert_eq!(registry.active_ids(), vec![1, 2]);
        assert_eq!(registry.cancel_all(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entry_removed_when_holder_panics() {
        let registry = Arc::new(ActiveOperationRegistry::new());
        let shared = registry.clone();

        let result = std::thread::spawn(move || {
            let _guard = shared.register(9, StubOperation::new(9));
            panic!("operation blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!registry.contains(9));
    }
}
