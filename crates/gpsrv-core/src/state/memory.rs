// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a non-durable backend for tests and for deployments where
// losing provisioned domains on restart is acceptable.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash, including the master secret digest
// - A new master secret is generated on the next start
// - Remote records created earlier are orphaned at the provider

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{StateDocument, StateStore};

/// In-memory state store implementation
///
/// Clones share the same document, so a test can keep a handle and
/// inspect what the `DomainStore` persisted.
///
/// # Example
///
/// ```rust
/// use gpsrv_core::state::MemoryStateStore;
/// use gpsrv_core::traits::{StateDocument, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     store.save(&StateDocument::default()).await?;
///     assert_eq!(store.save_count().await, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    document: StateDocument,
    saves: usize,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `document`
    pub fn with_document(document: StateDocument) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryState { document, saves: 0 })),
        }
    }

    /// Number of completed `save()` calls
    pub async fn save_count(&self) -> usize {
        self.inner.read().await.saves
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<StateDocument, Error> {
        Ok(self.inner.read().await.document.clone())
    }

    async fn save(&self, document: &StateDocument) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.document = document.clone();
        guard.saves += 1;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
