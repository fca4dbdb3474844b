//! In-memory domain map backed by a durable [`StateStore`]
//!
//! `DomainStore` is the single source of truth for ownership and cooldown
//! state. It loads the persisted document once at startup and writes the
//! full document through to the backend on every mutation. A mutation
//! only becomes visible once the backend has accepted it; if the save
//! fails, the in-memory change is rolled back.
//!
//! ## Per-subdomain serialization
//!
//! The map itself is guarded by an async `RwLock`. Services additionally
//! hold [`DomainStore::lock_subdomain`] across their whole
//! check → provider call → commit sequence, so two requests for the same
//! subdomain never interleave while requests for different subdomains
//! proceed in parallel.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::secret::SecretDigest;
use crate::state::MemoryStateStore;
use crate::traits::state_store::{DomainRecord, StateDocument, StateStore};

/// Guard held while a request owns a subdomain
pub type SubdomainGuard = OwnedMutexGuard<()>;

pub struct DomainStore {
    backend: Box<dyn StateStore>,
    document: RwLock<StateDocument>,
    key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DomainStore {
    /// Load the persisted document from `backend`
    pub async fn open(backend: Box<dyn StateStore>) -> Result<Self> {
        let mut document = backend.load().await?;
        for (subdomain, record) in document.domains.iter_mut() {
            if record.subdomain.is_empty() {
                debug!("Filling in label for record {}", subdomain);
                record.subdomain = subdomain.clone();
            }
        }
        debug!(
            "Loaded {} provisioned domain(s) from {} backend",
            document.domains.len(),
            backend.backend_name()
        );

        Ok(Self {
            backend,
            document: RwLock::new(document),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// A store over a fresh non-durable backend
    pub async fn in_memory() -> Result<Self> {
        Self::open(Box::new(MemoryStateStore::new())).await
    }

    pub async fn get(&self, subdomain: &str) -> Option<DomainRecord> {
        self.document.read().await.domains.get(subdomain).cloned()
    }

    pub async fn contains(&self, subdomain: &str) -> bool {
        self.document.read().await.domains.contains_key(subdomain)
    }

    /// Number of provisioned subdomains
    pub async fn len(&self) -> usize {
        self.document.read().await.domains.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a new record; never overwrites an existing one
    pub async fn create(&self, subdomain: &str, record: DomainRecord) -> Result<()> {
        let mut document = self.document.write().await;
        if document.domains.contains_key(subdomain) {
            return Err(Error::already_provisioned(subdomain));
        }

        document.domains.insert(subdomain.to_string(), record);
        if let Err(e) = self.backend.save(&document).await {
            document.domains.remove(subdomain);
            error!("Failed to persist new record for {}: {}", subdomain, e);
            return Err(e);
        }

        Ok(())
    }

    /// Set `destination` and `lastModified` of an existing record
    ///
    /// `lastModified` never moves backwards.
    pub async fn commit_update(
        &self,
        subdomain: &str,
        destination: Ipv4Addr,
        now_ms: i64,
    ) -> Result<()> {
        let mut document = self.document.write().await;
        let record = document
            .domains
            .get_mut(subdomain)
            .ok_or_else(|| Error::not_found(subdomain))?;

        let previous = (record.destination, record.last_modified);
        record.destination = destination;
        record.last_modified = record.last_modified.max(now_ms);

        if let Err(e) = self.backend.save(&document).await {
            if let Some(record) = document.domains.get_mut(subdomain) {
                (record.destination, record.last_modified) = previous;
            }
            error!("Failed to persist update for {}: {}", subdomain, e);
            return Err(e);
        }

        Ok(())
    }

    /// Digest of the master provisioning secret, if one was bootstrapped
    pub async fn provision_key(&self) -> Option<SecretDigest> {
        self.document.read().await.provision_key.clone()
    }

    /// Replace the master secret digest (write-through)
    pub async fn set_provision_key(&self, digest: SecretDigest) -> Result<()> {
        let mut document = self.document.write().await;
        let previous = document.provision_key.replace(digest);

        if let Err(e) = self.backend.save(&document).await {
            document.provision_key = previous;
            return Err(e);
        }

        Ok(())
    }

    /// Acquire exclusive ownership of `subdomain` for one request
    ///
    /// The subdomain does not need to exist. Entries nobody holds or
    /// waits on are dropped from the lock table on each call.
    pub async fn lock_subdomain(&self, subdomain: &str) -> SubdomainGuard {
        let lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(subdomain.to_string()).or_default())
        };

        lock.lock_owned().await
    }
}

impl std::fmt::Debug for DomainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainStore")
            .field("backend", &self.backend.backend_name())
            .finish_non_exhaustive()
    }
}
