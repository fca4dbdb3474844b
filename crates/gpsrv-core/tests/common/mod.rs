//! Test doubles and common utilities for service contract tests
//!
//! This module provides minimal test doubles that record how the services
//! use their collaborators without talking to a real DNS provider.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gpsrv_core::error::{Error, Result};
use gpsrv_core::secret::{ProvisionKeyBootstrap, RawSecret, bootstrap_provision_key};
use gpsrv_core::state::MemoryStateStore;
use gpsrv_core::traits::{DnsProvider, RemoteRecordId, StateDocument, StateStore};
use gpsrv_core::{DomainStore, ProvisioningService, SecretManager, ServiceConfig, UpdateService};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// A mock DnsProvider that tracks calls and can be told to fail or stall
#[derive(Default)]
pub struct MockDnsProvider {
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicU64,
    created: std::sync::Mutex<Vec<(String, Ipv4Addr)>>,
    updated: std::sync::Mutex<Vec<(RemoteRecordId, Ipv4Addr)>>,
}

impl MockDnsProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every following call take `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<(String, Ipv4Addr)> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(RemoteRecordId, Ipv4Addr)> {
        self.updated.lock().unwrap().clone()
    }

    async fn simulate(&self) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "simulated outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn create_record(&self, name: &str, address: Ipv4Addr) -> Result<RemoteRecordId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), address));
        Ok(RemoteRecordId::new(format!("rec-{}", name)))
    }

    async fn update_record(&self, record_id: &RemoteRecordId, address: Ipv4Addr) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        self.updated
            .lock()
            .unwrap()
            .push((record_id.clone(), address));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A StateStore that can be told to reject saves
///
/// Clones share the failure switch and the underlying document.
#[derive(Clone, Default)]
pub struct FailingStateStore {
    inner: MemoryStateStore,
    fail_saves: Arc<AtomicBool>,
}

impl FailingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn persisted(&self) -> StateDocument {
        self.inner.load().await.unwrap()
    }
}

#[async_trait]
impl StateStore for FailingStateStore {
    async fn load(&self) -> Result<StateDocument> {
        self.inner.load().await
    }

    async fn save(&self, document: &StateDocument) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::state_store("disk full"));
        }
        self.inner.save(document).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Store, services and provider wired together with a bootstrapped master secret
pub struct Harness {
    pub store: Arc<DomainStore>,
    pub backend: MemoryStateStore,
    pub provider: Arc<MockDnsProvider>,
    pub provisioning: ProvisioningService,
    pub updates: UpdateService,
    pub master: RawSecret,
    pub config: ServiceConfig,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(ServiceConfig::default()).await
    }

    pub async fn with_config(config: ServiceConfig) -> Self {
        let backend = MemoryStateStore::new();
        let store = Arc::new(DomainStore::open(Box::new(backend.clone())).await.unwrap());
        let secrets = SecretManager::new();

        let master = match bootstrap_provision_key(&store, &secrets, false).await.unwrap() {
            ProvisionKeyBootstrap::Generated { secret, .. } => secret,
            ProvisionKeyBootstrap::Existing => panic!("fresh store has no master secret"),
        };

        let provider = MockDnsProvider::new();
        let dyn_provider: Arc<dyn DnsProvider> = provider.clone();

        Self {
            provisioning: ProvisioningService::new(
                Arc::clone(&store),
                Arc::clone(&dyn_provider),
                secrets.clone(),
                config.clone(),
            ),
            updates: UpdateService::new(Arc::clone(&store), dyn_provider, secrets, &config),
            store,
            backend,
            provider,
            master,
            config,
        }
    }

    /// Provision `subdomain` at `t(0)` and return its secret
    pub async fn provision(&self, subdomain: &str, destination: &str) -> RawSecret {
        self.provisioning
            .provision(
                Some(self.master.expose()),
                Some(subdomain),
                Some(destination),
                t(0),
            )
            .await
            .expect("provisioning succeeds")
            .secret
    }

    pub async fn update(
        &self,
        secret: &str,
        subdomain: &str,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.updates
            .update(Some(secret), Some(subdomain), Some(destination), now)
            .await
    }
}

/// A fixed instant plus `secs` seconds
pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Seconds in the default cooldown window
pub const COOLDOWN_SECS: i64 = 600;
