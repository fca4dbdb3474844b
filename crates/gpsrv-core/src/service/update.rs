//! Destination updates for provisioned subdomains
//!
//! ```text
//! Provisioned(dest, t0)
//!     ── authorized, cooldown elapsed, provider ack ──► Provisioned(new_dest, t1)
//! ```
//!
//! Any failed transition leaves the record in its prior state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{call_provider, cooldown_remaining, parse_ipv4, required};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::secret::SecretManager;
use crate::store::DomainStore;
use crate::traits::{DnsProvider, DomainRecord};

pub struct UpdateService {
    store: Arc<DomainStore>,
    provider: Arc<dyn DnsProvider>,
    secrets: SecretManager,
    cooldown: Duration,
    provider_timeout: Duration,
}

impl UpdateService {
    pub fn new(
        store: Arc<DomainStore>,
        provider: Arc<dyn DnsProvider>,
        secrets: SecretManager,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            store,
            provider,
            secrets,
            cooldown: config.cooldown(),
            provider_timeout: config.provider_timeout(),
        }
    }

    /// Repoint `subdomain` to `destination`
    ///
    /// Order of checks: missing field → address format → authorization →
    /// cooldown. An unknown subdomain and a wrong secret both yield
    /// `Unauthorized`.
    ///
    /// The per-subdomain lock is held from authorization until the commit,
    /// so two concurrent updates cannot both pass the cooldown check.
    pub async fn update(
        &self,
        secret: Option<&str>,
        subdomain: Option<&str>,
        destination: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let subdomain = required("subdomain", subdomain)?;
        let destination = required("dest", destination).inspect_err(|_| {
            // Older deployments accepted an update carrying only `subdomain`
            debug!("Update for {} rejected: no dest field", subdomain);
        })?;
        let address = parse_ipv4(destination)?;

        let _guard = self.store.lock_subdomain(subdomain).await;

        let record = self.authorize(secret, subdomain).await?;
        let now_ms = now.timestamp_millis();

        if let Some(remaining) = cooldown_remaining(record.cooldown_anchor(), now_ms, self.cooldown)
        {
            debug!(
                "Update for {} rejected: cooldown has {}s left",
                subdomain,
                remaining.as_secs()
            );
            return Err(Error::RateLimited {
                retry_after_secs: remaining.as_millis().div_ceil(1000) as u64,
            });
        }

        call_provider(
            self.provider.provider_name(),
            self.provider_timeout,
            self.provider.update_record(&record.remote_record_id, address),
        )
        .await
        .inspect_err(|e| warn!("Update of {} failed at provider: {}", subdomain, e))?;

        self.store.commit_update(subdomain, address, now_ms).await?;

        info!(
            "Updated {} -> {} (was {})",
            subdomain, address, record.destination
        );
        Ok(())
    }

    async fn authorize(&self, secret: Option<&str>, subdomain: &str) -> Result<DomainRecord> {
        let presented = secret.filter(|s| !s.is_empty());
        let record = self.store.get(subdomain).await;

        match (presented, record) {
            (Some(presented), Some(record)) if self.secrets.verify(presented, &record.secret_hash) => {
                Ok(record)
            }
            _ => {
                warn!("Unauthorized update attempt for {}", subdomain);
                Err(Error::Unauthorized)
            }
        }
    }
}
