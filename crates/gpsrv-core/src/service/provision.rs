//! Subdomain provisioning
//!
//! A provisioning request must carry the master secret. On success the
//! caller receives the per-subdomain secret in plaintext; this is the
//! only time it is ever disclosed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{call_provider, parse_ipv4, required, validate_subdomain};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::secret::{RawSecret, SecretManager};
use crate::store::DomainStore;
use crate::traits::{DnsProvider, DomainRecord};

/// What a successful provisioning hands back to the client
#[derive(Debug, Clone)]
pub struct ProvisionedInfo {
    /// Subdomain as requested
    pub subdomain: String,
    /// Subdomain with the parent zone appended
    pub fqdn: String,
    /// Per-subdomain secret, never retrievable again
    pub secret: RawSecret,
}

pub struct ProvisioningService {
    store: Arc<DomainStore>,
    provider: Arc<dyn DnsProvider>,
    secrets: SecretManager,
    config: ServiceConfig,
}

impl ProvisioningService {
    pub fn new(
        store: Arc<DomainStore>,
        provider: Arc<dyn DnsProvider>,
        secrets: SecretManager,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            provider,
            secrets,
            config,
        }
    }

    /// Provision `subdomain` pointing at `destination`
    ///
    /// Order of checks:
    /// 1. master secret present and valid, else `Unauthorized`
    /// 2. `subdomain` and `destination` present, else `MissingField`
    /// 3. well-formed subdomain and IPv4 destination
    /// 4. subdomain not yet taken, else `AlreadyProvisioned`
    ///
    /// The remote A record is created before anything is stored. If the
    /// provider fails, no local record exists afterwards.
    pub async fn provision(
        &self,
        master_secret: Option<&str>,
        subdomain: Option<&str>,
        destination: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ProvisionedInfo> {
        self.authorize(master_secret).await?;

        let subdomain = required("subdomain", subdomain)?;
        let destination = required("dest", destination)?;
        validate_subdomain(subdomain, &self.config.parent_zone)?;
        let address = parse_ipv4(destination)?;

        // Held until the record is committed: concurrent requests for the
        // same name must not both reach the provider.
        let _guard = self.store.lock_subdomain(subdomain).await;

        if self.store.contains(subdomain).await {
            debug!("Subdomain {} is already provisioned", subdomain);
            return Err(Error::already_provisioned(subdomain));
        }

        let secret = self.secrets.generate_secret()?;
        let secret_hash = self.secrets.hash(secret.expose());
        let fqdn = self.config.fqdn(subdomain);

        let remote_record_id = call_provider(
            self.provider.provider_name(),
            self.provider_timeout(),
            self.provider.create_record(&fqdn, address),
        )
        .await
        .inspect_err(|e| warn!("Provisioning {} failed at provider: {}", fqdn, e))?;

        let record = DomainRecord::new(
            subdomain,
            secret_hash,
            address,
            remote_record_id.clone(),
            now.timestamp_millis(),
        );

        if let Err(e) = self.store.create(subdomain, record).await {
            warn!(
                "Remote record {} for {} was created but could not be stored",
                remote_record_id, fqdn
            );
            return Err(e);
        }

        info!(
            "Provisioned {} -> {} (record {})",
            fqdn, address, remote_record_id
        );

        Ok(ProvisionedInfo {
            subdomain: subdomain.to_string(),
            fqdn,
            secret,
        })
    }

    async fn authorize(&self, master_secret: Option<&str>) -> Result<()> {
        let presented = master_secret
            .filter(|s| !s.is_empty())
            .ok_or(Error::Unauthorized)?;

        let Some(digest) = self.store.provision_key().await else {
            warn!("Provisioning attempted before a master secret was bootstrapped");
            return Err(Error::Unauthorized);
        };

        if !self.secrets.verify(presented, &digest) {
            debug!("Provisioning rejected: master secret mismatch");
            return Err(Error::Unauthorized);
        }

        Ok(())
    }

    fn provider_timeout(&self) -> Duration {
        self.config.provider_timeout()
    }
}
