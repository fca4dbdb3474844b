// # DNS Provider Trait
//
// Defines the interface for creating and repointing A records in the
// external DNS zone.
//
// ## Implementations
//
// - Cloudflare: `gpsrv-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use gpsrv_core::DnsProvider;
//
// let id = provider.create_record("alice.is-a.pregnant.horse", "1.2.3.4".parse()?).await?;
// provider.update_record(&id, "5.6.7.8".parse()?).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Opaque identifier the provider assigned to a created record
///
/// Required for every later update of that record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecordId(String);

impl RemoteRecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RemoteRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for DNS provider implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// DNS providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (a failed call fails the request)
/// - ❌ Access the domain store (owned by the services)
/// - ❌ Cache state beyond a single request
/// - ❌ Enable proxying/CDN on records (raw resolution is required)
///
/// Every call is a single attempt. The services bound it with a timeout
/// and only commit local state after it returns `Ok`.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create an A record `name -> address`
    ///
    /// # Parameters
    ///
    /// - `name`: Fully qualified record name (subdomain plus parent zone)
    /// - `address`: IPv4 address the record resolves to
    ///
    /// # Returns
    ///
    /// - `Ok(RemoteRecordId)`: Identifier of the created record
    /// - `Err(Error)`: If the record could not be created
    async fn create_record(
        &self,
        name: &str,
        address: Ipv4Addr,
    ) -> Result<RemoteRecordId, crate::Error>;

    /// Repoint an existing A record to a new address
    ///
    /// # Parameters
    ///
    /// - `record_id`: Identifier returned by [`DnsProvider::create_record`]
    /// - `address`: New IPv4 address
    async fn update_record(
        &self,
        record_id: &RemoteRecordId,
        address: Ipv4Addr,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
