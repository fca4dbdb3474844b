// # State Store Trait
//
// Defines the durable backend behind the `DomainStore`.
//
// ## Purpose
//
// The backend persists one key-value document holding:
// - `provisionKey`: digest of the master provisioning secret
// - `domains`: every provisioned subdomain and its record
//
// `DomainStore` keeps the document in memory and hands the whole of it
// to `save()` after every mutation (write-through).
//
// ## Implementations
//
// - File-based: JSON file with atomic replace and backup recovery
// - Memory: non-durable, for tests and ephemeral deployments
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "provisionKey": "<sha512 hex>",
//   "domains": {
//     "alice": {
//       "subdomain": "alice",
//       "subKeyHash": "<sha512 hex>",
//       "dest": "1.2.3.4",
//       "lastModified": 0,
//       "provisionedAt": 1760000000000,
//       "remoteRecordId": "372e67954025e0ba6aaa6d586b9e0b59"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::secret::SecretDigest;
use crate::traits::dns_provider::RemoteRecordId;

/// State document format version
pub const STATE_DOCUMENT_VERSION: &str = "1.0";

/// One provisioned subdomain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    /// Client-chosen label, unique and immutable
    ///
    /// Older documents only carry it as the map key; the store fills it in
    /// on load.
    #[serde(default)]
    pub subdomain: String,

    /// Digest of the per-subdomain secret, set once at creation
    #[serde(rename = "subKeyHash")]
    pub secret_hash: SecretDigest,

    /// Address the subdomain currently resolves to
    #[serde(rename = "dest")]
    pub destination: Ipv4Addr,

    /// Unix milliseconds of the last successful update, 0 if never updated
    #[serde(default)]
    pub last_modified: i64,

    /// Unix milliseconds of provisioning
    #[serde(default)]
    pub provisioned_at: i64,

    /// Provider identifier of the A record
    #[serde(default)]
    pub remote_record_id: RemoteRecordId,
}

impl DomainRecord {
    /// Build the record committed at provisioning time
    pub fn new(
        subdomain: impl Into<String>,
        secret_hash: SecretDigest,
        destination: Ipv4Addr,
        remote_record_id: RemoteRecordId,
        provisioned_at: i64,
    ) -> Self {
        Self {
            subdomain: subdomain.into(),
            secret_hash,
            destination,
            last_modified: 0,
            provisioned_at,
            remote_record_id,
        }
    }

    /// Start of the current cooldown window
    ///
    /// Creating the remote record counts as a write, so a fresh record is
    /// anchored at its provisioning time until its first update.
    pub fn cooldown_anchor(&self) -> i64 {
        self.last_modified.max(self.provisioned_at)
    }
}

/// The whole persisted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: String,

    /// Digest of the master provisioning secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision_key: Option<SecretDigest>,

    #[serde(default)]
    pub domains: HashMap<String, DomainRecord>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            provision_key: None,
            domains: HashMap::new(),
        }
    }
}

fn default_version() -> String {
    STATE_DOCUMENT_VERSION.to_string()
}

/// Trait for durable state backends
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Buffer writes: `save()` returns only once the document is durable
/// - ❌ Decide ownership or cooldown (owned by the services)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted document
    ///
    /// Returns an empty document if nothing has been persisted yet.
    async fn load(&self) -> Result<StateDocument, crate::Error>;

    /// Durably replace the persisted document
    async fn save(&self, document: &StateDocument) -> Result<(), crate::Error>;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;
}
