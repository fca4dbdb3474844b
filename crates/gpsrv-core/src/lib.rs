// # gpsrv-core
//
// Core library for the GPSrv dynamic-DNS provisioning service.
//
// Clients provision a subdomain under a fixed parent zone, receive a
// secret, and later use that secret to repoint the subdomain's A record.
//
// ## Architecture Overview
//
// - **SecretManager**: Generates, hashes and verifies bearer secrets
// - **DomainStore**: In-memory subdomain map, written through to a StateStore
// - **DnsProvider**: Trait over the external DNS zone API
// - **ProvisioningService**: Master-secret-gated subdomain creation
// - **UpdateService**: Secret-gated, rate-limited destination updates
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Remote first**: Local state is committed only after the provider acknowledged
// 2. **Write-through**: Every mutation is durable before the request completes
// 3. **One-time disclosure**: Only digests are stored; raw secrets are shown once
// 4. **Per-subdomain serialization**: Check-then-act sequences never interleave for one name

pub mod clock;
pub mod config;
pub mod error;
pub mod registry;
pub mod secret;
pub mod service;
pub mod state;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use clock::{Clock, SystemClock};
pub use config::{GpsrvConfig, ProviderConfig, ServiceConfig, StateStoreConfig};
pub use error::{Error, Result};
pub use registry::ProviderRegistry;
pub use secret::{ProvisionKeyBootstrap, RawSecret, SecretDigest, SecretManager};
pub use service::{ProvisionedInfo, ProvisioningService, UpdateService};
pub use state::{FileStateStore, MemoryStateStore};
pub use store::DomainStore;
pub use traits::{DnsProvider, DomainRecord, RemoteRecordId, StateDocument, StateStore};
