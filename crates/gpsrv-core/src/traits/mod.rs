//! Core traits for the GPSrv service
//!
//! - [`DnsProvider`]: Create and repoint A records via a provider API
//! - [`StateStore`]: Durable backend for the domain document

pub mod dns_provider;
pub mod state_store;

pub use dns_provider::{DnsProvider, DnsProviderFactory, RemoteRecordId};
pub use state_store::{DomainRecord, StateDocument, StateStore};
