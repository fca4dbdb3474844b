// # State Store Implementations
//
// This module provides implementations of the StateStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use crate::config::StateStoreConfig;
use crate::error::Result;
use crate::traits::StateStore;

/// Build the backend described by `config`
pub async fn open(config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
    match config {
        StateStoreConfig::File { path } => Ok(Box::new(FileStateStore::new(path).await?)),
        StateStoreConfig::Memory => {
            tracing::warn!("Using in-memory state store: provisioned domains are lost on restart");
            Ok(Box::new(MemoryStateStore::new()))
        }
    }
}
