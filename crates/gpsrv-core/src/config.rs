//! Configuration types for the GPSrv service
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Parent zone every subdomain is provisioned under
pub const DEFAULT_PARENT_ZONE: &str = ".is-a.pregnant.horse";

/// Main GPSrv configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpsrvConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Provisioning/update service settings
    #[serde(default)]
    pub service: ServiceConfig,
}

impl GpsrvConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.state_store.validate()?;
        self.service.validate()?;
        Ok(())
    }
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone holding the parent domain
        zone_id: String,
        /// Log intended writes instead of performing them
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token, zone_id, ..
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare zone ID cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Cloudflare {
            api_token: String::new(),
            zone_id: String::new(),
            dry_run: false,
        }
    }
}

// Hides the API token
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderConfig::Cloudflare {
                zone_id, dry_run, ..
            } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<REDACTED>")
                .field("zone_id", zone_id)
                .field("dry_run", dry_run)
                .finish(),
            ProviderConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    Memory,
}

impl StateStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        StateStoreConfig::File {
            path: "./kdb.json".to_string(),
        }
    }
}

/// Provisioning/update service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Suffix appended to every subdomain, including the leading dot
    #[serde(default = "default_parent_zone")]
    pub parent_zone: String,

    /// Minimum time between successful updates of one subdomain
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,

    /// Upper bound on a single DNS provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.parent_zone.starts_with('.') || self.parent_zone.len() < 2 {
            return Err(crate::Error::config(format!(
                "Parent zone must start with '.' and name a domain, got '{}'",
                self.parent_zone
            )));
        }
        if self.provider_timeout_secs == 0 {
            return Err(crate::Error::config("Provider timeout must be > 0"));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Fully qualified name of `subdomain`
    pub fn fqdn(&self, subdomain: &str) -> String {
        format!("{}{}", subdomain, self.parent_zone)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            parent_zone: default_parent_zone(),
            cooldown_minutes: default_cooldown_minutes(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_parent_zone() -> String {
    DEFAULT_PARENT_ZONE.to_string()
}

fn default_cooldown_minutes() -> u64 {
    10
}

fn default_provider_timeout_secs() -> u64 {
    30
}
