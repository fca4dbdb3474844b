//! Daemon configuration from environment variables
//!
//! | Variable | Default |
//! |---|---|
//! | `GPSRV_LISTEN_ADDR` | `0.0.0.0:20001` |
//! | `GPSRV_LOG_LEVEL` | `info` |
//! | `GPSRV_PROVIDER_TYPE` | `cloudflare` |
//! | `GPSRV_PROVIDER_API_TOKEN` | required |
//! | `GPSRV_PROVIDER_ZONE_ID` | required for cloudflare |
//! | `GPSRV_MODE` | `live` (`dry-run` logs provider writes instead) |
//! | `GPSRV_STATE_STORE_TYPE` | `file` |
//! | `GPSRV_STATE_STORE_PATH` | `./kdb.json` |
//! | `GPSRV_PARENT_ZONE` | `.is-a.pregnant.horse` |
//! | `GPSRV_COOLDOWN_MINUTES` | `10` |
//! | `GPSRV_PROVIDER_TIMEOUT_SECS` | `30` |
//! | `GPSRV_REGEN_PKEY` | unset (`1`, `true`, `yes`, `on` regenerate the master secret) |

use anyhow::{Context, Result};
use gpsrv_core::{GpsrvConfig, ProviderConfig, ServiceConfig, StateStoreConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:20001";
const DEFAULT_STATE_STORE_PATH: &str = "./kdb.json";

/// Application configuration
#[derive(Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub provider_type: String,
    /// ⚠️ NEVER log this value
    pub provider_api_token: String,
    pub provider_zone_id: Option<String>,
    pub dry_run: bool,
    pub state_store_type: String,
    pub state_store_path: PathBuf,
    pub parent_zone: Option<String>,
    pub cooldown_minutes: Option<u64>,
    pub provider_timeout_secs: Option<u64>,
    /// Replace the master secret, print it, and exit
    pub regenerate_provision_key: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("log_level", &self.log_level)
            .field("provider_type", &self.provider_type)
            .field("provider_api_token", &"<REDACTED>")
            .field("provider_zone_id", &self.provider_zone_id)
            .field("dry_run", &self.dry_run)
            .field("state_store_type", &self.state_store_type)
            .field("state_store_path", &self.state_store_path)
            .field("parent_zone", &self.parent_zone)
            .field("cooldown_minutes", &self.cooldown_minutes)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("regenerate_provision_key", &self.regenerate_provision_key)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("GPSRV_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse()
            .with_context(|| format!("GPSRV_LISTEN_ADDR '{}' is not a socket address", listen_addr))?;

        Ok(Self {
            listen_addr,
            log_level: var("GPSRV_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            provider_type: var("GPSRV_PROVIDER_TYPE").unwrap_or_else(|| "cloudflare".to_string()),
            provider_api_token: var("GPSRV_PROVIDER_API_TOKEN").unwrap_or_default(),
            provider_zone_id: var("GPSRV_PROVIDER_ZONE_ID"),
            dry_run: var("GPSRV_MODE").is_some_and(|mode| mode.eq_ignore_ascii_case("dry-run")),
            state_store_type: var("GPSRV_STATE_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            state_store_path: var("GPSRV_STATE_STORE_PATH")
                .unwrap_or_else(|| DEFAULT_STATE_STORE_PATH.to_string())
                .into(),
            parent_zone: var("GPSRV_PARENT_ZONE"),
            cooldown_minutes: parse_number(&var, "GPSRV_COOLDOWN_MINUTES")?,
            provider_timeout_secs: parse_number(&var, "GPSRV_PROVIDER_TIMEOUT_SECS")?,
            regenerate_provision_key: var("GPSRV_REGEN_PKEY").is_some_and(|v| is_truthy(&v)),
        })
    }

    /// Validate the configuration
    ///
    /// Checks required values, supported types, and numeric ranges. The
    /// core configuration built from it is validated as well.
    pub fn validate(&self) -> Result<()> {
        if self.provider_api_token.is_empty() {
            anyhow::bail!(
                "GPSRV_PROVIDER_API_TOKEN is required. \
                Set it via: export GPSRV_PROVIDER_API_TOKEN=your_token"
            );
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.provider_api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "GPSRV_PROVIDER_API_TOKEN appears to be a placeholder. \
                Use an actual API token from your DNS provider."
            );
        }

        match self.provider_type.as_str() {
            #[cfg(feature = "cloudflare")]
            "cloudflare" => {
                if self.provider_zone_id.is_none() {
                    anyhow::bail!(
                        "GPSRV_PROVIDER_ZONE_ID is required when GPSRV_PROVIDER_TYPE=cloudflare"
                    );
                }
            }
            _ => anyhow::bail!(
                "GPSRV_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: {}",
                self.provider_type,
                supported_providers().join(", ")
            ),
        }

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "GPSRV_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if let Some(cooldown) = self.cooldown_minutes
            && cooldown > 24 * 60
        {
            anyhow::bail!(
                "GPSRV_COOLDOWN_MINUTES must be between 0 and 1440. Got: {}",
                cooldown
            );
        }

        if let Some(timeout) = self.provider_timeout_secs
            && !(1..=300).contains(&timeout)
        {
            anyhow::bail!(
                "GPSRV_PROVIDER_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        self.log_level()?;

        self.to_core_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    /// Maximum tracing level
    pub fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "GPSRV_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Core library configuration
    pub fn to_core_config(&self) -> GpsrvConfig {
        let provider = match self.provider_type.as_str() {
            "cloudflare" => ProviderConfig::Cloudflare {
                api_token: self.provider_api_token.clone(),
                zone_id: self.provider_zone_id.clone().unwrap_or_default(),
                dry_run: self.dry_run,
            },
            other => ProviderConfig::Custom {
                factory: other.to_string(),
                config: serde_json::json!({ "dry_run": self.dry_run }),
            },
        };

        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            _ => StateStoreConfig::File {
                path: self.state_store_path.to_string_lossy().into_owned(),
            },
        };

        let defaults = ServiceConfig::default();
        let service = ServiceConfig {
            parent_zone: self.parent_zone.clone().unwrap_or(defaults.parent_zone),
            cooldown_minutes: self.cooldown_minutes.unwrap_or(defaults.cooldown_minutes),
            provider_timeout_secs: self
                .provider_timeout_secs
                .unwrap_or(defaults.provider_timeout_secs),
        };

        GpsrvConfig {
            provider,
            state_store,
            service,
        }
    }
}

fn parse_number<F>(var: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a non-negative integer. Got: {}", key, raw))
        })
        .transpose()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn supported_providers() -> Vec<&'static str> {
    let mut providers = Vec::new();
    #[cfg(feature = "cloudflare")]
    providers.push("cloudflare");
    providers
}
