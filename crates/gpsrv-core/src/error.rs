//! Error types for the GPSrv provisioning service
//!
//! Validation and authorization variants are terminal for a request and
//! never mutate state. `Provider` wraps any failure of the remote DNS API.
//! The remaining variants are internal faults and must be reported to
//! clients without their details.

use thiserror::Error;

/// Result type alias for GPSrv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the GPSrv service
#[derive(Error, Debug)]
pub enum Error {
    /// A required request field was absent or empty
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Destination is not an IPv4 dotted quad
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Subdomain is not a valid sequence of DNS labels
    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),

    /// Missing or wrong secret, or unknown subdomain on update
    ///
    /// Carries no detail so callers cannot tell which check failed.
    #[error("Unauthorized")]
    Unauthorized,

    /// Subdomain already has an owner
    #[error("Subdomain already provisioned: {0}")]
    AlreadyProvisioned(String),

    /// Update attempted inside the cooldown window
    #[error("Rate limited: retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window elapses (rounded up)
        retry_after_secs: u64,
    },

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// DNS provider failure (including timeouts)
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected internal fault
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create an invalid subdomain error
    pub fn invalid_subdomain(msg: impl Into<String>) -> Self {
        Self::InvalidSubdomain(msg.into())
    }

    /// Create an "already provisioned" error
    pub fn already_provisioned(subdomain: impl Into<String>) -> Self {
        Self::AlreadyProvisioned(subdomain.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is an internal fault rather than a client or provider error
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::StateStore(_) | Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_carries_no_detail() {
        assert_eq!(Error::Unauthorized.to_string(), "Unauthorized");
    }

    #[test]
    fn test_internal_classification() {
        assert!(Error::state_store("disk full").is_internal());
        assert!(Error::internal("boom").is_internal());
        assert!(!Error::provider("cloudflare", "503").is_internal());
        assert!(!Error::Unauthorized.is_internal());
        assert!(!Error::RateLimited { retry_after_secs: 5 }.is_internal());
    }
}
