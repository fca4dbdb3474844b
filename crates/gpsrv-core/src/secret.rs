//! Bearer secret derivation and verification
//!
//! Secrets are 16 random bytes from the system CSPRNG, hex-encoded. Only
//! their SHA-512 digest is ever stored. Because secrets are high-entropy
//! tokens rather than passwords, the digest is unsalted.
//!
//! There is no operation that recovers a secret from its digest. A raw
//! secret leaves the process exactly twice: when the master secret is
//! bootstrapped and when a subdomain is provisioned.

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::DomainStore;

/// Number of random bytes in a generated secret
pub const SECRET_BYTES: usize = 16;

/// A plaintext bearer secret
///
/// `Debug` is redacted; use [`RawSecret::expose`] at the disclosure point.
#[derive(Clone, PartialEq, Eq)]
pub struct RawSecret(String);

impl RawSecret {
    /// The plaintext value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSecret(<REDACTED>)")
    }
}

/// Lowercase hex SHA-512 digest of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretDigest(String);

impl SecretDigest {
    /// Wrap an already computed hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Derives, hashes and verifies secrets
#[derive(Debug, Clone)]
pub struct SecretManager {
    rng: SystemRandom,
}

impl SecretManager {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Generate a fresh secret from the system CSPRNG
    pub fn generate_secret(&self) -> Result<RawSecret> {
        let mut bytes = [0u8; SECRET_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| Error::internal("system random number generator failed"))?;
        Ok(RawSecret(hex::encode(bytes)))
    }

    /// SHA-512 of the UTF-8 bytes of `secret`
    pub fn hash(&self, secret: &str) -> SecretDigest {
        let digest = digest::digest(&digest::SHA512, secret.as_bytes());
        SecretDigest(hex::encode(digest.as_ref()))
    }

    /// Check `presented` against a stored digest in constant time
    // Deprecated in ring 0.17 with no replacement in ring
    #[allow(deprecated)]
    pub fn verify(&self, presented: &str, stored: &SecretDigest) -> bool {
        let computed = self.hash(presented);
        ring::constant_time::verify_slices_are_equal(computed.0.as_bytes(), stored.0.as_bytes())
            .is_ok()
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of the master secret bootstrap
#[derive(Debug)]
pub enum ProvisionKeyBootstrap {
    /// A digest was already persisted; nothing to disclose
    Existing,

    /// A new master secret was generated and its digest persisted
    ///
    /// The caller must show `secret` to the operator exactly once. When
    /// `regenerated` is set the process should exit right afterwards.
    Generated {
        secret: RawSecret,
        regenerated: bool,
    },
}

/// Ensure a master provisioning secret exists
///
/// Generates one when none is persisted or when `regenerate` is set. Only
/// the digest is stored; the returned secret cannot be retrieved again.
pub async fn bootstrap_provision_key(
    store: &DomainStore,
    secrets: &SecretManager,
    regenerate: bool,
) -> Result<ProvisionKeyBootstrap> {
    if store.provision_key().await.is_some() && !regenerate {
        return Ok(ProvisionKeyBootstrap::Existing);
    }

    if regenerate {
        warn!("Regenerating master provisioning secret; the previous secret stops working");
    }

    let secret = secrets.generate_secret()?;
    store.set_provision_key(secrets.hash(secret.expose())).await?;
    info!("New master provisioning secret digest persisted");

    Ok(ProvisionKeyBootstrap::Generated {
        secret,
        regenerated: regenerate,
    })
}
