//! Provisioning and update orchestration
//!
//! ```text
//!  request ──► ProvisioningService / UpdateService
//!                 │
//!                 ├─► SecretManager   (verify / derive)
//!                 ├─► DomainStore     (per-subdomain lock, read)
//!                 ├─► DnsProvider     (one attempt, bounded by timeout)
//!                 └─► DomainStore     (commit, write-through)
//! ```
//!
//! No local state changes unless the provider call succeeded first, and
//! a failed step leaves the record exactly as it was.

pub mod provision;
pub mod update;

pub use provision::{ProvisionedInfo, ProvisioningService};
pub use update::UpdateService;

use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Maximum length of a fully qualified name (RFC 1035)
const MAX_FQDN_LEN: usize = 253;

/// Maximum length of one label (RFC 1035)
const MAX_LABEL_LEN: usize = 63;

/// Reject absent and empty fields
pub(crate) fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingField(field)),
    }
}

/// Parse a strict IPv4 dotted quad: four decimal octets, each 0-255
pub fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::invalid_address(value))
}

/// Check that `subdomain` is one or more DNS labels and fits under `parent_zone`
pub fn validate_subdomain(subdomain: &str, parent_zone: &str) -> Result<()> {
    if subdomain.len() + parent_zone.len() > MAX_FQDN_LEN {
        return Err(Error::invalid_subdomain(format!(
            "name too long: {} chars with parent zone (max {})",
            subdomain.len() + parent_zone.len(),
            MAX_FQDN_LEN
        )));
    }

    for label in subdomain.split('.') {
        if label.is_empty() {
            return Err(Error::invalid_subdomain(format!(
                "empty label in '{}'",
                subdomain
            )));
        }

        if label.len() > MAX_LABEL_LEN {
            return Err(Error::invalid_subdomain(format!(
                "label too long: {} chars (max {})",
                label.len(),
                MAX_LABEL_LEN
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::invalid_subdomain(format!(
                "label '{}' may only contain ASCII letters, digits and hyphens",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_subdomain(format!(
                "label '{}' cannot start or end with a hyphen",
                label
            )));
        }
    }

    Ok(())
}

/// Run one provider call under `timeout`
///
/// Every failure, including expiry, comes back as [`Error::Provider`].
pub(crate) async fn call_provider<T, F>(provider: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e @ Error::Provider { .. })) => Err(e),
        Ok(Err(e)) => Err(Error::provider(provider, e.to_string())),
        Err(_) => Err(Error::provider(
            provider,
            format!("request timed out after {}s", timeout.as_secs_f64()),
        )),
    }
}

/// Time left until `anchor_ms + cooldown`, if any
///
/// A clock that stepped behind the anchor counts as no time elapsed, so
/// the wait is never longer than one full window.
pub(crate) fn cooldown_remaining(anchor_ms: i64, now_ms: i64, cooldown: Duration) -> Option<Duration> {
    if cooldown.is_zero() {
        return None;
    }

    let cooldown_ms = i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX);
    let elapsed_ms = now_ms.saturating_sub(anchor_ms).max(0);

    if elapsed_ms < cooldown_ms {
        let remaining = cooldown_ms - elapsed_ms;
        Some(Duration::from_millis(remaining.unsigned_abs()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert_eq!(required("subdomain", Some("alice")).unwrap(), "alice");
        assert!(matches!(
            required("subdomain", Some("")),
            Err(Error::MissingField("subdomain"))
        ));
        assert!(matches!(
            required("dest", None),
            Err(Error::MissingField("dest"))
        ));
    }

    #[test]
    fn test_parse_ipv4_accepts_dotted_quads() {
        for valid in ["192.168.1.1", "0.0.0.0", "255.255.255.255"] {
            assert!(parse_ipv4(valid).is_ok(), "{} should be accepted", valid);
        }
    }

    #[test]
    fn test_parse_ipv4_rejects_malformed() {
        for invalid in [
            "999.1.1.1",
            "1.2.3",
            "abc",
            "1.2.3.4.5",
            "256.0.0.1",
            " 1.2.3.4",
            "::1",
            "",
        ] {
            assert!(
                matches!(parse_ipv4(invalid), Err(Error::InvalidAddress(_))),
                "{:?} should be rejected",
                invalid
            );
        }
    }

    #[test]
    fn test_validate_subdomain() {
        let zone = ".is-a.pregnant.horse";
        assert!(validate_subdomain("alice", zone).is_ok());
        assert!(validate_subdomain("Alice-01", zone).is_ok());
        assert!(validate_subdomain("home.alice", zone).is_ok());

        for invalid in ["-alice", "alice-", "al ice", "al_ice", "alice.", ".alice", "ünï"] {
            assert!(
                matches!(validate_subdomain(invalid, zone), Err(Error::InvalidSubdomain(_))),
                "{:?} should be rejected",
                invalid
            );
        }

        assert!(validate_subdomain(&"a".repeat(64), zone).is_err());
        let long = vec!["a".repeat(60); 4].join(".");
        assert!(validate_subdomain(&long, zone).is_err());
    }

    #[test]
    fn test_cooldown_remaining() {
        let cooldown = Duration::from_secs(600);
        assert_eq!(
            cooldown_remaining(0, 1_000, cooldown),
            Some(Duration::from_millis(599_000))
        );
        assert_eq!(cooldown_remaining(0, 600_000, cooldown), None);
        assert_eq!(cooldown_remaining(0, 600_001, cooldown), None);
        assert_eq!(cooldown_remaining(1_000, 1_000, Duration::ZERO), None);
        assert_eq!(cooldown_remaining(5_000, 1_000, cooldown), Some(cooldown));
    }

    #[tokio::test]
    async fn test_call_provider_times_out() {
        let result: Result<()> = call_provider("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::Provider { .. })));
    }

    #[tokio::test]
    async fn test_call_provider_wraps_other_errors() {
        let result: Result<()> = call_provider("cloudflare", Duration::from_secs(1), async {
            Err(Error::not_found("zone"))
        })
        .await;

        match result {
            Err(Error::Provider { provider, .. }) => assert_eq!(provider, "cloudflare"),
            other => panic!("expected provider error, got {:?}", other),
        }
    }
}
