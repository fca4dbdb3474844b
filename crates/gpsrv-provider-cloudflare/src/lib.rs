// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare DNS provider for the GPSrv
// provisioning service.
//
// ## Behavior
//
// - One HTTP request per provider call; errors go straight back to the caller
// - Creates A records with `POST /zones/:zone_id/dns_records`
// - Repoints them with `PATCH /zones/:zone_id/dns_records/:record_id`
// - Records are always created unproxied with automatic TTL
// - HTTP status codes are mapped to descriptive provider errors (401/403, 404, 409, 429, 5xx)
// - Dry-run mode logs intended writes without sending them
//
// No retries and no caching: a failed call fails the request that made it.
//
// ## Security Requirements
//
// - API token NEVER appears in logs or error messages
// - Construction fails if the token or zone ID is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use gpsrv_core::config::ProviderConfig;
use gpsrv_core::traits::{DnsProvider, DnsProviderFactory, RemoteRecordId};
use gpsrv_core::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL value Cloudflare interprets as "automatic"
const AUTOMATIC_TTL: u32 = 1;

const PROVIDER_NAME: &str = "cloudflare";

/// Cloudflare DNS provider
///
/// Stateless apart from its HTTP client. The record ID returned by
/// [`DnsProvider::create_record`] is what later updates address.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Log the intended request payload
/// - **NOT** contact Cloudflare
/// - Return a synthetic record ID from `create_record`
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone holding the parent domain
    zone_id: String,

    /// API root, overridable for tests
    api_base: String,

    client: reqwest::Client,

    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Body of create and patch requests
#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    proxied: bool,
}

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Zone holding the parent domain
    /// - `dry_run`: If true, log writes instead of sending them
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token or zone ID is empty or
    /// the HTTP client cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare zone ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    fn record_url(&self, record_id: &RemoteRecordId) -> String {
        format!("{}/{}", self.records_url(), record_id)
    }

    /// Send a request and unwrap the envelope's `result`
    async fn send<T>(&self, request: reqwest::RequestBuilder, action: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| {
                Error::provider(
                    PROVIDER_NAME,
                    format!("HTTP request failed: {}", e.without_url()),
                )
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::provider(
                PROVIDER_NAME,
                format!("Failed to read response: {}", e.without_url()),
            )
        })?;

        if !status.is_success() {
            return Err(status_error(status, &body, action));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("{} rejected: {}", action, describe(&envelope.errors)),
            ));
        }

        Ok(envelope.result)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Create an A record for `name`
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "A", "name": "...", "content": "1.2.3.4", "ttl": 1, "proxied": false}
    /// ```
    async fn create_record(&self, name: &str, address: Ipv4Addr) -> Result<RemoteRecordId> {
        let payload = RecordPayload {
            record_type: "A",
            name: Some(name),
            content: address.to_string(),
            ttl: Some(AUTOMATIC_TTL),
            proxied: false,
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would POST {} with payload: {}",
                self.records_url(),
                serde_json::to_string(&payload).unwrap_or_default()
            );
            return Ok(RemoteRecordId::new(format!("dry-run-{}", name)));
        }

        tracing::debug!("Creating Cloudflare A record {} -> {}", name, address);

        let record: DnsRecord = self
            .send(
                self.client.post(self.records_url()).json(&payload),
                "Record creation",
            )
            .await?
            .ok_or_else(|| {
                Error::provider(PROVIDER_NAME, "Invalid response format: result is missing")
            })?;

        if record.id.is_empty() {
            return Err(Error::provider(
                PROVIDER_NAME,
                "Invalid response format: record id is empty",
            ));
        }

        tracing::info!("Cloudflare record {} created for {}", record.id, name);
        Ok(RemoteRecordId::new(record.id))
    }

    /// Point an existing record at `address`
    ///
    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// {"type": "A", "content": "1.2.3.4", "proxied": false}
    /// ```
    async fn update_record(&self, record_id: &RemoteRecordId, address: Ipv4Addr) -> Result<()> {
        if record_id.is_empty() {
            return Err(Error::provider(
                PROVIDER_NAME,
                "No remote record ID stored for this subdomain",
            ));
        }

        let payload = RecordPayload {
            record_type: "A",
            name: None,
            content: address.to_string(),
            ttl: None,
            proxied: false,
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would PATCH {} with payload: {}",
                self.record_url(record_id),
                serde_json::to_string(&payload).unwrap_or_default()
            );
            return Ok(());
        }

        tracing::debug!("Patching Cloudflare record {} -> {}", record_id, address);

        self.send::<serde_json::Value>(
            self.client.patch(self.record_url(record_id)).json(&payload),
            "Record update",
        )
        .await?;

        tracing::info!("Cloudflare record {} now points at {}", record_id, address);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Map a non-success HTTP status to a provider error
fn status_error(status: StatusCode, body: &str, action: &str) -> Error {
    let details = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .map(|envelope| describe(&envelope.errors))
        .unwrap_or_else(|_| "no error details".to_string());

    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("{} failed: zone or record not found ({})", action, details),
        409 => format!("{} failed: conflicting record exists ({})", action, details),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("Cloudflare server error (transient): {} - {}", status, details),
        _ => format!("{} failed: {} - {}", action, status, details),
    };

    Error::provider(PROVIDER_NAME, message)
}

fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    zone_id.clone(),
                    *dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use gpsrv_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// gpsrv_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &gpsrv_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(CloudflareFactory));
}
