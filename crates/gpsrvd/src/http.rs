//! HTTP surface of the daemon
//!
//! ```text
//! GET  /                 banner
//! GET  /info             number of provisioned subdomains
//! GET  /query?name=      destination of one subdomain
//! POST /update           Authorization: <subdomain secret>, form: subdomain, dest
//! POST /provision        Authorization: <master secret>,    form: subdomain, dest
//! ```
//!
//! All bodies are plain text. Secrets arrive raw in the `Authorization`
//! header and are never logged.

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::header::{AUTHORIZATION, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use gpsrv_core::traits::DnsProvider;
use gpsrv_core::{
    Clock, DomainStore, Error, ProvisioningService, SecretManager, ServiceConfig, UpdateService,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

const BANNER: &str = "GPSrv Domain Manager";

/// Everything the handlers share
pub struct ApiState {
    store: Arc<DomainStore>,
    provisioning: ProvisioningService,
    updates: UpdateService,
    clock: Arc<dyn Clock>,
}

impl ApiState {
    pub fn new(
        store: Arc<DomainStore>,
        provider: Arc<dyn DnsProvider>,
        secrets: SecretManager,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            updates: UpdateService::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                secrets.clone(),
                &config,
            ),
            provisioning: ProvisioningService::new(Arc::clone(&store), provider, secrets, config),
            store,
            clock,
        }
    }
}

/// Build the router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/info", get(info))
        .route("/query", get(query))
        .route("/update", post(update))
        .route("/provision", post(provision))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    name: Option<String>,
}

/// Form body of `/update` and `/provision`
#[derive(Debug, Default, Deserialize)]
struct DomainForm {
    subdomain: Option<String>,
    dest: Option<String>,
}

async fn banner() -> &'static str {
    BANNER
}

async fn info(State(state): State<Arc<ApiState>>) -> String {
    format!(
        "# of currently provisioned domains: {}",
        state.store.len().await
    )
}

async fn query(
    State(state): State<Arc<ApiState>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Response {
    let name = params
        .map(|Query(params)| params.name)
        .unwrap_or_default()
        .filter(|name| !name.is_empty());

    let Some(name) = name else {
        return (
            StatusCode::BAD_REQUEST,
            "Bad Request: missing name query param",
        )
            .into_response();
    };

    match state.store.get(&name).await {
        Some(record) => record.destination.to_string().into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn update(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    form: Result<Form<DomainForm>, FormRejection>,
) -> Result<&'static str, ApiError> {
    let secret = authorization(&headers);
    let form = form_or_empty(form);
    let now = state.clock.now();

    run_to_completion(async move {
        state
            .updates
            .update(
                secret.as_deref(),
                form.subdomain.as_deref(),
                form.dest.as_deref(),
                now,
            )
            .await
    })
    .await?;

    Ok("OK")
}

async fn provision(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    form: Result<Form<DomainForm>, FormRejection>,
) -> Result<String, ApiError> {
    let master = authorization(&headers);
    let form = form_or_empty(form);
    let now = state.clock.now();

    let provisioned = run_to_completion(async move {
        state
            .provisioning
            .provision(
                master.as_deref(),
                form.subdomain.as_deref(),
                form.dest.as_deref(),
                now,
            )
            .await
    })
    .await?;

    Ok(format!(
        "Provisioned {}. Key: {}",
        provisioned.fqdn,
        provisioned.secret.expose()
    ))
}

/// Raw `Authorization` header value
fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

// An unreadable body is treated as one without fields
fn form_or_empty(form: Result<Form<DomainForm>, FormRejection>) -> DomainForm {
    match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!("Unreadable form body: {}", rejection);
            DomainForm::default()
        }
    }
}

/// Drive a service call on its own task
///
/// The caller may go away mid-request; the provider call and the commit
/// that follows it still finish.
async fn run_to_completion<T, F>(call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(call)
        .await
        .map_err(|e| Error::internal(format!("request task failed: {}", e)))?
}

/// Service error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::MissingField(field) => (
                StatusCode::BAD_REQUEST,
                format!("Bad Request: missing {}", field_label(field)),
            )
                .into_response(),
            Error::InvalidAddress(_) => (
                StatusCode::BAD_REQUEST,
                "Bad Request: destination must be an IPv4 address",
            )
                .into_response(),
            Error::InvalidSubdomain(reason) => (
                StatusCode::BAD_REQUEST,
                format!("Bad Request: invalid subdomain: {}", reason),
            )
                .into_response(),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized.").into_response(),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            Error::AlreadyProvisioned(subdomain) => (
                StatusCode::CONFLICT,
                format!("Conflict: {} is already provisioned", subdomain),
            )
                .into_response(),
            Error::RateLimited { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    format!(
                        "Too Many Requests: try again in {} seconds",
                        retry_after_secs
                    ),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            Error::Provider { provider, message } => {
                warn!("DNS provider {} failed: {}", provider, message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error: DNS provider request failed",
                )
                    .into_response()
            }
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "dest" => "destination",
        other => other,
    }
}
