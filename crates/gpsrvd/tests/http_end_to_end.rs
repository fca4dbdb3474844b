//! End-to-end test of the HTTP surface
//!
//! Drives the router in-process with a mock DNS provider and a manually
//! advanced clock.

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{DateTime, Duration, TimeZone, Utc};
use gpsrv_core::secret::{ProvisionKeyBootstrap, bootstrap_provision_key};
use gpsrv_core::state::MemoryStateStore;
use gpsrv_core::traits::{DnsProvider, RemoteRecordId};
use gpsrv_core::{Clock, DomainStore, Error, SecretManager, ServiceConfig};
use gpsrvd::{ApiState, router};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
struct MockProvider {
    creates: AtomicUsize,
    updates: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl DnsProvider for MockProvider {
    async fn create_record(&self, name: &str, _address: Ipv4Addr) -> Result<RemoteRecordId, Error> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "zone unavailable"));
        }
        Ok(RemoteRecordId::new(format!("rec-{}", name)))
    }

    async fn update_record(&self, _record_id: &RemoteRecordId, _address: Ipv4Addr) -> Result<(), Error> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "zone unavailable"));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

struct TestApp {
    app: Router,
    master: String,
    provider: Arc<MockProvider>,
    clock: Arc<ManualClock>,
}

async fn test_app() -> TestApp {
    let store = Arc::new(
        DomainStore::open(Box::new(MemoryStateStore::new()))
            .await
            .unwrap(),
    );
    let secrets = SecretManager::new();
    let master = match bootstrap_provision_key(&store, &secrets, false).await.unwrap() {
        ProvisionKeyBootstrap::Generated { secret, .. } => secret.expose().to_string(),
        ProvisionKeyBootstrap::Existing => unreachable!("fresh store"),
    };

    let provider = Arc::new(MockProvider::default());
    let clock = Arc::new(ManualClock(Mutex::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    )));

    let state = ApiState::new(
        store,
        provider.clone(),
        secrets,
        ServiceConfig::default(),
        clock.clone(),
    );

    TestApp {
        app: router(Arc::new(state)),
        master,
        provider,
        clock,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, authorization: Option<&str>, form: &str) -> (StatusCode, String) {
        let mut request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(authorization) = authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }
        self.send(request.body(Body::from(form.to_string())).unwrap())
            .await
    }

    /// Provision `subdomain` and return its secret
    async fn provision(&self, subdomain: &str, dest: &str) -> String {
        let (status, body) = self
            .post(
                "/provision",
                Some(&self.master),
                &format!("subdomain={}&dest={}", subdomain, dest),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body.rsplit("Key: ").next().unwrap().to_string()
    }
}

#[tokio::test]
async fn full_client_lifecycle() {
    let t = test_app().await;

    // Provision
    let (status, body) = t
        .post("/provision", Some(&t.master), "subdomain=alice&dest=1.2.3.4")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Provisioned alice.is-a.pregnant.horse. Key: "));
    let key = body.rsplit("Key: ").next().unwrap().to_string();
    assert_eq!(key.len(), 32);

    // Query
    let (status, body) = t.get("/query?name=alice").await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "1.2.3.4"));

    // Wrong key
    let (status, body) = t
        .post("/update", Some("wrong-key"), "subdomain=alice&dest=5.6.7.8")
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::UNAUTHORIZED, "Unauthorized."));

    // Invalid address
    let (status, _) = t
        .post("/update", Some(&key), "subdomain=alice&dest=999.1.1.1")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Inside the cooldown
    let response = t
        .app
        .clone()
        .oneshot(
            Request::post("/update")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::AUTHORIZATION, &key)
                .body(Body::from("subdomain=alice&dest=5.6.7.8"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).unwrap(),
        "600"
    );

    // After the cooldown
    t.clock.advance(Duration::minutes(10) + Duration::seconds(1));
    let (status, body) = t
        .post("/update", Some(&key), "subdomain=alice&dest=5.6.7.8")
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let (status, body) = t.get("/query?name=alice").await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "5.6.7.8"));

    assert_eq!(t.provider.creates.load(Ordering::SeqCst), 1);
    assert_eq!(t.provider.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn banner_and_info() {
    let t = test_app().await;

    let (status, body) = t.get("/").await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "GPSrv Domain Manager"));

    let (_, body) = t.get("/info").await;
    assert_eq!(body, "# of currently provisioned domains: 0");

    t.provision("alice", "1.2.3.4").await;
    t.provision("bob", "1.2.3.4").await;

    let (_, body) = t.get("/info").await;
    assert_eq!(body, "# of currently provisioned domains: 2");
}

#[tokio::test]
async fn query_errors() {
    let t = test_app().await;

    let (status, body) = t.get("/query").await;
    assert_eq!(
        (status, body.as_str()),
        (StatusCode::BAD_REQUEST, "Bad Request: missing name query param")
    );

    let (status, body) = t.get("/query?name=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, body) = t.get("/query?name=nobody").await;
    assert_eq!((status, body.as_str()), (StatusCode::NOT_FOUND, "Not Found"));
}

#[tokio::test]
async fn provision_errors() {
    let t = test_app().await;

    let (status, body) = t.post("/provision", None, "subdomain=alice&dest=1.2.3.4").await;
    assert_eq!((status, body.as_str()), (StatusCode::UNAUTHORIZED, "Unauthorized."));

    let (status, _) = t
        .post("/provision", Some("not-the-master"), "subdomain=alice&dest=1.2.3.4")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t.post("/provision", Some(&t.master), "dest=1.2.3.4").await;
    assert_eq!(
        (status, body.as_str()),
        (StatusCode::BAD_REQUEST, "Bad Request: missing subdomain")
    );

    let (status, body) = t.post("/provision", Some(&t.master), "subdomain=alice").await;
    assert_eq!(
        (status, body.as_str()),
        (StatusCode::BAD_REQUEST, "Bad Request: missing destination")
    );

    let (status, _) = t
        .post("/provision", Some(&t.master), "subdomain=al%20ice&dest=1.2.3.4")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    t.provision("alice", "1.2.3.4").await;
    let (status, _) = t
        .post("/provision", Some(&t.master), "subdomain=alice&dest=5.6.7.8")
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = t.get("/query?name=alice").await;
    assert_eq!(body, "1.2.3.4");
}

#[tokio::test]
async fn provider_failure_is_generic_500() {
    let t = test_app().await;
    t.provider.fail.store(true, Ordering::SeqCst);

    let (status, body) = t
        .post("/provision", Some(&t.master), "subdomain=alice&dest=1.2.3.4")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("zone unavailable"));

    let (status, _) = t.get("/query?name=alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_failure_keeps_previous_destination() {
    let t = test_app().await;
    let key = t.provision("alice", "1.2.3.4").await;
    t.clock.advance(Duration::minutes(11));

    t.provider.fail.store(true, Ordering::SeqCst);
    let (status, _) = t
        .post("/update", Some(&key), "subdomain=alice&dest=5.6.7.8")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, body) = t.get("/query?name=alice").await;
    assert_eq!(body, "1.2.3.4");
}

#[tokio::test]
async fn update_field_errors() {
    let t = test_app().await;
    let key = t.provision("alice", "1.2.3.4").await;

    let (status, body) = t.post("/update", Some(&key), "dest=5.6.7.8").await;
    assert_eq!(
        (status, body.as_str()),
        (StatusCode::BAD_REQUEST, "Bad Request: missing subdomain")
    );

    let (status, body) = t.post("/update", Some(&key), "subdomain=alice").await;
    assert_eq!(
        (status, body.as_str()),
        (StatusCode::BAD_REQUEST, "Bad Request: missing destination")
    );

    // Unknown subdomain looks like a wrong key
    let (status, body) = t
        .post("/update", Some(&key), "subdomain=nobody&dest=5.6.7.8")
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::UNAUTHORIZED, "Unauthorized."));

    // A body that is not a form
    let (status, _) = t
        .send(
            Request::post("/update")
                .header(header::AUTHORIZATION, &key)
                .body(Body::from("{\"subdomain\":\"alice\"}"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn secrets_are_not_interchangeable() {
    let t = test_app().await;
    let alice = t.provision("alice", "1.2.3.4").await;
    t.provision("bob", "1.2.3.4").await;
    t.clock.advance(Duration::minutes(11));

    let (status, _) = t
        .post("/update", Some(&alice), "subdomain=bob&dest=5.6.7.8")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Subdomain secrets cannot provision
    let (status, _) = t
        .post("/provision", Some(&alice), "subdomain=carol&dest=1.2.3.4")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
