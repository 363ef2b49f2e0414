// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use vayu_profile_sync::config::{Config, CreatedAtPolicy};
use vayu_profile_sync::db::{DocumentStore, FirestoreDb, Fields, MemoryStore};
use vayu_profile_sync::error::AppError;
use vayu_profile_sync::routes::create_router;
use vayu_profile_sync::services::{
    AuthStateChannel, AuthWatcher, FirebaseTokenVerifier, ProfileUpserter,
};
use vayu_profile_sync::AppState;

#[allow(dead_code)]
pub const TEST_KID: &str = "test-key-1";
#[allow(dead_code)]
const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_rsa_private.pem");
#[allow(dead_code)]
const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/test_rsa_public.pem");
/// Base64url modulus and exponent of the test public key, as served in a JWKS.
#[allow(dead_code)]
const TEST_JWK_N: &str = include_str!("../fixtures/test_rsa_modulus.b64url");
#[allow(dead_code)]
const TEST_JWK_E: &str = "AQAB";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Generate a unique uid for test isolation.
#[allow(dead_code)]
pub fn unique_uid(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

/// Verifier that trusts only the test key pair.
#[allow(dead_code)]
pub fn test_verifier(config: &Config) -> FirebaseTokenVerifier {
    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).expect("test public key");
    FirebaseTokenVerifier::new_with_static_key(config, TEST_KID, key).expect("test verifier")
}

/// Claims of a valid Firebase ID token for `uid`.
#[allow(dead_code)]
pub fn id_token_claims(config: &Config, uid: &str) -> Value {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    json!({
        "iss": format!("https://securetoken.google.com/{}", config.firebase_project_id),
        "aud": config.firebase_project_id,
        "sub": uid,
        "user_id": uid,
        "iat": now,
        "auth_time": now,
        "exp": now + 3600,
        "email": format!("{uid}@example.com"),
        "name": "Test User",
        "firebase": { "sign_in_provider": "password" }
    })
}

/// Sign claims with the test key.
#[allow(dead_code)]
pub fn sign_id_token(claims: &Value) -> String {
    sign_id_token_with_kid(claims, TEST_KID)
}

#[allow(dead_code)]
pub fn sign_id_token_with_kid(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).expect("test private key");
    encode(&header, claims, &key).expect("Failed to sign ID token")
}

/// A test app wired to an in-memory store, with the auth watcher mounted.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub watcher: AuthWatcher,
}

/// Create a test app. Must be called from within a tokio runtime.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let store = MemoryStore::new();
    let auth_events = AuthStateChannel::new();

    let upserter = ProfileUpserter::new(Arc::new(store.clone()), CreatedAtPolicy::Preserve);
    let watcher = AuthWatcher::mount(&auth_events, upserter).expect("mount watcher");

    let state = Arc::new(AppState {
        token_verifier: Arc::new(test_verifier(&config)),
        config,
        auth_events,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        watcher,
    }
}

/// A store that refuses every write, counting attempts.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct FailingStore {
    pub attempts: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn merge_write(&self, _: &str, _: &str, _: Fields) -> Result<(), AppError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Database("PERMISSION_DENIED: missing or insufficient permissions".into()))
    }
}

/// Poll until `done` holds, failing the test after two seconds.
#[allow(dead_code)]
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A local JWKS endpoint serving the test public key under chosen kids.
#[allow(dead_code)]
pub struct KeyServer {
    pub url: String,
    state: Arc<KeyServerState>,
}

struct KeyServerState {
    kids: Mutex<Vec<String>>,
    max_age_secs: u64,
    requests: AtomicUsize,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl KeyServer {
    /// Number of JWKS requests served so far.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Start publishing another kid, as after a key rotation.
    pub fn rotate_in(&self, kid: &str) {
        self.state.kids.lock().unwrap().push(kid.to_string());
    }

    /// Answer every request with 503 until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }
}

async fn serve_jwks(State(state): State<Arc<KeyServerState>>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let keys: Vec<Value> = state
        .kids
        .lock()
        .unwrap()
        .iter()
        .map(|kid| {
            json!({
                "kid": kid,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": TEST_JWK_N.trim(),
                "e": TEST_JWK_E,
            })
        })
        .collect();

    (
        [(
            header::CACHE_CONTROL,
            format!("public, max-age={}, must-revalidate", state.max_age_secs),
        )],
        Json(json!({ "keys": keys })),
    )
        .into_response()
}

/// Spawn a JWKS server on an ephemeral port. Must be called from within a
/// tokio runtime.
#[allow(dead_code)]
pub async fn spawn_key_server(kids: &[&str], max_age_secs: u64) -> KeyServer {
    let state = Arc::new(KeyServerState {
        kids: Mutex::new(kids.iter().map(|kid| kid.to_string()).collect()),
        max_age_secs,
        requests: AtomicUsize::new(0),
        failing: AtomicBool::new(false),
    });

    let app = Router::new()
        .route("/jwks", get(serve_jwks))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind key server");
    let addr = listener.local_addr().expect("key server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    KeyServer {
        url: format!("http://{addr}/jwks"),
        state,
    }
}
