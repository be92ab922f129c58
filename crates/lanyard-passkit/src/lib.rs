//! Pass update protocol layer for Lanyard.
//!
//! Exposes an axum [`Router`] implementing the wallet-refresh contract
//! (modelled on the PassKit web service): register a device for updates,
//! enumerate updated serials, unregister, and fetch the signed pass with
//! conditional-GET semantics. Backed by any [`PassStore`] and any
//! [`PassBuilder`].

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use lanyard_builder::PassBuilder;
use lanyard_core::store::PassStore;
use serde::Deserialize;

use auth::{AuthMode, TokenScheme};
use handlers::{check, fetch, list, register, unregister};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Deployment environment. Only development mode may synthesise placeholder
/// push tokens for registrations that arrive without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  #[default]
  Production,
  Development,
}

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:         String,
  pub port:         u16,
  pub store_path:   PathBuf,
  /// The single pass type this deployment serves, e.g.
  /// `pass.ac.example.campus`.
  pub pass_type_id: String,
  /// Secret the auth-token scheme signs with.
  pub auth_secret:  String,
  /// Strict unless explicitly configured otherwise; see [`AuthMode`].
  #[serde(default)]
  pub auth_mode:    AuthMode,
  #[serde(default)]
  pub environment:  Environment,
  /// External signing-service endpoint. Absent means the in-process
  /// deterministic signer (development only).
  pub signer_url:   Option<String>,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, B> {
  pub store:   Arc<S>,
  pub builder: Arc<B>,
  pub tokens:  Arc<TokenScheme>,
  pub config:  Arc<ServerConfig>,
}

// Manual impl: the derive would demand `S: Clone`/`B: Clone`, but the fields
// are reference-counted.
impl<S, B> Clone for AppState<S, B> {
  fn clone(&self) -> Self {
    AppState {
      store:   self.store.clone(),
      builder: self.builder.clone(),
      tokens:  self.tokens.clone(),
      config:  self.config.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the pass update protocol.
pub fn router<S, B>(state: AppState<S, B>) -> Router
where
  S: PassStore + 'static,
  B: PassBuilder + 'static,
{
  Router::new()
    .route(
      "/v1/devices/{device_id}/registrations/{pass_type_id}",
      get(list::handler::<S, B>),
    )
    .route(
      "/v1/devices/{device_id}/registrations/{pass_type_id}/{serial}",
      post(register::handler::<S, B>)
        .get(check::handler::<S, B>)
        .delete(unregister::handler::<S, B>),
    )
    .route(
      "/v1/passes/{pass_type_id}/{serial}",
      get(fetch::handler::<S, B>),
    )
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::{TimeZone as _, Utc};
  use lanyard_builder::{PassAssembler, StaticSigner};
  use lanyard_core::{
    serial::StudentId,
    store::PassStore as _,
    subject::{PassSubject, Profile},
  };
  use lanyard_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  type TestState = AppState<SqliteStore, PassAssembler<StaticSigner>>;

  const PASS_TYPE: &str = "pass.ac.example.campus";

  async fn make_state(mode: AuthMode, env: Environment) -> TestState {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState {
      store:   Arc::new(store),
      builder: Arc::new(PassAssembler::new(StaticSigner)),
      tokens:  Arc::new(TokenScheme::new(b"test-secret")),
      config:  Arc::new(ServerConfig {
        host:         "127.0.0.1".to_string(),
        port:         8999,
        store_path:   PathBuf::from(":memory:"),
        pass_type_id: PASS_TYPE.to_string(),
        auth_secret:  "test-secret".to_string(),
        auth_mode:    mode,
        environment:  env,
        signer_url:   None,
      }),
    }
  }

  fn sid(serial: &str) -> StudentId {
    StudentId::parse(serial).expect("valid serial")
  }

  async fn enroll(state: &TestState, serial: &str) {
    let serial = sid(serial);
    let subject = PassSubject {
      campus:          serial.campus(),
      serial,
      profile:         Profile {
        given_name:  "Alice".into(),
        family_name: "Liddell".into(),
        email:       "alice@example.ac.uk".into(),
        photo_url:   None,
      },
      pass_active:     false,
      pass_updated_at: None,
      created_at:      Utc::now(),
    };
    state.store.insert_subject(subject).await.unwrap();
  }

  fn pass_auth(state: &TestState, serial: &str) -> String {
    format!("PassAuth {}", state.tokens.mint(&sid(serial)))
  }

  async fn oneshot_raw(
    state:   TestState,
    method:  &str,
    uri:     &str,
    headers: Vec<(header::HeaderName, &str)>,
    body:    &str,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  fn registration_uri(device: &str, serial: &str) -> String {
    format!("/v1/devices/{device}/registrations/{PASS_TYPE}/{serial}")
  }

  async fn register(
    state:  TestState,
    device: &str,
    serial: &str,
    token:  &str,
  ) -> axum::response::Response {
    let auth = pass_auth(&state, serial);
    oneshot_raw(
      state,
      "POST",
      &registration_uri(device, serial),
      vec![
        (header::AUTHORIZATION, auth.as_str()),
        (header::CONTENT_TYPE, "application/json"),
      ],
      &format!(r#"{{"pushToken":"{token}"}}"#),
    )
    .await
  }

  async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  // ── Registration ──────────────────────────────────────────────────────────

  #[tokio::test]
  async fn register_creates_then_consolidates() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;

    let created =
      register(state.clone(), "dev-a", "207100001", "tok-1").await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let updated =
      register(state.clone(), "dev-b", "207100001", "tok-2").await;
    assert_eq!(updated.status(), StatusCode::OK);

    // dev-b displaced dev-a.
    let listed = oneshot_raw(
      state.clone(),
      "GET",
      &format!("/v1/devices/dev-a/registrations/{PASS_TYPE}"),
      vec![],
      "",
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let json = body_json(listed).await;
    assert_eq!(json["serialNumbers"], serde_json::json!([]));

    let listed = oneshot_raw(
      state,
      "GET",
      &format!("/v1/devices/dev-b/registrations/{PASS_TYPE}"),
      vec![],
      "",
    )
    .await;
    let json = body_json(listed).await;
    assert_eq!(json["serialNumbers"], serde_json::json!(["207100001"]));
    assert!(json["lastUpdated"].is_string());
  }

  #[tokio::test]
  async fn register_unknown_pass_returns_404() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    let resp = register(state, "dev-a", "207100001", "tok-1").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn register_without_auth_returns_401_in_strict_mode() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;

    let resp = oneshot_raw(
      state,
      "POST",
      &registration_uri("dev-a", "207100001"),
      vec![(header::CONTENT_TYPE, "application/json")],
      r#"{"pushToken":"tok-1"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn permissive_mode_accepts_missing_auth() {
    let state =
      make_state(AuthMode::Permissive, Environment::Production).await;
    enroll(&state, "207100001").await;

    let resp = oneshot_raw(
      state,
      "POST",
      &registration_uri("dev-a", "207100001"),
      vec![(header::CONTENT_TYPE, "application/json")],
      r#"{"pushToken":"tok-1"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
  }

  #[tokio::test]
  async fn missing_push_token_is_rejected_in_production() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;

    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state,
      "POST",
      &registration_uri("dev-a", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn missing_push_token_gets_a_placeholder_in_development() {
    let state =
      make_state(AuthMode::Strict, Environment::Development).await;
    enroll(&state, "207100001").await;

    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &registration_uri("dev-a", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let live = state
      .store
      .live_registration(sid("207100001"))
      .await
      .unwrap()
      .unwrap();
    assert!(!live.push_token.is_empty());
  }

  #[tokio::test]
  async fn unknown_pass_type_returns_404() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;

    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state,
      "POST",
      "/v1/devices/dev-a/registrations/pass.other.type/207100001",
      vec![
        (header::AUTHORIZATION, auth.as_str()),
        (header::CONTENT_TYPE, "application/json"),
      ],
      r#"{"pushToken":"tok-1"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  // ── Check ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn check_reflects_the_live_registration() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    register(state.clone(), "dev-a", "207100001", "tok-1").await;

    let auth = pass_auth(&state, "207100001");
    let found = oneshot_raw(
      state.clone(),
      "GET",
      &registration_uri("dev-a", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(found.status(), StatusCode::OK);

    let missing = oneshot_raw(
      state,
      "GET",
      &registration_uri("dev-b", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
  }

  // ── Unregister ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unregister_succeeds_then_reports_not_found() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    register(state.clone(), "dev-a", "207100001", "tok-1").await;

    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state.clone(),
      "DELETE",
      &registration_uri("dev-a", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = oneshot_raw(
      state,
      "DELETE",
      &registration_uri("dev-a", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn unregister_tolerates_a_displaced_device() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    register(state.clone(), "dev-a", "207100001", "tok-1").await;
    register(state.clone(), "dev-b", "207100001", "tok-2").await;

    // dev-a no longer holds the live row but its unregister still lands.
    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state.clone(),
      "DELETE",
      &registration_uri("dev-a", "207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    assert!(
      state
        .store
        .live_registration(sid("207100001"))
        .await
        .unwrap()
        .is_none()
    );
  }

  // ── Fetch ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn fetch_serves_bytes_then_304_on_replay() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    let issued_at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    state
      .store
      .mark_pass_issued(sid("207100001"), issued_at)
      .await
      .unwrap()
      .unwrap();

    let auth = pass_auth(&state, "207100001");
    let uri = format!("/v1/passes/{PASS_TYPE}/207100001");

    let first = oneshot_raw(
      state.clone(),
      "GET",
      &uri,
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let last_modified = first
      .headers()
      .get(header::LAST_MODIFIED)
      .unwrap()
      .to_str()
      .unwrap()
      .to_string();
    assert_eq!(last_modified, "Sat, 01 Aug 2026 12:00:00 GMT");
    let ct = first
      .headers()
      .get(header::CONTENT_TYPE)
      .unwrap()
      .to_str()
      .unwrap();
    assert!(ct.contains("pkpass"), "Content-Type: {ct}");
    let bytes = axum::body::to_bytes(first.into_body(), usize::MAX)
      .await
      .unwrap();
    assert!(!bytes.is_empty());

    // Replaying Last-Modified as If-Modified-Since yields 304, no body.
    let replay = oneshot_raw(
      state.clone(),
      "GET",
      &uri,
      vec![
        (header::AUTHORIZATION, auth.as_str()),
        (header::IF_MODIFIED_SINCE, last_modified.as_str()),
      ],
      "",
    )
    .await;
    assert_eq!(replay.status(), StatusCode::NOT_MODIFIED);
    let bytes = axum::body::to_bytes(replay.into_body(), usize::MAX)
      .await
      .unwrap();
    assert!(bytes.is_empty());

    // An earlier If-Modified-Since still gets the artifact.
    let stale = oneshot_raw(
      state,
      "GET",
      &uri,
      vec![
        (header::AUTHORIZATION, auth.as_str()),
        (header::IF_MODIFIED_SINCE, "Mon, 01 Jun 2026 00:00:00 GMT"),
      ],
      "",
    )
    .await;
    assert_eq!(stale.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn reissuing_a_pass_invalidates_the_cached_copy() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    let issued_at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    state
      .store
      .mark_pass_issued(sid("207100001"), issued_at)
      .await
      .unwrap();

    let auth = pass_auth(&state, "207100001");
    let uri = format!("/v1/passes/{PASS_TYPE}/207100001");

    // Client holds the Aug 1 artifact; the pass is reissued a day later.
    let reissued_at = Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap();
    state
      .store
      .mark_pass_issued(sid("207100001"), reissued_at)
      .await
      .unwrap();

    let resp = oneshot_raw(
      state,
      "GET",
      &uri,
      vec![
        (header::AUTHORIZATION, auth.as_str()),
        (header::IF_MODIFIED_SINCE, "Sat, 01 Aug 2026 12:00:00 GMT"),
      ],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn fetch_unknown_pass_returns_404() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/v1/passes/{PASS_TYPE}/207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn fetch_with_wrong_token_returns_401() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    enroll(&state, "207100002").await;

    // A token minted for a different pass does not open this one.
    let auth = pass_auth(&state, "207100002");
    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/v1/passes/{PASS_TYPE}/207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn fetch_before_first_issuance_serves_with_current_time() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;

    let auth = pass_auth(&state, "207100001");
    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/v1/passes/{PASS_TYPE}/207100001"),
      vec![(header::AUTHORIZATION, auth.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(header::LAST_MODIFIED));
  }

  // ── Listing ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn empty_listing_is_a_successful_response() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/v1/devices/dev-a/registrations/{PASS_TYPE}"),
      vec![],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["serialNumbers"], serde_json::json!([]));
    assert!(json["lastUpdated"].is_string());
  }

  #[tokio::test]
  async fn listing_filters_on_passes_updated_since() {
    let state =
      make_state(AuthMode::Strict, Environment::Production).await;
    enroll(&state, "207100001").await;
    register(state.clone(), "dev-a", "207100001", "tok-1").await;

    let all = oneshot_raw(
      state.clone(),
      "GET",
      &format!("/v1/devices/dev-a/registrations/{PASS_TYPE}"),
      vec![],
      "",
    )
    .await;
    let watermark = body_json(all).await["lastUpdated"]
      .as_str()
      .unwrap()
      .to_string();

    // Nothing changed since the watermark.
    let unchanged = oneshot_raw(
      state,
      "GET",
      &format!(
        "/v1/devices/dev-a/registrations/{PASS_TYPE}?passesUpdatedSince={}",
        urlencode(&watermark)
      ),
      vec![],
      "",
    )
    .await;
    let json = body_json(unchanged).await;
    assert_eq!(json["serialNumbers"], serde_json::json!([]));
  }

  fn urlencode(raw: &str) -> String {
    raw.replace('+', "%2B").replace(':', "%3A")
  }
}
