//! Handlers for `/subjects` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/subjects` | Enroll: allocates the next campus identifier |
//! | `GET`  | `/subjects/:serial` | 404 if not found |
//! | `POST` | `/subjects/:serial/pass` | Mark the pass (re)issued |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use lanyard_core::{
  allocator::{self, AllocError},
  campus::Campus,
  serial::StudentId,
  store::PassStore,
  subject::{PassSubject, Profile},
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── Enroll ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollBody {
  pub campus:      Campus,
  pub given_name:  String,
  pub family_name: String,
  pub email:       String,
  #[serde(default)]
  pub photo_url:   Option<String>,
}

/// `POST /subjects` — body: `{"campus":"london","givenName":…}`
pub async fn enroll<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<EnrollBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PassStore,
{
  let profile = Profile {
    given_name:  body.given_name,
    family_name: body.family_name,
    email:       body.email,
    photo_url:   body.photo_url,
  };

  let subject = allocator::allocate(store.as_ref(), body.campus, profile)
    .await
    .map_err(|e| match e {
      AllocError::Store(inner) => ApiError::Store(Box::new(inner)),
      e @ AllocError::CapacityExceeded(_) => ApiError::Conflict(e.to_string()),
      e @ AllocError::Contention { .. } => ApiError::Unavailable(e.to_string()),
    })?;

  Ok((StatusCode::CREATED, Json(subject)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /subjects/:serial`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(serial): Path<String>,
) -> Result<Json<PassSubject>, ApiError>
where
  S: PassStore,
{
  let serial = parse_serial(&serial)?;
  let subject = store
    .get_subject(serial.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("subject {serial} not found")))?;
  Ok(Json(subject))
}

// ─── Issue pass ───────────────────────────────────────────────────────────────

/// `POST /subjects/:serial/pass` — activate and timestamp the subject's pass.
pub async fn issue_pass<S>(
  State(store): State<Arc<S>>,
  Path(serial): Path<String>,
) -> Result<Json<PassSubject>, ApiError>
where
  S: PassStore,
{
  let serial = parse_serial(&serial)?;
  let subject = store
    .mark_pass_issued(serial.clone(), Utc::now())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("subject {serial} not found")))?;
  Ok(Json(subject))
}

fn parse_serial(raw: &str) -> Result<StudentId, ApiError> {
  StudentId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use lanyard_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;
  use crate::api_router;

  async fn request(
    store:  Arc<SqliteStore>,
    method: &str,
    uri:    &str,
    body:   &str,
  ) -> axum::response::Response {
    let req = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap();
    api_router(store).oneshot(req).await.unwrap()
  }

  async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  const ENROLL: &str = r#"{
    "campus": "london",
    "givenName": "Alice",
    "familyName": "Liddell",
    "email": "alice@example.ac.uk"
  }"#;

  #[tokio::test]
  async fn enroll_allocates_sequential_serials() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());

    let first = request(store.clone(), "POST", "/subjects", ENROLL).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let json = body_json(first).await;
    assert_eq!(json["serial"], "207100001");
    assert_eq!(json["pass_active"], false);

    let second = request(store, "POST", "/subjects", ENROLL).await;
    let json = body_json(second).await;
    assert_eq!(json["serial"], "207100002");
  }

  #[tokio::test]
  async fn get_one_roundtrip_and_not_found() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    request(store.clone(), "POST", "/subjects", ENROLL).await;

    let found =
      request(store.clone(), "GET", "/subjects/207100001", "").await;
    assert_eq!(found.status(), StatusCode::OK);
    let json = body_json(found).await;
    assert_eq!(json["profile"]["given_name"], "Alice");

    let missing = request(store.clone(), "GET", "/subjects/207100002", "").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let invalid = request(store, "GET", "/subjects/not-a-serial", "").await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn issue_pass_activates_and_timestamps() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    request(store.clone(), "POST", "/subjects", ENROLL).await;

    let resp =
      request(store.clone(), "POST", "/subjects/207100001/pass", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["pass_active"], true);
    assert!(json["pass_updated_at"].is_string());

    let missing =
      request(store, "POST", "/subjects/207100002/pass", "").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
  }
}
