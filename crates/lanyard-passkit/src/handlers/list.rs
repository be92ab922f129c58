//! GET listing handler — serials a device is registered for.
//!
//! No auth: the listing carries serials only, and the original wire contract
//! does not credential this endpoint.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, TimeZone as _, Utc};
use lanyard_core::{serial::StudentId, store::PassStore};
use lanyard_builder::PassBuilder;
use serde::{Deserialize, Serialize};

use crate::{AppState, error::Error, handlers::ensure_pass_type};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListParams {
  pub passes_updated_since: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialList {
  pub serial_numbers: Vec<StudentId>,
  pub last_updated:   String,
}

pub async fn handler<S, B>(
  State(state): State<AppState<S, B>>,
  Path((device_id, pass_type_id)): Path<(String, String)>,
  Query(params): Query<ListParams>,
) -> Result<Json<SerialList>, Error>
where
  S: PassStore + 'static,
  B: PassBuilder + 'static,
{
  ensure_pass_type(&state.config.pass_type_id, &pass_type_id)?;

  let since = params
    .passes_updated_since
    .as_deref()
    .and_then(parse_updated_since);

  let listed = state
    .store
    .serials_for_device(device_id, since)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;

  // An empty set is a valid, successful response; the watermark falls back
  // to the current time.
  let last_updated = listed.last_updated.unwrap_or_else(Utc::now);

  Ok(Json(SerialList {
    serial_numbers: listed.serials,
    last_updated:   last_updated.to_rfc3339(),
  }))
}

/// RFC 3339 or unix seconds; anything unparseable is ignored and the full
/// listing is returned.
fn parse_updated_since(raw: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  raw
    .parse::<i64>()
    .ok()
    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
