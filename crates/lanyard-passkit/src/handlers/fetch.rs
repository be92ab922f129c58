//! GET pass handler — conditional fetch of the signed artifact.

use axum::{
  body::Body,
  extract::{Path, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use lanyard_builder::PassBuilder;
use lanyard_core::store::PassStore;

use crate::{
  AppState,
  auth::authorize,
  error::Error,
  handlers::{ensure_pass_type, parse_serial},
};

pub async fn handler<S, B>(
  State(state): State<AppState<S, B>>,
  Path((pass_type_id, serial)): Path<(String, String)>,
  headers: HeaderMap,
) -> Result<Response, Error>
where
  S: PassStore + 'static,
  B: PassBuilder + 'static,
{
  let serial = parse_serial(&serial)?;
  ensure_pass_type(&state.config.pass_type_id, &pass_type_id)?;
  authorize(&headers, &state.tokens, state.config.auth_mode, &serial)?;

  let subject = state
    .store
    .get_subject(serial)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?
    .ok_or(Error::NotFound)?;

  let if_modified_since = headers
    .get(header::IF_MODIFIED_SINCE)
    .and_then(|v| v.to_str().ok())
    .and_then(parse_http_date);

  // The header has one-second precision; compare at that granularity.
  if let (Some(since), Some(modified)) =
    (if_modified_since, subject.last_modified())
    && since >= truncate_to_seconds(modified)
  {
    return Ok(StatusCode::NOT_MODIFIED.into_response());
  }

  let built = state.builder.build(&subject).await?;

  Ok(
    Response::builder()
      .status(StatusCode::OK)
      .header(header::CONTENT_TYPE, built.content_type)
      .header(
        header::LAST_MODIFIED,
        http_date(truncate_to_seconds(built.modified)),
      )
      .header(header::CONTENT_LENGTH, built.bytes.len())
      .body(Body::from(built.bytes))
      .unwrap(),
  )
}

/// HTTP-date (RFC 2822 with GMT), with RFC 3339 accepted for lenient clients.
/// Unparseable values behave as an absent header.
fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc2822(raw)
    .or_else(|_| DateTime::parse_from_rfc3339(raw))
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

fn http_date(dt: DateTime<Utc>) -> String {
  dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn http_date_roundtrip() {
    let dt = Utc.with_ymd_and_hms(2026, 8, 1, 12, 30, 45).unwrap();
    let formatted = http_date(dt);
    assert_eq!(formatted, "Sat, 01 Aug 2026 12:30:45 GMT");
    assert_eq!(parse_http_date(&formatted), Some(dt));
  }

  #[test]
  fn rfc3339_is_accepted_too() {
    let dt = parse_http_date("2026-08-01T12:30:45+00:00").unwrap();
    assert_eq!(dt, Utc.with_ymd_and_hms(2026, 8, 1, 12, 30, 45).unwrap());
    assert_eq!(parse_http_date("not a date"), None);
  }
}
