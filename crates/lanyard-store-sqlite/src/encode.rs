//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings (fixed UTC offset, so
//! lexicographic order is chronological order). Push tokens are stored as an
//! opaque TEXT column next to a format discriminator; rows written by the
//! legacy system carry the `legacy` discriminator and are decoded by
//! structural sniffing.

use chrono::{DateTime, Utc};
use lanyard_core::{
  campus::Campus,
  registration::{PassRegistration, PushToken},
  serial::StudentId,
  subject::{PassSubject, Profile},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Campus ──────────────────────────────────────────────────────────────────

pub fn encode_campus(c: Campus) -> &'static str { c.name() }

pub fn decode_campus(s: &str) -> Result<Campus> {
  s.parse().map_err(Error::Core)
}

// ─── Push token ──────────────────────────────────────────────────────────────

/// Column pair `(push_token, token_format)` for a token about to be written.
pub fn encode_push_token(token: &PushToken) -> Result<(String, &'static str)> {
  match token {
    PushToken::Single(t)      => Ok((t.clone(), "single")),
    PushToken::PerDevice(map) => Ok((serde_json::to_string(map)?, "multi")),
  }
}

/// Decode a stored `(push_token, token_format)` pair.
///
/// A `multi` row whose blob no longer parses is treated as a single opaque
/// token rather than an error, the same recovery the legacy sniffing path
/// applies.
pub fn decode_push_token(raw: String, format: &str) -> PushToken {
  match format {
    "single" => PushToken::Single(raw),
    "multi"  => match serde_json::from_str(&raw) {
      Ok(map) => PushToken::PerDevice(map),
      Err(_)  => PushToken::Single(raw),
    },
    _ => PushToken::sniff_legacy(&raw),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `pass_subjects` row.
pub struct RawSubject {
  pub serial:          String,
  pub campus:          String,
  pub given_name:      String,
  pub family_name:     String,
  pub email:           String,
  pub photo_url:       Option<String>,
  pub pass_active:     bool,
  pub pass_updated_at: Option<String>,
  pub created_at:      String,
}

impl RawSubject {
  pub fn into_subject(self) -> Result<PassSubject> {
    Ok(PassSubject {
      serial:          StudentId::parse(&self.serial)?,
      campus:          decode_campus(&self.campus)?,
      profile:         Profile {
        given_name:  self.given_name,
        family_name: self.family_name,
        email:       self.email,
        photo_url:   self.photo_url,
      },
      pass_active:     self.pass_active,
      pass_updated_at: self
        .pass_updated_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `pass_registrations` row.
pub struct RawRegistration {
  pub device_id:    String,
  pub serial:       String,
  pub push_token:   String,
  pub token_format: String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawRegistration {
  pub fn into_registration(self) -> Result<PassRegistration> {
    Ok(PassRegistration {
      device_id:  self.device_id,
      serial:     StudentId::parse(&self.serial)?,
      push_token: decode_push_token(self.push_token, &self.token_format),
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
