//! The pass auth-token scheme.
//!
//! A token is `hex(HMAC-SHA256(secret, "{serial}:{day_bucket}"))` where the
//! day bucket is `floor(unix_now / 86400)`. The token is bound to one pass
//! and one 24-hour window, which caps how long a replayed token stays useful
//! without the server keeping any per-request state.

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lanyard_core::serial::StudentId;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq as _;

use crate::error::Error;

/// Width of the rotation window.
pub const DAY_BUCKET_SECS: i64 = 86_400;

/// Authorization scheme name on the wire: `Authorization: PassAuth <token>`.
pub const AUTH_SCHEME: &str = "PassAuth";

type HmacSha256 = Hmac<Sha256>;

// ─── Verification mode ───────────────────────────────────────────────────────

/// Server-wide verification mode. Permissive mode exists for protocol
/// conformance testing against clients that do not yet send credentials and
/// must be switched on explicitly in configuration — strict is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
  /// Missing or mismatched token aborts the request with 401.
  #[default]
  Strict,
  /// Mismatch is logged as a warning and the request proceeds.
  Permissive,
}

// ─── Token scheme ────────────────────────────────────────────────────────────

/// Mints and verifies pass auth tokens for one server secret.
#[derive(Clone)]
pub struct TokenScheme {
  mac: HmacSha256,
}

impl TokenScheme {
  pub fn new(secret: &[u8]) -> TokenScheme {
    // HMAC-SHA256 accepts keys of any length; this cannot fail.
    let mac = HmacSha256::new_from_slice(secret)
      .expect("HMAC accepts keys of any length");
    TokenScheme { mac }
  }

  /// The valid token for `serial` in the current day bucket.
  pub fn mint(&self, serial: &StudentId) -> String {
    self.mint_at(serial, Utc::now())
  }

  pub fn mint_at(&self, serial: &StudentId, now: DateTime<Utc>) -> String {
    let bucket = now.timestamp().div_euclid(DAY_BUCKET_SECS);
    let mut mac = self.mac.clone();
    mac.update(format!("{serial}:{bucket}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  /// Constant-time check of a presented token against the current bucket.
  pub fn verify(&self, serial: &StudentId, presented: &str) -> bool {
    self.verify_at(serial, presented, Utc::now())
  }

  pub fn verify_at(
    &self,
    serial: &StudentId,
    presented: &str,
    now: DateTime<Utc>,
  ) -> bool {
    let expected = self.mint_at(serial, now);
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
  }
}

// ─── Request authorization ───────────────────────────────────────────────────

/// Verify the `Authorization` header for `serial` under `mode`.
///
/// In strict mode a failure aborts the request before any directory access;
/// in permissive mode it is logged and the request continues.
pub fn authorize(
  headers: &HeaderMap,
  tokens: &TokenScheme,
  mode: AuthMode,
  serial: &StudentId,
) -> Result<(), Error> {
  let presented = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix(AUTH_SCHEME))
    .map(str::trim_start);

  if presented.is_some_and(|t| tokens.verify(serial, t)) {
    return Ok(());
  }

  match mode {
    AuthMode::Strict => Err(Error::Unauthorized),
    AuthMode::Permissive => {
      tracing::warn!(
        %serial,
        "missing or invalid pass auth token; permissive mode, continuing"
      );
      Ok(())
    }
  }
}
