//! Registration types for the pass registration directory.
//!
//! A registration maps a (device, serial) pair to a push-delivery token. The
//! directory enforces a single-active-device policy: registering a second
//! device for the same serial displaces the first. The multi-device token
//! encoding survives only as a read path for rows persisted by the legacy
//! system.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serial::StudentId;

// ─── Push token ──────────────────────────────────────────────────────────────

/// The push-token payload of a registration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "lowercase")]
pub enum PushToken {
  /// One opaque token for the single live device. All new writes use this.
  Single(String),
  /// Legacy encoding: one token per device library identifier. Never written
  /// for fresh registrations; decoded from previously persisted data so that
  /// per-device unregistration keeps working.
  PerDevice(BTreeMap<String, String>),
}

impl PushToken {
  pub fn single(token: impl Into<String>) -> PushToken {
    PushToken::Single(token.into())
  }

  /// Decode a raw value written by the legacy system, which carried no format
  /// discriminator. A JSON-object-shaped string is a per-device map; anything
  /// else — including an object-shaped string that fails to parse — is one
  /// opaque token.
  pub fn sniff_legacy(raw: &str) -> PushToken {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
      if let Ok(map) = serde_json::from_str::<BTreeMap<String, String>>(trimmed)
      {
        return PushToken::PerDevice(map);
      }
    }
    PushToken::Single(raw.to_string())
  }

  /// True when the token carries no delivery target at all.
  pub fn is_empty(&self) -> bool {
    match self {
      PushToken::Single(t)    => t.is_empty(),
      PushToken::PerDevice(m) => m.is_empty(),
    }
  }
}

// ─── Registration row ────────────────────────────────────────────────────────

/// A live registration row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRegistration {
  pub device_id:  String,
  pub serial:     StudentId,
  pub push_token: PushToken,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Operation outcomes ──────────────────────────────────────────────────────

/// Outcome of a register call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
  /// A fresh row was created for the serial.
  Created,
  /// An existing row was consolidated and overwritten.
  Updated,
  /// No subject exists for the serial; nothing was written.
  UnknownSubject,
}

/// Outcome of an unregister call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterOutcome {
  /// The live row for the serial was deleted.
  Removed,
  /// A legacy per-device row lost one entry but stays alive for the rest.
  Retained,
  /// No row exists for the serial at all.
  NotFound,
}

/// Serials registered to one device, with the directory's freshness
/// watermark across the returned rows.
#[derive(Debug, Clone)]
pub struct DeviceSerials {
  pub serials:      Vec<StudentId>,
  /// Maximum `updated_at` across the returned rows; `None` when the result
  /// set is empty (callers substitute the current time).
  pub last_updated: Option<DateTime<Utc>>,
}
