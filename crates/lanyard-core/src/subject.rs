//! PassSubject — the enrolled-student record a pass is bound to.
//!
//! A subject is created at enrollment time by the allocator and never deleted
//! while the student remains enrolled. Pass (re)issuance mutates only the
//! `pass_active` flag and the `pass_updated_at` timestamp; that timestamp is
//! the last-modified value the conditional-fetch logic compares against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{campus::Campus, serial::StudentId};

/// Profile fields carried on the pass face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub given_name:  String,
  pub family_name: String,
  pub email:       String,
  /// Where the subject's photo can be fetched from, if one was provided.
  pub photo_url:   Option<String>,
}

/// An enrolled student, keyed by the allocated serial number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSubject {
  pub serial:          StudentId,
  pub campus:          Campus,
  pub profile:         Profile,
  pub pass_active:     bool,
  /// Set each time a pass is (re)issued for the subject. `None` until the
  /// first issuance.
  pub pass_updated_at: Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
}

impl PassSubject {
  /// The timestamp conditional fetches compare against.
  pub fn last_modified(&self) -> Option<DateTime<Utc>> { self.pass_updated_at }
}
