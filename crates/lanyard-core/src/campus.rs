//! Campus — the enrollment location.
//!
//! Each campus owns a fixed 3-digit numeric prefix; the prefix is the leading
//! component of every student identifier issued for that campus and must
//! never change once identifiers are in circulation.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator as _};

use crate::error::Error;

/// An enrollment campus.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Campus {
  London,
  Bristol,
  Sheffield,
  Birmingham,
}

impl Campus {
  /// The fixed 3-digit identifier prefix for this campus.
  pub fn prefix(self) -> &'static str {
    match self {
      Campus::London     => "207",
      Campus::Bristol    => "208",
      Campus::Sheffield  => "209",
      Campus::Birmingham => "210",
    }
  }

  /// Lowercase name as used on the wire and in storage.
  pub fn name(self) -> &'static str {
    match self {
      Campus::London     => "london",
      Campus::Bristol    => "bristol",
      Campus::Sheffield  => "sheffield",
      Campus::Birmingham => "birmingham",
    }
  }

  /// Resolve a campus from its 3-digit identifier prefix.
  pub fn from_prefix(prefix: &str) -> Option<Campus> {
    Campus::iter().find(|c| c.prefix() == prefix)
  }
}

impl fmt::Display for Campus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Campus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Campus::iter()
      .find(|c| c.name() == s)
      .ok_or_else(|| Error::InvalidCampus(s.to_string()))
  }
}
