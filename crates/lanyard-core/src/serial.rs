//! StudentId — the serial number of a pass.
//!
//! Format: `{campus prefix:3 digits}{sequence:6 digits}`, e.g. `207100001`.
//! Identifiers are immutable once assigned and globally unique; the sequence
//! space per campus is 100001..=999999.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{campus::Campus, error::Error};

/// First sequence value issued for each campus.
pub const SEQ_MIN: u32 = 100_001;
/// Last sequence value a campus may issue; exceeding it is a terminal
/// capacity failure, never a rollover.
pub const SEQ_MAX: u32 = 999_999;

/// A validated 9-digit student identifier / pass serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudentId(String);

impl StudentId {
  /// Construct from a campus and a sequence value.
  ///
  /// Returns `None` when `sequence` falls outside the issuable range — the
  /// allocator reads this as capacity exhaustion.
  pub fn from_parts(campus: Campus, sequence: u32) -> Option<StudentId> {
    if !(SEQ_MIN..=SEQ_MAX).contains(&sequence) {
      return None;
    }
    Some(StudentId(format!("{}{sequence:06}", campus.prefix())))
  }

  /// Parse and validate a wire/storage representation.
  pub fn parse(s: &str) -> Result<StudentId, Error> {
    if s.len() != 9 || !s.chars().all(|c| c.is_ascii_digit()) {
      return Err(Error::InvalidSerial(s.to_string()));
    }
    let campus = Campus::from_prefix(&s[..3])
      .ok_or_else(|| Error::InvalidSerial(s.to_string()))?;
    let sequence: u32 = s[3..]
      .parse()
      .map_err(|_| Error::InvalidSerial(s.to_string()))?;
    StudentId::from_parts(campus, sequence)
      .ok_or_else(|| Error::InvalidSerial(s.to_string()))
  }

  /// The campus the identifier was issued for.
  pub fn campus(&self) -> Campus {
    // Validated at construction; the prefix is always a known campus.
    Campus::from_prefix(&self.0[..3]).unwrap_or(Campus::London)
  }

  /// The 6-digit sequence component.
  pub fn sequence(&self) -> u32 {
    self.0[3..].parse().unwrap_or(0)
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for StudentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for StudentId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> { StudentId::parse(s) }
}

impl TryFrom<String> for StudentId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { StudentId::parse(&s) }
}

impl From<StudentId> for String {
  fn from(id: StudentId) -> String { id.0 }
}

impl AsRef<str> for StudentId {
  fn as_ref(&self) -> &str { &self.0 }
}
