//! Error types for `lanyard-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown campus: {0:?}")]
  InvalidCampus(String),

  #[error("invalid serial number: {0:?}")]
  InvalidSerial(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
