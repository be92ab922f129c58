//! Error type for `lanyard-builder`.
//!
//! Photo-fetch failures never appear here: they are recovered locally with a
//! placeholder image inside [`crate::photo::PhotoFetcher`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("signing failed: {0}")]
  Signer(String),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
