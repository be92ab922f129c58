//! The opaque signing collaborator.
//!
//! Lanyard does not know how passes are signed; it hands the signer the
//! subject's field values and photo and receives signed bytes plus a content
//! type back. [`HttpSigner`] is the production adapter (an external signing
//! service); [`StaticSigner`] is a deterministic in-process stand-in for
//! tests and development.

use std::future::Future;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lanyard_core::{campus::Campus, serial::StudentId};
use serde::Serialize;

use crate::error::{Error, Result};

/// Content type of a signed pass artifact.
pub const PASS_CONTENT_TYPE: &str = "application/vnd.apple.pkpass";

// ─── Contract ────────────────────────────────────────────────────────────────

/// Everything the signer needs to produce a pass artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
  pub serial:      StudentId,
  pub campus:      Campus,
  pub given_name:  String,
  pub family_name: String,
  pub email:       String,
  /// The subject's last-modified value the artifact corresponds to.
  pub modified:    DateTime<Utc>,
  /// Photo bytes, base64 on the wire.
  #[serde(serialize_with = "as_base64")]
  pub photo:       Bytes,
}

fn as_base64<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
  S: serde::Serializer,
{
  serializer.serialize_str(&B64.encode(bytes))
}

/// A signed artifact as returned by the collaborator.
#[derive(Debug, Clone)]
pub struct SignedPass {
  pub bytes:        Bytes,
  pub content_type: String,
}

/// The signing black box.
pub trait PassSigner: Send + Sync {
  fn sign(
    &self,
    request: SignRequest,
  ) -> impl Future<Output = Result<SignedPass>> + Send + '_;
}

// ─── HTTP adapter ────────────────────────────────────────────────────────────

/// Adapter to an external signing service: POSTs the [`SignRequest`] as JSON
/// and returns the response body as the signed artifact.
#[derive(Clone)]
pub struct HttpSigner {
  client:   reqwest::Client,
  endpoint: String,
}

impl HttpSigner {
  pub fn new(endpoint: impl Into<String>) -> HttpSigner {
    HttpSigner { client: reqwest::Client::new(), endpoint: endpoint.into() }
  }
}

impl PassSigner for HttpSigner {
  async fn sign(&self, request: SignRequest) -> Result<SignedPass> {
    let response = self
      .client
      .post(&self.endpoint)
      .json(&request)
      .send()
      .await?
      .error_for_status()?;

    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or(PASS_CONTENT_TYPE)
      .to_string();

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
      return Err(Error::Signer("signing service returned no body".into()));
    }

    Ok(SignedPass { bytes, content_type })
  }
}

// ─── Deterministic stand-in ──────────────────────────────────────────────────

/// In-process signer whose output is a pure function of the request fields.
/// Useful wherever a real signing service is unavailable; the determinism is
/// what lets conditional-fetch tests treat repeated builds as identical.
#[derive(Clone, Copy, Default)]
pub struct StaticSigner;

impl PassSigner for StaticSigner {
  async fn sign(&self, request: SignRequest) -> Result<SignedPass> {
    let body = serde_json::to_vec(&request)
      .map_err(|e| Error::Signer(e.to_string()))?;
    Ok(SignedPass {
      bytes:        Bytes::from(body),
      content_type: PASS_CONTENT_TYPE.to_string(),
    })
  }
}
