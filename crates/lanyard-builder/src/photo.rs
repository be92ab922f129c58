//! Bounded photo retrieval with placeholder fallback.
//!
//! A missing or unreachable photo must never fail pass issuance: any fetch
//! error, timeout, or non-success status yields the embedded placeholder.

use std::time::Duration;

use bytes::Bytes;

/// Total per-fetch budget, connection included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// 1x1 transparent PNG served when a subject photo cannot be retrieved.
pub const PLACEHOLDER_PNG: &[u8] = &[
  0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
  0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
  0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00,
  0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
  0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
  0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// HTTP client for subject photos.
#[derive(Clone, Default)]
pub struct PhotoFetcher {
  client: reqwest::Client,
}

impl PhotoFetcher {
  pub fn new() -> PhotoFetcher { PhotoFetcher::default() }

  /// Fetch `url`, falling back to [`PLACEHOLDER_PNG`] on any failure.
  pub async fn fetch(&self, url: &str) -> Bytes {
    match self.try_fetch(url).await {
      Ok(bytes) => bytes,
      Err(e) => {
        tracing::warn!(url, error = %e, "photo fetch failed, using placeholder");
        Bytes::from_static(PLACEHOLDER_PNG)
      }
    }
  }

  async fn try_fetch(&self, url: &str) -> Result<Bytes, reqwest::Error> {
    let response = self
      .client
      .get(url)
      .timeout(FETCH_TIMEOUT)
      .send()
      .await?
      .error_for_status()?;
    response.bytes().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn unreachable_url_yields_placeholder() {
    let fetcher = PhotoFetcher::new();
    // Nothing listens on this port; the connection is refused immediately.
    let bytes = fetcher.fetch("http://127.0.0.1:9/photo.jpg").await;
    assert_eq!(&bytes[..], PLACEHOLDER_PNG);
  }

  #[test]
  fn placeholder_is_a_png() {
    assert_eq!(&PLACEHOLDER_PNG[..8], b"\x89PNG\r\n\x1a\n");
  }
}
