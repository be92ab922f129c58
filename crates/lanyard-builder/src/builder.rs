//! [`PassAssembler`] — photo retrieval plus signing, behind the
//! [`PassBuilder`] contract the protocol server consumes.

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use lanyard_core::subject::PassSubject;

use crate::{
  error::Result,
  photo::{PLACEHOLDER_PNG, PhotoFetcher},
  signer::{PassSigner, SignRequest, SignedPass},
};

/// A produced pass artifact.
#[derive(Debug, Clone)]
pub struct BuiltPass {
  pub bytes:        Bytes,
  pub content_type: String,
  /// The subject last-modified value the artifact corresponds to; the
  /// current time when the subject has never had a pass issued.
  pub modified:     DateTime<Utc>,
}

/// Abstraction the protocol server builds passes through.
pub trait PassBuilder: Send + Sync {
  fn build<'a>(
    &'a self,
    subject: &'a PassSubject,
  ) -> impl Future<Output = Result<BuiltPass>> + Send + 'a;
}

/// The standard builder: fetch the subject's photo (bounded, with placeholder
/// fallback), then delegate to the signer.
#[derive(Clone)]
pub struct PassAssembler<S> {
  photos: PhotoFetcher,
  signer: S,
}

impl<S: PassSigner> PassAssembler<S> {
  pub fn new(signer: S) -> PassAssembler<S> {
    PassAssembler { photos: PhotoFetcher::new(), signer }
  }
}

impl<S: PassSigner> PassBuilder for PassAssembler<S> {
  async fn build(&self, subject: &PassSubject) -> Result<BuiltPass> {
    let modified = subject.pass_updated_at.unwrap_or_else(Utc::now);

    let photo = match subject.profile.photo_url.as_deref() {
      Some(url) => self.photos.fetch(url).await,
      None      => Bytes::from_static(PLACEHOLDER_PNG),
    };

    let SignedPass { bytes, content_type } = self
      .signer
      .sign(SignRequest {
        serial:      subject.serial.clone(),
        campus:      subject.campus,
        given_name:  subject.profile.given_name.clone(),
        family_name: subject.profile.family_name.clone(),
        email:       subject.profile.email.clone(),
        modified,
        photo,
      })
      .await?;

    Ok(BuiltPass { bytes, content_type, modified })
  }
}
