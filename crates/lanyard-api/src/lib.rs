//! JSON boundary API for enrollment.
//!
//! Exposes an axum [`Router`] backed by any [`lanyard_core::store::PassStore`].
//! This is the seam the (out-of-scope) admissions system drives: enrolling a
//! student allocates an identifier, and marking a pass (re)issued is what
//! makes registered devices observe a change. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", lanyard_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod subjects;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use lanyard_core::store::PassStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: PassStore + 'static,
{
  Router::new()
    .route("/subjects", post(subjects::enroll::<S>))
    .route("/subjects/{serial}", get(subjects::get_one::<S>))
    .route("/subjects/{serial}/pass", post(subjects::issue_pass::<S>))
    .with_state(store)
}
