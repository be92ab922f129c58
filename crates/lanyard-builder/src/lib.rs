//! Pass artifact assembly for Lanyard.
//!
//! Signing is an opaque collaborator behind the [`PassSigner`] trait; this
//! crate owns everything around it — photo retrieval with a bounded timeout
//! and placeholder fallback, and the [`PassBuilder`] contract the protocol
//! server consumes. Two builds of an unchanged subject are indistinguishable
//! to the conditional-fetch logic: the artifact's `modified` value is always
//! the subject's stored last-modified timestamp.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod builder;
pub mod error;
pub mod photo;
pub mod signer;

pub use builder::{BuiltPass, PassAssembler, PassBuilder};
pub use error::{Error, Result};
pub use signer::{HttpSigner, PassSigner, SignRequest, SignedPass, StaticSigner};
