//! SQLite backend for the Lanyard pass store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. The serial-number uniqueness the
//! allocator depends on is the `pass_subjects` primary key; every directory
//! mutation runs inside a single transaction scoped by serial number.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
