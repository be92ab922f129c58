//! The `PassStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `lanyard-store-sqlite`).
//! Higher layers (`lanyard-passkit`, `lanyard-api`) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  campus::Campus,
  registration::{
    DeviceSerials, PassRegistration, PushToken, RegisterOutcome,
    UnregisterOutcome,
  },
  serial::StudentId,
  subject::PassSubject,
};

// ─── Insert outcome ──────────────────────────────────────────────────────────

/// Result of attempting to persist a freshly allocated subject.
///
/// `SerialTaken` is not an error: it is the signal that another allocation
/// won the race for this identifier and the caller should retry from the
/// read step. The distinction is enforced by the backend's uniqueness
/// constraint, never by the read-then-write logic alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted,
  SerialTaken,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Lanyard pass store backend.
///
/// Directory mutations for a given serial (register/unregister) must be
/// atomic with respect to each other: implementations run each as a single
/// transactional read-modify-write scoped by serial number.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PassStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Persist a new subject under the store's serial uniqueness constraint.
  fn insert_subject(
    &self,
    subject: PassSubject,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + '_;

  /// Retrieve a subject by serial. Returns `None` if not found.
  fn get_subject(
    &self,
    serial: StudentId,
  ) -> impl Future<Output = Result<Option<PassSubject>, Self::Error>> + Send + '_;

  /// The numerically greatest sequence already issued for `campus`, or
  /// `None` when the campus has issued nothing yet.
  fn max_sequence(
    &self,
    campus: Campus,
  ) -> impl Future<Output = Result<Option<u32>, Self::Error>> + Send + '_;

  /// Mark the subject's pass as (re)issued at `at`: sets `pass_active` and
  /// advances `pass_updated_at`. Returns the updated subject, or `None` if
  /// the serial is unknown.
  fn mark_pass_issued(
    &self,
    serial: StudentId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<PassSubject>, Self::Error>> + Send + '_;

  // ── Registration directory ────────────────────────────────────────────

  /// Register `device_id` for updates to `serial`, consolidating any
  /// existing rows for the serial down to a single live one.
  fn register_device(
    &self,
    serial: StudentId,
    device_id: String,
    push_token: PushToken,
  ) -> impl Future<Output = Result<RegisterOutcome, Self::Error>> + Send + '_;

  /// Serials whose live registration row belongs to `device_id`, optionally
  /// restricted to rows updated strictly after `updated_since`.
  fn serials_for_device(
    &self,
    device_id: String,
    updated_since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<DeviceSerials, Self::Error>> + Send + '_;

  /// True only if the live row for `serial` has exactly this device.
  fn has_registration(
    &self,
    device_id: String,
    serial: StudentId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// The live registration row for `serial`, if any.
  fn live_registration(
    &self,
    serial: StudentId,
  ) -> impl Future<Output = Result<Option<PassRegistration>, Self::Error>> + Send + '_;

  /// Remove `device_id`'s interest in `serial`.
  ///
  /// Cross-device-tolerant: if the serial's live row belongs to a different
  /// device (consolidation displaced the requester earlier), that row is
  /// removed anyway. Legacy per-device rows lose only the requester's entry.
  fn unregister_device(
    &self,
    device_id: String,
    serial: StudentId,
  ) -> impl Future<Output = Result<UnregisterOutcome, Self::Error>> + Send + '_;
}
