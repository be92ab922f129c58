//! Campus-scoped student identifier allocation.
//!
//! Allocation is a read-increment-insert sequence: find the greatest
//! sequence already issued for the campus, add one, and persist the subject
//! under that identifier. The read gives no protection against concurrent
//! allocations — uniqueness comes from the store's constraint, surfaced as
//! [`InsertOutcome::SerialTaken`], and a lost race retries the whole
//! sequence from the read step.

use chrono::Utc;
use thiserror::Error;

use crate::{
  campus::Campus,
  serial::{SEQ_MIN, StudentId},
  store::{InsertOutcome, PassStore},
  subject::{PassSubject, Profile},
};

/// Retry budget for lost allocation races. Exhausting it is retryable by
/// re-issuing the whole enrollment request, unlike capacity exhaustion.
pub const MAX_ATTEMPTS: u32 = 3;

/// Errors surfaced by [`allocate`].
#[derive(Debug, Error)]
pub enum AllocError<E> {
  /// The campus has issued its entire sequence space. Terminal: the
  /// sequence never wraps and never rolls over to another campus.
  #[error("campus {0} has exhausted its identifier space")]
  CapacityExceeded(Campus),

  /// Every attempt lost the insert race. The caller may retry the whole
  /// enrollment operation.
  #[error("identifier allocation contended after {attempts} attempts")]
  Contention { attempts: u32 },

  #[error(transparent)]
  Store(E),
}

impl<E> AllocError<E> {
  pub fn is_retryable(&self) -> bool {
    matches!(self, AllocError::Contention { .. })
  }
}

/// Allocate the next identifier for `campus` and persist the new subject.
///
/// On success exactly one new subject row exists with the returned serial;
/// on any error no row was created by this call.
pub async fn allocate<S>(
  store: &S,
  campus: Campus,
  profile: Profile,
) -> Result<PassSubject, AllocError<S::Error>>
where
  S: PassStore,
{
  for attempt in 1..=MAX_ATTEMPTS {
    let last = store
      .max_sequence(campus)
      .await
      .map_err(AllocError::Store)?;
    let next = last.map_or(SEQ_MIN, |n| n.saturating_add(1));

    let serial = StudentId::from_parts(campus, next)
      .ok_or(AllocError::CapacityExceeded(campus))?;

    let subject = PassSubject {
      serial:          serial.clone(),
      campus,
      profile:         profile.clone(),
      pass_active:     false,
      pass_updated_at: None,
      created_at:      Utc::now(),
    };

    match store
      .insert_subject(subject.clone())
      .await
      .map_err(AllocError::Store)?
    {
      InsertOutcome::Inserted => return Ok(subject),
      InsertOutcome::SerialTaken => {
        tracing::warn!(%serial, attempt, "lost allocation race, retrying");
      }
    }
  }

  Err(AllocError::Contention { attempts: MAX_ATTEMPTS })
}

#[cfg(test)]
mod tests {
  use std::{
    collections::BTreeMap,
    sync::{
      Mutex,
      atomic::{AtomicU32, Ordering},
    },
  };

  use chrono::{DateTime, Utc};

  use super::*;
  use crate::{
    registration::{
      DeviceSerials, PassRegistration, PushToken, RegisterOutcome,
      UnregisterOutcome,
    },
    serial::SEQ_MAX,
  };

  /// Subject-only in-memory store; directory methods are never exercised by
  /// allocator tests.
  #[derive(Default)]
  struct MemStore {
    subjects: Mutex<BTreeMap<String, PassSubject>>,
    /// Number of inserts to reject as lost races before accepting.
    contend:  AtomicU32,
  }

  impl MemStore {
    fn contending(n: u32) -> MemStore {
      MemStore { contend: AtomicU32::new(n), ..MemStore::default() }
    }
  }

  impl PassStore for MemStore {
    type Error = std::convert::Infallible;

    async fn insert_subject(
      &self,
      subject: PassSubject,
    ) -> Result<InsertOutcome, Self::Error> {
      if self.contend.load(Ordering::SeqCst) > 0 {
        self.contend.fetch_sub(1, Ordering::SeqCst);
        return Ok(InsertOutcome::SerialTaken);
      }
      let mut subjects = self.subjects.lock().unwrap();
      if subjects.contains_key(subject.serial.as_str()) {
        return Ok(InsertOutcome::SerialTaken);
      }
      subjects.insert(subject.serial.as_str().to_string(), subject);
      Ok(InsertOutcome::Inserted)
    }

    async fn get_subject(
      &self,
      serial: StudentId,
    ) -> Result<Option<PassSubject>, Self::Error> {
      Ok(self.subjects.lock().unwrap().get(serial.as_str()).cloned())
    }

    async fn max_sequence(
      &self,
      campus: Campus,
    ) -> Result<Option<u32>, Self::Error> {
      Ok(
        self
          .subjects
          .lock()
          .unwrap()
          .values()
          .filter(|s| s.campus == campus)
          .map(|s| s.serial.sequence())
          .max(),
      )
    }

    async fn mark_pass_issued(
      &self,
      _: StudentId,
      _: DateTime<Utc>,
    ) -> Result<Option<PassSubject>, Self::Error> {
      unimplemented!()
    }

    async fn register_device(
      &self,
      _: StudentId,
      _: String,
      _: PushToken,
    ) -> Result<RegisterOutcome, Self::Error> {
      unimplemented!()
    }

    async fn serials_for_device(
      &self,
      _: String,
      _: Option<DateTime<Utc>>,
    ) -> Result<DeviceSerials, Self::Error> {
      unimplemented!()
    }

    async fn has_registration(
      &self,
      _: String,
      _: StudentId,
    ) -> Result<bool, Self::Error> {
      unimplemented!()
    }

    async fn live_registration(
      &self,
      _: StudentId,
    ) -> Result<Option<PassRegistration>, Self::Error> {
      unimplemented!()
    }

    async fn unregister_device(
      &self,
      _: String,
      _: StudentId,
    ) -> Result<UnregisterOutcome, Self::Error> {
      unimplemented!()
    }
  }

  fn profile() -> Profile {
    Profile {
      given_name:  "Alice".into(),
      family_name: "Liddell".into(),
      email:       "alice@example.ac.uk".into(),
      photo_url:   None,
    }
  }

  #[tokio::test]
  async fn first_allocation_starts_the_sequence() {
    let store = MemStore::default();
    let subject = allocate(&store, Campus::London, profile()).await.unwrap();
    assert_eq!(subject.serial.as_str(), "207100001");
    assert!(!subject.pass_active);
  }

  #[tokio::test]
  async fn allocations_are_sequential_per_campus() {
    let store = MemStore::default();
    for expected in ["208100001", "208100002", "208100003"] {
      let subject =
        allocate(&store, Campus::Bristol, profile()).await.unwrap();
      assert_eq!(subject.serial.as_str(), expected);
    }
  }

  #[tokio::test]
  async fn campuses_do_not_share_sequences() {
    let store = MemStore::default();
    allocate(&store, Campus::London, profile()).await.unwrap();
    allocate(&store, Campus::London, profile()).await.unwrap();
    let sheffield =
      allocate(&store, Campus::Sheffield, profile()).await.unwrap();
    assert_eq!(sheffield.serial.as_str(), "209100001");
  }

  #[tokio::test]
  async fn capacity_exhaustion_is_terminal() {
    let store = MemStore::default();
    let last = PassSubject {
      serial:          StudentId::from_parts(Campus::London, SEQ_MAX).unwrap(),
      campus:          Campus::London,
      profile:         profile(),
      pass_active:     false,
      pass_updated_at: None,
      created_at:      Utc::now(),
    };
    store.insert_subject(last).await.unwrap();

    let err = allocate(&store, Campus::London, profile()).await.unwrap_err();
    assert!(matches!(err, AllocError::CapacityExceeded(Campus::London)));
    assert!(!err.is_retryable());
    // No row beyond the one we seeded.
    assert_eq!(store.subjects.lock().unwrap().len(), 1);
    // Other campuses are unaffected.
    let bristol = allocate(&store, Campus::Bristol, profile()).await.unwrap();
    assert_eq!(bristol.serial.as_str(), "208100001");
  }

  #[tokio::test]
  async fn lost_races_are_retried_within_budget() {
    let store = MemStore::contending(2);
    let subject = allocate(&store, Campus::London, profile()).await.unwrap();
    assert_eq!(subject.serial.as_str(), "207100001");
  }

  #[tokio::test]
  async fn exhausted_retries_surface_as_contention() {
    let store = MemStore::contending(MAX_ATTEMPTS);
    let err = allocate(&store, Campus::London, profile()).await.unwrap_err();
    assert!(
      matches!(err, AllocError::Contention { attempts } if attempts == MAX_ATTEMPTS)
    );
    assert!(err.is_retryable());
  }
}
