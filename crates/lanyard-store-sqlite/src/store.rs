//! [`SqliteStore`] — the SQLite implementation of [`PassStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use lanyard_core::{
  campus::Campus,
  registration::{
    DeviceSerials, PassRegistration, PushToken, RegisterOutcome,
    UnregisterOutcome,
  },
  serial::StudentId,
  store::{InsertOutcome, PassStore},
  subject::PassSubject,
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{
    RawRegistration, RawSubject, decode_dt, encode_campus, encode_dt,
    encode_push_token,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lanyard pass store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

const SUBJECT_COLUMNS: &str = "serial, campus, given_name, family_name, \
                               email, photo_url, pass_active, \
                               pass_updated_at, created_at";

fn subject_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubject> {
  Ok(RawSubject {
    serial:          row.get(0)?,
    campus:          row.get(1)?,
    given_name:      row.get(2)?,
    family_name:     row.get(3)?,
    email:           row.get(4)?,
    photo_url:       row.get(5)?,
    pass_active:     row.get(6)?,
    pass_updated_at: row.get(7)?,
    created_at:      row.get(8)?,
  })
}

const REGISTRATION_COLUMNS: &str =
  "device_id, serial, push_token, token_format, created_at, updated_at";

fn registration_from_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<RawRegistration> {
  Ok(RawRegistration {
    device_id:    row.get(0)?,
    serial:       row.get(1)?,
    push_token:   row.get(2)?,
    token_format: row.get(3)?,
    created_at:   row.get(4)?,
    updated_at:   row.get(5)?,
  })
}

// ─── PassStore impl ──────────────────────────────────────────────────────────

impl PassStore for SqliteStore {
  type Error = Error;

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn insert_subject(
    &self,
    subject: PassSubject,
  ) -> Result<InsertOutcome> {
    let serial_str     = subject.serial.as_str().to_owned();
    let campus_str     = encode_campus(subject.campus).to_owned();
    let given          = subject.profile.given_name.clone();
    let family         = subject.profile.family_name.clone();
    let email          = subject.profile.email.clone();
    let photo_url      = subject.profile.photo_url.clone();
    let pass_active    = subject.pass_active;
    let pass_updated   = subject.pass_updated_at.map(encode_dt);
    let created_at_str = encode_dt(subject.created_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO pass_subjects (
             serial, campus, given_name, family_name, email, photo_url,
             pass_active, pass_updated_at, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            serial_str,
            campus_str,
            given,
            family,
            email,
            photo_url,
            pass_active,
            pass_updated,
            created_at_str,
          ],
        );
        match result {
          Ok(_) => Ok(InsertOutcome::Inserted),
          // The primary key won the race for us: another allocation holds
          // this serial.
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            Ok(InsertOutcome::SerialTaken)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(outcome)
  }

  async fn get_subject(
    &self,
    serial: StudentId,
  ) -> Result<Option<PassSubject>> {
    let serial_str = serial.as_str().to_owned();

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SUBJECT_COLUMNS} FROM pass_subjects WHERE serial = ?1"
              ),
              rusqlite::params![serial_str],
              subject_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn max_sequence(&self, campus: Campus) -> Result<Option<u32>> {
    let pattern = format!("{}%", campus.prefix());

    // Serials are fixed-width and zero-padded, so the lexicographic maximum
    // is the numeric maximum.
    let max_serial: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT MAX(serial) FROM pass_subjects WHERE serial LIKE ?1",
          rusqlite::params![pattern],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(max_serial.and_then(|s| s.get(3..).and_then(|seq| seq.parse().ok())))
  }

  async fn mark_pass_issued(
    &self,
    serial: StudentId,
    at: DateTime<Utc>,
  ) -> Result<Option<PassSubject>> {
    let serial_str = serial.as_str().to_owned();
    let at_str     = encode_dt(at);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE pass_subjects
           SET pass_active = 1, pass_updated_at = ?2
           WHERE serial = ?1",
          rusqlite::params![serial_str, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SUBJECT_COLUMNS} FROM pass_subjects WHERE serial = ?1"
              ),
              rusqlite::params![serial_str],
              subject_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  // ── Registration directory ────────────────────────────────────────────────

  async fn register_device(
    &self,
    serial: StudentId,
    device_id: String,
    push_token: PushToken,
  ) -> Result<RegisterOutcome> {
    let serial_str = serial.as_str().to_owned();
    let (token_raw, token_format) = encode_push_token(&push_token)?;
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let subject_exists: bool = tx
          .query_row(
            "SELECT 1 FROM pass_subjects WHERE serial = ?1",
            rusqlite::params![serial_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !subject_exists {
          return Ok(RegisterOutcome::UnknownSubject);
        }

        // All rows for this serial, newest first. More than one can only be
        // left over from an earlier inconsistent state; keep the newest and
        // delete the rest before overwriting.
        let survivors: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT device_id FROM pass_registrations
             WHERE serial = ?1
             ORDER BY updated_at DESC, device_id",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![serial_str], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          rows
        };

        let outcome = match survivors.first() {
          None => {
            tx.execute(
              "INSERT INTO pass_registrations (
                 device_id, serial, push_token, token_format,
                 created_at, updated_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
              rusqlite::params![
                device_id, serial_str, token_raw, token_format, now_str
              ],
            )?;
            RegisterOutcome::Created
          }
          Some(keep) => {
            tx.execute(
              "DELETE FROM pass_registrations
               WHERE serial = ?1 AND device_id != ?2",
              rusqlite::params![serial_str, keep],
            )?;
            tx.execute(
              "UPDATE pass_registrations
               SET device_id = ?2, push_token = ?3, token_format = ?4,
                   updated_at = ?5
               WHERE serial = ?1 AND device_id = ?6",
              rusqlite::params![
                serial_str, device_id, token_raw, token_format, now_str, keep
              ],
            )?;
            RegisterOutcome::Updated
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }

  async fn serials_for_device(
    &self,
    device_id: String,
    updated_since: Option<DateTime<Utc>>,
  ) -> Result<DeviceSerials> {
    let since_str = updated_since.map(encode_dt);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(since) = since_str {
          let mut stmt = conn.prepare(
            "SELECT serial, updated_at FROM pass_registrations
             WHERE device_id = ?1 AND updated_at > ?2
             ORDER BY serial",
          )?;
          stmt
            .query_map(rusqlite::params![device_id, since], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(
            "SELECT serial, updated_at FROM pass_registrations
             WHERE device_id = ?1
             ORDER BY serial",
          )?;
          stmt
            .query_map(rusqlite::params![device_id], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    let mut serials = Vec::with_capacity(rows.len());
    let mut last_updated: Option<DateTime<Utc>> = None;
    for (serial_str, updated_str) in rows {
      serials.push(StudentId::parse(&serial_str)?);
      let updated = decode_dt(&updated_str)?;
      if last_updated.is_none_or(|max| updated > max) {
        last_updated = Some(updated);
      }
    }

    Ok(DeviceSerials { serials, last_updated })
  }

  async fn has_registration(
    &self,
    device_id: String,
    serial: StudentId,
  ) -> Result<bool> {
    // True only when the *live* (most recently updated) row for the serial
    // belongs to this exact device.
    Ok(
      self
        .live_registration(serial)
        .await?
        .is_some_and(|r| r.device_id == device_id),
    )
  }

  async fn live_registration(
    &self,
    serial: StudentId,
  ) -> Result<Option<PassRegistration>> {
    let serial_str = serial.as_str().to_owned();

    let raw: Option<RawRegistration> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {REGISTRATION_COLUMNS} FROM pass_registrations
                 WHERE serial = ?1
                 ORDER BY updated_at DESC, device_id
                 LIMIT 1"
              ),
              rusqlite::params![serial_str],
              registration_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRegistration::into_registration).transpose()
  }

  async fn unregister_device(
    &self,
    device_id: String,
    serial: StudentId,
  ) -> Result<UnregisterOutcome> {
    let serial_str = serial.as_str().to_owned();
    let now_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Exact (device, serial) row first; failing that, any row for the
        // serial — consolidation may have displaced the requester, and the
        // request is still treated as satisfied.
        let exact: Option<RawRegistration> = tx
          .query_row(
            &format!(
              "SELECT {REGISTRATION_COLUMNS} FROM pass_registrations
               WHERE device_id = ?1 AND serial = ?2"
            ),
            rusqlite::params![device_id, serial_str],
            registration_from_row,
          )
          .optional()?;
        let row = match exact {
          Some(r) => Some(r),
          None => tx
            .query_row(
              &format!(
                "SELECT {REGISTRATION_COLUMNS} FROM pass_registrations
                 WHERE serial = ?1
                 ORDER BY updated_at DESC, device_id
                 LIMIT 1"
              ),
              rusqlite::params![serial_str],
              registration_from_row,
            )
            .optional()?,
        };
        let Some(row) = row else {
          return Ok(UnregisterOutcome::NotFound);
        };

        let outcome = match crate::encode::decode_push_token(
          row.push_token,
          &row.token_format,
        ) {
          PushToken::PerDevice(mut map) => {
            map.remove(&device_id);
            match map.keys().next().cloned() {
              None => {
                tx.execute(
                  "DELETE FROM pass_registrations
                   WHERE serial = ?1 AND device_id = ?2",
                  rusqlite::params![serial_str, row.device_id],
                )?;
                UnregisterOutcome::Removed
              }
              Some(next_device) => {
                // Keep the row alive, repointed at a remaining device.
                // OR REPLACE absorbs a stale duplicate row already keyed by
                // that device.
                let map_json = serde_json::to_string(&map)
                  .map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))?;
                tx.execute(
                  "UPDATE OR REPLACE pass_registrations
                   SET device_id = ?2, push_token = ?3, token_format = 'multi',
                       updated_at = ?4
                   WHERE serial = ?1 AND device_id = ?5",
                  rusqlite::params![
                    serial_str, next_device, map_json, now_str, row.device_id
                  ],
                )?;
                UnregisterOutcome::Retained
              }
            }
          }
          PushToken::Single(_) => {
            tx.execute(
              "DELETE FROM pass_registrations
               WHERE serial = ?1 AND device_id = ?2",
              rusqlite::params![serial_str, row.device_id],
            )?;
            UnregisterOutcome::Removed
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }
}
