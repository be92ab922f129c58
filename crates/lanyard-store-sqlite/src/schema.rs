//! SQL schema for the Lanyard SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The primary key on serial is the uniqueness constraint the identifier
-- allocator races against.
CREATE TABLE IF NOT EXISTS pass_subjects (
    serial          TEXT PRIMARY KEY,
    campus          TEXT NOT NULL,   -- 'london' | 'bristol' | 'sheffield' | 'birmingham'
    given_name      TEXT NOT NULL,
    family_name     TEXT NOT NULL,
    email           TEXT NOT NULL,
    photo_url       TEXT,
    pass_active     INTEGER NOT NULL DEFAULT 0,
    pass_updated_at TEXT,            -- ISO 8601 UTC; advanced on each (re)issue
    created_at      TEXT NOT NULL
);

-- At most one live row exists per serial (consolidation invariant).
-- token_format 'legacy' marks rows persisted before the discriminator
-- existed; their push_token is decoded by structural sniffing.
CREATE TABLE IF NOT EXISTS pass_registrations (
    device_id    TEXT NOT NULL,
    serial       TEXT NOT NULL REFERENCES pass_subjects(serial),
    push_token   TEXT NOT NULL,
    token_format TEXT NOT NULL DEFAULT 'legacy',  -- 'single' | 'multi' | 'legacy'
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (device_id, serial)
);

-- Serves consolidation and cross-device unregistration, which look rows up
-- by serial alone.
CREATE INDEX IF NOT EXISTS pass_registrations_serial_idx
    ON pass_registrations(serial);

PRAGMA user_version = 1;
";
