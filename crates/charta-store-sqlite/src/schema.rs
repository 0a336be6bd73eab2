//! SQL schema for the Charta SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The live record. Only a commit updates a row; rows are never deleted.
CREATE TABLE IF NOT EXISTS visits (
    visit_id       TEXT PRIMARY KEY,
    patient_id     TEXT NOT NULL,
    visit_type     TEXT NOT NULL,
    status         TEXT NOT NULL,   -- 'DRAFT' | 'IN_PROGRESS' | ... | 'LOCKED'
    version_number INTEGER NOT NULL,
    sections_json  TEXT NOT NULL,
    created_at     TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at     TEXT NOT NULL
);

-- Snapshots are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS visit_versions (
    version_id     TEXT PRIMARY KEY,
    visit_id       TEXT NOT NULL REFERENCES visits(visit_id),
    version_number INTEGER NOT NULL,
    changed_by     TEXT NOT NULL,
    changed_at     TEXT NOT NULL,
    status         TEXT NOT NULL,
    visit_type     TEXT NOT NULL,
    sections_json  TEXT NOT NULL,
    UNIQUE (visit_id, version_number)
);

CREATE TRIGGER IF NOT EXISTS visit_versions_no_update
BEFORE UPDATE ON visit_versions
BEGIN
    SELECT RAISE(ABORT, 'visit_versions is append-only');
END;

CREATE TRIGGER IF NOT EXISTS visit_versions_no_delete
BEFORE DELETE ON visit_versions
BEGIN
    SELECT RAISE(ABORT, 'visit_versions is append-only');
END;

CREATE TRIGGER IF NOT EXISTS visits_no_delete
BEFORE DELETE ON visits
BEGIN
    SELECT RAISE(ABORT, 'visits are never deleted');
END;

CREATE INDEX IF NOT EXISTS visits_patient_idx ON visits(patient_id);

PRAGMA user_version = 1;
";
