//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs are hyphenated lowercase strings,
//! statuses and visit types use their wire names, and sections are compact
//! JSON.

use std::str::FromStr;

use charta_core::visit::{
  VisitRecord, VisitSections, VisitStatus, VisitType, VisitVersion,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

// ─── Status and type ─────────────────────────────────────────────────────────

pub fn encode_status(s: VisitStatus) -> String { s.to_string() }

pub fn decode_status(s: &str) -> Result<VisitStatus> {
  VisitStatus::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown visit status: {s:?}")))
}

pub fn encode_visit_type(t: VisitType) -> String { t.to_string() }

pub fn decode_visit_type(s: &str) -> Result<VisitType> {
  VisitType::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown visit type: {s:?}")))
}

// ─── Sections ────────────────────────────────────────────────────────────────

pub fn encode_sections(sections: &VisitSections) -> Result<String> {
  Ok(serde_json::to_string(sections)?)
}

pub fn decode_sections(s: &str) -> Result<VisitSections> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const VISIT_COLUMNS: &str = "visit_id, patient_id, visit_type, status, \
                                 version_number, sections_json, created_at, \
                                 updated_at";

pub const VERSION_COLUMNS: &str = "version_id, visit_id, version_number, \
                                   changed_by, changed_at, status, \
                                   visit_type, sections_json";

/// Raw values read directly from a `visits` row.
pub struct RawVisit {
  pub visit_id:       String,
  pub patient_id:     String,
  pub visit_type:     String,
  pub status:         String,
  pub version_number: u32,
  pub sections_json:  String,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawVisit {
  /// Row mapper for queries selecting [`VISIT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visit_id:       row.get(0)?,
      patient_id:     row.get(1)?,
      visit_type:     row.get(2)?,
      status:         row.get(3)?,
      version_number: row.get(4)?,
      sections_json:  row.get(5)?,
      created_at:     row.get(6)?,
      updated_at:     row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<VisitRecord> {
    Ok(VisitRecord {
      visit_id:       decode_uuid(&self.visit_id)?,
      patient_id:     decode_uuid(&self.patient_id)?,
      visit_type:     decode_visit_type(&self.visit_type)?,
      status:         decode_status(&self.status)?,
      version_number: self.version_number,
      sections:       decode_sections(&self.sections_json)?,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `visit_versions` row.
pub struct RawVersion {
  pub version_id:     String,
  pub visit_id:       String,
  pub version_number: u32,
  pub changed_by:     String,
  pub changed_at:     String,
  pub status:         String,
  pub visit_type:     String,
  pub sections_json:  String,
}

impl RawVersion {
  /// Row mapper for queries selecting [`VERSION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:     row.get(0)?,
      visit_id:       row.get(1)?,
      version_number: row.get(2)?,
      changed_by:     row.get(3)?,
      changed_at:     row.get(4)?,
      status:         row.get(5)?,
      visit_type:     row.get(6)?,
      sections_json:  row.get(7)?,
    })
  }

  pub fn into_version(self) -> Result<VisitVersion> {
    Ok(VisitVersion {
      version_id:     decode_uuid(&self.version_id)?,
      visit_id:       decode_uuid(&self.visit_id)?,
      version_number: self.version_number,
      changed_by:     self.changed_by,
      changed_at:     decode_dt(&self.changed_at)?,
      status:         decode_status(&self.status)?,
      visit_type:     decode_visit_type(&self.visit_type)?,
      sections:       decode_sections(&self.sections_json)?,
    })
  }
}

/// Encoded column values for one `visit_versions` insert.
pub struct VersionRow {
  pub version_id:     String,
  pub visit_id:       String,
  pub version_number: u32,
  pub changed_by:     String,
  pub changed_at:     String,
  pub status:         String,
  pub visit_type:     String,
  pub sections_json:  String,
}

impl VersionRow {
  pub fn encode(version: &VisitVersion) -> Result<Self> {
    Ok(Self {
      version_id:     encode_uuid(version.version_id),
      visit_id:       encode_uuid(version.visit_id),
      version_number: version.version_number,
      changed_by:     version.changed_by.clone(),
      changed_at:     encode_dt(version.changed_at),
      status:         encode_status(version.status),
      visit_type:     encode_visit_type(version.visit_type),
      sections_json:  encode_sections(&version.sections)?,
    })
  }

  pub fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO visit_versions (
         version_id, visit_id, version_number, changed_by, changed_at,
         status, visit_type, sections_json
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        self.version_id,
        self.visit_id,
        self.version_number,
        self.changed_by,
        self.changed_at,
        self.status,
        self.visit_type,
        self.sections_json,
      ],
    )?;
    Ok(())
  }
}
