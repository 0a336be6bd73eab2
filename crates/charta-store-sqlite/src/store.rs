//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::path::Path;

use charta_core::{
  store::{CommitRequest, RecordStore},
  visit::{NewVisit, VisitRecord, VisitSections, VisitStatus, VisitVersion},
};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawVersion, RawVisit, VERSION_COLUMNS, VISIT_COLUMNS, VersionRow,
    encode_dt, encode_sections, encode_status, encode_uuid, encode_visit_type,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Charta record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// What the commit closure found under its transaction.
enum CommitOutcome {
  Committed(RawVisit),
  Missing,
  Stale(u32),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
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

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn create_visit(
    &self,
    input: NewVisit,
    at: DateTime<Utc>,
  ) -> Result<(VisitRecord, VisitVersion)> {
    let record = VisitRecord {
      visit_id:       Uuid::new_v4(),
      patient_id:     input.patient_id,
      visit_type:     input.visit_type,
      status:         VisitStatus::Draft,
      version_number: 1,
      sections:       VisitSections::default(),
      created_at:     at,
      updated_at:     at,
    };
    let version = VisitVersion {
      version_id:     Uuid::new_v4(),
      visit_id:       record.visit_id,
      version_number: 1,
      changed_by:     input.created_by,
      changed_at:     at,
      status:         VisitStatus::Draft,
      visit_type:     record.visit_type,
      sections:       record.sections.clone(),
    };

    let visit_id_str   = encode_uuid(record.visit_id);
    let patient_id_str = encode_uuid(record.patient_id);
    let type_str       = encode_visit_type(record.visit_type);
    let status_str     = encode_status(record.status);
    let sections_json  = encode_sections(&record.sections)?;
    let at_str         = encode_dt(at);
    let version_row    = VersionRow::encode(&version)?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO visits (
             visit_id, patient_id, visit_type, status, version_number,
             sections_json, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)",
          rusqlite::params![
            visit_id_str,
            patient_id_str,
            type_str,
            status_str,
            sections_json,
            at_str,
          ],
        )?;
        version_row.insert(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(visit_id = %record.visit_id, "created visit");
    Ok((record, version))
  }

  async fn get_visit(&self, visit_id: Uuid) -> Result<Option<VisitRecord>> {
    let id_str = encode_uuid(visit_id);

    let raw: Option<RawVisit> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE visit_id = ?1"),
              rusqlite::params![id_str],
              RawVisit::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVisit::into_record).transpose()
  }

  async fn list_visits(&self, patient_id: Option<Uuid>) -> Result<Vec<VisitRecord>> {
    let patient_str = patient_id.map(encode_uuid);

    let raws: Vec<RawVisit> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(p) = patient_str {
          let mut stmt = conn.prepare(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE patient_id = ?1
             ORDER BY created_at"
          ))?;
          stmt
            .query_map(rusqlite::params![p], RawVisit::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits ORDER BY created_at"
          ))?;
          stmt
            .query_map([], RawVisit::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVisit::into_record).collect()
  }

  async fn commit(&self, request: CommitRequest) -> Result<(VisitRecord, VisitVersion)> {
    let version_id     = Uuid::new_v4();
    let visit_id       = request.visit_id;
    let expected       = request.expected_version;
    let visit_id_str   = encode_uuid(visit_id);
    let version_id_str = encode_uuid(version_id);
    let status_str     = encode_status(request.status);
    let sections_json  = encode_sections(&request.sections)?;
    let changed_at_str = encode_dt(request.changed_at);
    let changed_by     = request.changed_by.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let current = tx
          .query_row(
            &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE visit_id = ?1"),
            rusqlite::params![visit_id_str],
            RawVisit::from_row,
          )
          .optional()?;
        let Some(mut raw) = current else {
          return Ok(CommitOutcome::Missing);
        };
        if raw.version_number != expected {
          return Ok(CommitOutcome::Stale(raw.version_number));
        }

        let next = expected + 1;
        tx.execute(
          "UPDATE visits
           SET status = ?1, version_number = ?2, sections_json = ?3,
               updated_at = ?4
           WHERE visit_id = ?5 AND version_number = ?6",
          rusqlite::params![
            status_str,
            next,
            sections_json,
            changed_at_str,
            visit_id_str,
            expected,
          ],
        )?;

        let row = VersionRow {
          version_id:     version_id_str,
          visit_id:       visit_id_str,
          version_number: next,
          changed_by,
          changed_at:     changed_at_str.clone(),
          status:         status_str.clone(),
          visit_type:     raw.visit_type.clone(),
          sections_json:  sections_json.clone(),
        };
        row.insert(&tx)?;
        tx.commit()?;

        raw.status         = status_str;
        raw.version_number = next;
        raw.sections_json  = sections_json;
        raw.updated_at     = changed_at_str;
        Ok(CommitOutcome::Committed(raw))
      })
      .await?;

    let record = match outcome {
      CommitOutcome::Committed(raw) => raw.into_record()?,
      CommitOutcome::Missing => return Err(Error::VisitNotFound(visit_id)),
      CommitOutcome::Stale(current) => {
        return Err(Error::Conflict {
          visit_id,
          expected,
          current,
        });
      }
    };

    let version = VisitVersion {
      version_id,
      visit_id,
      version_number: record.version_number,
      changed_by:     request.changed_by,
      changed_at:     request.changed_at,
      status:         request.status,
      visit_type:     record.visit_type,
      sections:       request.sections,
    };

    Ok((record, version))
  }

  async fn get_version(
    &self,
    visit_id: Uuid,
    version_number: u32,
  ) -> Result<Option<VisitVersion>> {
    let id_str = encode_uuid(visit_id);

    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {VERSION_COLUMNS} FROM visit_versions
                 WHERE visit_id = ?1 AND version_number = ?2"
              ),
              rusqlite::params![id_str, version_number],
              RawVersion::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }

  async fn list_versions(&self, visit_id: Uuid) -> Result<Vec<VisitVersion>> {
    let id_str = encode_uuid(visit_id);

    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VERSION_COLUMNS} FROM visit_versions
           WHERE visit_id = ?1
           ORDER BY version_number DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersion::into_version).collect()
  }
}
