//! The `RecordStore` trait and the clock abstraction.
//!
//! The trait is implemented by storage backends (e.g. `charta-store-sqlite`).
//! `charta-engine` depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::visit::{
  NewVisit, VisitRecord, VisitSections, VisitStatus, VisitVersion,
};

// ─── Commit request ──────────────────────────────────────────────────────────

/// Everything a store needs to append one version.
///
/// The store assigns `expected_version + 1` as the new version number and
/// must refuse the commit if the visit has already moved past
/// `expected_version`.
#[derive(Debug, Clone)]
pub struct CommitRequest {
  pub visit_id:         Uuid,
  pub expected_version: u32,
  pub status:           VisitStatus,
  pub sections:         VisitSections,
  pub changed_by:       String,
  pub changed_at:       DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a durable visit record store.
///
/// Versions are append-only: a store never updates or deletes a version row.
/// The live record is updated only as part of a commit, in the same atomic
/// step that appends the version.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait RecordStore: Send + Sync {
  /// Convertible into [`crate::Error`] so callers can tell a stale commit
  /// (`ConcurrentCommitConflict`) apart from a transport failure.
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Persist a new `DRAFT` visit together with its first version.
  fn create_visit(
    &self,
    input: NewVisit,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(VisitRecord, VisitVersion), Self::Error>>
  + Send
  + '_;

  /// Retrieve a visit by id. Returns `None` if not found.
  fn get_visit(
    &self,
    visit_id: Uuid,
  ) -> impl Future<Output = Result<Option<VisitRecord>, Self::Error>> + Send + '_;

  /// List visits, optionally restricted to one patient.
  fn list_visits(
    &self,
    patient_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<VisitRecord>, Self::Error>> + Send + '_;

  /// Append a version and update the live record in one step.
  fn commit(
    &self,
    request: CommitRequest,
  ) -> impl Future<Output = Result<(VisitRecord, VisitVersion), Self::Error>>
  + Send
  + '_;

  fn get_version(
    &self,
    visit_id: Uuid,
    version_number: u32,
  ) -> impl Future<Output = Result<Option<VisitVersion>, Self::Error>> + Send + '_;

  /// All versions of a visit, newest first.
  fn list_versions(
    &self,
    visit_id: Uuid,
  ) -> impl Future<Output = Result<Vec<VisitVersion>, Self::Error>> + Send + '_;
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Source of `changed_at` timestamps.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}
