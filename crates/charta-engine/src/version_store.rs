//! [`VersionStore`]: serialized commits, history, diffs and restore.
//!
//! Every write to a visit goes through one of [`VersionStore::commit`],
//! [`VersionStore::transition`] or [`VersionStore::restore`]. Each takes the
//! visit's commit lock, re-reads the live record, asks the
//! [`LifecycleController`] for permission and then appends exactly one
//! version. Commits for different visits do not contend.

use std::{
  collections::HashMap,
  future::Future,
  sync::{Arc, Mutex, PoisonError},
};

use charta_core::{
  Error, Result,
  diff::{SectionDiff, diff},
  lifecycle::{LifecycleController, Transition},
  store::{Clock, CommitRequest, RecordStore, SystemClock},
  visit::{NewVisit, VisitRecord, VisitSections, VisitStatus, VisitVersion},
};
use serde::Serialize;
use uuid::Uuid;

/// One row of a visit's history: a version and what changed since the
/// version before it.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
  pub version: VisitVersion,
  /// Empty for version 1.
  pub changes: Vec<SectionDiff>,
}

pub struct VersionStore<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
  locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: RecordStore> VersionStore<S> {
  pub fn new(store: S) -> Self {
    Self::with_clock(store, Arc::new(SystemClock))
  }

  pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
    Self {
      store: Arc::new(store),
      clock,
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  // ─── Visits ────────────────────────────────────────────────────────────────

  /// Create a `DRAFT` visit and its first version.
  pub async fn create(
    &self,
    input: NewVisit,
  ) -> Result<(VisitRecord, VisitVersion)> {
    let (record, version) = self
      .store
      .create_visit(input, self.clock.now())
      .await
      .map_err(lift)?;
    tracing::info!(
      visit_id = %record.visit_id,
      patient_id = %record.patient_id,
      "visit created"
    );
    Ok((record, version))
  }

  /// The live record.
  pub async fn current(&self, visit_id: Uuid) -> Result<VisitRecord> {
    self
      .store
      .get_visit(visit_id)
      .await
      .map_err(lift)?
      .ok_or(Error::VisitNotFound(visit_id))
  }

  pub async fn list(&self, patient_id: Option<Uuid>) -> Result<Vec<VisitRecord>> {
    self.store.list_visits(patient_id).await.map_err(lift)
  }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Commit new section content, keeping the visit's status.
  pub async fn commit(
    &self,
    visit_id: Uuid,
    sections: VisitSections,
    changed_by: &str,
  ) -> Result<(VisitRecord, VisitVersion)> {
    self
      .serialized(visit_id, async {
        let visit = self.current(visit_id).await?;
        LifecycleController::ensure_editable(&visit)?;
        self.write(&visit, visit.status, sections, changed_by).await
      })
      .await
  }

  /// Move the visit forward through the lifecycle. The new status is
  /// committed as its own version with the content unchanged.
  pub async fn transition(
    &self,
    visit_id: Uuid,
    transition: Transition,
    changed_by: &str,
  ) -> Result<(VisitRecord, VisitVersion)> {
    self
      .serialized(visit_id, async {
        let visit = self.current(visit_id).await?;
        let next = LifecycleController::next_status(&visit, transition)?;
        let committed = self
          .write(&visit, next, visit.sections.clone(), changed_by)
          .await?;
        tracing::info!(
          %visit_id,
          from = %visit.status,
          to = %next,
          %transition,
          "visit status changed"
        );
        Ok::<_, Error>(committed)
      })
      .await
  }

  /// Copy an earlier `DRAFT` version forward as a new version.
  pub async fn restore(
    &self,
    visit_id: Uuid,
    version_number: u32,
    changed_by: &str,
  ) -> Result<(VisitRecord, VisitVersion)> {
    self
      .serialized(visit_id, async {
        let visit = self.current(visit_id).await?;
        LifecycleController::ensure_editable(&visit)?;
        let target = self.version(visit_id, version_number).await?;
        LifecycleController::check_restore(&visit, &target)?;

        let committed = self
          .write(&visit, target.status, target.sections, changed_by)
          .await?;
        tracing::info!(
          %visit_id,
          restored = version_number,
          version = committed.1.version_number,
          "version restored"
        );
        Ok::<_, Error>(committed)
      })
      .await
  }

  // ─── History ───────────────────────────────────────────────────────────────

  /// All versions, newest first.
  pub async fn versions(&self, visit_id: Uuid) -> Result<Vec<VisitVersion>> {
    let versions = self.store.list_versions(visit_id).await.map_err(lift)?;
    // Every visit has at least its creation version.
    if versions.is_empty() {
      return Err(Error::VisitNotFound(visit_id));
    }
    Ok(versions)
  }

  pub async fn version(
    &self,
    visit_id: Uuid,
    version_number: u32,
  ) -> Result<VisitVersion> {
    self
      .store
      .get_version(visit_id, version_number)
      .await
      .map_err(lift)?
      .ok_or(Error::VersionNotFound {
        visit_id,
        version_number,
      })
  }

  /// Diff any two versions of the same visit.
  pub async fn compare(
    &self,
    visit_id: Uuid,
    from: u32,
    to: u32,
  ) -> Result<Vec<SectionDiff>> {
    let from = self.version(visit_id, from).await?;
    let to = self.version(visit_id, to).await?;
    Ok(diff(&from, &to))
  }

  /// Newest-first history with each version diffed against its predecessor.
  pub async fn timeline(&self, visit_id: Uuid) -> Result<Vec<TimelineEntry>> {
    let versions = self.versions(visit_id).await?;
    let changes: Vec<Vec<SectionDiff>> = versions
      .iter()
      .enumerate()
      .map(|(i, version)| match versions.get(i + 1) {
        Some(previous) => diff(previous, version),
        None => Vec::new(),
      })
      .collect();

    Ok(
      versions
        .into_iter()
        .zip(changes)
        .map(|(version, changes)| TimelineEntry { version, changes })
        .collect(),
    )
  }

  // ─── Internals ─────────────────────────────────────────────────────────────

  /// Run `write` under the visit's commit lock. The lock entry is dropped
  /// again once nobody else is queued on it.
  async fn serialized<T>(
    &self,
    visit_id: Uuid,
    write: impl Future<Output = Result<T>>,
  ) -> Result<T> {
    let lock = self.lock_for(visit_id);
    let result = {
      let _guard = lock.lock().await;
      write.await
    };
    self.release(visit_id, lock);
    result
  }

  fn lock_for(&self, visit_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(visit_id).or_default().clone()
  }

  fn release(&self, visit_id: Uuid, lock: Arc<tokio::sync::Mutex<()>>) {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    drop(lock);
    if locks
      .get(&visit_id)
      .is_some_and(|entry| Arc::strong_count(entry) == 1)
    {
      locks.remove(&visit_id);
    }
  }

  #[cfg(test)]
  pub(crate) fn open_locks(&self) -> usize {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  /// Append one version on top of `visit`. The caller holds the visit's lock.
  async fn write(
    &self,
    visit: &VisitRecord,
    status: VisitStatus,
    sections: VisitSections,
    changed_by: &str,
  ) -> Result<(VisitRecord, VisitVersion)> {
    let request = CommitRequest {
      visit_id: visit.visit_id,
      expected_version: visit.version_number,
      status,
      sections,
      changed_by: changed_by.to_owned(),
      changed_at: self.clock.now(),
    };

    let (record, version) = self.store.commit(request).await.map_err(lift)?;
    tracing::debug!(
      visit_id = %record.visit_id,
      version = version.version_number,
      status = %record.status,
      changed_by,
      "committed version"
    );
    Ok((record, version))
  }
}

fn lift<E: Into<Error>>(err: E) -> Error { err.into() }
