//! Tests for the version store, the autosave pipeline and the service.
//!
//! Timing-sensitive pipeline tests run on paused time against an in-memory
//! store; everything else uses an in-memory SQLite store.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use charta_core::{
  Error as CoreError,
  gate::GateDecision,
  interaction::InteractionSeverity,
  lifecycle::Transition,
  prescription::PrescriptionDraft,
  store::{CommitRequest, RecordStore},
  visit::{
    NewVisit, SectionEdit, SoapNote, VisitNotes, VisitRecord, VisitSections,
    VisitStatus, VisitType, VisitVersion, Vitals,
  },
};
use charta_store_sqlite::SqliteStore;
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use uuid::Uuid;

use crate::{
  ChartService, Error, VersionStore,
  autosave::{AutoSaveConfig, AutoSavePipeline, AutoSaveStatus},
  interactions::{InteractionRule, InteractionTable},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn new_visit() -> NewVisit {
  NewVisit {
    patient_id: Uuid::new_v4(),
    visit_type: VisitType::Outpatient,
    created_by: "dr.grey".into(),
  }
}

fn soap(subjective: &str) -> SectionEdit {
  SectionEdit::ReplaceSoap(SoapNote {
    subjective: Some(subjective.into()),
    ..Default::default()
  })
}

fn vitals(heart_rate: f64) -> SectionEdit {
  SectionEdit::ReplaceVitals(Vitals {
    heart_rate_bpm: Some(heart_rate),
    ..Default::default()
  })
}

fn complaint(text: &str) -> SectionEdit {
  SectionEdit::ReplaceNotes(VisitNotes {
    chief_complaint: Some(text.into()),
    follow_up:       None,
  })
}

// ─── In-memory store ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum MemoryError {
  #[error("store is offline")]
  Offline,
  #[error("visit {0} not found")]
  NotFound(Uuid),
  #[error("visit {visit_id} is at {current}, commit expected {expected}")]
  Stale {
    visit_id: Uuid,
    expected: u32,
    current:  u32,
  },
}

impl From<MemoryError> for CoreError {
  fn from(err: MemoryError) -> Self {
    match err {
      MemoryError::NotFound(id) => CoreError::VisitNotFound(id),
      MemoryError::Stale {
        visit_id,
        expected,
        current,
      } => CoreError::ConcurrentCommitConflict {
        visit_id,
        expected,
        current,
      },
      other => CoreError::save_failed(other),
    }
  }
}

/// A store whose commits can be slowed down or made to fail, and which
/// counts how many commits overlap.
#[derive(Default)]
struct MemoryStore {
  visits:     Mutex<HashMap<Uuid, VisitRecord>>,
  versions:   Mutex<HashMap<Uuid, Vec<VisitVersion>>>,
  delay:      Duration,
  offline:    AtomicBool,
  commits:    AtomicUsize,
  active:     AtomicUsize,
  max_active: AtomicUsize,
}

impl MemoryStore {
  fn with_delay(delay: Duration) -> Self {
    Self {
      delay,
      ..Default::default()
    }
  }

  fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  fn commits(&self) -> usize { self.commits.load(Ordering::SeqCst) }

  fn max_active(&self) -> usize { self.max_active.load(Ordering::SeqCst) }
}

impl RecordStore for MemoryStore {
  type Error = MemoryError;

  async fn create_visit(
    &self,
    input: NewVisit,
    at: DateTime<Utc>,
  ) -> Result<(VisitRecord, VisitVersion), MemoryError> {
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
      sections:       VisitSections::default(),
    };
    self
      .visits
      .lock()
      .unwrap()
      .insert(record.visit_id, record.clone());
    self
      .versions
      .lock()
      .unwrap()
      .insert(record.visit_id, vec![version.clone()]);
    Ok((record, version))
  }

  async fn get_visit(
    &self,
    visit_id: Uuid,
  ) -> Result<Option<VisitRecord>, MemoryError> {
    Ok(self.visits.lock().unwrap().get(&visit_id).cloned())
  }

  async fn list_visits(
    &self,
    patient_id: Option<Uuid>,
  ) -> Result<Vec<VisitRecord>, MemoryError> {
    Ok(
      self
        .visits
        .lock()
        .unwrap()
        .values()
        .filter(|v| patient_id.is_none_or(|p| v.patient_id == p))
        .cloned()
        .collect(),
    )
  }

  async fn commit(
    &self,
    request: CommitRequest,
  ) -> Result<(VisitRecord, VisitVersion), MemoryError> {
    let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(active, Ordering::SeqCst);
    if !self.delay.is_zero() {
      sleep(self.delay).await;
    }
    self.active.fetch_sub(1, Ordering::SeqCst);

    if self.offline.load(Ordering::SeqCst) {
      return Err(MemoryError::Offline);
    }

    let mut visits = self.visits.lock().unwrap();
    let record = visits
      .get_mut(&request.visit_id)
      .ok_or(MemoryError::NotFound(request.visit_id))?;
    if record.version_number != request.expected_version {
      return Err(MemoryError::Stale {
        visit_id: request.visit_id,
        expected: request.expected_version,
        current:  record.version_number,
      });
    }

    record.version_number += 1;
    record.status = request.status;
    record.sections = request.sections.clone();
    record.updated_at = request.changed_at;
    let version = VisitVersion {
      version_id:     Uuid::new_v4(),
      visit_id:       request.visit_id,
      version_number: record.version_number,
      changed_by:     request.changed_by,
      changed_at:     request.changed_at,
      status:         request.status,
      visit_type:     record.visit_type,
      sections:       request.sections,
    };
    self
      .versions
      .lock()
      .unwrap()
      .entry(request.visit_id)
      .or_default()
      .push(version.clone());
    self.commits.fetch_add(1, Ordering::SeqCst);
    Ok((record.clone(), version))
  }

  async fn get_version(
    &self,
    visit_id: Uuid,
    version_number: u32,
  ) -> Result<Option<VisitVersion>, MemoryError> {
    Ok(
      self
        .versions
        .lock()
        .unwrap()
        .get(&visit_id)
        .and_then(|vs| {
          vs.iter().find(|v| v.version_number == version_number).cloned()
        }),
    )
  }

  async fn list_versions(
    &self,
    visit_id: Uuid,
  ) -> Result<Vec<VisitVersion>, MemoryError> {
    let mut versions = self
      .versions
      .lock()
      .unwrap()
      .get(&visit_id)
      .cloned()
      .unwrap_or_default();
    versions.reverse();
    Ok(versions)
  }
}

async fn pipeline_with(
  store: MemoryStore,
  config: AutoSaveConfig,
) -> (Arc<VersionStore<MemoryStore>>, VisitRecord, AutoSavePipeline) {
  let versions = Arc::new(VersionStore::new(store));
  let (visit, _) = versions.create(new_visit()).await.unwrap();
  let pipeline = AutoSavePipeline::spawn(Arc::clone(&versions), &visit, config);
  (versions, visit, pipeline)
}

// ─── Autosave pipeline ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn edits_within_one_window_produce_one_payload() {
  let (versions, visit, pipeline) =
    pipeline_with(MemoryStore::default(), AutoSaveConfig::default()).await;
  let mut state = pipeline.watch();

  pipeline.edit(vitals(72.0), "nurse.joy").await.unwrap();
  sleep(Duration::from_secs(10)).await;
  pipeline.edit(soap("cough"), "nurse.joy").await.unwrap();
  sleep(Duration::from_secs(10)).await;
  pipeline.edit(vitals(88.0), "nurse.joy").await.unwrap();

  // The SOAP timer is the first to run out, at t = 40 s.
  sleep(Duration::from_secs(19)).await;
  assert_eq!(versions.store().commits(), 0);
  assert!(pipeline.state().dirty);

  state
    .wait_for(|s| s.status == AutoSaveStatus::Saved)
    .await
    .unwrap();
  let saved = versions.version(visit.visit_id, 2).await.unwrap();
  assert_eq!(saved.sections.vitals.heart_rate_bpm, Some(88.0));
  assert_eq!(saved.sections.soap.subjective.as_deref(), Some("cough"));
  assert_eq!(saved.changed_by, "nurse.joy");

  // The vitals timer still fires at t = 50 s but finds nothing new.
  sleep(Duration::from_secs(30)).await;
  assert_eq!(versions.store().commits(), 1);
  assert!(!pipeline.state().dirty);
}

#[tokio::test(start_paused = true)]
async fn only_one_save_is_in_flight() {
  let config = AutoSaveConfig {
    debounce:      Duration::from_secs(1),
    saved_display: Duration::from_secs(2),
  };
  let (versions, visit, pipeline) =
    pipeline_with(MemoryStore::with_delay(Duration::from_secs(5)), config)
      .await;

  // Fires at 1 s and occupies the store until 6 s.
  pipeline.edit(vitals(72.0), "nurse.joy").await.unwrap();
  sleep(Duration::from_secs(2)).await;
  // Fires at 3 s and queues.
  pipeline.edit(soap("cough"), "nurse.joy").await.unwrap();
  sleep(Duration::from_millis(1500)).await;
  // Fires at 4.5 s and joins the queued request.
  pipeline.edit(complaint("fever"), "nurse.joy").await.unwrap();
  sleep(Duration::from_secs(2)).await;
  assert_eq!(versions.store().commits(), 0);

  let version = pipeline.save_now(None).await.unwrap().expect("a save");
  assert_eq!(version.version_number, 3);
  assert_eq!(version.sections.soap.subjective.as_deref(), Some("cough"));
  assert_eq!(
    version.sections.notes.chief_complaint.as_deref(),
    Some("fever")
  );
  assert_eq!(version.sections.vitals.heart_rate_bpm, Some(72.0));

  assert_eq!(versions.store().commits(), 2);
  assert_eq!(versions.store().max_active(), 1);
  let current = versions.current(visit.visit_id).await.unwrap();
  assert_eq!(current.version_number, 3);
}

#[tokio::test(start_paused = true)]
async fn status_cycles_through_idle_between_saves() {
  let (_, _, pipeline) =
    pipeline_with(MemoryStore::default(), AutoSaveConfig::default()).await;
  let mut events = pipeline.subscribe();

  pipeline.edit(soap("a"), "nurse.joy").await.unwrap();
  pipeline.save_now(None).await.unwrap();
  // Still inside the `saved` display window.
  pipeline.edit(soap("b"), "nurse.joy").await.unwrap();
  pipeline.save_now(None).await.unwrap();
  sleep(Duration::from_secs(3)).await;

  let mut seen = Vec::new();
  while let Ok(status) = events.try_recv() {
    seen.push(status);
  }
  use AutoSaveStatus::*;
  assert_eq!(seen, [Saving, Saved, Idle, Saving, Saved, Idle]);
  assert_eq!(pipeline.state().last_saved_version, Some(3));
}

#[tokio::test(start_paused = true)]
async fn failed_save_keeps_working_copy_and_does_not_retry() {
  let (versions, _, pipeline) =
    pipeline_with(MemoryStore::default(), AutoSaveConfig::default()).await;
  versions.store().set_offline(true);

  pipeline.edit(soap("pending"), "nurse.joy").await.unwrap();
  let err = pipeline.save_now(None).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::SaveFailed(_))));

  let state = pipeline.state();
  assert_eq!(state.status, AutoSaveStatus::Error);
  assert!(state.dirty);
  assert!(state.last_error.unwrap().contains("offline"));

  sleep(Duration::from_secs(120)).await;
  assert_eq!(versions.store().commits(), 0);
  assert_eq!(pipeline.state().status, AutoSaveStatus::Error);
  let working = pipeline.snapshot().await.unwrap();
  assert_eq!(working.soap.subjective.as_deref(), Some("pending"));

  versions.store().set_offline(false);
  let version = pipeline.save_now(None).await.unwrap().expect("a save");
  assert_eq!(version.version_number, 2);
  assert_eq!(version.sections.soap.subjective.as_deref(), Some("pending"));
  assert_eq!(pipeline.state().status, AutoSaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn signing_underneath_discards_pending_edits() {
  let (versions, visit, pipeline) =
    pipeline_with(MemoryStore::default(), AutoSaveConfig::default()).await;
  let mut state = pipeline.watch();

  pipeline.edit(soap("late entry"), "nurse.joy").await.unwrap();
  versions
    .transition(visit.visit_id, Transition::Sign, "dr.grey")
    .await
    .unwrap();

  state
    .wait_for(|s| s.status == AutoSaveStatus::Error)
    .await
    .unwrap();
  let state = pipeline.state();
  assert!(!state.dirty);
  assert!(state.last_error.unwrap().contains("SIGNED"));

  let working = pipeline.snapshot().await.unwrap();
  assert_eq!(working.soap.subjective, None);
  assert_eq!(versions.versions(visit.visit_id).await.unwrap().len(), 2);
  assert!(pipeline.save_now(None).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn rejected_edit_leaves_working_copy_clean() {
  let (_, _, pipeline) =
    pipeline_with(MemoryStore::default(), AutoSaveConfig::default()).await;

  let err = pipeline
    .edit(SectionEdit::RemoveDiagnosis(3), "nurse.joy")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::NoSuchEntry { index: 3, .. })
  ));
  assert!(!pipeline.state().dirty);
  assert!(pipeline.save_now(None).await.unwrap().is_none());
}

// ─── Version store ───────────────────────────────────────────────────────────

async fn sqlite_versions() -> VersionStore<SqliteStore> {
  VersionStore::new(SqliteStore::open_in_memory().await.unwrap())
}

fn sections_with(subjective: &str) -> VisitSections {
  let mut sections = VisitSections::default();
  sections.soap.subjective = Some(subjective.into());
  sections
}

#[tokio::test]
async fn concurrent_commits_get_distinct_versions() {
  let versions = Arc::new(sqlite_versions().await);
  let (visit, _) = versions.create(new_visit()).await.unwrap();
  let id = visit.visit_id;

  let tasks: Vec<_> = (0..8)
    .map(|i| {
      let versions = Arc::clone(&versions);
      tokio::spawn(async move {
        versions
          .commit(id, sections_with(&format!("note {i}")), "nurse")
          .await
      })
    })
    .collect();

  let mut numbers = Vec::new();
  for task in tasks {
    numbers.push(task.await.unwrap().unwrap().1.version_number);
  }
  numbers.sort_unstable();
  assert_eq!(numbers, (2..=9).collect::<Vec<u32>>());
  // Every writer has finished, so no commit lock is kept around.
  assert_eq!(versions.open_locks(), 0);
}

#[tokio::test]
async fn locked_visit_rejects_every_write() {
  let versions = sqlite_versions().await;
  let (visit, _) = versions.create(new_visit()).await.unwrap();
  let id = visit.visit_id;

  for transition in [
    Transition::Start,
    Transition::Complete,
    Transition::Sign,
    Transition::Lock,
  ] {
    versions.transition(id, transition, "dr.grey").await.unwrap();
  }
  let statuses: Vec<VisitStatus> = versions
    .versions(id)
    .await
    .unwrap()
    .iter()
    .map(|v| v.status)
    .collect();
  use VisitStatus::*;
  assert_eq!(statuses, [Locked, Signed, Completed, InProgress, Draft]);

  // Twice, to show the rejection does not depend on what came before.
  for _ in 0..2 {
    let err = versions
      .commit(id, sections_with("amend"), "dr.grey")
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::Locked { .. }));
    let err = versions.restore(id, 1, "dr.grey").await.unwrap_err();
    assert!(matches!(err, CoreError::Locked { .. }));
    let err = versions
      .transition(id, Transition::Lock, "dr.grey")
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::Locked { .. }));
  }
  assert_eq!(versions.current(id).await.unwrap().version_number, 5);
}

#[tokio::test]
async fn restore_appends_and_leaves_history_alone() {
  let versions = sqlite_versions().await;
  let (visit, _) = versions.create(new_visit()).await.unwrap();
  let id = visit.visit_id;
  versions.commit(id, sections_with("a"), "nurse").await.unwrap();
  versions.commit(id, sections_with("b"), "nurse").await.unwrap();
  let before = versions.versions(id).await.unwrap();

  let (record, restored) = versions.restore(id, 2, "dr.grey").await.unwrap();
  assert_eq!(restored.version_number, 4);
  assert_eq!(restored.status, VisitStatus::Draft);
  assert_eq!(restored.changed_by, "dr.grey");
  assert_eq!(record.sections.soap.subjective.as_deref(), Some("a"));

  let after = versions.versions(id).await.unwrap();
  assert_eq!(after.len(), 4);
  for (old, new) in before.iter().zip(&after[1..]) {
    assert_eq!(old.version_id, new.version_id);
    assert_eq!(old.sections, new.sections);
  }
}

#[tokio::test]
async fn restore_requires_a_draft_snapshot() {
  let versions = sqlite_versions().await;
  let (visit, _) = versions.create(new_visit()).await.unwrap();
  let id = visit.visit_id;
  versions
    .transition(id, Transition::Start, "dr.grey")
    .await
    .unwrap();

  let err = versions.restore(id, 2, "dr.grey").await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::RestoreNotPermitted {
      version_number: 2,
      status:         VisitStatus::InProgress,
    }
  ));
  let err = versions.restore(id, 9, "dr.grey").await.unwrap_err();
  assert!(matches!(err, CoreError::VersionNotFound { .. }));

  let (record, _) = versions.restore(id, 1, "dr.grey").await.unwrap();
  assert_eq!(record.status, VisitStatus::Draft);
}

#[tokio::test]
async fn timeline_pairs_each_version_with_its_predecessor() {
  let versions = sqlite_versions().await;
  let (visit, _) = versions.create(new_visit()).await.unwrap();
  let id = visit.visit_id;
  versions.commit(id, sections_with("cough"), "nurse").await.unwrap();
  versions.commit(id, sections_with("cough "), "nurse").await.unwrap();

  let timeline = versions.timeline(id).await.unwrap();
  let numbers: Vec<u32> =
    timeline.iter().map(|e| e.version.version_number).collect();
  assert_eq!(numbers, [3, 2, 1]);
  assert!(timeline[2].changes.is_empty());

  let subjective = timeline[0]
    .changes
    .iter()
    .find(|d| d.title == "Subjective")
    .unwrap();
  assert!(subjective.changed);
  assert_eq!(subjective.from_value.as_deref(), Some("cough"));
  assert_eq!(subjective.to_value.as_deref(), Some("cough "));

  let direct = versions.compare(id, 1, 3).await.unwrap();
  assert!(direct.iter().any(|d| d.title == "Subjective" && d.changed));
  assert!(direct.iter().any(|d| d.title == "Status" && !d.changed));
}

#[tokio::test]
async fn unknown_visit_is_reported() {
  let versions = sqlite_versions().await;
  let missing = Uuid::new_v4();
  assert!(matches!(
    versions.versions(missing).await,
    Err(CoreError::VisitNotFound(_))
  ));
  assert!(matches!(
    versions.commit(missing, VisitSections::default(), "x").await,
    Err(CoreError::VisitNotFound(_))
  ));
}

// ─── Service ─────────────────────────────────────────────────────────────────

async fn service() -> ChartService<SqliteStore, InteractionTable> {
  let table = InteractionTable::new(vec![InteractionRule {
    first:       "Warfarin".into(),
    second:      "Aspirin".into(),
    severity:    InteractionSeverity::Major,
    description: "Increased bleeding risk".into(),
  }]);
  ChartService::new(sqlite_versions().await, table, AutoSaveConfig::default())
}

#[tokio::test]
async fn held_prescription_is_only_added_on_confirm() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;

  let decision = svc
    .submit_prescription(id, PrescriptionDraft::new("Aspirin"), "dr.grey")
    .await
    .unwrap();
  assert!(matches!(decision, GateDecision::Proceed(_)));

  let decision = svc
    .submit_prescription(id, PrescriptionDraft::new("Warfarin"), "dr.grey")
    .await
    .unwrap();
  let GateDecision::Held(warnings) = decision else {
    panic!("warfarin should be held");
  };
  assert_eq!(warnings.len(), 1);
  assert_eq!(warnings[0].severity, InteractionSeverity::Major);
  assert_eq!(warnings[0].medication_name, "Aspirin");
  assert!(svc.pending_prescription(id).await.unwrap().is_some());

  // Cancel: nothing changes.
  svc.cancel_prescription(id).await.unwrap();
  svc.save_now(id, "dr.grey").await.unwrap();
  let record = svc.visit(id).await.unwrap();
  assert_eq!(record.sections.prescriptions.len(), 1);

  // Confirm: appended unchanged.
  svc
    .submit_prescription(id, PrescriptionDraft::new("Warfarin"), "dr.grey")
    .await
    .unwrap();
  let confirmed = svc.confirm_prescription(id, "dr.grey").await.unwrap();
  assert_eq!(confirmed, PrescriptionDraft::new("Warfarin"));
  svc.save_now(id, "dr.grey").await.unwrap();
  let record = svc.visit(id).await.unwrap();
  let names: Vec<&str> = record
    .sections
    .prescriptions
    .iter()
    .map(|rx| rx.medication_name.as_str())
    .collect();
  assert_eq!(names, ["Aspirin", "Warfarin"]);
  assert!(svc.pending_prescription(id).await.unwrap().is_none());
}

#[tokio::test]
async fn second_submission_waits_for_the_first() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;
  svc
    .edit(
      id,
      SectionEdit::AddPrescription(PrescriptionDraft::new("Aspirin")),
      "dr.grey",
    )
    .await
    .unwrap();

  svc
    .submit_prescription(id, PrescriptionDraft::new("Warfarin"), "dr.grey")
    .await
    .unwrap();
  let err = svc
    .submit_prescription(id, PrescriptionDraft::new("Metformin"), "dr.grey")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::SubmissionPending)));

  let err = svc.confirm_prescription(Uuid::new_v4(), "dr.grey").await;
  assert!(matches!(err, Err(Error::Core(CoreError::VisitNotFound(_)))));
}

#[tokio::test]
async fn locked_visit_rejects_service_mutations() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;
  svc.edit(id, soap("final"), "dr.grey").await.unwrap();
  svc.transition(id, Transition::Sign, "dr.grey").await.unwrap();
  svc.transition(id, Transition::Lock, "dr.grey").await.unwrap();
  assert!(!svc.can_edit(id).await.unwrap());
  let versions_before = svc.history(id).await.unwrap().len();

  for _ in 0..2 {
    let locked = |r: Result<(), Error>| {
      assert!(matches!(r, Err(Error::Core(CoreError::Locked { .. }))));
    };
    locked(svc.edit(id, soap("amend"), "x").await.map(drop));
    locked(svc.save_now(id, "x").await.map(drop));
    locked(svc.restore(id, 1, "x").await.map(drop));
    locked(svc.transition(id, Transition::Lock, "x").await.map(drop));
    locked(
      svc
        .submit_prescription(id, PrescriptionDraft::new("Aspirin"), "x")
        .await
        .map(drop),
    );
    locked(svc.confirm_prescription(id, "x").await.map(drop));
  }

  assert_eq!(svc.history(id).await.unwrap().len(), versions_before);
  // Reads still work.
  assert_eq!(svc.visit(id).await.unwrap().status, VisitStatus::Locked);
  assert!(svc.timeline(id).await.is_ok());
}

#[tokio::test]
async fn transition_saves_pending_edits_first() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;

  svc.edit(id, soap("signed content"), "nurse.joy").await.unwrap();
  let record = svc.transition(id, Transition::Sign, "dr.grey").await.unwrap();
  assert_eq!(record.status, VisitStatus::Signed);
  assert_eq!(
    record.sections.soap.subjective.as_deref(),
    Some("signed content")
  );

  let history = svc.history(id).await.unwrap();
  assert_eq!(history[0].status, VisitStatus::Signed);
  assert_eq!(history[0].changed_by, "dr.grey");
  assert_eq!(history[1].status, VisitStatus::Draft);
  assert_eq!(history[1].changed_by, "nurse.joy");

  let err = svc
    .transition(id, Transition::Complete, "dr.grey")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::InvalidTransition { .. })
  ));
}

#[tokio::test]
async fn restore_resets_the_working_copy() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;

  svc.edit(id, soap("first"), "nurse").await.unwrap();
  svc.save_now(id, "nurse").await.unwrap();
  svc.edit(id, soap("second"), "nurse").await.unwrap();
  svc.save_now(id, "nurse").await.unwrap();

  let restored = svc.restore(id, 2, "dr.grey").await.unwrap();
  assert_eq!(restored.version_number, 4);

  svc.edit(id, vitals(64.0), "nurse").await.unwrap();
  let saved = svc.save_now(id, "nurse").await.unwrap().expect("a save");
  assert_eq!(saved.version_number, 5);
  assert_eq!(saved.sections.soap.subjective.as_deref(), Some("first"));
  assert_eq!(saved.sections.vitals.heart_rate_bpm, Some(64.0));

  let diff = svc.diff(id, 3, 4).await.unwrap();
  let subjective = diff.iter().find(|d| d.title == "Subjective").unwrap();
  assert!(subjective.changed);
}

#[tokio::test]
async fn signing_and_locking_close_visit_sessions() {
  let svc = service().await;
  let mut ids = Vec::new();
  for i in 0..3 {
    let visit = svc.create_visit(new_visit()).await.unwrap();
    svc
      .edit(visit.visit_id, soap(&format!("note {i}")), "dr.grey")
      .await
      .unwrap();
    ids.push(visit.visit_id);
  }
  assert_eq!(svc.open_sessions().await, 3);

  for id in &ids {
    svc.transition(*id, Transition::Sign, "dr.grey").await.unwrap();
  }
  assert_eq!(svc.open_sessions().await, 0);
  let record = svc.visit(ids[0]).await.unwrap();
  assert_eq!(record.sections.soap.subjective.as_deref(), Some("note 0"));

  // A signed visit has nothing to autosave, so no session is reopened.
  let err = svc.subscribe(ids[1]).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Locked { .. })));
  assert!(!svc.autosave_state(ids[1]).await.unwrap().dirty);

  for id in &ids {
    svc.transition(*id, Transition::Lock, "dr.grey").await.unwrap();
  }
  assert_eq!(svc.open_sessions().await, 0);
}

#[tokio::test]
async fn confirm_keeps_submission_held_when_the_edit_fails() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;
  svc
    .submit_prescription(id, PrescriptionDraft::new("Aspirin"), "dr.grey")
    .await
    .unwrap();
  svc
    .submit_prescription(id, PrescriptionDraft::new("Warfarin"), "dr.grey")
    .await
    .unwrap();

  let session = svc.open_session(id).await.unwrap();
  session.pipeline.shutdown();

  let err = svc.confirm_prescription(id, "dr.grey").await.unwrap_err();
  assert!(matches!(err, Error::PipelineClosed(_)));
  let held = svc.pending_prescription(id).await.unwrap().unwrap();
  assert_eq!(held.prescription, PrescriptionDraft::new("Warfarin"));
}

#[tokio::test]
async fn resubmitting_a_listed_medication_is_not_held() {
  let svc = service().await;
  let visit = svc.create_visit(new_visit()).await.unwrap();
  let id = visit.visit_id;
  for name in ["Warfarin", "Aspirin"] {
    svc
      .edit(
        id,
        SectionEdit::AddPrescription(PrescriptionDraft::new(name)),
        "dr.grey",
      )
      .await
      .unwrap();
  }

  let decision = svc
    .submit_prescription(id, PrescriptionDraft::new("Warfarin"), "dr.grey")
    .await
    .unwrap();
  assert!(matches!(decision, GateDecision::Proceed(_)));
}
