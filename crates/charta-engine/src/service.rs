//! [`ChartService`], the entry point presentation layers talk to.
//!
//! The service owns the [`VersionStore`], one autosave pipeline and one
//! interaction gate per open visit, and the interaction detector. Every
//! mutating method checks [`LifecycleController::ensure_editable`] against
//! the persisted record before touching anything. A session lives from the
//! first edit until the visit is signed or locked.

use std::{collections::HashMap, sync::Arc};

use charta_core::{
  diff::SectionDiff,
  gate::{GateDecision, HeldSubmission, InteractionGate},
  interaction::InteractionDetector,
  lifecycle::{LifecycleController, Transition},
  prescription::PrescriptionDraft,
  store::RecordStore,
  visit::{NewVisit, Section, SectionEdit, VisitRecord, VisitVersion},
};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::{
  Error, Result,
  autosave::{AutoSaveConfig, AutoSavePipeline, AutoSaveState, AutoSaveStatus},
  version_store::{TimelineEntry, VersionStore},
};

/// Runtime state for one visit that is open for editing.
pub(crate) struct VisitSession {
  pub(crate) pipeline: AutoSavePipeline,
  /// Held across detection and the confirming edit, so a submission is
  /// screened and released as one step.
  pub(crate) gate:     Mutex<InteractionGate>,
}

pub struct ChartService<S, D> {
  versions: Arc<VersionStore<S>>,
  detector: D,
  autosave: AutoSaveConfig,
  sessions: Mutex<HashMap<Uuid, Arc<VisitSession>>>,
}

impl<S, D> ChartService<S, D>
where
  S: RecordStore + 'static,
  D: InteractionDetector,
{
  pub fn new(
    versions: VersionStore<S>,
    detector: D,
    autosave: AutoSaveConfig,
  ) -> Self {
    Self {
      versions: Arc::new(versions),
      detector,
      autosave,
      sessions: Mutex::new(HashMap::new()),
    }
  }

  // ─── Visits ────────────────────────────────────────────────────────────────

  pub async fn create_visit(&self, input: NewVisit) -> Result<VisitRecord> {
    let (record, _) = self.versions.create(input).await?;
    Ok(record)
  }

  /// The persisted record. Unsaved edits are not included.
  pub async fn visit(&self, visit_id: Uuid) -> Result<VisitRecord> {
    Ok(self.versions.current(visit_id).await?)
  }

  pub async fn list_visits(
    &self,
    patient_id: Option<Uuid>,
  ) -> Result<Vec<VisitRecord>> {
    Ok(self.versions.list(patient_id).await?)
  }

  pub async fn can_edit(&self, visit_id: Uuid) -> Result<bool> {
    let visit = self.versions.current(visit_id).await?;
    Ok(LifecycleController::can_edit(&visit))
  }

  // ─── Editing ───────────────────────────────────────────────────────────────

  /// Queue a section edit for autosave.
  pub async fn edit(
    &self,
    visit_id: Uuid,
    edit: SectionEdit,
    operator: &str,
  ) -> Result<Section> {
    let visit = self.editable(visit_id).await?;
    let session = self.session(&visit).await;
    session.pipeline.edit(edit, operator).await
  }

  /// Flush pending edits now. `Ok(None)` when there was nothing to save.
  pub async fn save_now(
    &self,
    visit_id: Uuid,
    operator: &str,
  ) -> Result<Option<VisitVersion>> {
    let visit = self.editable(visit_id).await?;
    let session = self.session(&visit).await;
    session.pipeline.save_now(Some(operator)).await
  }

  /// Autosave state; a visit nobody has edited yet is idle.
  pub async fn autosave_state(&self, visit_id: Uuid) -> Result<AutoSaveState> {
    self.versions.current(visit_id).await?;
    let sessions = self.sessions.lock().await;
    Ok(
      sessions
        .get(&visit_id)
        .map(|session| session.pipeline.state())
        .unwrap_or_default(),
    )
  }

  /// Autosave status events. Only editable visits have a pipeline to watch.
  pub async fn subscribe(
    &self,
    visit_id: Uuid,
  ) -> Result<broadcast::Receiver<AutoSaveStatus>> {
    let visit = self.editable(visit_id).await?;
    Ok(self.session(&visit).await.pipeline.subscribe())
  }

  // ─── Lifecycle ─────────────────────────────────────────────────────────────

  /// Apply a lifecycle transition. Pending edits are saved first so that a
  /// signature covers what the operator sees. Once the visit can no longer
  /// be edited its session is closed.
  pub async fn transition(
    &self,
    visit_id: Uuid,
    transition: Transition,
    operator: &str,
  ) -> Result<VisitRecord> {
    let visit = self.versions.current(visit_id).await?;
    LifecycleController::next_status(&visit, transition)?;

    if let Some(session) = self.open_session(visit_id).await {
      session.pipeline.save_now(None).await?;
    }
    let (record, _) = self
      .versions
      .transition(visit_id, transition, operator)
      .await?;
    if !LifecycleController::can_edit(&record) {
      self.close_session(visit_id).await;
    }
    Ok(record)
  }

  /// Restore an earlier `DRAFT` version as the newest version.
  pub async fn restore(
    &self,
    visit_id: Uuid,
    version_number: u32,
    operator: &str,
  ) -> Result<VisitVersion> {
    self.editable(visit_id).await?;

    let session = self.open_session(visit_id).await;
    if let Some(session) = &session {
      session.pipeline.save_now(None).await?;
    }
    let (record, version) = self
      .versions
      .restore(visit_id, version_number, operator)
      .await?;
    if let Some(session) = &session {
      session.pipeline.reload(record).await?;
    }
    Ok(version)
  }

  // ─── History ───────────────────────────────────────────────────────────────

  pub async fn history(&self, visit_id: Uuid) -> Result<Vec<VisitVersion>> {
    Ok(self.versions.versions(visit_id).await?)
  }

  pub async fn version(
    &self,
    visit_id: Uuid,
    version_number: u32,
  ) -> Result<VisitVersion> {
    Ok(self.versions.version(visit_id, version_number).await?)
  }

  pub async fn diff(
    &self,
    visit_id: Uuid,
    from: u32,
    to: u32,
  ) -> Result<Vec<SectionDiff>> {
    Ok(self.versions.compare(visit_id, from, to).await?)
  }

  pub async fn timeline(&self, visit_id: Uuid) -> Result<Vec<TimelineEntry>> {
    Ok(self.versions.timeline(visit_id).await?)
  }

  // ─── Prescriptions ─────────────────────────────────────────────────────────

  /// Run a new prescription through interaction detection and the gate.
  ///
  /// Detection compares the medication against the prescriptions in the
  /// working copy. Without warnings the prescription is added straight away;
  /// otherwise it is held until [`Self::confirm_prescription`] or
  /// [`Self::cancel_prescription`].
  pub async fn submit_prescription(
    &self,
    visit_id: Uuid,
    prescription: PrescriptionDraft,
    operator: &str,
  ) -> Result<GateDecision> {
    let visit = self.editable(visit_id).await?;
    let session = self.session(&visit).await;
    let mut gate = session.gate.lock().await;
    if gate.is_holding() {
      return Err(charta_core::Error::SubmissionPending.into());
    }

    let current: Vec<String> = session
      .pipeline
      .snapshot()
      .await?
      .prescriptions
      .into_iter()
      .map(|rx| rx.medication_name)
      .collect();
    let warnings = self
      .detector
      .detect(&prescription.medication_name, &current)
      .await
      .map_err(|e| Error::Detection(Box::new(e)))?;

    let decision = gate.submit(prescription, warnings)?;
    match &decision {
      GateDecision::Proceed(prescription) => {
        session
          .pipeline
          .edit(SectionEdit::AddPrescription(prescription.clone()), operator)
          .await?;
      }
      GateDecision::Held(warnings) => {
        tracing::info!(
          %visit_id,
          warnings = warnings.len(),
          "prescription held for interaction review"
        );
      }
    }
    Ok(decision)
  }

  pub async fn pending_prescription(
    &self,
    visit_id: Uuid,
  ) -> Result<Option<HeldSubmission>> {
    self.versions.current(visit_id).await?;
    let Some(session) = self.open_session(visit_id).await else {
      return Ok(None);
    };
    let gate = session.gate.lock().await;
    Ok(gate.pending().cloned())
  }

  /// Release the held prescription, unchanged, into the working copy. The
  /// submission stays held if the working copy cannot take it.
  pub async fn confirm_prescription(
    &self,
    visit_id: Uuid,
    operator: &str,
  ) -> Result<PrescriptionDraft> {
    self.editable(visit_id).await?;
    let session = self
      .open_session(visit_id)
      .await
      .ok_or(charta_core::Error::NoPendingSubmission)?;

    let mut gate = session.gate.lock().await;
    let prescription = gate
      .pending()
      .map(|held| held.prescription.clone())
      .ok_or(charta_core::Error::NoPendingSubmission)?;
    session
      .pipeline
      .edit(SectionEdit::AddPrescription(prescription.clone()), operator)
      .await?;
    gate.confirm()?;
    tracing::info!(
      %visit_id,
      medication = %prescription.medication_name,
      "held prescription confirmed"
    );
    Ok(prescription)
  }

  /// Drop the held prescription. Nothing else changes.
  pub async fn cancel_prescription(
    &self,
    visit_id: Uuid,
  ) -> Result<HeldSubmission> {
    self.versions.current(visit_id).await?;
    let session = self
      .open_session(visit_id)
      .await
      .ok_or(charta_core::Error::NoPendingSubmission)?;

    let held = session.gate.lock().await.cancel()?;
    tracing::info!(
      %visit_id,
      medication = %held.prescription.medication_name,
      "held prescription cancelled"
    );
    Ok(held)
  }

  // ─── Sessions ──────────────────────────────────────────────────────────────

  /// Flush and stop every open pipeline. Failures are logged; the working
  /// copies they would have saved are lost with the process.
  pub async fn shutdown(&self) {
    let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
    for (visit_id, session) in sessions {
      if let Err(err) = session.pipeline.save_now(None).await {
        tracing::warn!(%visit_id, error = %err, "final save failed");
      }
      session.pipeline.shutdown();
    }
  }

  async fn editable(&self, visit_id: Uuid) -> Result<VisitRecord> {
    let visit = self.versions.current(visit_id).await?;
    LifecycleController::ensure_editable(&visit)?;
    Ok(visit)
  }

  pub(crate) async fn open_session(
    &self,
    visit_id: Uuid,
  ) -> Option<Arc<VisitSession>> {
    self.sessions.lock().await.get(&visit_id).cloned()
  }

  #[cfg(test)]
  pub(crate) async fn open_sessions(&self) -> usize {
    self.sessions.lock().await.len()
  }

  async fn close_session(&self, visit_id: Uuid) {
    if let Some(session) = self.sessions.lock().await.remove(&visit_id) {
      tracing::debug!(%visit_id, "closing visit session");
      session.pipeline.shutdown();
    }
  }

  async fn session(&self, visit: &VisitRecord) -> Arc<VisitSession> {
    let mut sessions = self.sessions.lock().await;
    sessions
      .entry(visit.visit_id)
      .or_insert_with(|| {
        tracing::debug!(visit_id = %visit.visit_id, "opening visit session");
        Arc::new(VisitSession {
          pipeline: AutoSavePipeline::spawn(
            Arc::clone(&self.versions),
            visit,
            self.autosave,
          ),
          gate:     Mutex::new(InteractionGate::new()),
        })
      })
      .clone()
  }
}
