//! Submission-time confirmation barrier for prescriptions.
//!
//! The gate holds at most one submission. A submission without warnings
//! passes straight through; one with warnings waits until the operator
//! confirms (the draft is released unchanged) or cancels (the draft is
//! dropped and nothing else happens).

use serde::Serialize;

use crate::{
  Error, Result,
  interaction::{DrugInteractionWarning, sort_by_severity},
  prescription::PrescriptionDraft,
};

/// A submission waiting for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct HeldSubmission {
  pub prescription: PrescriptionDraft,
  /// Most severe first.
  pub warnings:     Vec<DrugInteractionWarning>,
}

/// Result of [`InteractionGate::submit`].
#[derive(Debug, Clone)]
pub enum GateDecision {
  /// No warnings; continue with the draft.
  Proceed(PrescriptionDraft),
  /// Held; these warnings need acknowledging.
  Held(Vec<DrugInteractionWarning>),
}

#[derive(Debug, Default)]
pub struct InteractionGate {
  held: Option<HeldSubmission>,
}

impl InteractionGate {
  pub fn new() -> Self { Self::default() }

  /// Route a prescription through the gate.
  ///
  /// Fails with [`Error::SubmissionPending`] while another submission is held.
  pub fn submit(
    &mut self,
    prescription: PrescriptionDraft,
    mut warnings: Vec<DrugInteractionWarning>,
  ) -> Result<GateDecision> {
    if self.held.is_some() {
      return Err(Error::SubmissionPending);
    }
    if warnings.is_empty() {
      return Ok(GateDecision::Proceed(prescription));
    }

    sort_by_severity(&mut warnings);
    self.held = Some(HeldSubmission {
      prescription,
      warnings: warnings.clone(),
    });
    Ok(GateDecision::Held(warnings))
  }

  pub fn pending(&self) -> Option<&HeldSubmission> { self.held.as_ref() }

  pub fn is_holding(&self) -> bool { self.held.is_some() }

  /// Release the held draft, unchanged.
  pub fn confirm(&mut self) -> Result<PrescriptionDraft> {
    self
      .held
      .take()
      .map(|held| held.prescription)
      .ok_or(Error::NoPendingSubmission)
  }

  /// Drop the held submission.
  pub fn cancel(&mut self) -> Result<HeldSubmission> {
    self.held.take().ok_or(Error::NoPendingSubmission)
  }
}
