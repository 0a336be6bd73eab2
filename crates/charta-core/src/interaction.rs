//! Drug interaction warnings and the detector abstraction.
//!
//! Warnings are ephemeral: they are computed when a prescription is
//! submitted, shown through the [`crate::gate::InteractionGate`], and never
//! persisted with the visit.

use std::future::Future;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Ordered from least to most severe.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InteractionSeverity {
  Minor,
  Moderate,
  Major,
  Contraindicated,
}

/// One interaction between the submitted medication and `medication_name`,
/// which is already on the patient's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugInteractionWarning {
  pub medication_name: String,
  pub severity:        InteractionSeverity,
  pub description:     String,
}

/// Sort most severe first. The sort is stable, so warnings of equal severity
/// keep the detector's order.
pub fn sort_by_severity(warnings: &mut [DrugInteractionWarning]) {
  warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
}

/// External interaction-detection service.
///
/// Invoked once per prescription submission with the medication being
/// prescribed and the names of the medications already on the visit. Only
/// interactions introduced by `medication` are expected back.
pub trait InteractionDetector: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect<'a>(
    &'a self,
    medication: &'a str,
    current: &'a [String],
  ) -> impl Future<Output = Result<Vec<DrugInteractionWarning>, Self::Error>>
  + Send
  + 'a;
}
