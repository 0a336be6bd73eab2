//! Prescriptions written during a visit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A prescription as entered on the visit, before it is dispensed anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionDraft {
  pub medication_name: String,
  pub generic_name:    Option<String>,
  /// Free text, e.g. "500 mg"; may be filled from a dosage calculation.
  pub dosage:          Option<String>,
  pub form:            Option<String>,
  pub route:           Option<String>,
  pub frequency:       Option<String>,
  pub duration:        Option<String>,
  pub quantity:        Option<u32>,
  #[serde(default)]
  pub refills:         u32,
  pub instructions:    Option<String>,
  pub start_date:      Option<NaiveDate>,
  pub prescribed_date: Option<NaiveDate>,
  pub end_date:        Option<NaiveDate>,
}

impl PrescriptionDraft {
  /// A draft with only the medication name filled in.
  pub fn new(medication_name: impl Into<String>) -> Self {
    Self {
      medication_name: medication_name.into(),
      ..Self::default()
    }
  }

  /// "Amoxicillin 500 mg, oral, three times daily, 7 days".
  pub fn summary(&self) -> String {
    let mut head = self.medication_name.clone();
    if let Some(dosage) = &self.dosage {
      head.push(' ');
      head.push_str(dosage);
    }
    let tail = [&self.route, &self.frequency, &self.duration]
      .into_iter()
      .flatten()
      .map(String::as_str);
    std::iter::once(head.as_str())
      .chain(tail)
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// Rendering of a whole prescription list for the version diff.
pub fn summarize(prescriptions: &[PrescriptionDraft]) -> Option<String> {
  if prescriptions.is_empty() {
    return None;
  }
  Some(
    prescriptions
      .iter()
      .map(PrescriptionDraft::summary)
      .collect::<Vec<_>>()
      .join("; "),
  )
}
