//! Diagnoses selected during a visit.
//!
//! [`DiagnosisList`] owns the "at most one primary" invariant: callers cannot
//! reach the inner vector mutably, so every insertion and removal goes through
//! the promotion rules below.

use serde::{Deserialize, Serialize};

/// How certain the clinician is about a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisType {
  Provisional,
  Confirmed,
  Differential,
  RuleOut,
}

/// One ICD-10 coded diagnosis on the visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedDiagnosis {
  pub icd10_code:     String,
  pub description:    String,
  pub diagnosis_type: DiagnosisType,
  #[serde(default)]
  pub is_primary:     bool,
  pub notes:          Option<String>,
}

impl SelectedDiagnosis {
  /// Convenience constructor for a non-primary diagnosis without notes.
  pub fn new(
    icd10_code: impl Into<String>,
    description: impl Into<String>,
    diagnosis_type: DiagnosisType,
  ) -> Self {
    Self {
      icd10_code: icd10_code.into(),
      description: description.into(),
      diagnosis_type,
      is_primary: false,
      notes: None,
    }
  }
}

/// Ordered diagnosis list with zero or one primary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SelectedDiagnosis>", into = "Vec<SelectedDiagnosis>")]
pub struct DiagnosisList(Vec<SelectedDiagnosis>);

impl DiagnosisList {
  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> std::slice::Iter<'_, SelectedDiagnosis> {
    self.0.iter()
  }

  pub fn get(&self, index: usize) -> Option<&SelectedDiagnosis> {
    self.0.get(index)
  }

  pub fn primary(&self) -> Option<&SelectedDiagnosis> {
    self.0.iter().find(|dx| dx.is_primary)
  }

  /// Append a diagnosis. An entry flagged primary demotes the current
  /// primary; the first entry of a list without a primary becomes primary.
  pub fn push(&mut self, mut dx: SelectedDiagnosis) {
    if dx.is_primary {
      self.clear_primary();
    } else if self.primary().is_none() {
      dx.is_primary = true;
    }
    self.0.push(dx);
  }

  /// Remove the entry at `index`. Removing the primary promotes the new
  /// first element, if any.
  pub fn remove(&mut self, index: usize) -> Option<SelectedDiagnosis> {
    if index >= self.0.len() {
      return None;
    }
    let removed = self.0.remove(index);
    if removed.is_primary
      && let Some(first) = self.0.first_mut()
    {
      first.is_primary = true;
    }
    Some(removed)
  }

  /// Make the entry at `index` the only primary. Returns `false` when the
  /// index is out of range.
  pub fn set_primary(&mut self, index: usize) -> bool {
    if index >= self.0.len() {
      return false;
    }
    self.clear_primary();
    self.0[index].is_primary = true;
    true
  }

  /// Single-line rendering used by the version diff.
  pub fn summary(&self) -> Option<String> {
    if self.0.is_empty() {
      return None;
    }
    let rendered: Vec<String> = self
      .0
      .iter()
      .map(|dx| {
        let marker = if dx.is_primary { " (primary)" } else { "" };
        format!("{} {}{marker}", dx.icd10_code, dx.description)
      })
      .collect();
    Some(rendered.join("; "))
  }

  fn clear_primary(&mut self) {
    for dx in &mut self.0 {
      dx.is_primary = false;
    }
  }
}

impl From<Vec<SelectedDiagnosis>> for DiagnosisList {
  /// Keeps only the first `is_primary` flag when several are set.
  fn from(mut items: Vec<SelectedDiagnosis>) -> Self {
    let mut seen_primary = false;
    for dx in &mut items {
      if dx.is_primary {
        dx.is_primary = !seen_primary;
        seen_primary = true;
      }
    }
    Self(items)
  }
}

impl From<DiagnosisList> for Vec<SelectedDiagnosis> {
  fn from(list: DiagnosisList) -> Self { list.0 }
}

impl<'a> IntoIterator for &'a DiagnosisList {
  type Item = &'a SelectedDiagnosis;
  type IntoIter = std::slice::Iter<'a, SelectedDiagnosis>;

  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}
