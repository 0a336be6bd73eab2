//! Field-level comparison of two visit versions.
//!
//! Values are compared literally. Two strings that differ only in whitespace
//! are reported as changed; nothing is trimmed or case-folded. Fields that
//! are absent or empty on both sides are left out of the result.

use serde::{Deserialize, Serialize};

use crate::{prescription, visit::VisitVersion};

/// One row of a version comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDiff {
  pub title:      String,
  pub from_value: Option<String>,
  pub to_value:   Option<String>,
  pub changed:    bool,
}

/// Compare `from` against `to`, one entry per comparable field.
pub fn diff(from: &VisitVersion, to: &VisitVersion) -> Vec<SectionDiff> {
  let a = fields(from);
  let b = fields(to);

  a.into_iter()
    .zip(b)
    .filter_map(|((title, from_value), (_, to_value))| {
      if from_value.is_none() && to_value.is_none() {
        return None;
      }
      let changed = from_value != to_value;
      Some(SectionDiff {
        title: title.to_owned(),
        from_value,
        to_value,
        changed,
      })
    })
    .collect()
}

/// The comparable fields of a version, in display order. Empty strings are
/// treated as absent.
fn fields(version: &VisitVersion) -> Vec<(&'static str, Option<String>)> {
  let s = &version.sections;
  let text = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

  vec![
    ("Visit type", Some(version.visit_type.to_string())),
    ("Status", Some(version.status.to_string())),
    ("Chief complaint", text(&s.notes.chief_complaint)),
    ("Vitals", s.vitals.summary()),
    ("Subjective", text(&s.soap.subjective)),
    ("Objective", text(&s.soap.objective)),
    ("Assessment", text(&s.soap.assessment)),
    ("Plan", text(&s.soap.plan)),
    ("Diagnoses", s.diagnoses.summary()),
    ("Prescriptions", prescription::summarize(&s.prescriptions)),
    ("Follow-up", text(&s.notes.follow_up)),
  ]
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::visit::{VisitSections, VisitStatus, VisitType};

  fn version(n: u32, sections: VisitSections) -> VisitVersion {
    VisitVersion {
      version_id: Uuid::new_v4(),
      visit_id: Uuid::nil(),
      version_number: n,
      changed_by: "nurse".into(),
      changed_at: Utc::now(),
      status: VisitStatus::Draft,
      visit_type: VisitType::Outpatient,
      sections,
    }
  }

  fn with_subjective(text: &str) -> VisitSections {
    let mut s = VisitSections::default();
    s.soap.subjective = Some(text.into());
    s
  }

  fn entry<'a>(diffs: &'a [SectionDiff], title: &str) -> Option<&'a SectionDiff> {
    diffs.iter().find(|d| d.title == title)
  }

  #[test]
  fn identical_versions_report_no_changes() {
    let a = version(1, with_subjective("cough"));
    let b = version(2, with_subjective("cough"));
    let diffs = diff(&a, &b);

    assert!(diffs.iter().all(|d| !d.changed));
    assert!(entry(&diffs, "Subjective").is_some());
  }

  #[test]
  fn whitespace_only_difference_is_a_change() {
    let a = version(1, with_subjective("cough"));
    let b = version(2, with_subjective("cough "));
    let d = diff(&a, &b);
    let subjective = entry(&d, "Subjective").unwrap();

    assert!(subjective.changed);
    assert_eq!(subjective.from_value.as_deref(), Some("cough"));
    assert_eq!(subjective.to_value.as_deref(), Some("cough "));
  }

  #[test]
  fn fields_empty_on_both_sides_are_omitted() {
    let mut a = VisitSections::default();
    a.soap.plan = Some(String::new());
    let diffs = diff(&version(1, a), &version(2, VisitSections::default()));

    assert!(entry(&diffs, "Plan").is_none());
    assert!(entry(&diffs, "Vitals").is_none());
    // Type and status are always present.
    assert!(entry(&diffs, "Visit type").is_some());
    assert!(entry(&diffs, "Status").is_some());
  }

  #[test]
  fn added_field_and_status_change_are_reported() {
    let a = version(1, VisitSections::default());
    let mut b = version(2, with_subjective("headache"));
    b.status = VisitStatus::Signed;
    let diffs = diff(&a, &b);

    let status = entry(&diffs, "Status").unwrap();
    assert!(status.changed);
    assert_eq!(status.to_value.as_deref(), Some("SIGNED"));

    let subjective = entry(&diffs, "Subjective").unwrap();
    assert!(subjective.changed);
    assert_eq!(subjective.from_value, None);
  }

  #[test]
  fn case_change_is_a_change() {
    let diffs = diff(
      &version(1, with_subjective("Cough")),
      &version(2, with_subjective("cough")),
    );
    assert!(entry(&diffs, "Subjective").unwrap().changed);
  }
}
