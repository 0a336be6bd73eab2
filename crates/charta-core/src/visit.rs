//! Visit records, immutable version snapshots and the editable sections they
//! carry.
//!
//! A [`VisitRecord`] is the live, mutable document. Every committed save
//! freezes its content into a [`VisitVersion`]; versions are never updated
//! once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  diagnosis::{DiagnosisList, SelectedDiagnosis},
  prescription::PrescriptionDraft,
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where a visit sits in its documentation lifecycle.
///
/// Ordered: a visit only ever moves towards [`VisitStatus::Locked`], except
/// through a restore of a `Draft` snapshot.
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
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitStatus {
  Draft,
  InProgress,
  Completed,
  Signed,
  Locked,
}

/// The kind of encounter being documented.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisitType {
  Outpatient,
  FollowUp,
  Emergency,
  Telehealth,
  Inpatient,
}

// ─── Sections ────────────────────────────────────────────────────────────────

/// Discriminant for the independently edited parts of a visit.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Section {
  Vitals,
  Soap,
  Notes,
  Diagnoses,
  Prescriptions,
}

/// Eight bedside observations. Every field is optional; BMI is derived and
/// written alongside them as `bmi`, never read back.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Vitals {
  pub temperature_c:         Option<f64>,
  pub heart_rate_bpm:        Option<f64>,
  pub respiratory_rate:      Option<f64>,
  pub systolic_mmhg:         Option<f64>,
  pub diastolic_mmhg:        Option<f64>,
  pub oxygen_saturation_pct: Option<f64>,
  pub weight_kg:             Option<f64>,
  pub height_cm:             Option<f64>,
}

impl Vitals {
  /// Body-mass index, when both weight and height are recorded and positive.
  pub fn bmi(&self) -> Option<f64> {
    let weight = self.weight_kg.filter(|w| *w > 0.0)?;
    let height_m = self.height_cm.filter(|h| *h > 0.0)? / 100.0;
    Some(weight / (height_m * height_m))
  }

  /// Single-line rendering used by the version diff. `None` when nothing has
  /// been recorded.
  pub fn summary(&self) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(t) = self.temperature_c {
      parts.push(format!("T {t} °C"));
    }
    if let Some(hr) = self.heart_rate_bpm {
      parts.push(format!("HR {hr} bpm"));
    }
    if let Some(rr) = self.respiratory_rate {
      parts.push(format!("RR {rr}/min"));
    }
    match (self.systolic_mmhg, self.diastolic_mmhg) {
      (Some(s), Some(d)) => parts.push(format!("BP {s}/{d} mmHg")),
      (Some(s), None) => parts.push(format!("BP {s}/- mmHg")),
      (None, Some(d)) => parts.push(format!("BP -/{d} mmHg")),
      (None, None) => {}
    }
    if let Some(spo2) = self.oxygen_saturation_pct {
      parts.push(format!("SpO2 {spo2}%"));
    }
    if let Some(w) = self.weight_kg {
      parts.push(format!("Wt {w} kg"));
    }
    if let Some(h) = self.height_cm {
      parts.push(format!("Ht {h} cm"));
    }
    if let Some(bmi) = self.bmi() {
      parts.push(format!("BMI {bmi:.1}"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
  }
}

impl Serialize for Vitals {
  fn serialize<S: Serializer>(
    &self,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    let mut s = serializer.serialize_struct("Vitals", 9)?;
    s.serialize_field("temperature_c", &self.temperature_c)?;
    s.serialize_field("heart_rate_bpm", &self.heart_rate_bpm)?;
    s.serialize_field("respiratory_rate", &self.respiratory_rate)?;
    s.serialize_field("systolic_mmhg", &self.systolic_mmhg)?;
    s.serialize_field("diastolic_mmhg", &self.diastolic_mmhg)?;
    s.serialize_field("oxygen_saturation_pct", &self.oxygen_saturation_pct)?;
    s.serialize_field("weight_kg", &self.weight_kg)?;
    s.serialize_field("height_cm", &self.height_cm)?;
    s.serialize_field("bmi", &self.bmi())?;
    s.end()
  }
}

/// Subjective, Objective, Assessment, Plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapNote {
  pub subjective: Option<String>,
  pub objective:  Option<String>,
  pub assessment: Option<String>,
  pub plan:       Option<String>,
}

/// Free-text fields that sit outside the SOAP structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitNotes {
  pub chief_complaint: Option<String>,
  pub follow_up:       Option<String>,
}

/// All editable content of a visit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitSections {
  pub vitals:        Vitals,
  pub soap:          SoapNote,
  pub notes:         VisitNotes,
  pub diagnoses:     DiagnosisList,
  pub prescriptions: Vec<PrescriptionDraft>,
}

// ─── Edits ───────────────────────────────────────────────────────────────────

/// A single edit to one section, as produced by a section editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum SectionEdit {
  ReplaceVitals(Vitals),
  ReplaceSoap(SoapNote),
  ReplaceNotes(VisitNotes),
  AddDiagnosis(SelectedDiagnosis),
  RemoveDiagnosis(usize),
  SetPrimaryDiagnosis(usize),
  AddPrescription(PrescriptionDraft),
  UpdatePrescription {
    index:        usize,
    prescription: PrescriptionDraft,
  },
  RemovePrescription(usize),
}

impl SectionEdit {
  /// The section this edit touches.
  pub fn section(&self) -> Section {
    match self {
      Self::ReplaceVitals(_) => Section::Vitals,
      Self::ReplaceSoap(_) => Section::Soap,
      Self::ReplaceNotes(_) => Section::Notes,
      Self::AddDiagnosis(_)
      | Self::RemoveDiagnosis(_)
      | Self::SetPrimaryDiagnosis(_) => Section::Diagnoses,
      Self::AddPrescription(_)
      | Self::UpdatePrescription { .. }
      | Self::RemovePrescription(_) => Section::Prescriptions,
    }
  }

  /// Apply the edit to `sections`. On error `sections` is left untouched.
  pub fn apply(self, sections: &mut VisitSections) -> Result<Section> {
    let section = self.section();
    let missing = |index| Error::NoSuchEntry { section, index };

    match self {
      Self::ReplaceVitals(vitals) => sections.vitals = vitals,
      Self::ReplaceSoap(soap) => sections.soap = soap,
      Self::ReplaceNotes(notes) => sections.notes = notes,
      Self::AddDiagnosis(dx) => sections.diagnoses.push(dx),
      Self::RemoveDiagnosis(index) => {
        sections.diagnoses.remove(index).ok_or_else(|| missing(index))?;
      }
      Self::SetPrimaryDiagnosis(index) => {
        if !sections.diagnoses.set_primary(index) {
          return Err(missing(index));
        }
      }
      Self::AddPrescription(rx) => sections.prescriptions.push(rx),
      Self::UpdatePrescription { index, prescription } => {
        let slot = sections
          .prescriptions
          .get_mut(index)
          .ok_or_else(|| missing(index))?;
        *slot = prescription;
      }
      Self::RemovePrescription(index) => {
        if index >= sections.prescriptions.len() {
          return Err(missing(index));
        }
        sections.prescriptions.remove(index);
      }
    }

    Ok(section)
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// The live, in-progress representation of a clinical visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
  pub visit_id:       Uuid,
  pub patient_id:     Uuid,
  pub visit_type:     VisitType,
  pub status:         VisitStatus,
  /// Always equal to the number of the newest [`VisitVersion`].
  pub version_number: u32,
  pub sections:       VisitSections,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

/// An immutable snapshot of a visit at one committed save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitVersion {
  pub version_id:     Uuid,
  pub visit_id:       Uuid,
  /// Unique per visit; strictly increasing from 1.
  pub version_number: u32,
  pub changed_by:     String,
  pub changed_at:     DateTime<Utc>,
  pub status:         VisitStatus,
  pub visit_type:     VisitType,
  pub sections:       VisitSections,
}

/// Input to [`crate::store::RecordStore::create_visit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVisit {
  pub patient_id: Uuid,
  pub visit_type: VisitType,
  pub created_by: String,
}
