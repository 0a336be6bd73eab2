//! Point-of-care dosage calculators.
//!
//! Pure functions, no state. Inputs are validated, never clamped: a value
//! that cannot be used is reported as [`DosageError::InvalidInput`] rather
//! than nudged into range.
//!
//! | Function | Formula |
//! |----------|---------|
//! | [`weight_based_dose`] | `weight_kg * dose_per_kg` |
//! | [`body_surface_area`] | `sqrt((height_cm * weight_kg) / 3600)` (Mosteller) |
//! | [`bsa_dose`] | `bsa_m2 * dose_per_m2` |
//! | [`creatinine_clearance`] | `((140 - age) * weight_kg) / (72 * scr)`, × 0.85 if female (Cockcroft-Gault) |

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DosageError {
  #[error("invalid {field}: {reason}")]
  InvalidInput { field: &'static str, reason: String },

  /// Cockcroft-Gault cannot be computed without the patient's age.
  #[error("patient age is required for creatinine clearance")]
  MissingAge,
}

/// Unit attached to a calculated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
  #[strum(serialize = "mg")]
  Milligrams,
  #[strum(serialize = "m²")]
  SquareMetres,
  #[strum(serialize = "mL/min")]
  MillilitresPerMinute,
}

/// A calculated value. The raw `value` is kept at full precision; only the
/// `Display` rendering rounds to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
  pub value: f64,
  pub unit:  Unit,
}

impl fmt::Display for Measurement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.2} {}", self.value, self.unit)
  }
}

/// Output of [`bsa_dose`]: the surface area and the dose derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BsaDose {
  pub bsa:  Measurement,
  pub dose: Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
  Female,
  Male,
  Unknown,
}

/// Inputs to [`creatinine_clearance`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClearanceInput {
  pub age_years:              Option<f64>,
  pub weight_kg:              f64,
  pub serum_creatinine_mg_dl: f64,
  pub sex:                    Sex,
}

// ─── Calculators ─────────────────────────────────────────────────────────────

/// Total dose for a per-kilogram prescription.
pub fn weight_based_dose(
  weight_kg: f64,
  dose_per_kg: f64,
) -> Result<Measurement, DosageError> {
  positive("weight_kg", weight_kg)?;
  non_negative("dose_per_kg", dose_per_kg)?;
  Ok(Measurement {
    value: weight_kg * dose_per_kg,
    unit:  Unit::Milligrams,
  })
}

/// Mosteller body surface area in m².
pub fn body_surface_area(
  height_cm: f64,
  weight_kg: f64,
) -> Result<Measurement, DosageError> {
  positive("height_cm", height_cm)?;
  positive("weight_kg", weight_kg)?;
  Ok(Measurement {
    value: ((height_cm * weight_kg) / 3600.0).sqrt(),
    unit:  Unit::SquareMetres,
  })
}

/// Dose for a per-m² prescription.
pub fn bsa_dose(
  height_cm: f64,
  weight_kg: f64,
  dose_per_m2: f64,
) -> Result<BsaDose, DosageError> {
  let bsa = body_surface_area(height_cm, weight_kg)?;
  non_negative("dose_per_m2", dose_per_m2)?;
  Ok(BsaDose {
    bsa,
    dose: Measurement {
      value: bsa.value * dose_per_m2,
      unit:  Unit::Milligrams,
    },
  })
}

const MAX_CLEARANCE_AGE: f64 = 140.0;

/// Cockcroft-Gault creatinine clearance in mL/min.
///
/// Age is checked before anything else; a zero creatinine is rejected
/// instead of dividing by it. The formula has no meaning from age 140 on,
/// where it stops yielding a positive clearance.
pub fn creatinine_clearance(
  input: &ClearanceInput,
) -> Result<Measurement, DosageError> {
  let age = input.age_years.ok_or(DosageError::MissingAge)?;
  non_negative("age_years", age)?;
  if age >= MAX_CLEARANCE_AGE {
    return Err(DosageError::InvalidInput {
      field:  "age_years",
      reason: format!("{age} must be below {MAX_CLEARANCE_AGE}"),
    });
  }
  positive("weight_kg", input.weight_kg)?;
  positive("serum_creatinine_mg_dl", input.serum_creatinine_mg_dl)?;

  let mut crcl =
    ((140.0 - age) * input.weight_kg) / (72.0 * input.serum_creatinine_mg_dl);
  if input.sex == Sex::Female {
    crcl *= 0.85;
  }

  Ok(Measurement {
    value: crcl,
    unit:  Unit::MillilitresPerMinute,
  })
}

/// Parse a free-text form value into an operand.
pub fn parse_operand(field: &'static str, raw: &str) -> Result<f64, DosageError> {
  let value: f64 = raw.trim().parse().map_err(|_| DosageError::InvalidInput {
    field,
    reason: format!("{raw:?} is not a number"),
  })?;
  finite(field, value)?;
  Ok(value)
}

// ─── Validation ──────────────────────────────────────────────────────────────

fn finite(field: &'static str, value: f64) -> Result<(), DosageError> {
  if value.is_finite() {
    Ok(())
  } else {
    Err(DosageError::InvalidInput {
      field,
      reason: format!("{value} is not a finite number"),
    })
  }
}

fn positive(field: &'static str, value: f64) -> Result<(), DosageError> {
  finite(field, value)?;
  if value > 0.0 {
    Ok(())
  } else {
    Err(DosageError::InvalidInput {
      field,
      reason: format!("{value} must be greater than zero"),
    })
  }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), DosageError> {
  finite(field, value)?;
  if value >= 0.0 {
    Ok(())
  } else {
    Err(DosageError::InvalidInput {
      field,
      reason: format!("{value} must not be negative"),
    })
  }
}
