//! Handlers for `/dosage` calculators.
//!
//! Operands arrive as raw query strings and are parsed here, so a value like
//! `weight_kg=abc` is reported as the calculator's own `InvalidInput` (422)
//! rather than as a generic query rejection.
//!
//! | Method | Path | Query |
//! |--------|------|-------|
//! | `GET`  | `/dosage/weight-based` | `weight_kg`, `dose_per_kg` |
//! | `GET`  | `/dosage/bsa` | `height_cm`, `weight_kg` |
//! | `GET`  | `/dosage/bsa-dose` | `height_cm`, `weight_kg`, `dose_per_m2` |
//! | `GET`  | `/dosage/creatinine-clearance` | `age_years` (optional), `weight_kg`, `serum_creatinine_mg_dl`, `sex` |

use axum::{Json, extract::Query};
use charta_core::dosage::{
  self, ClearanceInput, DosageError, Measurement, Sex, Unit, parse_operand,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A calculated value with its two-decimal rendering.
#[derive(Debug, Serialize)]
pub struct Calculated {
  pub value:     f64,
  pub unit:      Unit,
  pub formatted: String,
}

impl From<Measurement> for Calculated {
  fn from(m: Measurement) -> Self {
    Self {
      value:     m.value,
      unit:      m.unit,
      formatted: m.to_string(),
    }
  }
}

// ─── Weight-based ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WeightParams {
  pub weight_kg:   String,
  pub dose_per_kg: String,
}

/// `GET /dosage/weight-based`
pub async fn weight_based(
  Query(params): Query<WeightParams>,
) -> Result<Json<Calculated>, ApiError> {
  let weight = parse_operand("weight_kg", &params.weight_kg)?;
  let dose_per_kg = parse_operand("dose_per_kg", &params.dose_per_kg)?;
  Ok(Json(dosage::weight_based_dose(weight, dose_per_kg)?.into()))
}

// ─── Body surface area ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BsaParams {
  pub height_cm: String,
  pub weight_kg: String,
}

/// `GET /dosage/bsa`
pub async fn bsa(
  Query(params): Query<BsaParams>,
) -> Result<Json<Calculated>, ApiError> {
  let height = parse_operand("height_cm", &params.height_cm)?;
  let weight = parse_operand("weight_kg", &params.weight_kg)?;
  Ok(Json(dosage::body_surface_area(height, weight)?.into()))
}

#[derive(Debug, Deserialize)]
pub struct BsaDoseParams {
  pub height_cm:   String,
  pub weight_kg:   String,
  pub dose_per_m2: String,
}

#[derive(Debug, Serialize)]
pub struct BsaDoseResult {
  pub bsa:  Calculated,
  pub dose: Calculated,
}

/// `GET /dosage/bsa-dose`
pub async fn bsa_dose(
  Query(params): Query<BsaDoseParams>,
) -> Result<Json<BsaDoseResult>, ApiError> {
  let height = parse_operand("height_cm", &params.height_cm)?;
  let weight = parse_operand("weight_kg", &params.weight_kg)?;
  let per_m2 = parse_operand("dose_per_m2", &params.dose_per_m2)?;
  let result = dosage::bsa_dose(height, weight, per_m2)?;
  Ok(Json(BsaDoseResult {
    bsa:  result.bsa.into(),
    dose: result.dose.into(),
  }))
}

// ─── Creatinine clearance ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClearanceParams {
  /// Blank is treated the same as absent.
  pub age_years:              Option<String>,
  pub weight_kg:              String,
  pub serum_creatinine_mg_dl: String,
  pub sex:                    Option<Sex>,
}

/// `GET /dosage/creatinine-clearance`
pub async fn creatinine_clearance(
  Query(params): Query<ClearanceParams>,
) -> Result<Json<Calculated>, ApiError> {
  let age_years = params
    .age_years
    .as_deref()
    .filter(|raw| !raw.trim().is_empty())
    .map(|raw| parse_operand("age_years", raw))
    .transpose()?;
  // Reported ahead of any malformed operand, as the calculator itself does.
  if age_years.is_none() {
    return Err(DosageError::MissingAge.into());
  }
  let input = ClearanceInput {
    age_years,
    weight_kg: parse_operand("weight_kg", &params.weight_kg)?,
    serum_creatinine_mg_dl: parse_operand(
      "serum_creatinine_mg_dl",
      &params.serum_creatinine_mg_dl,
    )?,
    sex: params.sex.unwrap_or(Sex::Unknown),
  };
  Ok(Json(dosage::creatinine_clearance(&input)?.into()))
}
