//! Handlers for prescription submission and the interaction gate.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/visits/{id}/prescriptions` | Body: `PrescriptionDraft`; 201 if added, 202 if held |
//! | `GET`  | `/visits/{id}/prescriptions/pending` | The held submission, or 404 |
//! | `POST` | `/visits/{id}/prescriptions/pending/confirm` | Adds the held draft unchanged |
//! | `POST` | `/visits/{id}/prescriptions/pending/cancel` | Drops it |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use charta_core::{
  gate::{GateDecision, HeldSubmission},
  interaction::{DrugInteractionWarning, InteractionDetector},
  prescription::PrescriptionDraft,
  store::RecordStore,
};
use charta_engine::ChartService;
use serde::Serialize;
use uuid::Uuid;

use crate::{error::ApiError, operator::Operator};

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
  Added {
    prescription: PrescriptionDraft,
  },
  /// Waiting for `/pending/confirm` or `/pending/cancel`.
  Held {
    warnings: Vec<DrugInteractionWarning>,
  },
}

/// `POST /visits/{id}/prescriptions`
pub async fn submit<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
  Json(prescription): Json<PrescriptionDraft>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  let decision = service
    .submit_prescription(id, prescription, operator.as_str())
    .await?;
  Ok(match decision {
    GateDecision::Proceed(prescription) => (
      StatusCode::CREATED,
      Json(SubmissionOutcome::Added { prescription }),
    ),
    GateDecision::Held(warnings) => (
      StatusCode::ACCEPTED,
      Json(SubmissionOutcome::Held { warnings }),
    ),
  })
}

/// `GET /visits/{id}/prescriptions/pending`
pub async fn pending<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<HeldSubmission>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  let held = service.pending_prescription(id).await?.ok_or_else(|| {
    ApiError::NotFound(format!("no prescription held for visit {id}"))
  })?;
  Ok(Json(held))
}

/// `POST /visits/{id}/prescriptions/pending/confirm`
pub async fn confirm<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
) -> Result<Json<PrescriptionDraft>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.confirm_prescription(id, operator.as_str()).await?))
}

/// `POST /visits/{id}/prescriptions/pending/cancel`
pub async fn cancel<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<HeldSubmission>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.cancel_prescription(id).await?))
}
