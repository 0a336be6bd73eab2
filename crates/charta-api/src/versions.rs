//! Handlers for version history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/visits/{id}/versions` | Newest first |
//! | `GET`  | `/visits/{id}/versions/{n}` | One snapshot |
//! | `POST` | `/visits/{id}/versions/{n}/restore` | Honours `If-Match`; returns 201 + the new version |
//! | `GET`  | `/visits/{id}/timeline` | Each version with its diff against the previous one |
//! | `GET`  | `/visits/{id}/diff` | `?from=<n>&to=<n>` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use charta_core::{
  diff::SectionDiff, interaction::InteractionDetector, store::RecordStore,
  visit::VisitVersion,
};
use charta_engine::{ChartService, version_store::TimelineEntry};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, etag::check_if_match, operator::Operator};

/// `GET /visits/{id}/versions`
pub async fn list<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<VisitVersion>>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.history(id).await?))
}

/// `GET /visits/{id}/versions/{n}`
pub async fn get_one<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path((id, version_number)): Path<(Uuid, u32)>,
) -> Result<Json<VisitVersion>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.version(id, version_number).await?))
}

/// `POST /visits/{id}/versions/{n}/restore`
pub async fn restore<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path((id, version_number)): Path<(Uuid, u32)>,
  operator: Operator,
  headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  check_if_match(&headers, &service.visit(id).await?)?;
  let version = service
    .restore(id, version_number, operator.as_str())
    .await?;
  Ok((StatusCode::CREATED, Json(version)))
}

/// `GET /visits/{id}/timeline`
pub async fn timeline<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.timeline(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DiffParams {
  pub from: u32,
  pub to:   u32,
}

/// `GET /visits/{id}/diff?from=<n>&to=<n>`
pub async fn diff<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<DiffParams>,
) -> Result<Json<Vec<SectionDiff>>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.diff(id, params.from, params.to).await?))
}
