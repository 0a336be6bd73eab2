//! Handlers for `/visits` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/visits` | Optional `?patient_id` |
//! | `POST` | `/visits` | Body: [`CreateBody`]; returns 201 + `ETag` |
//! | `GET`  | `/visits/{id}` | Persisted record + `can_edit`; `ETag` |
//! | `POST` | `/visits/{id}/edits` | Body: a `SectionEdit`; returns 202 |
//! | `POST` | `/visits/{id}/save` | 200 + new version, or 204 if nothing was pending |
//! | `GET`  | `/visits/{id}/autosave` | Autosave state |
//! | `POST` | `/visits/{id}/{start,complete,sign,lock}` | Honours `If-Match` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use charta_core::{
  interaction::InteractionDetector,
  lifecycle::{LifecycleController, Transition},
  store::RecordStore,
  visit::{NewVisit, Section, SectionEdit, VisitRecord, VisitType},
};
use charta_engine::{ChartService, autosave::AutoSaveState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::ApiError,
  etag::{check_if_match, etag_header},
  operator::Operator,
};

/// A visit as returned by the API.
#[derive(Debug, Serialize)]
pub struct VisitView {
  #[serde(flatten)]
  pub visit:    VisitRecord,
  pub can_edit: bool,
}

impl From<VisitRecord> for VisitView {
  fn from(visit: VisitRecord) -> Self {
    let can_edit = LifecycleController::can_edit(&visit);
    Self { visit, can_edit }
  }
}

/// `visit` as JSON with its `ETag`.
fn tagged(visit: VisitRecord) -> Result<Response, ApiError> {
  let etag = etag_header(&visit)?;
  Ok(([(header::ETAG, etag)], Json(VisitView::from(visit))).into_response())
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub patient_id: Option<Uuid>,
}

/// `GET /visits[?patient_id=<id>]`
pub async fn list<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<VisitView>>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  let visits = service.list_visits(params.patient_id).await?;
  Ok(Json(visits.into_iter().map(VisitView::from).collect()))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub patient_id: Uuid,
  pub visit_type: VisitType,
}

/// `POST /visits`. The operator becomes the author of version 1.
pub async fn create<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  operator: Operator,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  let visit = service
    .create_visit(NewVisit {
      patient_id: body.patient_id,
      visit_type: body.visit_type,
      created_by: operator.0,
    })
    .await?;
  Ok((StatusCode::CREATED, tagged(visit)?))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /visits/{id}`
pub async fn get_one<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  tagged(service.visit(id).await?)
}

// ─── Editing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EditAccepted {
  pub section:  Section,
  pub autosave: AutoSaveState,
}

/// `POST /visits/{id}/edits`. Queued for autosave, not yet persisted.
pub async fn edit<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
  Json(edit): Json<SectionEdit>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  let section = service.edit(id, edit, operator.as_str()).await?;
  let autosave = service.autosave_state(id).await?;
  Ok((StatusCode::ACCEPTED, Json(EditAccepted { section, autosave })))
}

/// `POST /visits/{id}/save`
pub async fn save<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(match service.save_now(id, operator.as_str()).await? {
    Some(version) => Json(version).into_response(),
    None => StatusCode::NO_CONTENT.into_response(),
  })
}

/// `GET /visits/{id}/autosave`
pub async fn autosave<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<AutoSaveState>, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Ok(Json(service.autosave_state(id).await?))
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

async fn transition<S, D>(
  service: &ChartService<S, D>,
  id: Uuid,
  transition: Transition,
  operator: &Operator,
  headers: &HeaderMap,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  check_if_match(headers, &service.visit(id).await?)?;
  let visit = service
    .transition(id, transition, operator.as_str())
    .await?;
  tagged(visit)
}

/// `POST /visits/{id}/start`
pub async fn start<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  transition(&service, id, Transition::Start, &operator, &headers).await
}

/// `POST /visits/{id}/complete`
pub async fn complete<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  transition(&service, id, Transition::Complete, &operator, &headers).await
}

/// `POST /visits/{id}/sign`
pub async fn sign<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  transition(&service, id, Transition::Sign, &operator, &headers).await
}

/// `POST /visits/{id}/lock`
pub async fn lock<S, D>(
  State(service): State<Arc<ChartService<S, D>>>,
  Path(id): Path<Uuid>,
  operator: Operator,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  transition(&service, id, Transition::Lock, &operator, &headers).await
}
