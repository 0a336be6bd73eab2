//! JSON REST API for Charta.
//!
//! Exposes an axum [`Router`] over a [`ChartService`]. Authentication, TLS
//! and transport concerns are the caller's responsibility; the caller is
//! expected to forward the clinician's identity in `X-Operator`.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", charta_api::api_router(service.clone()))
//! ```

pub mod dosage;
pub mod error;
pub mod etag;
pub mod operator;
pub mod prescriptions;
pub mod versions;
pub mod visits;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use charta_core::{interaction::InteractionDetector, store::RecordStore};
use charta_engine::ChartService;

pub use error::ApiError;
pub use operator::Operator;

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, D>(service: Arc<ChartService<S, D>>) -> Router<()>
where
  S: RecordStore + 'static,
  D: InteractionDetector + 'static,
{
  Router::new()
    // Visits
    .route("/visits", get(visits::list::<S, D>).post(visits::create::<S, D>))
    .route("/visits/{id}", get(visits::get_one::<S, D>))
    .route("/visits/{id}/edits", post(visits::edit::<S, D>))
    .route("/visits/{id}/save", post(visits::save::<S, D>))
    .route("/visits/{id}/autosave", get(visits::autosave::<S, D>))
    // Lifecycle
    .route("/visits/{id}/start", post(visits::start::<S, D>))
    .route("/visits/{id}/complete", post(visits::complete::<S, D>))
    .route("/visits/{id}/sign", post(visits::sign::<S, D>))
    .route("/visits/{id}/lock", post(visits::lock::<S, D>))
    // History
    .route("/visits/{id}/versions", get(versions::list::<S, D>))
    .route("/visits/{id}/versions/{n}", get(versions::get_one::<S, D>))
    .route(
      "/visits/{id}/versions/{n}/restore",
      post(versions::restore::<S, D>),
    )
    .route("/visits/{id}/timeline", get(versions::timeline::<S, D>))
    .route("/visits/{id}/diff", get(versions::diff::<S, D>))
    // Prescriptions
    .route(
      "/visits/{id}/prescriptions",
      post(prescriptions::submit::<S, D>),
    )
    .route(
      "/visits/{id}/prescriptions/pending",
      get(prescriptions::pending::<S, D>),
    )
    .route(
      "/visits/{id}/prescriptions/pending/confirm",
      post(prescriptions::confirm::<S, D>),
    )
    .route(
      "/visits/{id}/prescriptions/pending/cancel",
      post(prescriptions::cancel::<S, D>),
    )
    // Dosage
    .route("/dosage/weight-based", get(dosage::weight_based))
    .route("/dosage/bsa", get(dosage::bsa))
    .route("/dosage/bsa-dose", get(dosage::bsa_dose))
    .route(
      "/dosage/creatinine-clearance",
      get(dosage::creatinine_clearance),
    )
    .with_state(service)
}
