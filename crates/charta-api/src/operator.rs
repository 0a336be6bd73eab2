//! The [`Operator`] extractor.
//!
//! Authentication happens in front of this API. Whatever sits there is
//! expected to forward the signed-in clinician's identity in `X-Operator`;
//! every mutating request records it as `changed_by`.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

pub const OPERATOR_HEADER: &str = "x-operator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

impl Operator {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl<S: Send + Sync> FromRequestParts<S> for Operator {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let value = parts
      .headers
      .get(OPERATOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| {
        ApiError::BadRequest(format!("missing {OPERATOR_HEADER} header"))
      })?;
    Ok(Self(value.to_owned()))
  }
}
