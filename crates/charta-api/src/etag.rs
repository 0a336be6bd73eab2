//! ETags for visit records.
//!
//! A visit's ETag is a SHA-256 over its id and current version number, so it
//! changes exactly when a commit lands.

use axum::http::{HeaderMap, HeaderValue, header};
use charta_core::visit::VisitRecord;
use sha2::{Digest, Sha256};

use crate::error::ApiError;

pub fn compute_etag(visit: &VisitRecord) -> String {
  let mut hasher = Sha256::new();
  hasher.update(visit.visit_id.as_bytes());
  hasher.update(visit.version_number.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// The `ETag` header value for `visit`.
pub fn etag_header(visit: &VisitRecord) -> Result<HeaderValue, ApiError> {
  HeaderValue::from_str(&compute_etag(visit))
    .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Fail with 412 when the request carries an `If-Match` that does not name
/// `visit`'s current version. No header, or `*`, always passes.
pub fn check_if_match(
  headers: &HeaderMap,
  visit: &VisitRecord,
) -> Result<(), ApiError> {
  let Some(if_match) = headers
    .get(header::IF_MATCH)
    .and_then(|v| v.to_str().ok())
  else {
    return Ok(());
  };

  let current = compute_etag(visit);
  let matches = if_match.split(',').map(str::trim).any(|tag| {
    tag == "*" || strip_etag_quotes(tag) == strip_etag_quotes(&current)
  });
  if matches {
    Ok(())
  } else {
    Err(ApiError::PreconditionFailed)
  }
}

fn strip_etag_quotes(tag: &str) -> &str {
  tag.trim_start_matches("W/").trim_matches('"')
}
