//! Error type for `charta-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column held a value the domain types do not recognise.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("visit not found: {0}")]
  VisitNotFound(uuid::Uuid),

  /// The visit has moved past the version the commit was prepared against.
  #[error("visit {visit_id} is at version {current}, expected {expected}")]
  Conflict {
    visit_id: uuid::Uuid,
    expected: u32,
    current:  u32,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for charta_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::VisitNotFound(id) => charta_core::Error::VisitNotFound(id),
      Error::Conflict {
        visit_id,
        expected,
        current,
      } => charta_core::Error::ConcurrentCommitConflict {
        visit_id,
        expected,
        current,
      },
      other => charta_core::Error::save_failed(other),
    }
  }
}
