//! Error type for `charta-engine`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] charta_core::Error),

  /// The worker behind a visit's autosave pipeline is gone.
  #[error("autosave pipeline for visit {0} has shut down")]
  PipelineClosed(Uuid),

  #[error("interaction detection failed: {0}")]
  Detection(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
