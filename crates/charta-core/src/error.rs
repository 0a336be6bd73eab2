//! Error types for `charta-core`.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::{
  dosage::DosageError,
  visit::{Section, VisitStatus},
};

/// Every failure the lifecycle engine reports to its callers.
///
/// The type is `Clone` so a single save outcome can be delivered to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
  /// A mutation was attempted against a visit whose status forbids edits.
  #[error("visit {visit_id} is {status} and can no longer be modified")]
  Locked { visit_id: Uuid, status: VisitStatus },

  /// `InvalidInput` or `MissingAge` from the dosage calculators.
  #[error(transparent)]
  Dosage(#[from] DosageError),

  /// The record store failed while persisting a commit.
  #[error("save failed: {0}")]
  SaveFailed(#[source] Arc<dyn std::error::Error + Send + Sync>),

  /// Another commit advanced the visit first; re-read and retry.
  #[error(
    "visit {visit_id} is at version {current}, commit was prepared against \
     version {expected}"
  )]
  ConcurrentCommitConflict {
    visit_id: Uuid,
    expected: u32,
    current:  u32,
  },

  #[error("visit not found: {0}")]
  VisitNotFound(Uuid),

  #[error("version {version_number} of visit {visit_id} not found")]
  VersionNotFound { visit_id: Uuid, version_number: u32 },

  #[error("cannot move a visit from {from} to {to}")]
  InvalidTransition { from: VisitStatus, to: VisitStatus },

  #[error(
    "version {version_number} was captured as {status}; only DRAFT versions \
     can be restored"
  )]
  RestoreNotPermitted {
    version_number: u32,
    status:         VisitStatus,
  },

  #[error("no {section} entry at index {index}")]
  NoSuchEntry { section: Section, index: usize },

  #[error("a prescription submission is already awaiting confirmation")]
  SubmissionPending,

  #[error("no prescription submission is awaiting confirmation")]
  NoPendingSubmission,
}

impl Error {
  /// Wrap a store failure as [`Error::SaveFailed`].
  pub fn save_failed(
    source: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::SaveFailed(Arc::new(source))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
