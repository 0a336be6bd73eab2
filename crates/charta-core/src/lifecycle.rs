//! The visit status state machine.
//!
//! ```text
//! DRAFT ──start──▶ IN_PROGRESS ──complete──▶ COMPLETED
//!   │                   │                        │
//!   └───────sign────────┴──────────sign──────────┘
//!                       ▼
//!                    SIGNED ──lock──▶ LOCKED
//! ```
//!
//! [`LifecycleController::can_edit`] is the only place write permission is
//! decided. Everything that mutates a visit asks it, directly or through
//! [`LifecycleController::ensure_editable`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  Error, Result,
  visit::{VisitRecord, VisitStatus, VisitVersion},
};

/// A forward status change requested by an operator.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Transition {
  Start,
  Complete,
  Sign,
  Lock,
}

impl Transition {
  /// The status a visit lands in after this transition.
  pub fn target(self) -> VisitStatus {
    match self {
      Self::Start => VisitStatus::InProgress,
      Self::Complete => VisitStatus::Completed,
      Self::Sign => VisitStatus::Signed,
      Self::Lock => VisitStatus::Locked,
    }
  }

  fn allowed_from(self, status: VisitStatus) -> bool {
    use VisitStatus::*;
    match self {
      Self::Start => status == Draft,
      Self::Complete => status == InProgress,
      Self::Sign => matches!(status, Draft | InProgress | Completed),
      Self::Lock => status == Signed,
    }
  }
}

pub struct LifecycleController;

impl LifecycleController {
  /// Whether the visit's content may still change.
  pub fn can_edit(visit: &VisitRecord) -> bool {
    match visit.status {
      VisitStatus::Draft | VisitStatus::InProgress | VisitStatus::Completed => {
        true
      }
      VisitStatus::Signed | VisitStatus::Locked => false,
    }
  }

  /// [`Self::can_edit`] as a `Result`, failing with [`Error::Locked`].
  pub fn ensure_editable(visit: &VisitRecord) -> Result<()> {
    if Self::can_edit(visit) {
      Ok(())
    } else {
      Err(Error::Locked {
        visit_id: visit.visit_id,
        status:   visit.status,
      })
    }
  }

  /// Validate `transition` against the visit's current status and return the
  /// status it leads to.
  pub fn next_status(
    visit: &VisitRecord,
    transition: Transition,
  ) -> Result<VisitStatus> {
    if visit.status == VisitStatus::Locked {
      return Err(Error::Locked {
        visit_id: visit.visit_id,
        status:   visit.status,
      });
    }
    if !transition.allowed_from(visit.status) {
      return Err(Error::InvalidTransition {
        from: visit.status,
        to:   transition.target(),
      });
    }
    Ok(transition.target())
  }

  /// Check that `target` may be restored onto `visit`.
  ///
  /// The visit must still be editable (so a signed or locked visit never
  /// becomes editable again) and the snapshot must have been captured while
  /// the visit was a draft.
  pub fn check_restore(visit: &VisitRecord, target: &VisitVersion) -> Result<()> {
    Self::ensure_editable(visit)?;
    if target.status != VisitStatus::Draft {
      return Err(Error::RestoreNotPermitted {
        version_number: target.version_number,
        status:         target.status,
      });
    }
    Ok(())
  }
}
