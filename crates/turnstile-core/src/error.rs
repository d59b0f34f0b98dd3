//! Error types for `turnstile-core`.
//!
//! Every error belongs to one of four request-level categories
//! ([`ErrorKind`]); scan denials additionally map to the
//! [`DenialReason`](crate::scan::DenialReason) recorded on the failed
//! access event, so the audit trail and the error surface stay in sync.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::scan::DenialReason;

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ─────────────────────────────────────────────────────────
  #[error("no identity holds card {0:?}")]
  UnknownCard(String),

  #[error("identity not found: {0}")]
  IdentityNotFound(Uuid),

  #[error("facility not found: {0}")]
  FacilityNotFound(Uuid),

  #[error("event not found: {0:?}")]
  EventNotFound(String),

  #[error("identity {identity_id} is not registered for event {event_id}")]
  NotRegistered {
    event_id:    Uuid,
    identity_id: Uuid,
  },

  // ── Conflict ──────────────────────────────────────────────────────────
  #[error("identity {identity_id} is already registered for event {event_id}")]
  AlreadyRegistered {
    event_id:    Uuid,
    identity_id: Uuid,
  },

  #[error("card {0:?} is already assigned to another identity")]
  CardInUse(String),

  #[error("card for identity {0} is already revoked")]
  CardAlreadyRevoked(Uuid),

  #[error("event slug {0:?} is already taken")]
  SlugTaken(String),

  // ── Policy ────────────────────────────────────────────────────────────
  #[error("facility {0} is inactive")]
  FacilityInactive(Uuid),

  #[error("facility {facility_id} is at capacity ({capacity})")]
  CapacityExceeded {
    facility_id: Uuid,
    capacity:    u32,
  },

  // ── Invalid input ─────────────────────────────────────────────────────
  #[error("exit timestamp {exited_at} precedes entry timestamp {entered_at}")]
  ClockSkew {
    entered_at: DateTime<Utc>,
    exited_at:  DateTime<Utc>,
  },

  // ── Infrastructure ────────────────────────────────────────────────────
  #[error("storage error: {0}")]
  Storage(String),
}

/// The request-level category an error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  Conflict,
  PolicyViolation,
  InvalidInput,
  Storage,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::UnknownCard(_)
      | Self::IdentityNotFound(_)
      | Self::FacilityNotFound(_)
      | Self::EventNotFound(_)
      | Self::NotRegistered { .. } => ErrorKind::NotFound,

      Self::AlreadyRegistered { .. }
      | Self::CardInUse(_)
      | Self::CardAlreadyRevoked(_)
      | Self::SlugTaken(_) => ErrorKind::Conflict,

      Self::FacilityInactive(_) | Self::CapacityExceeded { .. } => {
        ErrorKind::PolicyViolation
      }

      Self::ClockSkew { .. } => ErrorKind::InvalidInput,

      Self::Storage(_) => ErrorKind::Storage,
    }
  }

  /// The denial reason recorded on a failed access event, if this error
  /// corresponds to a scan denial.
  pub fn denial_reason(&self) -> Option<DenialReason> {
    match self {
      Self::UnknownCard(_) => Some(DenialReason::UnknownCard),
      Self::FacilityNotFound(_) => Some(DenialReason::FacilityNotFound),
      Self::FacilityInactive(_) => Some(DenialReason::FacilityInactive),
      Self::CapacityExceeded { .. } => Some(DenialReason::CapacityExceeded),
      Self::EventNotFound(_) => Some(DenialReason::EventNotFound),
      Self::NotRegistered { .. } => Some(DenialReason::NotRegistered),
      Self::ClockSkew { .. } => Some(DenialReason::ClockSkew),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
