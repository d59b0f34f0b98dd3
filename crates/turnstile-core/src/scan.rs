//! Access events — the append-only scan log.
//!
//! One record per scan attempt, successful or not. Records are never
//! updated or deleted; they are the source of truth for audit and for
//! recomputing any derived state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Actions ─────────────────────────────────────────────────────────────────

/// The direction a successful scan resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
  Enter,
  Exit,
}

// ─── Denials ─────────────────────────────────────────────────────────────────

/// Why a scan was denied. Stored verbatim on the failed access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
  UnknownCard,
  FacilityNotFound,
  FacilityInactive,
  CapacityExceeded,
  EventNotFound,
  NotRegistered,
  ClockSkew,
}

impl DenialReason {
  /// The code stored in the `reason` column of the access-event log.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::UnknownCard => "unknown_card",
      Self::FacilityNotFound => "facility_not_found",
      Self::FacilityInactive => "facility_inactive",
      Self::CapacityExceeded => "capacity_exceeded",
      Self::EventNotFound => "event_not_found",
      Self::NotRegistered => "not_registered",
      Self::ClockSkew => "clock_skew",
    }
  }
}

// ─── Target ──────────────────────────────────────────────────────────────────

/// What a scan was aimed at: a facility door or an event check-in desk.
///
/// Facilities are addressed by id, events by slug — each as presented by
/// the scanning device, so denied scans against unknown targets can still
/// be logged faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "lowercase")]
pub enum ScanTarget {
  Facility(Uuid),
  Event(String),
}

// ─── AccessEvent ─────────────────────────────────────────────────────────────

/// One record in the append-only scan log.
///
/// Denied scans are recorded too (`success == false`, `action == None`,
/// `reason` set), so the log is a complete audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
  pub access_event_id: Uuid,
  /// Store-assigned, strictly increasing. Insertion order matches
  /// wall-clock scan order; toggle state depends on it.
  pub seq:             i64,
  /// The raw card identifier as presented — kept even when no identity
  /// matched it.
  pub card_id:         String,
  pub identity_id:     Option<Uuid>,
  pub target:          ScanTarget,
  pub action:          Option<ScanAction>,
  /// Device-supplied scan timestamp.
  pub scanned_at:      DateTime<Utc>,
  /// Server-assigned; never changes after creation.
  pub recorded_at:     DateTime<Utc>,
  pub success:         bool,
  pub reason:          Option<DenialReason>,
}
