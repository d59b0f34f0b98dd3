//! Events — scheduled gatherings with an attendance requirement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled event attendees check in and out of.
///
/// `minimum_attendance_minutes` is the accumulated-presence threshold an
/// attendee must reach to be considered eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub event_id:                   Uuid,
  /// URL-safe unique handle, e.g. `"hackathon-2026"`.
  pub slug:                       String,
  pub name:                       String,
  pub minimum_attendance_minutes: i64,
  pub starts_at:                  DateTime<Utc>,
  pub ends_at:                    DateTime<Utc>,
  pub created_at:                 DateTime<Utc>,
}

impl Event {
  /// The eligibility threshold in seconds — attendance durations are
  /// accumulated in seconds so partial minutes are never dropped.
  pub fn minimum_attendance_seconds(&self) -> i64 {
    self.minimum_attendance_minutes * 60
  }
}

/// Input to [`crate::store::AccessStore::add_event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
  pub slug:                       String,
  pub name:                       String,
  pub minimum_attendance_minutes: i64,
  pub starts_at:                  DateTime<Utc>,
  pub ends_at:                    DateTime<Utc>,
}
