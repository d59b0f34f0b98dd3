//! Occupancy snapshot — the derived "who is inside right now" projection.
//!
//! The snapshot is a cache of facts derivable from the access-event log.
//! The occupant count is always the size of the active-session set, so
//! the `count == |active set|` invariant holds by construction rather
//! than by discipline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{facility::Facility, presence::Presence};

// ─── Active sessions ─────────────────────────────────────────────────────────

/// One identity currently inside a facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
  pub session_id:  Uuid,
  pub identity_id: Uuid,
  pub entered_at:  DateTime<Utc>,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The current-state projection for one facility.
///
/// Created lazily on the facility's first scan; mutated in place on every
/// successful scan thereafter. No identity appears twice in `active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancySnapshot {
  pub facility_id: Uuid,
  pub active:      Vec<ActiveSession>,
  pub updated_at:  DateTime<Utc>,
}

impl OccupancySnapshot {
  pub fn empty(facility_id: Uuid, at: DateTime<Utc>) -> Self {
    Self { facility_id, active: Vec::new(), updated_at: at }
  }

  pub fn current(&self) -> u32 { self.active.len() as u32 }

  pub fn session_for(&self, identity_id: Uuid) -> Option<&ActiveSession> {
    self.active.iter().find(|s| s.identity_id == identity_id)
  }

  /// The presence state of `identity_id` at this facility.
  pub fn presence_of(&self, identity_id: Uuid) -> Presence {
    Presence::from_open_session(self.session_for(identity_id).is_some())
  }

  /// Whether one more occupant fits under `capacity`.
  pub fn has_room(&self, capacity: u32) -> bool { self.current() < capacity }

  /// Build the read-model report for this snapshot.
  pub fn report(&self, facility: &Facility) -> OccupancyReport {
    let current = self.current();
    let capacity = facility.capacity;
    let percent_full = if capacity == 0 {
      100.0
    } else {
      f64::from(current) / f64::from(capacity) * 100.0
    };

    OccupancyReport {
      facility_id: self.facility_id,
      current,
      capacity,
      available: capacity.saturating_sub(current),
      percent_full,
      active: self.active.clone(),
      updated_at: self.updated_at,
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// The occupancy read model returned to callers — never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyReport {
  pub facility_id:  Uuid,
  pub current:      u32,
  pub capacity:     u32,
  pub available:    u32,
  pub percent_full: f64,
  pub active:       Vec<ActiveSession>,
  pub updated_at:   DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn facility(capacity: u32) -> Facility {
    Facility {
      facility_id: Uuid::new_v4(),
      name:        "workshop".into(),
      capacity,
      is_active:   true,
      created_at:  Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  fn session(identity_id: Uuid) -> ActiveSession {
    ActiveSession {
      session_id: Uuid::new_v4(),
      identity_id,
      entered_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
    }
  }

  #[test]
  fn count_equals_active_set_size() {
    let f = facility(10);
    let mut snap = OccupancySnapshot::empty(f.facility_id, f.created_at);
    assert_eq!(snap.current(), 0);

    snap.active.push(session(Uuid::new_v4()));
    snap.active.push(session(Uuid::new_v4()));
    assert_eq!(snap.current(), snap.active.len() as u32);
  }

  #[test]
  fn presence_tracks_membership() {
    let f = facility(10);
    let id = Uuid::new_v4();
    let mut snap = OccupancySnapshot::empty(f.facility_id, f.created_at);

    assert_eq!(snap.presence_of(id), Presence::Out);
    snap.active.push(session(id));
    assert_eq!(snap.presence_of(id), Presence::In);
  }

  #[test]
  fn report_percentages_and_availability() {
    let f = facility(4);
    let mut snap = OccupancySnapshot::empty(f.facility_id, f.created_at);
    snap.active.push(session(Uuid::new_v4()));

    let report = snap.report(&f);
    assert_eq!(report.current, 1);
    assert_eq!(report.available, 3);
    assert!((report.percent_full - 25.0).abs() < f64::EPSILON);
  }

  #[test]
  fn zero_capacity_facility_is_always_full() {
    let f = facility(0);
    let snap = OccupancySnapshot::empty(f.facility_id, f.created_at);

    assert!(!snap.has_room(f.capacity));
    let report = snap.report(&f);
    assert_eq!(report.available, 0);
    assert!((report.percent_full - 100.0).abs() < f64::EPSILON);
  }
}
