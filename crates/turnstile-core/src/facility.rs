//! Facilities — physical spaces with a bounded capacity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical space whose occupancy is tracked by card scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
  pub facility_id: Uuid,
  pub name:        String,
  /// Maximum simultaneous occupants; entries beyond this are denied.
  pub capacity:    u32,
  /// Inactive facilities deny every scan.
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::add_facility`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFacility {
  pub name:      String,
  pub capacity:  u32,
  #[serde(default = "default_active")]
  pub is_active: bool,
}

fn default_active() -> bool { true }
