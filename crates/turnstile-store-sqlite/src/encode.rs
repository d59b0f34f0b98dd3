//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enum-like fields
//! (ScanAction, DenialReason, target kind) are stored as their snake_case
//! codes. UUIDs are stored as hyphenated lowercase strings. Booleans are
//! stored as 0/1 integers.

use chrono::{DateTime, Utc};
use turnstile_core::{
  attendance::{AttendanceSession, Attendee},
  event::Event,
  facility::Facility,
  identity::AccessIdentity,
  occupancy::ActiveSession,
  scan::{AccessEvent, DenialReason, ScanAction, ScanTarget},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

// ─── ScanAction ──────────────────────────────────────────────────────────────

pub fn encode_action(a: ScanAction) -> &'static str {
  match a {
    ScanAction::Enter => "enter",
    ScanAction::Exit => "exit",
  }
}

pub fn decode_action(s: &str) -> Result<ScanAction> {
  match s {
    "enter" => Ok(ScanAction::Enter),
    "exit" => Ok(ScanAction::Exit),
    other => Err(Error::Decode(format!("unknown scan action: {other:?}"))),
  }
}

// ─── DenialReason ────────────────────────────────────────────────────────────

pub fn encode_reason(r: DenialReason) -> &'static str { r.as_str() }

pub fn decode_reason(s: &str) -> Result<DenialReason> {
  match s {
    "unknown_card" => Ok(DenialReason::UnknownCard),
    "facility_not_found" => Ok(DenialReason::FacilityNotFound),
    "facility_inactive" => Ok(DenialReason::FacilityInactive),
    "capacity_exceeded" => Ok(DenialReason::CapacityExceeded),
    "event_not_found" => Ok(DenialReason::EventNotFound),
    "not_registered" => Ok(DenialReason::NotRegistered),
    "clock_skew" => Ok(DenialReason::ClockSkew),
    other => Err(Error::Decode(format!("unknown denial reason: {other:?}"))),
  }
}

// ─── ScanTarget ──────────────────────────────────────────────────────────────

/// Reassemble a target from its (kind, reference) column pair — facilities
/// are referenced by uuid, events by slug.
pub fn decode_target(kind: &str, reference: &str) -> Result<ScanTarget> {
  match kind {
    "facility" => Ok(ScanTarget::Facility(decode_uuid(reference)?)),
    "event" => Ok(ScanTarget::Event(reference.to_owned())),
    other => Err(Error::Decode(format!("unknown target kind: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `identities` row.
pub struct RawIdentity {
  pub identity_id:  String,
  pub username:     String,
  pub display_name: String,
  pub card_id:      Option<String>,
  pub issued_at:    String,
}

impl RawIdentity {
  pub fn into_identity(self) -> Result<AccessIdentity> {
    Ok(AccessIdentity {
      identity_id:  decode_uuid(&self.identity_id)?,
      username:     self.username,
      display_name: self.display_name,
      card_id:      self.card_id,
      issued_at:    decode_dt(&self.issued_at)?,
    })
  }
}

/// Raw strings read directly from a `facilities` row.
pub struct RawFacility {
  pub facility_id: String,
  pub name:        String,
  pub capacity:    i64,
  pub is_active:   bool,
  pub created_at:  String,
}

impl RawFacility {
  pub fn into_facility(self) -> Result<Facility> {
    Ok(Facility {
      facility_id: decode_uuid(&self.facility_id)?,
      name:        self.name,
      capacity:    self.capacity as u32,
      is_active:   self.is_active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `events` row.
pub struct RawEvent {
  pub event_id:                   String,
  pub slug:                       String,
  pub name:                       String,
  pub minimum_attendance_minutes: i64,
  pub starts_at:                  String,
  pub ends_at:                    String,
  pub created_at:                 String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:                   decode_uuid(&self.event_id)?,
      slug:                       self.slug,
      name:                       self.name,
      minimum_attendance_minutes: self.minimum_attendance_minutes,
      starts_at:                  decode_dt(&self.starts_at)?,
      ends_at:                    decode_dt(&self.ends_at)?,
      created_at:                 decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `attendees` row.
pub struct RawAttendee {
  pub attendee_id:   String,
  pub event_id:      String,
  pub identity_id:   String,
  pub total_seconds: i64,
  pub is_eligible:   bool,
  pub registered_at: String,
}

impl RawAttendee {
  pub fn into_attendee(self) -> Result<Attendee> {
    Ok(Attendee {
      attendee_id:   decode_uuid(&self.attendee_id)?,
      event_id:      decode_uuid(&self.event_id)?,
      identity_id:   decode_uuid(&self.identity_id)?,
      total_seconds: self.total_seconds,
      is_eligible:   self.is_eligible,
      registered_at: decode_dt(&self.registered_at)?,
    })
  }
}

/// Raw strings read directly from an `attendance_sessions` row.
pub struct RawAttendanceSession {
  pub session_id:  String,
  pub attendee_id: String,
  pub entered_at:  String,
  pub exited_at:   Option<String>,
}

impl RawAttendanceSession {
  pub fn into_session(self) -> Result<AttendanceSession> {
    Ok(AttendanceSession {
      session_id:  decode_uuid(&self.session_id)?,
      attendee_id: decode_uuid(&self.attendee_id)?,
      entered_at:  decode_dt(&self.entered_at)?,
      exited_at:   self.exited_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read directly from an `occupancy_sessions` row.
pub struct RawActiveSession {
  pub session_id:  String,
  pub identity_id: String,
  pub entered_at:  String,
}

impl RawActiveSession {
  pub fn into_active(self) -> Result<ActiveSession> {
    Ok(ActiveSession {
      session_id:  decode_uuid(&self.session_id)?,
      identity_id: decode_uuid(&self.identity_id)?,
      entered_at:  decode_dt(&self.entered_at)?,
    })
  }
}

/// Raw strings read directly from an `access_events` row.
pub struct RawAccessEvent {
  pub seq:             i64,
  pub access_event_id: String,
  pub card_id:         String,
  pub identity_id:     Option<String>,
  pub target_kind:     String,
  pub target_id:       String,
  pub action:          Option<String>,
  pub scanned_at:      String,
  pub recorded_at:     String,
  pub success:         bool,
  pub reason:          Option<String>,
}

impl RawAccessEvent {
  pub fn into_access_event(self) -> Result<AccessEvent> {
    Ok(AccessEvent {
      seq:             self.seq,
      access_event_id: decode_uuid(&self.access_event_id)?,
      card_id:         self.card_id,
      identity_id:     self
        .identity_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      target:          decode_target(&self.target_kind, &self.target_id)?,
      action:          self.action.as_deref().map(decode_action).transpose()?,
      scanned_at:      decode_dt(&self.scanned_at)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
      success:         self.success,
      reason:          self.reason.as_deref().map(decode_reason).transpose()?,
    })
  }
}
