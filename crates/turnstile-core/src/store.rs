//! The `AccessStore` trait and supporting request/result types.
//!
//! The trait is implemented by storage backends (e.g.
//! `turnstile-store-sqlite`). Higher layers (`turnstile-api`,
//! `turnstile-server`) depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  attendance::{AttendanceAction, AttendanceSession, Attendee},
  event::{Event, NewEvent},
  facility::{Facility, NewFacility},
  identity::{AccessIdentity, NewIdentity},
  occupancy::OccupancyReport,
  scan::{AccessEvent, ScanAction},
};

// ─── Operation results ───────────────────────────────────────────────────────

/// Result of a successful facility scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
  pub action:       ScanAction,
  pub occupancy:    OccupancyReport,
  pub access_event: AccessEvent,
}

/// Result of a successful attendance toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleOutcome {
  pub action:       AttendanceAction,
  /// The attendee with `total_seconds`/`is_eligible` as of this toggle.
  pub attendee:     Attendee,
  pub session:      AttendanceSession,
  pub access_event: AccessEvent,
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`AccessStore::list_access_events`]. All filters are
/// conjunctive; results are ordered by `seq` ascending.
#[derive(Debug, Clone, Default)]
pub struct AccessEventQuery {
  pub facility_id: Option<Uuid>,
  pub event_slug:  Option<String>,
  pub identity_id: Option<Uuid>,
  /// Restrict to successful (`Some(true)`) or denied (`Some(false)`)
  /// scans.
  pub success:     Option<bool>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Turnstile storage backend.
///
/// The scan log is append-only; `record_scan` and `toggle_session` are
/// single atomic read-modify-write transactions — concurrent scans against
/// the same facility or attendee are linearized by the storage engine, not
/// by this crate.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccessStore: Send + Sync {
  type Error: std::error::Error
    + Into<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Identities ────────────────────────────────────────────────────────

  /// Enroll a new identity with an assigned card. Fails with a conflict
  /// if the card is already held by a non-revoked identity.
  fn enroll_identity(
    &self,
    input: NewIdentity,
  ) -> impl Future<Output = Result<AccessIdentity, Self::Error>> + Send + '_;

  /// Retrieve an identity by UUID. Returns `None` if not found.
  fn get_identity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AccessIdentity>, Self::Error>> + Send + '_;

  /// Resolve a card identifier to its (non-revoked) holder.
  fn lookup_identity_by_card<'a>(
    &'a self,
    card_id: &'a str,
  ) -> impl Future<Output = Result<Option<AccessIdentity>, Self::Error>> + Send + 'a;

  fn list_identities(
    &self,
  ) -> impl Future<Output = Result<Vec<AccessIdentity>, Self::Error>> + Send + '_;

  /// Revoke an identity's card, clearing `card_id`. The identity and its
  /// scan history remain. Fails if already revoked.
  fn revoke_card(
    &self,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<AccessIdentity, Self::Error>> + Send + '_;

  // ── Facilities ────────────────────────────────────────────────────────

  fn add_facility(
    &self,
    input: NewFacility,
  ) -> impl Future<Output = Result<Facility, Self::Error>> + Send + '_;

  fn get_facility(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Facility>, Self::Error>> + Send + '_;

  fn list_facilities(
    &self,
  ) -> impl Future<Output = Result<Vec<Facility>, Self::Error>> + Send + '_;

  /// Activate or deactivate a facility; inactive facilities deny scans.
  fn set_facility_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<Facility, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Create an event. Fails with a conflict if the slug is taken.
  fn add_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  fn get_event<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + 'a;

  fn list_events(
    &self,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  // ── Attendees ─────────────────────────────────────────────────────────

  /// Register an identity for an event. Fails with a conflict if already
  /// registered.
  fn register_attendee<'a>(
    &'a self,
    slug: &'a str,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<Attendee, Self::Error>> + Send + 'a;

  /// Unregister an attendee: delete all their attendance sessions, then
  /// the attendee row, atomically. No orphan sessions may remain.
  fn unregister_attendee<'a>(
    &'a self,
    slug: &'a str,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_attendee<'a>(
    &'a self,
    slug: &'a str,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Attendee>, Self::Error>> + Send + 'a;

  fn list_attendees<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Vec<Attendee>, Self::Error>> + Send + 'a;

  // ── Occupancy ledger ──────────────────────────────────────────────────

  /// Toggle an identity's presence at a facility, appending to the scan
  /// log and mutating the occupancy snapshot in one transaction.
  ///
  /// Denied scans (unknown card, missing/inactive facility, capacity)
  /// still append a failed access event before the error is returned.
  fn record_scan<'a>(
    &'a self,
    card_id: &'a str,
    facility_id: Uuid,
    scanned_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<ScanOutcome, Self::Error>> + Send + 'a;

  /// Current occupancy for a facility; read-only, no side effects.
  fn get_occupancy(
    &self,
    facility_id: Uuid,
  ) -> impl Future<Output = Result<OccupancyReport, Self::Error>> + Send + '_;

  // ── Attendance accumulator ────────────────────────────────────────────

  /// Toggle an attendee's event session: check in when no session is
  /// open, check out (and credit the duration) when one is. A second
  /// check-in while a session is open is a check-out, never a second
  /// session.
  fn toggle_session<'a>(
    &'a self,
    card_id: &'a str,
    slug: &'a str,
    scanned_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<ToggleOutcome, Self::Error>> + Send + 'a;

  fn list_attendance_sessions<'a>(
    &'a self,
    slug: &'a str,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AttendanceSession>, Self::Error>> + Send + 'a;

  /// Re-derive an attendee's totals from their closed sessions and
  /// persist the result — the repair path for the denormalised cache.
  fn recompute_attendance<'a>(
    &'a self,
    slug: &'a str,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<Attendee, Self::Error>> + Send + 'a;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// Read the append-only scan log, filtered by `query`, in insertion
  /// order.
  fn list_access_events<'a>(
    &'a self,
    query: &'a AccessEventQuery,
  ) -> impl Future<Output = Result<Vec<AccessEvent>, Self::Error>> + Send + 'a;
}
