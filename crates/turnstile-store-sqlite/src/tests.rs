//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeZone, Utc};
use turnstile_core::{
  Error as DomainError,
  attendance::AttendanceAction,
  event::NewEvent,
  facility::NewFacility,
  identity::NewIdentity,
  scan::{DenialReason, ScanAction, ScanTarget},
  store::{AccessEventQuery, AccessStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// Minutes past a fixed reference instant.
fn t(minutes: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    + chrono::Duration::minutes(minutes)
}

async fn enroll(s: &SqliteStore, card: &str, username: &str) -> turnstile_core::identity::AccessIdentity {
  s.enroll_identity(NewIdentity {
    username:     username.into(),
    display_name: username.to_uppercase(),
    card_id:      card.into(),
  })
  .await
  .unwrap()
}

async fn facility(s: &SqliteStore, capacity: u32) -> turnstile_core::facility::Facility {
  s.add_facility(NewFacility {
    name: "workshop".into(),
    capacity,
    is_active: true,
  })
  .await
  .unwrap()
}

async fn event(s: &SqliteStore, slug: &str, minimum: i64) -> turnstile_core::event::Event {
  s.add_event(NewEvent {
    slug:                       slug.into(),
    name:                       "Hack Night".into(),
    minimum_attendance_minutes: minimum,
    starts_at:                  t(0),
    ends_at:                    t(600),
  })
  .await
  .unwrap()
}

// ─── Identities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_and_lookup_by_card() {
  let s = store().await;
  let identity = enroll(&s, "card-a", "alice").await;

  let found = s.lookup_identity_by_card("card-a").await.unwrap().unwrap();
  assert_eq!(found.identity_id, identity.identity_id);
  assert_eq!(found.username, "alice");
  assert!(!found.is_revoked());

  assert!(s.lookup_identity_by_card("card-z").await.unwrap().is_none());
}

#[tokio::test]
async fn enroll_duplicate_card_conflicts() {
  let s = store().await;
  enroll(&s, "card-a", "alice").await;

  let err = s
    .enroll_identity(NewIdentity {
      username:     "bob".into(),
      display_name: "Bob".into(),
      card_id:      "card-a".into(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::CardInUse(_))));
}

#[tokio::test]
async fn revoked_card_stops_resolving() {
  let s = store().await;
  let identity = enroll(&s, "card-a", "alice").await;

  let revoked = s.revoke_card(identity.identity_id).await.unwrap();
  assert!(revoked.is_revoked());

  // The card no longer resolves; the identity row remains.
  assert!(s.lookup_identity_by_card("card-a").await.unwrap().is_none());
  assert!(s.get_identity(identity.identity_id).await.unwrap().is_some());

  let err = s.revoke_card(identity.identity_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::CardAlreadyRevoked(_))));
}

// ─── Occupancy ledger ────────────────────────────────────────────────────────

#[tokio::test]
async fn scans_strictly_alternate_enter_exit() {
  let s = store().await;
  enroll(&s, "card-a", "alice").await;
  let f = facility(&s, 10).await;

  let first = s.record_scan("card-a", f.facility_id, t(0)).await.unwrap();
  assert_eq!(first.action, ScanAction::Enter);
  assert_eq!(first.occupancy.current, 1);

  let second = s.record_scan("card-a", f.facility_id, t(30)).await.unwrap();
  assert_eq!(second.action, ScanAction::Exit);
  assert_eq!(second.occupancy.current, 0);

  let third = s.record_scan("card-a", f.facility_id, t(60)).await.unwrap();
  assert_eq!(third.action, ScanAction::Enter);
  assert_eq!(third.occupancy.current, 1);
}

#[tokio::test]
async fn occupancy_count_tracks_active_set() {
  let s = store().await;
  enroll(&s, "card-a", "alice").await;
  enroll(&s, "card-b", "bob").await;
  let f = facility(&s, 10).await;

  s.record_scan("card-a", f.facility_id, t(0)).await.unwrap();
  s.record_scan("card-b", f.facility_id, t(1)).await.unwrap();

  let report = s.get_occupancy(f.facility_id).await.unwrap();
  assert_eq!(report.current, 2);
  assert_eq!(report.current as usize, report.active.len());
  assert_eq!(report.available, 8);

  s.record_scan("card-a", f.facility_id, t(5)).await.unwrap();
  let report = s.get_occupancy(f.facility_id).await.unwrap();
  assert_eq!(report.current, 1);
  assert_eq!(report.active.len(), 1);
}

#[tokio::test]
async fn capacity_one_denies_then_admits_after_exit() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  enroll(&s, "card-b", "bob").await;
  let f = facility(&s, 1).await;

  // A enters.
  let a_in = s.record_scan("card-a", f.facility_id, t(0)).await.unwrap();
  assert_eq!(a_in.action, ScanAction::Enter);
  assert_eq!(a_in.occupancy.current, 1);

  // B is denied; occupancy unchanged.
  let err = s.record_scan("card-b", f.facility_id, t(1)).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Domain(DomainError::CapacityExceeded { capacity: 1, .. })
  ));
  let report = s.get_occupancy(f.facility_id).await.unwrap();
  assert_eq!(report.current, 1);
  assert_eq!(report.active[0].identity_id, alice.identity_id);

  // A exits, then B fits.
  let a_out = s.record_scan("card-a", f.facility_id, t(2)).await.unwrap();
  assert_eq!(a_out.action, ScanAction::Exit);
  assert_eq!(a_out.occupancy.current, 0);

  let b_in = s.record_scan("card-b", f.facility_id, t(3)).await.unwrap();
  assert_eq!(b_in.action, ScanAction::Enter);
  assert_eq!(b_in.occupancy.current, 1);
}

#[tokio::test]
async fn unknown_card_is_denied_but_logged() {
  let s = store().await;
  let f = facility(&s, 5).await;

  let err = s.record_scan("ghost", f.facility_id, t(0)).await.unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::UnknownCard(_))));

  let events = s
    .list_access_events(&AccessEventQuery {
      facility_id: Some(f.facility_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(events.len(), 1);
  assert!(!events[0].success);
  assert_eq!(events[0].reason, Some(DenialReason::UnknownCard));
  assert_eq!(events[0].identity_id, None);
  assert_eq!(events[0].card_id, "ghost");
}

#[tokio::test]
async fn missing_and_inactive_facilities_are_denied() {
  let s = store().await;
  enroll(&s, "card-a", "alice").await;

  let err = s.record_scan("card-a", Uuid::new_v4(), t(0)).await.unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::FacilityNotFound(_))));

  let f = facility(&s, 5).await;
  s.set_facility_active(f.facility_id, false).await.unwrap();

  let err = s.record_scan("card-a", f.facility_id, t(1)).await.unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::FacilityInactive(_))));
}

#[tokio::test]
async fn occupancy_of_never_scanned_facility_is_empty() {
  let s = store().await;
  let f = facility(&s, 3).await;

  let report = s.get_occupancy(f.facility_id).await.unwrap();
  assert_eq!(report.current, 0);
  assert_eq!(report.capacity, 3);
  assert_eq!(report.available, 3);
  assert!(report.active.is_empty());

  let err = s.get_occupancy(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::FacilityNotFound(_))));
}

// ─── Attendance accumulator ──────────────────────────────────────────────────

#[tokio::test]
async fn toggle_checks_in_then_out_and_accumulates() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  event(&s, "hack-night", 60).await;
  s.register_attendee("hack-night", alice.identity_id).await.unwrap();

  // Check in at t=0, out at t=30: 30 minutes, not yet eligible.
  let check_in = s.toggle_session("card-a", "hack-night", t(0)).await.unwrap();
  assert_eq!(check_in.action, AttendanceAction::CheckedIn);
  assert!(check_in.session.is_open());
  assert_eq!(check_in.attendee.total_seconds, 0);

  let check_out = s.toggle_session("card-a", "hack-night", t(30)).await.unwrap();
  assert_eq!(check_out.action, AttendanceAction::CheckedOut);
  assert_eq!(check_out.attendee.total_minutes(), 30);
  assert!(!check_out.attendee.is_eligible);

  // Second interval t=40..t=100 tips the total to 90.
  s.toggle_session("card-a", "hack-night", t(40)).await.unwrap();
  let final_out = s.toggle_session("card-a", "hack-night", t(100)).await.unwrap();
  assert_eq!(final_out.attendee.total_minutes(), 90);
  assert!(final_out.attendee.is_eligible);

  let sessions = s
    .list_attendance_sessions("hack-night", alice.identity_id)
    .await
    .unwrap();
  assert_eq!(sessions.len(), 2);
  assert!(sessions.iter().all(|sess| !sess.is_open()));
}

#[tokio::test]
async fn clock_skew_checkout_denied_without_mutation() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  event(&s, "hack-night", 60).await;
  s.register_attendee("hack-night", alice.identity_id).await.unwrap();

  s.toggle_session("card-a", "hack-night", t(30)).await.unwrap();

  let err = s
    .toggle_session("card-a", "hack-night", t(10))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::ClockSkew { .. })));

  // The open session and the totals are untouched.
  let sessions = s
    .list_attendance_sessions("hack-night", alice.identity_id)
    .await
    .unwrap();
  assert_eq!(sessions.len(), 1);
  assert!(sessions[0].is_open());

  let attendee = s
    .get_attendee("hack-night", alice.identity_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(attendee.total_seconds, 0);

  // A later, sane checkout still works.
  let out = s.toggle_session("card-a", "hack-night", t(90)).await.unwrap();
  assert_eq!(out.action, AttendanceAction::CheckedOut);
  assert_eq!(out.attendee.total_minutes(), 60);
  assert!(out.attendee.is_eligible);
}

#[tokio::test]
async fn toggle_requires_registration_and_known_event() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;

  let err = s
    .toggle_session("card-a", "no-such-event", t(0))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::EventNotFound(_))));

  event(&s, "hack-night", 60).await;
  let err = s
    .toggle_session("card-a", "hack-night", t(0))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::NotRegistered { .. })));

  // Both denials are in the audit log, in scan order; the card resolved,
  // so both carry the identity.
  let events = s
    .list_access_events(&AccessEventQuery {
      identity_id: Some(alice.identity_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].reason, Some(DenialReason::EventNotFound));
  assert_eq!(events[1].reason, Some(DenialReason::NotRegistered));
}

#[tokio::test]
async fn register_twice_conflicts() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  event(&s, "hack-night", 60).await;

  s.register_attendee("hack-night", alice.identity_id).await.unwrap();
  let err = s
    .register_attendee("hack-night", alice.identity_id)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::AlreadyRegistered { .. })));
}

#[tokio::test]
async fn duplicate_event_slug_conflicts() {
  let s = store().await;
  event(&s, "hack-night", 60).await;

  let err = s
    .add_event(NewEvent {
      slug:                       "hack-night".into(),
      name:                       "Other".into(),
      minimum_attendance_minutes: 30,
      starts_at:                  t(0),
      ends_at:                    t(60),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::SlugTaken(_))));
}

#[tokio::test]
async fn unregister_cascades_sessions() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  event(&s, "hack-night", 60).await;
  s.register_attendee("hack-night", alice.identity_id).await.unwrap();

  // Two closed sessions.
  s.toggle_session("card-a", "hack-night", t(0)).await.unwrap();
  s.toggle_session("card-a", "hack-night", t(30)).await.unwrap();
  s.toggle_session("card-a", "hack-night", t(40)).await.unwrap();
  s.toggle_session("card-a", "hack-night", t(70)).await.unwrap();

  s.unregister_attendee("hack-night", alice.identity_id).await.unwrap();
  assert!(
    s.get_attendee("hack-night", alice.identity_id)
      .await
      .unwrap()
      .is_none()
  );

  // Re-registering starts from a clean slate: no orphan sessions, no
  // carried-over totals.
  let fresh = s.register_attendee("hack-night", alice.identity_id).await.unwrap();
  assert_eq!(fresh.total_seconds, 0);
  assert!(!fresh.is_eligible);

  let sessions = s
    .list_attendance_sessions("hack-night", alice.identity_id)
    .await
    .unwrap();
  assert!(sessions.is_empty());

  let recomputed = s
    .recompute_attendance("hack-night", alice.identity_id)
    .await
    .unwrap();
  assert_eq!(recomputed.total_seconds, 0);
}

#[tokio::test]
async fn unregister_unknown_attendee_errors() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  event(&s, "hack-night", 60).await;

  let err = s
    .unregister_attendee("hack-night", alice.identity_id)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::NotRegistered { .. })));

  let err = s
    .unregister_attendee("no-such-event", alice.identity_id)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(DomainError::EventNotFound(_))));
}

#[tokio::test]
async fn recompute_matches_denormalised_totals() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  event(&s, "hack-night", 60).await;
  s.register_attendee("hack-night", alice.identity_id).await.unwrap();

  s.toggle_session("card-a", "hack-night", t(0)).await.unwrap();
  s.toggle_session("card-a", "hack-night", t(45)).await.unwrap();
  s.toggle_session("card-a", "hack-night", t(50)).await.unwrap();
  let last = s.toggle_session("card-a", "hack-night", t(80)).await.unwrap();

  let recomputed = s
    .recompute_attendance("hack-night", alice.identity_id)
    .await
    .unwrap();
  assert_eq!(recomputed.total_seconds, last.attendee.total_seconds);
  assert_eq!(recomputed.total_minutes(), 75);
  assert!(recomputed.is_eligible);
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_log_preserves_scan_order_and_reasons() {
  let s = store().await;
  enroll(&s, "card-a", "alice").await;
  enroll(&s, "card-b", "bob").await;
  let f = facility(&s, 1).await;

  s.record_scan("card-a", f.facility_id, t(0)).await.unwrap();
  let _ = s.record_scan("card-b", f.facility_id, t(1)).await; // denied: capacity
  s.record_scan("card-a", f.facility_id, t(2)).await.unwrap();
  s.record_scan("card-b", f.facility_id, t(3)).await.unwrap();

  let events = s
    .list_access_events(&AccessEventQuery {
      facility_id: Some(f.facility_id),
      ..Default::default()
    })
    .await
    .unwrap();

  assert_eq!(events.len(), 4);
  assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

  assert_eq!(events[0].action, Some(ScanAction::Enter));
  assert!(!events[1].success);
  assert_eq!(events[1].reason, Some(DenialReason::CapacityExceeded));
  assert_eq!(events[2].action, Some(ScanAction::Exit));
  assert_eq!(events[3].action, Some(ScanAction::Enter));

  assert!(
    events
      .iter()
      .all(|e| e.target == ScanTarget::Facility(f.facility_id))
  );
}

#[tokio::test]
async fn audit_log_filters_by_success_and_target() {
  let s = store().await;
  let alice = enroll(&s, "card-a", "alice").await;
  let f = facility(&s, 5).await;
  event(&s, "hack-night", 60).await;
  s.register_attendee("hack-night", alice.identity_id).await.unwrap();

  s.record_scan("card-a", f.facility_id, t(0)).await.unwrap();
  s.toggle_session("card-a", "hack-night", t(1)).await.unwrap();
  let _ = s.record_scan("ghost", f.facility_id, t(2)).await; // denied

  let denied = s
    .list_access_events(&AccessEventQuery {
      success: Some(false),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(denied.len(), 1);
  assert_eq!(denied[0].card_id, "ghost");

  let event_scans = s
    .list_access_events(&AccessEventQuery {
      event_slug: Some("hack-night".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(event_scans.len(), 1);
  assert_eq!(event_scans[0].target, ScanTarget::Event("hack-night".into()));
  assert_eq!(event_scans[0].action, Some(ScanAction::Enter));

  let alice_scans = s
    .list_access_events(&AccessEventQuery {
      identity_id: Some(alice.identity_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(alice_scans.len(), 2);
}
