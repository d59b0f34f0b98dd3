//! [`SqliteStore`] — the SQLite implementation of [`AccessStore`].
//!
//! The two toggle operations (`record_scan`, `toggle_session`) each run
//! their full read-modify-write inside one SQLite transaction on the
//! store's single connection, so concurrent scans against the same
//! facility or attendee are linearized by the database, not by this code.
//! Denied scans commit their failed access-event row in that same
//! transaction before the domain error is surfaced.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use turnstile_core::{
  Error as DomainError,
  attendance::{AttendanceAction, AttendanceSession, Attendee, eligible},
  event::{Event, NewEvent},
  facility::{Facility, NewFacility},
  identity::{AccessIdentity, NewIdentity},
  occupancy::{OccupancyReport, OccupancySnapshot},
  presence::Presence,
  scan::{AccessEvent, DenialReason, ScanAction},
  store::{AccessEventQuery, AccessStore, ScanOutcome, ToggleOutcome},
};

use crate::{
  Error, Result,
  encode::{
    RawAccessEvent, RawActiveSession, RawAttendanceSession, RawAttendee,
    RawEvent, RawFacility, RawIdentity, decode_dt, encode_action, encode_dt,
    encode_reason, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Turnstile store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Transaction payloads ────────────────────────────────────────────────────

/// What a facility-scan transaction decided, carried out of the closure.
enum ScanTx {
  Granted {
    action:          ScanAction,
    /// Closed-session length on exit, for transition logging.
    session_seconds: Option<i64>,
    facility:        RawFacility,
  },
  Denied(DomainError),
}

/// What an attendance-toggle transaction decided.
enum ToggleTx {
  Granted {
    action:   AttendanceAction,
    attendee: RawAttendee,
    session:  RawAttendanceSession,
  },
  Denied(DomainError),
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Identities ────────────────────────────────────────────────────────────

  async fn enroll_identity(&self, input: NewIdentity) -> Result<AccessIdentity> {
    let identity = AccessIdentity {
      identity_id:  Uuid::new_v4(),
      username:     input.username,
      display_name: input.display_name,
      card_id:      Some(input.card_id),
      issued_at:    Utc::now(),
    };

    let id_str   = encode_uuid(identity.identity_id);
    let username = identity.username.clone();
    let display  = identity.display_name.clone();
    let card     = identity.card_id.clone();
    let at_str   = encode_dt(identity.issued_at);

    let taken = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken: bool = tx
          .query_row(
            "SELECT 1 FROM identities WHERE card_id = ?1",
            rusqlite::params![card],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !taken {
          tx.execute(
            "INSERT INTO identities (identity_id, username, display_name, card_id, issued_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id_str, username, display, card, at_str],
          )?;
        }

        tx.commit()?;
        Ok(taken)
      })
      .await?;

    if taken {
      let card = identity.card_id.unwrap_or_default();
      return Err(Error::Domain(DomainError::CardInUse(card)));
    }
    Ok(identity)
  }

  async fn get_identity(&self, id: Uuid) -> Result<Option<AccessIdentity>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| Ok(identity_row(conn, &id_str)?))
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn lookup_identity_by_card(
    &self,
    card_id: &str,
  ) -> Result<Option<AccessIdentity>> {
    let card = card_id.to_owned();

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| Ok(identity_row_by_card(conn, &card)?))
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn list_identities(&self) -> Result<Vec<AccessIdentity>> {
    let raws: Vec<RawIdentity> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT identity_id, username, display_name, card_id, issued_at
           FROM identities ORDER BY issued_at",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawIdentity {
              identity_id:  row.get(0)?,
              username:     row.get(1)?,
              display_name: row.get(2)?,
              card_id:      row.get(3)?,
              issued_at:    row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentity::into_identity).collect()
  }

  async fn revoke_card(&self, identity_id: Uuid) -> Result<AccessIdentity> {
    let id_str = encode_uuid(identity_id);

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(row) = identity_row(&tx, &id_str)? else {
          tx.commit()?;
          return Ok(None);
        };

        if row.card_id.is_some() {
          tx.execute(
            "UPDATE identities SET card_id = NULL WHERE identity_id = ?1",
            rusqlite::params![id_str],
          )?;
        }

        tx.commit()?;
        Ok(Some(row))
      })
      .await?;

    // `raw.card_id` holds the pre-update value, so revoked-twice is
    // distinguishable from a successful revocation.
    match raw {
      None => Err(Error::Domain(DomainError::IdentityNotFound(identity_id))),
      Some(row) if row.card_id.is_none() => {
        Err(Error::Domain(DomainError::CardAlreadyRevoked(identity_id)))
      }
      Some(row) => {
        let mut identity = row.into_identity()?;
        identity.card_id = None;
        Ok(identity)
      }
    }
  }

  // ── Facilities ────────────────────────────────────────────────────────────

  async fn add_facility(&self, input: NewFacility) -> Result<Facility> {
    let facility = Facility {
      facility_id: Uuid::new_v4(),
      name:        input.name,
      capacity:    input.capacity,
      is_active:   input.is_active,
      created_at:  Utc::now(),
    };

    let id_str   = encode_uuid(facility.facility_id);
    let name     = facility.name.clone();
    let capacity = i64::from(facility.capacity);
    let active   = facility.is_active;
    let at_str   = encode_dt(facility.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO facilities (facility_id, name, capacity, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, name, capacity, active, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(facility)
  }

  async fn get_facility(&self, id: Uuid) -> Result<Option<Facility>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawFacility> = self
      .conn
      .call(move |conn| Ok(facility_row(conn, &id_str)?))
      .await?;

    raw.map(RawFacility::into_facility).transpose()
  }

  async fn list_facilities(&self) -> Result<Vec<Facility>> {
    let raws: Vec<RawFacility> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT facility_id, name, capacity, is_active, created_at
           FROM facilities ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawFacility {
              facility_id: row.get(0)?,
              name:        row.get(1)?,
              capacity:    row.get(2)?,
              is_active:   row.get(3)?,
              created_at:  row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFacility::into_facility).collect()
  }

  async fn set_facility_active(&self, id: Uuid, active: bool) -> Result<Facility> {
    let id_str = encode_uuid(id);

    let raw: Option<RawFacility> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(row) = facility_row(&tx, &id_str)? else {
          tx.commit()?;
          return Ok(None);
        };

        tx.execute(
          "UPDATE facilities SET is_active = ?1 WHERE facility_id = ?2",
          rusqlite::params![active, id_str],
        )?;

        tx.commit()?;
        Ok(Some(RawFacility { is_active: active, ..row }))
      })
      .await?;

    match raw {
      None => Err(Error::Domain(DomainError::FacilityNotFound(id))),
      Some(row) => Ok(row.into_facility()?),
    }
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn add_event(&self, input: NewEvent) -> Result<Event> {
    let event = Event {
      event_id:                   Uuid::new_v4(),
      slug:                       input.slug,
      name:                       input.name,
      minimum_attendance_minutes: input.minimum_attendance_minutes,
      starts_at:                  input.starts_at,
      ends_at:                    input.ends_at,
      created_at:                 Utc::now(),
    };

    let id_str     = encode_uuid(event.event_id);
    let slug       = event.slug.clone();
    let name       = event.name.clone();
    let minimum    = event.minimum_attendance_minutes;
    let starts_str = encode_dt(event.starts_at);
    let ends_str   = encode_dt(event.ends_at);
    let at_str     = encode_dt(event.created_at);

    let taken = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken: bool = tx
          .query_row(
            "SELECT 1 FROM events WHERE slug = ?1",
            rusqlite::params![slug],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !taken {
          tx.execute(
            "INSERT INTO events
               (event_id, slug, name, minimum_attendance_minutes, starts_at, ends_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![id_str, slug, name, minimum, starts_str, ends_str, at_str],
          )?;
        }

        tx.commit()?;
        Ok(taken)
      })
      .await?;

    if taken {
      return Err(Error::Domain(DomainError::SlugTaken(event.slug)));
    }
    Ok(event)
  }

  async fn get_event(&self, slug: &str) -> Result<Option<Event>> {
    let slug = slug.to_owned();

    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| Ok(event_row_by_slug(conn, &slug)?))
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }

  async fn list_events(&self) -> Result<Vec<Event>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, slug, name, minimum_attendance_minutes,
                  starts_at, ends_at, created_at
           FROM events ORDER BY starts_at",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawEvent {
              event_id:                   row.get(0)?,
              slug:                       row.get(1)?,
              name:                       row.get(2)?,
              minimum_attendance_minutes: row.get(3)?,
              starts_at:                  row.get(4)?,
              ends_at:                    row.get(5)?,
              created_at:                 row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Attendees ─────────────────────────────────────────────────────────────

  async fn register_attendee(
    &self,
    slug: &str,
    identity_id: Uuid,
  ) -> Result<Attendee> {
    let slug = slug.to_owned();
    let identity_id_str = encode_uuid(identity_id);
    let attendee_id = Uuid::new_v4();
    let attendee_id_str = encode_uuid(attendee_id);
    let registered_at = Utc::now();
    let at_str = encode_dt(registered_at);

    let outcome: std::result::Result<String, DomainError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(event) = event_row_by_slug(&tx, &slug)? else {
          tx.commit()?;
          return Ok(Err(DomainError::EventNotFound(slug)));
        };

        if identity_row(&tx, &identity_id_str)?.is_none() {
          tx.commit()?;
          return Ok(Err(DomainError::IdentityNotFound(identity_id)));
        }

        if attendee_row(&tx, &event.event_id, &identity_id_str)?.is_some() {
          let event_id = parse_uuid(&event.event_id)?;
          tx.commit()?;
          return Ok(Err(DomainError::AlreadyRegistered { event_id, identity_id }));
        }

        tx.execute(
          "INSERT INTO attendees
             (attendee_id, event_id, identity_id, total_seconds, is_eligible, registered_at)
           VALUES (?1, ?2, ?3, 0, 0, ?4)",
          rusqlite::params![attendee_id_str, event.event_id, identity_id_str, at_str],
        )?;

        tx.commit()?;
        Ok(Ok(event.event_id))
      })
      .await?;

    let event_id_str = outcome.map_err(Error::Domain)?;
    Ok(Attendee {
      attendee_id,
      event_id: Uuid::parse_str(&event_id_str)?,
      identity_id,
      total_seconds: 0,
      is_eligible: false,
      registered_at,
    })
  }

  async fn unregister_attendee(&self, slug: &str, identity_id: Uuid) -> Result<()> {
    let slug = slug.to_owned();
    let identity_id_str = encode_uuid(identity_id);

    // Sessions first, then the attendee row, in one transaction — partial
    // deletion must never be observable.
    let outcome: std::result::Result<(), DomainError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(event) = event_row_by_slug(&tx, &slug)? else {
          tx.commit()?;
          return Ok(Err(DomainError::EventNotFound(slug)));
        };

        let Some(attendee) = attendee_row(&tx, &event.event_id, &identity_id_str)?
        else {
          let event_id = parse_uuid(&event.event_id)?;
          tx.commit()?;
          return Ok(Err(DomainError::NotRegistered { event_id, identity_id }));
        };

        tx.execute(
          "DELETE FROM attendance_sessions WHERE attendee_id = ?1",
          rusqlite::params![attendee.attendee_id],
        )?;
        tx.execute(
          "DELETE FROM attendees WHERE attendee_id = ?1",
          rusqlite::params![attendee.attendee_id],
        )?;

        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    outcome.map_err(Error::Domain)
  }

  async fn get_attendee(
    &self,
    slug: &str,
    identity_id: Uuid,
  ) -> Result<Option<Attendee>> {
    let slug = slug.to_owned();
    let identity_id_str = encode_uuid(identity_id);

    let raw: Option<RawAttendee> = self
      .conn
      .call(move |conn| {
        let Some(event) = event_row_by_slug(conn, &slug)? else {
          return Ok(None);
        };
        Ok(attendee_row(conn, &event.event_id, &identity_id_str)?)
      })
      .await?;

    raw.map(RawAttendee::into_attendee).transpose()
  }

  async fn list_attendees(&self, slug: &str) -> Result<Vec<Attendee>> {
    let slug = slug.to_owned();

    let raws: Vec<RawAttendee> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT a.attendee_id, a.event_id, a.identity_id,
                  a.total_seconds, a.is_eligible, a.registered_at
           FROM attendees a
           JOIN events e ON e.event_id = a.event_id
           WHERE e.slug = ?1
           ORDER BY a.registered_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![slug], |row| {
            Ok(RawAttendee {
              attendee_id:   row.get(0)?,
              event_id:      row.get(1)?,
              identity_id:   row.get(2)?,
              total_seconds: row.get(3)?,
              is_eligible:   row.get(4)?,
              registered_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttendee::into_attendee).collect()
  }

  // ── Occupancy ledger ──────────────────────────────────────────────────────

  async fn record_scan(
    &self,
    card_id: &str,
    facility_id: Uuid,
    scanned_at: DateTime<Utc>,
  ) -> Result<ScanOutcome> {
    let card = card_id.to_owned();
    let facility_id_str = encode_uuid(facility_id);
    let scanned_at_str = encode_dt(scanned_at);
    let recorded_at = Utc::now();
    let recorded_at_str = encode_dt(recorded_at);
    let access_event_id_str = encode_uuid(Uuid::new_v4());
    let new_session_id_str = encode_uuid(Uuid::new_v4());

    let (raw_event, decision, raw_active): (
      RawAccessEvent,
      ScanTx,
      Vec<RawActiveSession>,
    ) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let identity = identity_row_by_card(&tx, &card)?;
        let facility = facility_row(&tx, &facility_id_str)?;
        let identity_id_str = identity.as_ref().map(|i| i.identity_id.clone());

        let decision = match (identity, facility) {
          (None, _) => ScanTx::Denied(DomainError::UnknownCard(card.clone())),
          (Some(_), None) => {
            ScanTx::Denied(DomainError::FacilityNotFound(facility_id))
          }
          (Some(_), Some(fac)) if !fac.is_active => {
            ScanTx::Denied(DomainError::FacilityInactive(facility_id))
          }
          (Some(ident), Some(fac)) => {
            let open = open_occupancy_row(&tx, &facility_id_str, &ident.identity_id)?;
            // The two-state machine decides the direction; the open row
            // is only consulted for the exit's session data.
            let action = Presence::from_open_session(open.is_some()).next_action();
            match open {
              // Not inside: this is an entry, capacity permitting.
              None => {
                let current: i64 = tx.query_row(
                  "SELECT COUNT(*) FROM occupancy_sessions WHERE facility_id = ?1",
                  rusqlite::params![facility_id_str],
                  |row| row.get(0),
                )?;

                if current >= fac.capacity {
                  ScanTx::Denied(DomainError::CapacityExceeded {
                    facility_id,
                    capacity: fac.capacity as u32,
                  })
                } else {
                  tx.execute(
                    "INSERT INTO occupancy_snapshots (facility_id, updated_at)
                     VALUES (?1, ?2)
                     ON CONFLICT(facility_id) DO UPDATE SET updated_at = ?2",
                    rusqlite::params![facility_id_str, recorded_at_str],
                  )?;
                  tx.execute(
                    "INSERT INTO occupancy_sessions
                       (session_id, facility_id, identity_id, entered_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                      new_session_id_str,
                      facility_id_str,
                      ident.identity_id,
                      scanned_at_str,
                    ],
                  )?;
                  ScanTx::Granted {
                    action,
                    session_seconds: None,
                    facility: fac,
                  }
                }
              }
              // Inside: this is an exit.
              Some(open) => {
                tx.execute(
                  "DELETE FROM occupancy_sessions WHERE session_id = ?1",
                  rusqlite::params![open.session_id],
                )?;
                tx.execute(
                  "UPDATE occupancy_snapshots SET updated_at = ?1 WHERE facility_id = ?2",
                  rusqlite::params![recorded_at_str, facility_id_str],
                )?;

                let entered = parse_dt(&open.entered_at)?;
                ScanTx::Granted {
                  action,
                  session_seconds: Some((scanned_at - entered).num_seconds()),
                  facility: fac,
                }
              }
            }
          }
        };

        let (action, reason) = match &decision {
          ScanTx::Granted { action, .. } => (Some(*action), None),
          ScanTx::Denied(e) => (None, e.denial_reason()),
        };

        let raw_event = append_access_event(&tx, AccessEventRow {
          access_event_id: &access_event_id_str,
          card_id:         &card,
          identity_id:     identity_id_str.as_deref(),
          target_kind:     "facility",
          target_id:       &facility_id_str,
          action,
          scanned_at:      &scanned_at_str,
          recorded_at:     &recorded_at_str,
          reason,
        })?;

        let raw_active = match &decision {
          ScanTx::Granted { .. } => active_session_rows(&tx, &facility_id_str)?,
          ScanTx::Denied(_) => Vec::new(),
        };

        tx.commit()?;
        Ok((raw_event, decision, raw_active))
      })
      .await?;

    let access_event = raw_event.into_access_event()?;

    match decision {
      ScanTx::Denied(e) => {
        tracing::warn!(
          card_id,
          %facility_id,
          reason = ?access_event.reason,
          "facility scan denied"
        );
        Err(Error::Domain(e))
      }
      ScanTx::Granted { action, session_seconds, facility } => {
        if let Some(secs) = session_seconds
          && secs < 0
        {
          // Exits tolerate device clock skew; the negative duration is
          // only surfaced in the logs.
          tracing::warn!(%facility_id, seconds = secs, "exit recorded before entry timestamp");
        }

        let facility = facility.into_facility()?;
        let active = raw_active
          .into_iter()
          .map(RawActiveSession::into_active)
          .collect::<Result<Vec<_>>>()?;
        let snapshot =
          OccupancySnapshot { facility_id, active, updated_at: recorded_at };

        tracing::info!(
          %facility_id,
          ?action,
          current = snapshot.current(),
          "facility scan recorded"
        );

        Ok(ScanOutcome {
          action,
          occupancy: snapshot.report(&facility),
          access_event,
        })
      }
    }
  }

  async fn get_occupancy(&self, facility_id: Uuid) -> Result<OccupancyReport> {
    let facility_id_str = encode_uuid(facility_id);

    let (raw_facility, updated_at_str, raw_active): (
      Option<RawFacility>,
      Option<String>,
      Vec<RawActiveSession>,
    ) = self
      .conn
      .call(move |conn| {
        let Some(facility) = facility_row(conn, &facility_id_str)? else {
          return Ok((None, None, Vec::new()));
        };

        let updated_at: Option<String> = conn
          .query_row(
            "SELECT updated_at FROM occupancy_snapshots WHERE facility_id = ?1",
            rusqlite::params![facility_id_str],
            |row| row.get(0),
          )
          .optional()?;

        let active = active_session_rows(conn, &facility_id_str)?;
        Ok((Some(facility), updated_at, active))
      })
      .await?;

    let Some(raw_facility) = raw_facility else {
      return Err(Error::Domain(DomainError::FacilityNotFound(facility_id)));
    };
    let facility = raw_facility.into_facility()?;

    // A facility never scanned has no snapshot row yet; report it empty
    // as of its creation.
    let updated_at = match updated_at_str {
      Some(s) => decode_dt(&s)?,
      None => facility.created_at,
    };
    let active = raw_active
      .into_iter()
      .map(RawActiveSession::into_active)
      .collect::<Result<Vec<_>>>()?;

    let snapshot = OccupancySnapshot { facility_id, active, updated_at };
    Ok(snapshot.report(&facility))
  }

  // ── Attendance accumulator ────────────────────────────────────────────────

  async fn toggle_session(
    &self,
    card_id: &str,
    slug: &str,
    scanned_at: DateTime<Utc>,
  ) -> Result<ToggleOutcome> {
    let card = card_id.to_owned();
    let event_slug = slug.to_owned();
    let scanned_at_str = encode_dt(scanned_at);
    let recorded_at_str = encode_dt(Utc::now());
    let access_event_id_str = encode_uuid(Uuid::new_v4());
    let new_session_id_str = encode_uuid(Uuid::new_v4());

    let (raw_event, decision): (RawAccessEvent, ToggleTx) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let identity = identity_row_by_card(&tx, &card)?;
        let event = event_row_by_slug(&tx, &event_slug)?;
        let identity_id_str = identity.as_ref().map(|i| i.identity_id.clone());

        let decision = match (identity, event) {
          (None, _) => ToggleTx::Denied(DomainError::UnknownCard(card.clone())),
          (Some(_), None) => {
            ToggleTx::Denied(DomainError::EventNotFound(event_slug.clone()))
          }
          (Some(ident), Some(event)) => {
            match attendee_row(&tx, &event.event_id, &ident.identity_id)? {
              None => ToggleTx::Denied(DomainError::NotRegistered {
                event_id:    parse_uuid(&event.event_id)?,
                identity_id: parse_uuid(&ident.identity_id)?,
              }),
              Some(attendee) => {
                toggle_attendance(&tx, &event, attendee, scanned_at, &scanned_at_str, &new_session_id_str)?
              }
            }
          }
        };

        let (action, reason) = match &decision {
          ToggleTx::Granted { action, .. } => {
            (Some(action.as_scan_action()), None)
          }
          ToggleTx::Denied(e) => (None, e.denial_reason()),
        };

        let raw_event = append_access_event(&tx, AccessEventRow {
          access_event_id: &access_event_id_str,
          card_id:         &card,
          identity_id:     identity_id_str.as_deref(),
          target_kind:     "event",
          target_id:       &event_slug,
          action,
          scanned_at:      &scanned_at_str,
          recorded_at:     &recorded_at_str,
          reason,
        })?;

        tx.commit()?;
        Ok((raw_event, decision))
      })
      .await?;

    let access_event = raw_event.into_access_event()?;

    match decision {
      ToggleTx::Denied(e) => {
        tracing::warn!(
          card_id,
          event_slug = slug,
          reason = ?access_event.reason,
          "attendance toggle denied"
        );
        Err(Error::Domain(e))
      }
      ToggleTx::Granted { action, attendee, session } => {
        let attendee = attendee.into_attendee()?;
        let session = session.into_session()?;

        tracing::info!(
          event_slug = slug,
          ?action,
          total_seconds = attendee.total_seconds,
          is_eligible = attendee.is_eligible,
          "attendance toggle recorded"
        );

        Ok(ToggleOutcome { action, attendee, session, access_event })
      }
    }
  }

  async fn list_attendance_sessions(
    &self,
    slug: &str,
    identity_id: Uuid,
  ) -> Result<Vec<AttendanceSession>> {
    let slug = slug.to_owned();
    let identity_id_str = encode_uuid(identity_id);

    let outcome: std::result::Result<Vec<RawAttendanceSession>, DomainError> =
      self
        .conn
        .call(move |conn| {
          let Some(event) = event_row_by_slug(conn, &slug)? else {
            return Ok(Err(DomainError::EventNotFound(slug)));
          };

          let Some(attendee) = attendee_row(conn, &event.event_id, &identity_id_str)?
          else {
            // Not registered: no sessions by definition.
            return Ok(Ok(Vec::new()));
          };

          let mut stmt = conn.prepare(
            "SELECT session_id, attendee_id, entered_at, exited_at
             FROM attendance_sessions
             WHERE attendee_id = ?1
             ORDER BY entered_at",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![attendee.attendee_id], |row| {
              Ok(RawAttendanceSession {
                session_id:  row.get(0)?,
                attendee_id: row.get(1)?,
                entered_at:  row.get(2)?,
                exited_at:   row.get(3)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(Ok(rows))
        })
        .await?;

    let raws = outcome.map_err(Error::Domain)?;
    raws
      .into_iter()
      .map(RawAttendanceSession::into_session)
      .collect()
  }

  async fn recompute_attendance(
    &self,
    slug: &str,
    identity_id: Uuid,
  ) -> Result<Attendee> {
    let slug = slug.to_owned();
    let identity_id_str = encode_uuid(identity_id);

    let outcome: std::result::Result<RawAttendee, DomainError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(event) = event_row_by_slug(&tx, &slug)? else {
          tx.commit()?;
          return Ok(Err(DomainError::EventNotFound(slug)));
        };

        let Some(attendee) = attendee_row(&tx, &event.event_id, &identity_id_str)?
        else {
          let event_id = parse_uuid(&event.event_id)?;
          tx.commit()?;
          return Ok(Err(DomainError::NotRegistered { event_id, identity_id }));
        };

        // Fold the closed sessions; open ones contribute nothing.
        let mut stmt = tx.prepare(
          "SELECT entered_at, exited_at FROM attendance_sessions
           WHERE attendee_id = ?1 AND exited_at IS NOT NULL",
        )?;
        let intervals = stmt
          .query_map(rusqlite::params![attendee.attendee_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut total_seconds = 0i64;
        for (entered_str, exited_str) in &intervals {
          let entered = parse_dt(entered_str)?;
          let exited = parse_dt(exited_str)?;
          total_seconds += (exited - entered).num_seconds();
        }

        let is_eligible =
          eligible(total_seconds, event.minimum_attendance_minutes);

        tx.execute(
          "UPDATE attendees SET total_seconds = ?1, is_eligible = ?2
           WHERE attendee_id = ?3",
          rusqlite::params![total_seconds, is_eligible, attendee.attendee_id],
        )?;

        tx.commit()?;
        Ok(Ok(RawAttendee { total_seconds, is_eligible, ..attendee }))
      })
      .await?;

    let raw = outcome.map_err(Error::Domain)?;
    Ok(raw.into_attendee()?)
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn list_access_events(
    &self,
    query: &AccessEventQuery,
  ) -> Result<Vec<AccessEvent>> {
    let facility_str = query.facility_id.map(encode_uuid);
    let event_slug   = query.event_slug.clone();
    let identity_str = query.identity_id.map(encode_uuid);
    let success      = query.success;
    let limit_val    = query.limit.unwrap_or(100) as i64;
    let offset_val   = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawAccessEvent> = self
      .conn
      .call(move |conn| {
        // Build WHERE clause dynamically; parameter positions are fixed.
        let mut conds: Vec<&'static str> = vec![];
        if facility_str.is_some() {
          conds.push("(target_kind = 'facility' AND target_id = ?1)");
        }
        if event_slug.is_some() {
          conds.push("(target_kind = 'event' AND target_id = ?2)");
        }
        if identity_str.is_some() {
          conds.push("identity_id = ?3");
        }
        if success.is_some() {
          conds.push("success = ?4");
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        let sql = format!(
          "SELECT seq, access_event_id, card_id, identity_id,
                  target_kind, target_id, action, scanned_at, recorded_at,
                  success, reason
           FROM access_events
           {where_clause}
           ORDER BY seq
           LIMIT ?5 OFFSET ?6"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              facility_str.as_deref(),
              event_slug.as_deref(),
              identity_str.as_deref(),
              success,
              limit_val,
              offset_val,
            ],
            |row| {
              Ok(RawAccessEvent {
                seq:             row.get(0)?,
                access_event_id: row.get(1)?,
                card_id:         row.get(2)?,
                identity_id:     row.get(3)?,
                target_kind:     row.get(4)?,
                target_id:       row.get(5)?,
                action:          row.get(6)?,
                scanned_at:      row.get(7)?,
                recorded_at:     row.get(8)?,
                success:         row.get(9)?,
                reason:          row.get(10)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawAccessEvent::into_access_event)
      .collect()
  }
}

// ─── Attendance toggle body ──────────────────────────────────────────────────

/// The check-in/check-out branch of [`AccessStore::toggle_session`], run
/// inside the caller's transaction once card, event, and registration have
/// all resolved.
fn toggle_attendance(
  tx: &rusqlite::Transaction<'_>,
  event: &RawEvent,
  attendee: RawAttendee,
  scanned_at: DateTime<Utc>,
  scanned_at_str: &str,
  new_session_id_str: &str,
) -> std::result::Result<ToggleTx, tokio_rusqlite::Error> {
  let open = open_attendance_row(tx, &attendee.attendee_id)?;
  // The two-state machine decides the direction; the open row is only
  // consulted for the checkout's session data.
  let action = match Presence::from_open_session(open.is_some()) {
    Presence::Out => AttendanceAction::CheckedIn,
    Presence::In => AttendanceAction::CheckedOut,
  };

  match open {
    // Out: check in.
    None => {
      tx.execute(
        "INSERT INTO attendance_sessions (session_id, attendee_id, entered_at, exited_at)
         VALUES (?1, ?2, ?3, NULL)",
        rusqlite::params![new_session_id_str, attendee.attendee_id, scanned_at_str],
      )?;

      let session = RawAttendanceSession {
        session_id:  new_session_id_str.to_owned(),
        attendee_id: attendee.attendee_id.clone(),
        entered_at:  scanned_at_str.to_owned(),
        exited_at:   None,
      };
      Ok(ToggleTx::Granted { action, attendee, session })
    }
    // In: check out of the open session. A second check-in while one is
    // open is a check-out, never a second session.
    Some(open) => {
      let entered = parse_dt(&open.entered_at)?;
      if scanned_at < entered {
        return Ok(ToggleTx::Denied(DomainError::ClockSkew {
          entered_at: entered,
          exited_at:  scanned_at,
        }));
      }

      let duration_seconds = (scanned_at - entered).num_seconds();
      let total_seconds = attendee.total_seconds + duration_seconds;
      let is_eligible = eligible(total_seconds, event.minimum_attendance_minutes);

      tx.execute(
        "UPDATE attendance_sessions SET exited_at = ?1 WHERE session_id = ?2",
        rusqlite::params![scanned_at_str, open.session_id],
      )?;
      tx.execute(
        "UPDATE attendees SET total_seconds = ?1, is_eligible = ?2
         WHERE attendee_id = ?3",
        rusqlite::params![total_seconds, is_eligible, attendee.attendee_id],
      )?;

      let session = RawAttendanceSession {
        exited_at: Some(scanned_at_str.to_owned()),
        ..open
      };
      Ok(ToggleTx::Granted {
        action:   AttendanceAction::CheckedOut,
        attendee: RawAttendee { total_seconds, is_eligible, ..attendee },
        session,
      })
    }
  }
}

// ─── Access-event append ─────────────────────────────────────────────────────

/// Column values for one scan-log append.
struct AccessEventRow<'a> {
  access_event_id: &'a str,
  card_id:         &'a str,
  identity_id:     Option<&'a str>,
  target_kind:     &'static str,
  target_id:       &'a str,
  action:          Option<ScanAction>,
  scanned_at:      &'a str,
  recorded_at:     &'a str,
  reason:          Option<DenialReason>,
}

fn append_access_event(
  conn: &rusqlite::Connection,
  row: AccessEventRow<'_>,
) -> rusqlite::Result<RawAccessEvent> {
  let success = row.reason.is_none();

  conn.execute(
    "INSERT INTO access_events
       (access_event_id, card_id, identity_id, target_kind, target_id,
        action, scanned_at, recorded_at, success, reason)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      row.access_event_id,
      row.card_id,
      row.identity_id,
      row.target_kind,
      row.target_id,
      row.action.map(encode_action),
      row.scanned_at,
      row.recorded_at,
      success,
      row.reason.map(encode_reason),
    ],
  )?;

  Ok(RawAccessEvent {
    seq:             conn.last_insert_rowid(),
    access_event_id: row.access_event_id.to_owned(),
    card_id:         row.card_id.to_owned(),
    identity_id:     row.identity_id.map(str::to_owned),
    target_kind:     row.target_kind.to_owned(),
    target_id:       row.target_id.to_owned(),
    action:          row.action.map(|a| encode_action(a).to_owned()),
    scanned_at:      row.scanned_at.to_owned(),
    recorded_at:     row.recorded_at.to_owned(),
    success,
    reason:          row.reason.map(|r| encode_reason(r).to_owned()),
  })
}

// ─── Row lookups ─────────────────────────────────────────────────────────────
//
// Shared by the single-row getters and the transactional operations; each
// takes a plain `&Connection` so it works both standalone and through a
// `Transaction`'s deref.

fn identity_row(
  conn: &rusqlite::Connection,
  identity_id: &str,
) -> rusqlite::Result<Option<RawIdentity>> {
  conn
    .query_row(
      "SELECT identity_id, username, display_name, card_id, issued_at
       FROM identities WHERE identity_id = ?1",
      rusqlite::params![identity_id],
      |row| {
        Ok(RawIdentity {
          identity_id:  row.get(0)?,
          username:     row.get(1)?,
          display_name: row.get(2)?,
          card_id:      row.get(3)?,
          issued_at:    row.get(4)?,
        })
      },
    )
    .optional()
}

fn identity_row_by_card(
  conn: &rusqlite::Connection,
  card_id: &str,
) -> rusqlite::Result<Option<RawIdentity>> {
  conn
    .query_row(
      "SELECT identity_id, username, display_name, card_id, issued_at
       FROM identities WHERE card_id = ?1",
      rusqlite::params![card_id],
      |row| {
        Ok(RawIdentity {
          identity_id:  row.get(0)?,
          username:     row.get(1)?,
          display_name: row.get(2)?,
          card_id:      row.get(3)?,
          issued_at:    row.get(4)?,
        })
      },
    )
    .optional()
}

fn facility_row(
  conn: &rusqlite::Connection,
  facility_id: &str,
) -> rusqlite::Result<Option<RawFacility>> {
  conn
    .query_row(
      "SELECT facility_id, name, capacity, is_active, created_at
       FROM facilities WHERE facility_id = ?1",
      rusqlite::params![facility_id],
      |row| {
        Ok(RawFacility {
          facility_id: row.get(0)?,
          name:        row.get(1)?,
          capacity:    row.get(2)?,
          is_active:   row.get(3)?,
          created_at:  row.get(4)?,
        })
      },
    )
    .optional()
}

fn event_row_by_slug(
  conn: &rusqlite::Connection,
  slug: &str,
) -> rusqlite::Result<Option<RawEvent>> {
  conn
    .query_row(
      "SELECT event_id, slug, name, minimum_attendance_minutes,
              starts_at, ends_at, created_at
       FROM events WHERE slug = ?1",
      rusqlite::params![slug],
      |row| {
        Ok(RawEvent {
          event_id:                   row.get(0)?,
          slug:                       row.get(1)?,
          name:                       row.get(2)?,
          minimum_attendance_minutes: row.get(3)?,
          starts_at:                  row.get(4)?,
          ends_at:                    row.get(5)?,
          created_at:                 row.get(6)?,
        })
      },
    )
    .optional()
}

fn attendee_row(
  conn: &rusqlite::Connection,
  event_id: &str,
  identity_id: &str,
) -> rusqlite::Result<Option<RawAttendee>> {
  conn
    .query_row(
      "SELECT attendee_id, event_id, identity_id, total_seconds, is_eligible, registered_at
       FROM attendees WHERE event_id = ?1 AND identity_id = ?2",
      rusqlite::params![event_id, identity_id],
      |row| {
        Ok(RawAttendee {
          attendee_id:   row.get(0)?,
          event_id:      row.get(1)?,
          identity_id:   row.get(2)?,
          total_seconds: row.get(3)?,
          is_eligible:   row.get(4)?,
          registered_at: row.get(5)?,
        })
      },
    )
    .optional()
}

fn open_occupancy_row(
  conn: &rusqlite::Connection,
  facility_id: &str,
  identity_id: &str,
) -> rusqlite::Result<Option<RawActiveSession>> {
  conn
    .query_row(
      "SELECT session_id, identity_id, entered_at
       FROM occupancy_sessions WHERE facility_id = ?1 AND identity_id = ?2",
      rusqlite::params![facility_id, identity_id],
      |row| {
        Ok(RawActiveSession {
          session_id:  row.get(0)?,
          identity_id: row.get(1)?,
          entered_at:  row.get(2)?,
        })
      },
    )
    .optional()
}

fn active_session_rows(
  conn: &rusqlite::Connection,
  facility_id: &str,
) -> rusqlite::Result<Vec<RawActiveSession>> {
  let mut stmt = conn.prepare(
    "SELECT session_id, identity_id, entered_at
     FROM occupancy_sessions WHERE facility_id = ?1
     ORDER BY entered_at",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![facility_id], |row| {
      Ok(RawActiveSession {
        session_id:  row.get(0)?,
        identity_id: row.get(1)?,
        entered_at:  row.get(2)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn open_attendance_row(
  conn: &rusqlite::Connection,
  attendee_id: &str,
) -> rusqlite::Result<Option<RawAttendanceSession>> {
  conn
    .query_row(
      "SELECT session_id, attendee_id, entered_at, exited_at
       FROM attendance_sessions
       WHERE attendee_id = ?1 AND exited_at IS NULL",
      rusqlite::params![attendee_id],
      |row| {
        Ok(RawAttendanceSession {
          session_id:  row.get(0)?,
          attendee_id: row.get(1)?,
          entered_at:  row.get(2)?,
          exited_at:   row.get(3)?,
        })
      },
    )
    .optional()
}

// ─── In-closure parsing ──────────────────────────────────────────────────────
//
// Stored values parsed while a transaction is still open; failures abort
// the closure as `tokio_rusqlite::Error::Other`.

fn parse_uuid(s: &str) -> std::result::Result<Uuid, tokio_rusqlite::Error> {
  Uuid::parse_str(s).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

fn parse_dt(s: &str) -> std::result::Result<DateTime<Utc>, tokio_rusqlite::Error> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}
