//! Attendance sessions and accumulation.
//!
//! An attendance session is a bounded open/closed time interval of
//! continuous presence at an event. Closed durations accumulate on the
//! attendee; eligibility is the accumulated total measured against the
//! event's configured minimum.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, scan::ScanAction};

// ─── Actions ─────────────────────────────────────────────────────────────────

/// What a toggle resolved to, in attendance vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceAction {
  CheckedIn,
  CheckedOut,
}

impl AttendanceAction {
  /// The equivalent action recorded in the access-event log.
  pub fn as_scan_action(self) -> ScanAction {
    match self {
      Self::CheckedIn => ScanAction::Enter,
      Self::CheckedOut => ScanAction::Exit,
    }
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

/// One open or closed interval of presence at an event.
///
/// Invariant: a given attendee has at most one session with
/// `exited_at == None` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceSession {
  pub session_id:  Uuid,
  pub attendee_id: Uuid,
  pub entered_at:  DateTime<Utc>,
  pub exited_at:   Option<DateTime<Utc>>,
}

impl AttendanceSession {
  pub fn is_open(&self) -> bool { self.exited_at.is_none() }

  /// Close the session at `at` and return the elapsed duration.
  ///
  /// Rejects `at < entered_at` with [`Error::ClockSkew`] without touching
  /// the session.
  pub fn close(&mut self, at: DateTime<Utc>) -> Result<Duration> {
    if at < self.entered_at {
      return Err(Error::ClockSkew { entered_at: self.entered_at, exited_at: at });
    }
    self.exited_at = Some(at);
    Ok(at - self.entered_at)
  }

  /// Elapsed time for a closed session; `None` while open.
  pub fn duration(&self) -> Option<Duration> {
    self.exited_at.map(|exit| exit - self.entered_at)
  }
}

// ─── Attendees ───────────────────────────────────────────────────────────────

/// Registration of one identity for one event, with accumulated totals.
///
/// `total_seconds` and `is_eligible` are a cache over the closed sessions
/// for this attendee; [`Attendee::recompute`] re-derives them from the
/// session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
  pub attendee_id:   Uuid,
  pub event_id:      Uuid,
  pub identity_id:   Uuid,
  /// Sum of all closed session durations, in seconds. Stored in seconds
  /// rather than minutes so partial minutes are never dropped.
  pub total_seconds: i64,
  pub is_eligible:   bool,
  pub registered_at: DateTime<Utc>,
}

impl Attendee {
  pub fn total_minutes(&self) -> i64 { self.total_seconds / 60 }

  /// Add one closed session's duration and refresh eligibility against
  /// the event's threshold (in minutes).
  pub fn credit(&mut self, duration: Duration, minimum_minutes: i64) {
    self.total_seconds += duration.num_seconds();
    self.is_eligible = eligible(self.total_seconds, minimum_minutes);
  }

  /// Rebuild `total_seconds`/`is_eligible` from scratch by folding the
  /// closed sessions. Open sessions contribute nothing.
  pub fn recompute<'a>(
    &mut self,
    sessions: impl IntoIterator<Item = &'a AttendanceSession>,
    minimum_minutes: i64,
  ) {
    self.total_seconds = sessions
      .into_iter()
      .filter_map(AttendanceSession::duration)
      .map(|d| d.num_seconds())
      .sum();
    self.is_eligible = eligible(self.total_seconds, minimum_minutes);
  }
}

/// `total >= minimum`, with the threshold configured in minutes.
pub fn eligible(total_seconds: i64, minimum_minutes: i64) -> bool {
  total_seconds >= minimum_minutes * 60
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(minute: u32) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(2026, 3, 14, 9 + minute / 60, minute % 60, 0)
      .unwrap()
  }

  fn open_session(entered_at: DateTime<Utc>) -> AttendanceSession {
    AttendanceSession {
      session_id:  Uuid::new_v4(),
      attendee_id: Uuid::new_v4(),
      entered_at,
      exited_at:   None,
    }
  }

  fn attendee() -> Attendee {
    Attendee {
      attendee_id:   Uuid::new_v4(),
      event_id:      Uuid::new_v4(),
      identity_id:   Uuid::new_v4(),
      total_seconds: 0,
      is_eligible:   false,
      registered_at: at(0),
    }
  }

  #[test]
  fn close_computes_duration() {
    let mut session = open_session(at(0));
    let d = session.close(at(30)).unwrap();
    assert_eq!(d.num_minutes(), 30);
    assert!(!session.is_open());
  }

  #[test]
  fn close_before_entry_is_clock_skew_and_leaves_session_open() {
    let mut session = open_session(at(30));
    let err = session.close(at(10)).unwrap_err();
    assert!(matches!(err, Error::ClockSkew { .. }));
    assert!(session.is_open());
  }

  #[test]
  fn accumulation_crosses_the_threshold() {
    // minimum 60: 30 minutes leaves the attendee ineligible, a further
    // 60 minutes (t=40..t=100) tips the total to 90.
    let mut a = attendee();

    let mut first = open_session(at(0));
    a.credit(first.close(at(30)).unwrap(), 60);
    assert_eq!(a.total_minutes(), 30);
    assert!(!a.is_eligible);

    let mut second = open_session(at(40));
    a.credit(second.close(at(100)).unwrap(), 60);
    assert_eq!(a.total_minutes(), 90);
    assert!(a.is_eligible);
  }

  #[test]
  fn sub_minute_remainders_are_kept() {
    let mut a = attendee();
    a.credit(Duration::seconds(90), 60);
    assert_eq!(a.total_seconds, 90);
    assert_eq!(a.total_minutes(), 1);
  }

  #[test]
  fn recompute_matches_fold_of_closed_sessions() {
    let mut a = attendee();

    let mut s1 = open_session(at(0));
    s1.close(at(30)).unwrap();
    let mut s2 = open_session(at(40));
    s2.close(at(100)).unwrap();
    let s3 = open_session(at(110)); // still open; contributes nothing

    a.recompute([&s1, &s2, &s3], 60);
    assert_eq!(a.total_minutes(), 90);
    assert!(a.is_eligible);
  }

  #[test]
  fn eligibility_boundary_is_inclusive() {
    assert!(!eligible(59 * 60 + 59, 60));
    assert!(eligible(60 * 60, 60));
  }
}
