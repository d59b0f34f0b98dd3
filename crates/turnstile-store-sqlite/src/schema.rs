//! SQL schema for the Turnstile SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS identities (
    identity_id  TEXT PRIMARY KEY,
    username     TEXT NOT NULL,    -- stable handle; shared across reissued cards
    display_name TEXT NOT NULL,
    card_id      TEXT UNIQUE,      -- NULL once revoked
    issued_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS facilities (
    facility_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    capacity    INTEGER NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    event_id                   TEXT PRIMARY KEY,
    slug                       TEXT NOT NULL UNIQUE,
    name                       TEXT NOT NULL,
    minimum_attendance_minutes INTEGER NOT NULL,
    starts_at                  TEXT NOT NULL,
    ends_at                    TEXT NOT NULL,
    created_at                 TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendees (
    attendee_id   TEXT PRIMARY KEY,
    event_id      TEXT NOT NULL REFERENCES events(event_id),
    identity_id   TEXT NOT NULL REFERENCES identities(identity_id),
    total_seconds INTEGER NOT NULL DEFAULT 0,
    is_eligible   INTEGER NOT NULL DEFAULT 0,
    registered_at TEXT NOT NULL,
    UNIQUE (event_id, identity_id)
);

CREATE TABLE IF NOT EXISTS attendance_sessions (
    session_id  TEXT PRIMARY KEY,
    attendee_id TEXT NOT NULL REFERENCES attendees(attendee_id),
    entered_at  TEXT NOT NULL,
    exited_at   TEXT              -- NULL while the session is open
);

-- At most one open session per attendee.
CREATE UNIQUE INDEX IF NOT EXISTS attendance_open_idx
    ON attendance_sessions(attendee_id) WHERE exited_at IS NULL;

-- Occupancy snapshot header: one row per facility, created on its first
-- successful scan and touched on every one after.
CREATE TABLE IF NOT EXISTS occupancy_snapshots (
    facility_id TEXT PRIMARY KEY REFERENCES facilities(facility_id),
    updated_at  TEXT NOT NULL
);

-- The snapshot's active-session set. The occupant count is the row count,
-- so it can never disagree with the set.
CREATE TABLE IF NOT EXISTS occupancy_sessions (
    session_id  TEXT PRIMARY KEY,
    facility_id TEXT NOT NULL REFERENCES occupancy_snapshots(facility_id),
    identity_id TEXT NOT NULL REFERENCES identities(identity_id),
    entered_at  TEXT NOT NULL,
    UNIQUE (facility_id, identity_id)
);

-- The scan log is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
-- seq materialises insertion order; toggle state depends on it.
CREATE TABLE IF NOT EXISTS access_events (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    access_event_id TEXT NOT NULL UNIQUE,
    card_id         TEXT NOT NULL,
    identity_id     TEXT REFERENCES identities(identity_id),
    target_kind     TEXT NOT NULL,  -- 'facility' | 'event'
    target_id       TEXT NOT NULL,  -- facility uuid or event slug, as presented;
                                    -- no FK: denied scans may name unknown targets
    action          TEXT,           -- 'enter' | 'exit'; NULL on denial
    scanned_at      TEXT NOT NULL,  -- device clock
    recorded_at     TEXT NOT NULL,  -- server clock
    success         INTEGER NOT NULL,
    reason          TEXT            -- denial code; NULL on success
);

CREATE INDEX IF NOT EXISTS access_events_target_idx
    ON access_events(target_kind, target_id);
CREATE INDEX IF NOT EXISTS access_events_identity_idx
    ON access_events(identity_id);

PRAGMA user_version = 1;
";
