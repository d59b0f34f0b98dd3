//! Handlers for `/events` endpoints, including attendee registration and
//! the attendance check-in/check-out toggle.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/events` | All events |
//! | `POST`   | `/events` | Body: [`NewEvent`]; 409 on slug collision |
//! | `GET`    | `/events/:slug` | 404 if not found |
//! | `POST`   | `/events/:slug/attendance` | Body: [`ToggleBody`]; the scan toggle |
//! | `GET`    | `/events/:slug/attendees` | Registered attendees |
//! | `POST`   | `/events/:slug/attendees` | Body: `{"identity_id": ...}`; returns 201 |
//! | `GET`    | `/events/:slug/attendees/:identity_id` | One attendee |
//! | `DELETE` | `/events/:slug/attendees/:identity_id` | Cascade-unregister; 204 |
//! | `GET`    | `/events/:slug/attendees/:identity_id/sessions` | Session history |
//! | `POST`   | `/events/:slug/attendees/:identity_id/recompute` | Re-derive totals |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use turnstile_core::{
  Error as DomainError,
  attendance::{AttendanceSession, Attendee},
  event::{Event, NewEvent},
  store::{AccessStore, ToggleOutcome},
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Events ──────────────────────────────────────────────────────────────────

/// `GET /events`
pub async fn list<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Event>>, ApiError>
where
  S: AccessStore,
{
  let events = store.list_events().await.map_err(ApiError::store)?;
  Ok(Json(events))
}

/// `POST /events` — body: [`NewEvent`].
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewEvent>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore,
{
  let event = store.add_event(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(event)))
}

/// `GET /events/:slug`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(slug): Path<String>,
) -> Result<Json<Event>, ApiError>
where
  S: AccessStore,
{
  let event = store
    .get_event(&slug)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError(DomainError::EventNotFound(slug)))?;
  Ok(Json(event))
}

// ─── Attendance toggle ───────────────────────────────────────────────────────

/// JSON body accepted by `POST /events/:slug/attendance`.
#[derive(Debug, Deserialize)]
pub struct ToggleBody {
  pub card_id:    String,
  pub scanned_at: DateTime<Utc>,
}

/// `POST /events/:slug/attendance` — body: [`ToggleBody`].
pub async fn toggle_attendance<S>(
  State(store): State<Arc<S>>,
  Path(slug): Path<String>,
  Json(body): Json<ToggleBody>,
) -> Result<Json<ToggleOutcome>, ApiError>
where
  S: AccessStore,
{
  let outcome = store
    .toggle_session(&body.card_id, &slug, body.scanned_at)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}

// ─── Attendees ───────────────────────────────────────────────────────────────

/// `GET /events/:slug/attendees`
pub async fn list_attendees<S>(
  State(store): State<Arc<S>>,
  Path(slug): Path<String>,
) -> Result<Json<Vec<Attendee>>, ApiError>
where
  S: AccessStore,
{
  let attendees = store
    .list_attendees(&slug)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(attendees))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub identity_id: Uuid,
}

/// `POST /events/:slug/attendees` — body: `{"identity_id": "..."}`.
pub async fn register<S>(
  State(store): State<Arc<S>>,
  Path(slug): Path<String>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore,
{
  let attendee = store
    .register_attendee(&slug, body.identity_id)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(attendee)))
}

/// `GET /events/:slug/attendees/:identity_id`
pub async fn get_attendee<S>(
  State(store): State<Arc<S>>,
  Path((slug, identity_id)): Path<(String, Uuid)>,
) -> Result<Json<Attendee>, ApiError>
where
  S: AccessStore,
{
  let event = store
    .get_event(&slug)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError(DomainError::EventNotFound(slug.clone())))?;

  let attendee = store
    .get_attendee(&slug, identity_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError(DomainError::NotRegistered {
      event_id: event.event_id,
      identity_id,
    }))?;
  Ok(Json(attendee))
}

/// `DELETE /events/:slug/attendees/:identity_id` — cascade-deletes the
/// attendee's sessions along with the registration.
pub async fn unregister<S>(
  State(store): State<Arc<S>>,
  Path((slug, identity_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError>
where
  S: AccessStore,
{
  store
    .unregister_attendee(&slug, identity_id)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /events/:slug/attendees/:identity_id/sessions`
pub async fn list_sessions<S>(
  State(store): State<Arc<S>>,
  Path((slug, identity_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<AttendanceSession>>, ApiError>
where
  S: AccessStore,
{
  let sessions = store
    .list_attendance_sessions(&slug, identity_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(sessions))
}

/// `POST /events/:slug/attendees/:identity_id/recompute` — re-derives the
/// attendee's totals from the session log and returns the repaired row.
pub async fn recompute<S>(
  State(store): State<Arc<S>>,
  Path((slug, identity_id)): Path<(String, Uuid)>,
) -> Result<Json<Attendee>, ApiError>
where
  S: AccessStore,
{
  let attendee = store
    .recompute_attendance(&slug, identity_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(attendee))
}
