//! Handler for `POST /scans` — the facility RFID scan endpoint.
//!
//! A scan request carries the raw card identifier, the facility the reader
//! is mounted at, and the device-clock timestamp. The response reports the
//! action taken (enter/exit), the updated occupancy, and the appended
//! access-event record. Denied scans come back as errors but are still
//! present in the audit log.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use turnstile_core::store::{AccessStore, ScanOutcome};
use uuid::Uuid;

use crate::error::ApiError;

/// JSON body accepted by `POST /scans`.
#[derive(Debug, Deserialize)]
pub struct ScanBody {
  pub card_id:     String,
  pub facility_id: Uuid,
  pub scanned_at:  DateTime<Utc>,
}

/// `POST /scans` — body: [`ScanBody`].
pub async fn record<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<ScanBody>,
) -> Result<Json<ScanOutcome>, ApiError>
where
  S: AccessStore,
{
  let outcome = store
    .record_scan(&body.card_id, body.facility_id, body.scanned_at)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}
