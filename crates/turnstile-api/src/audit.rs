//! Handler for `GET /access-events` — the audit-trail read.
//!
//! Query params map directly to [`AccessEventQuery`] fields. Results are
//! in insertion (`seq`) order, which matches wall-clock scan order.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use turnstile_core::{
  scan::AccessEvent,
  store::{AccessEventQuery, AccessStore},
};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub facility_id: Option<Uuid>,
  pub event_slug:  Option<String>,
  pub identity_id: Option<Uuid>,
  /// `true` for granted scans only, `false` for denied scans only.
  pub success:     Option<bool>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// `GET /access-events[?facility_id=...][&event_slug=...][&identity_id=...][&success=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AccessEvent>>, ApiError>
where
  S: AccessStore,
{
  let query = AccessEventQuery {
    facility_id: params.facility_id,
    event_slug:  params.event_slug,
    identity_id: params.identity_id,
    success:     params.success,
    limit:       params.limit,
    offset:      params.offset,
  };

  let events = store
    .list_access_events(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(events))
}
