//! Handlers for `/facilities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/facilities` | All facilities |
//! | `POST` | `/facilities` | Body: [`NewFacility`]; returns 201 |
//! | `GET`  | `/facilities/:id` | 404 if not found |
//! | `POST` | `/facilities/:id/active` | Body: `{"is_active": false}` |
//! | `GET`  | `/facilities/:id/occupancy` | Current occupancy report |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use turnstile_core::{
  Error as DomainError,
  facility::{Facility, NewFacility},
  occupancy::OccupancyReport,
  store::AccessStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /facilities`
pub async fn list<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Facility>>, ApiError>
where
  S: AccessStore,
{
  let facilities = store.list_facilities().await.map_err(ApiError::store)?;
  Ok(Json(facilities))
}

/// `POST /facilities` — body: [`NewFacility`].
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewFacility>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore,
{
  let facility = store.add_facility(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(facility)))
}

/// `GET /facilities/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Facility>, ApiError>
where
  S: AccessStore,
{
  let facility = store
    .get_facility(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError(DomainError::FacilityNotFound(id)))?;
  Ok(Json(facility))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveBody {
  pub is_active: bool,
}

/// `POST /facilities/:id/active` — body: `{"is_active": <bool>}`.
pub async fn set_active<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SetActiveBody>,
) -> Result<Json<Facility>, ApiError>
where
  S: AccessStore,
{
  let facility = store
    .set_facility_active(id, body.is_active)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(facility))
}

/// `GET /facilities/:id/occupancy`
pub async fn occupancy<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<OccupancyReport>, ApiError>
where
  S: AccessStore,
{
  let report = store.get_occupancy(id).await.map_err(ApiError::store)?;
  Ok(Json(report))
}
