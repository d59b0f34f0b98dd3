//! Handlers for `/identities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/identities` | All identities, including revoked ones |
//! | `POST` | `/identities` | Body: [`NewIdentity`]; returns 201 |
//! | `GET`  | `/identities/:id` | 404 if not found |
//! | `POST` | `/identities/:id/revoke` | Clears the card id; 409 if already revoked |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use turnstile_core::{
  Error as DomainError,
  identity::{AccessIdentity, NewIdentity},
  store::AccessStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /identities`
pub async fn list<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<AccessIdentity>>, ApiError>
where
  S: AccessStore,
{
  let identities = store.list_identities().await.map_err(ApiError::store)?;
  Ok(Json(identities))
}

/// `POST /identities` — body: [`NewIdentity`].
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewIdentity>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore,
{
  let identity = store
    .enroll_identity(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(identity)))
}

/// `GET /identities/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<AccessIdentity>, ApiError>
where
  S: AccessStore,
{
  let identity = store
    .get_identity(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError(DomainError::IdentityNotFound(id)))?;
  Ok(Json(identity))
}

/// `POST /identities/:id/revoke`
pub async fn revoke<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<AccessIdentity>, ApiError>
where
  S: AccessStore,
{
  let identity = store.revoke_card(id).await.map_err(ApiError::store)?;
  Ok(Json(identity))
}
