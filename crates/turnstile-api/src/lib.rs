//! JSON REST API for Turnstile.
//!
//! Exposes an axum [`Router`] backed by any
//! [`turnstile_core::store::AccessStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", turnstile_api::api_router(store.clone()))
//! ```

pub mod audit;
pub mod error;
pub mod events;
pub mod facilities;
pub mod identities;
pub mod scans;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use turnstile_core::store::AccessStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: AccessStore + 'static,
{
  Router::new()
    // Scans (facility occupancy toggle)
    .route("/scans", post(scans::record::<S>))
    // Identities
    .route(
      "/identities",
      get(identities::list::<S>).post(identities::create::<S>),
    )
    .route("/identities/{id}", get(identities::get_one::<S>))
    .route("/identities/{id}/revoke", post(identities::revoke::<S>))
    // Facilities
    .route(
      "/facilities",
      get(facilities::list::<S>).post(facilities::create::<S>),
    )
    .route("/facilities/{id}", get(facilities::get_one::<S>))
    .route("/facilities/{id}/active", post(facilities::set_active::<S>))
    .route("/facilities/{id}/occupancy", get(facilities::occupancy::<S>))
    // Events, attendees, and the attendance toggle
    .route("/events", get(events::list::<S>).post(events::create::<S>))
    .route("/events/{slug}", get(events::get_one::<S>))
    .route("/events/{slug}/attendance", post(events::toggle_attendance::<S>))
    .route(
      "/events/{slug}/attendees",
      get(events::list_attendees::<S>).post(events::register::<S>),
    )
    .route(
      "/events/{slug}/attendees/{identity_id}",
      get(events::get_attendee::<S>).delete(events::unregister::<S>),
    )
    .route(
      "/events/{slug}/attendees/{identity_id}/sessions",
      get(events::list_sessions::<S>),
    )
    .route(
      "/events/{slug}/attendees/{identity_id}/recompute",
      post(events::recompute::<S>),
    )
    // Audit trail
    .route("/access-events", get(audit::list::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests;
