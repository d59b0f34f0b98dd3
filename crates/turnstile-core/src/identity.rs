//! Access identities — the link between a physical card and a person.
//!
//! An identity is issued once at enrollment and is immutable afterwards,
//! with one exception: revocation clears the card identifier, leaving the
//! identity (and its scan history) intact for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person as seen by the access system, keyed by their card.
///
/// Several identities may refer to the same person over time (lost cards
/// are revoked and a fresh identity is enrolled); the `username` is the
/// stable human handle across them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessIdentity {
  pub identity_id:  Uuid,
  pub username:     String,
  pub display_name: String,
  /// The RFID card identifier. `None` once revoked — a revoked identity
  /// can never scan again.
  pub card_id:      Option<String>,
  pub issued_at:    DateTime<Utc>,
}

impl AccessIdentity {
  pub fn is_revoked(&self) -> bool { self.card_id.is_none() }
}

/// Input to [`crate::store::AccessStore::enroll_identity`].
/// `identity_id` and `issued_at` are always assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentity {
  pub username:     String,
  pub display_name: String,
  pub card_id:      String,
}
