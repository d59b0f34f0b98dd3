//! Error type for `turnstile-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain-rule violation (unknown card, capacity, clock skew, …).
  #[error(transparent)]
  Domain(#[from] turnstile_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored value could not be decoded back into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

/// Collapse into the core taxonomy: domain errors pass through untouched,
/// infrastructure failures become [`turnstile_core::Error::Storage`].
impl From<Error> for turnstile_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Domain(inner) => inner,
      other => turnstile_core::Error::Storage(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
