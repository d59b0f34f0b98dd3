//! SQLite backend for the Turnstile access tracker.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. The two mutating scan operations
//! each run as a single SQLite transaction; SQLite's single-writer model is
//! what linearizes concurrent scans against the same facility or attendee.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
