//! The two-state presence machine shared by the occupancy ledger and the
//! attendance accumulator.
//!
//! A scan carries no direction of its own; the direction is inferred from
//! the current state of the (identity, target) pair. Modelling this as an
//! explicit machine — rather than asking "does an open session exist?" at
//! each call site — keeps the toggle semantics in one place.

use serde::{Deserialize, Serialize};

use crate::scan::ScanAction;

/// Whether an identity is currently inside a target (facility or event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
  Out,
  In,
}

impl Presence {
  /// Derive the state from whether an open session exists in storage.
  pub fn from_open_session(open: bool) -> Self {
    if open { Self::In } else { Self::Out }
  }

  /// The action the next scan will take from this state.
  pub fn next_action(self) -> ScanAction {
    match self {
      Self::Out => ScanAction::Enter,
      Self::In => ScanAction::Exit,
    }
  }

  /// The state after the next scan.
  pub fn toggled(self) -> Self {
    match self {
      Self::Out => Self::In,
      Self::In => Self::Out,
    }
  }
}
