//! Trajectory data types.

use crate::network::NetworkSnapshot;
use crate::simulation::RoundSummary;
use serde::{Deserialize, Serialize};

/// Record of the simulation at a single round.
///
/// Contains the round summary and, every few rounds, a full network snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Counts and aggregates of the round.
    pub summary: RoundSummary,

    /// Network at the end of the round (optional).
    pub snapshot: Option<NetworkSnapshot>,
}
