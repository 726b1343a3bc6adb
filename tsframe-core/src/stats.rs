//! Per-session frame statistics.

use serde::{Deserialize, Serialize};

use crate::frame::Validity;

/// Counts gathered by a reader. Only ever incremented while the session runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Frames (blocking) or read units (non-blocking) scored.
    pub attempts: u64,
    pub well_formed: u64,
    pub malformed: u64,
}

impl StatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one frame or read unit.
    pub fn record(&mut self, validity: Validity) {
        self.attempts += 1;
        match validity {
            Validity::WellFormed => self.well_formed += 1,
            Validity::Malformed => self.malformed += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempts == 0
    }
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total: {}, good: {}, bad: {}",
            self.attempts, self.well_formed, self.malformed
        )
    }
}
