//! Sweep strategies
//!
//! A table's strategy decides how many historical versions survive a sweep and
//! whether concurrent readers need a sentinel to tell "deleted" from "never
//! written". The set is closed, so behaviour is an exhaustive match rather than
//! a trait object.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SweepStrategy {
    /// Keeps the swept write itself and marks the cell with a sentinel.
    Conservative,
    /// Removes every version up to and including the swept write.
    Thorough,
}

impl SweepStrategy {
    pub const ALL: [SweepStrategy; 2] = [SweepStrategy::Conservative, SweepStrategy::Thorough];

    /// Highest timestamp (inclusive) that may be deleted for a cell whose
    /// newest swept write happened at `start_timestamp`.
    pub fn deletion_cutoff(self, start_timestamp: Timestamp) -> Timestamp {
        match self {
            SweepStrategy::Conservative => start_timestamp.saturating_sub(1),
            SweepStrategy::Thorough => start_timestamp,
        }
    }

    pub fn should_add_sentinels(self) -> bool {
        match self {
            SweepStrategy::Conservative => true,
            SweepStrategy::Thorough => false,
        }
    }

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            SweepStrategy::Conservative => 0,
            SweepStrategy::Thorough => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SweepStrategy::Conservative),
            1 => Some(SweepStrategy::Thorough),
            _ => None,
        }
    }
}

impl fmt::Display for SweepStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepStrategy::Conservative => write!(f, "conservative"),
            SweepStrategy::Thorough => write!(f, "thorough"),
        }
    }
}

impl FromStr for SweepStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(SweepStrategy::Conservative),
            "thorough" => Ok(SweepStrategy::Thorough),
            other => Err(format!(
                "Unknown sweep strategy '{}' (expected 'conservative' or 'thorough')",
                other
            )),
        }
    }
}
