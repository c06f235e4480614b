//! Desired-state resolution.
//!
//! Maps a caller's logical target onto the minimal ordered sequence of
//! adjacent stage transitions relative to the parcel's observed stage. The
//! four lifecycle targets of the original module (present / distributed /
//! activated / absent) collapse onto the stable linear order: `present` and
//! `distributed` are floors, `activated` and `absent` are exact targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, StagerError};
use crate::stage::{Stage, Transition, STABLE_STAGES};

/// A caller's logical lifecycle target for a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// Downloaded onto the manager node, or further along.
    Present,
    /// Distributed to cluster hosts, or further along.
    Distributed,
    /// Exactly the active parcel.
    Activated,
    /// Fully rolled back to remote availability.
    Absent,
}

impl DesiredState {
    /// The rank on the stable order this state converges to.
    #[must_use]
    pub fn target_rank(self) -> u8 {
        match self {
            Self::Absent => 0,
            Self::Present => 1,
            Self::Distributed => 2,
            Self::Activated => 3,
        }
    }

    /// Floors are satisfied by any stage at or above the target rank;
    /// exact targets only by the target itself.
    #[must_use]
    pub fn is_floor(self) -> bool {
        matches!(self, Self::Present | Self::Distributed)
    }

    /// Returns true when a parcel at `rank` already satisfies this state.
    #[must_use]
    fn satisfied_by(self, rank: u8) -> bool {
        if self.is_floor() {
            rank >= self.target_rank()
        } else {
            rank == self.target_rank()
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Distributed => write!(f, "distributed"),
            Self::Activated => write!(f, "activated"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

impl FromStr for DesiredState {
    type Err = StagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "distributed" => Ok(Self::Distributed),
            "activated" => Ok(Self::Activated),
            "absent" => Ok(Self::Absent),
            other => Err(StagerError::InvalidRequest(format!(
                "unknown desired state: {other}"
            ))),
        }
    }
}

/// The outcome of desired-state resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// The observed stage already satisfies the desired state. Benign no-op.
    Converged,
    /// The observed stage is transient; nothing may be triggered until the
    /// in-flight operation lands. The run short-circuits with a
    /// transient-state outcome instead of blocking on someone else's work.
    Blocked {
        /// The transient stage observed.
        stage: Stage,
    },
    /// The ordered sequence of adjacent transitions to execute.
    Apply(Vec<Transition>),
}

impl Plan {
    /// Returns the transitions to execute, empty for the no-op outcomes.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        match self {
            Self::Apply(steps) => steps,
            _ => &[],
        }
    }
}

/// Resolves the minimal transition sequence from `current` to `desired`.
///
/// Ascending targets walk up the stable order, `absent` walks down; every
/// step is an adjacent edge from the transition table, so a rollback from
/// `ACTIVATED` is always exactly deactivate, undistribute, remove-download.
pub fn plan(current: Stage, desired: DesiredState) -> Result<Plan> {
    let Some(mut rank) = current.rank() else {
        return Ok(Plan::Blocked { stage: current });
    };
    if desired.satisfied_by(rank) {
        return Ok(Plan::Converged);
    }

    let target = desired.target_rank();
    let mut steps = Vec::new();
    while rank < target {
        steps.push(Transition::between(
            STABLE_STAGES[rank as usize],
            STABLE_STAGES[rank as usize + 1],
        )?);
        rank += 1;
    }
    while rank > target {
        steps.push(Transition::between(
            STABLE_STAGES[rank as usize],
            STABLE_STAGES[rank as usize - 1],
        )?);
        rank -= 1;
    }
    Ok(Plan::Apply(steps))
}
