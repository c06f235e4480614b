//! The parcel lifecycle stage model.
//!
//! Stages form a strict linear order over the four stable rest points
//! (`AVAILABLE_REMOTELY < DOWNLOADED < DISTRIBUTED < ACTIVATED`), with four
//! transient stages sitting between them while a remote operation runs. The
//! transition table makes every legal move explicit: each [`Transition`] is a
//! directed edge between two adjacent stable stages, and knows the transient
//! stage it passes through on the way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, StagerError};

/// A parcel's position in its lifecycle, as reported by the cluster.
///
/// Serialized forms match the management service's wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Published on the remote repository, nothing local yet.
    AvailableRemotely,
    /// Download in progress.
    Downloading,
    /// Present on the manager node.
    Downloaded,
    /// Distribution to cluster hosts in progress.
    Distributing,
    /// Present on every cluster host.
    Distributed,
    /// Activation (or deactivation) in progress.
    Activating,
    /// The active parcel for its product on the cluster.
    Activated,
    /// Removal from cluster hosts in progress.
    Undistributing,
}

/// The four stable stages in ascending lifecycle order.
pub const STABLE_STAGES: [Stage; 4] = [
    Stage::AvailableRemotely,
    Stage::Downloaded,
    Stage::Distributed,
    Stage::Activated,
];

impl Stage {
    /// Returns true for mid-flight stages reached only while a remote
    /// operation executes. A transient stage must never be the starting
    /// point for a new transition.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::Distributing | Self::Activating | Self::Undistributing
        )
    }

    /// Returns true for the stable rest points of the lifecycle.
    #[must_use]
    pub fn is_stable(self) -> bool {
        !self.is_transient()
    }

    /// The stage's rank on the stable linear order, or `None` for transient
    /// stages, which are never compared.
    #[must_use]
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::AvailableRemotely => Some(0),
            Self::Downloaded => Some(1),
            Self::Distributed => Some(2),
            Self::Activated => Some(3),
            _ => None,
        }
    }

    /// Wire name of the stage as the management service reports it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AvailableRemotely => "AVAILABLE_REMOTELY",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Distributing => "DISTRIBUTING",
            Self::Distributed => "DISTRIBUTED",
            Self::Activating => "ACTIVATING",
            Self::Activated => "ACTIVATED",
            Self::Undistributing => "UNDISTRIBUTING",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AVAILABLE_REMOTELY" => Ok(Self::AvailableRemotely),
            "DOWNLOADING" => Ok(Self::Downloading),
            "DOWNLOADED" => Ok(Self::Downloaded),
            "DISTRIBUTING" => Ok(Self::Distributing),
            "DISTRIBUTED" => Ok(Self::Distributed),
            "ACTIVATING" => Ok(Self::Activating),
            "ACTIVATED" => Ok(Self::Activated),
            "UNDISTRIBUTING" => Ok(Self::Undistributing),
            other => Err(StagerError::UnknownStage(other.to_string())),
        }
    }
}

/// A directed edge between two adjacent stable stages.
///
/// Multi-hop moves are never resolved here; the plan resolver decomposes
/// them into a sequence of adjacent transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// `AVAILABLE_REMOTELY -> DOWNLOADED`
    Download,
    /// `DOWNLOADED -> DISTRIBUTED`
    Distribute,
    /// `DISTRIBUTED -> ACTIVATED`
    Activate,
    /// `ACTIVATED -> DISTRIBUTED`
    Deactivate,
    /// `DISTRIBUTED -> DOWNLOADED`
    Undistribute,
    /// `DOWNLOADED -> AVAILABLE_REMOTELY`
    RemoveDownload,
}

impl Transition {
    /// The stable stage this transition starts from.
    #[must_use]
    pub fn from_stage(self) -> Stage {
        match self {
            Self::Download => Stage::AvailableRemotely,
            Self::Distribute | Self::RemoveDownload => Stage::Downloaded,
            Self::Activate | Self::Undistribute => Stage::Distributed,
            Self::Deactivate => Stage::Activated,
        }
    }

    /// The stable stage reached on success.
    #[must_use]
    pub fn target_stage(self) -> Stage {
        match self {
            Self::Download | Self::Undistribute => Stage::Downloaded,
            Self::Distribute | Self::Deactivate => Stage::Distributed,
            Self::Activate => Stage::Activated,
            Self::RemoveDownload => Stage::AvailableRemotely,
        }
    }

    /// The stage snapshots keep reporting while the remote operation runs.
    ///
    /// Deactivation reports `ACTIVATING`, the same transient stage as
    /// activation. Remove-download reports no transient stage at all; its
    /// snapshots read `DOWNLOADED` until the removal lands, so that is what
    /// the engine settles past.
    #[must_use]
    pub fn settle_while(self) -> Stage {
        match self {
            Self::Download => Stage::Downloading,
            Self::Distribute => Stage::Distributing,
            Self::Activate | Self::Deactivate => Stage::Activating,
            Self::Undistribute => Stage::Undistributing,
            Self::RemoveDownload => Stage::Downloaded,
        }
    }

    /// Resolves the transition between two *adjacent* stable stages.
    ///
    /// Fails with [`StagerError::IllegalTransition`] for any other pair,
    /// transient stages included.
    pub fn between(from: Stage, to: Stage) -> Result<Self> {
        match (from, to) {
            (Stage::AvailableRemotely, Stage::Downloaded) => Ok(Self::Download),
            (Stage::Downloaded, Stage::Distributed) => Ok(Self::Distribute),
            (Stage::Distributed, Stage::Activated) => Ok(Self::Activate),
            (Stage::Activated, Stage::Distributed) => Ok(Self::Deactivate),
            (Stage::Distributed, Stage::Downloaded) => Ok(Self::Undistribute),
            (Stage::Downloaded, Stage::AvailableRemotely) => Ok(Self::RemoveDownload),
            _ => Err(StagerError::IllegalTransition { from, to }),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Distribute => write!(f, "distribute"),
            Self::Activate => write!(f, "activate"),
            Self::Deactivate => write!(f, "deactivate"),
            Self::Undistribute => write!(f, "undistribute"),
            Self::RemoveDownload => write!(f, "remove download"),
        }
    }
}
