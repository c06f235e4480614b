//! Error types for stager operations.
//!
//! Every failure mode is detected at the point of the failing remote call
//! and terminates the current convergence run; there is no local retry
//! beyond the engine's stage-settle polling.

use std::time::Duration;
use thiserror::Error;

use crate::stage::{Stage, Transition};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StagerError>;

/// The main error type for stager operations.
#[derive(Debug, Error)]
pub enum StagerError {
    /// A cluster, product, or version lookup failed. Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// "latest" was requested but the product has no available versions.
    #[error("cannot resolve \"latest\": no versions available for product {product}")]
    VersionResolution {
        /// The product whose versions were queried.
        product: String,
    },

    /// No direct transition exists between the two stages.
    #[error("no transition from stage {from} to stage {to}")]
    IllegalTransition {
        /// The stage the move was requested from.
        from: Stage,
        /// The stage the move was requested to.
        to: Stage,
    },

    /// The artifact was observed in a stage the current plan step cannot
    /// start from.
    #[error("expected stage {expected}, observed {observed}")]
    UnexpectedStage {
        /// The stage the plan step requires.
        expected: Stage,
        /// The stage actually observed.
        observed: Stage,
    },

    /// A triggered remote command reported failure. Completed steps are
    /// retained, not rolled back.
    #[error("{transition} command failed at stage {stage}: {detail}")]
    CommandFailed {
        /// The transition whose command failed.
        transition: Transition,
        /// The stage observed when the failure was reported.
        stage: Stage,
        /// Failure detail propagated from the command result.
        detail: String,
    },

    /// A triggered remote command did not complete within its bound.
    #[error("{transition} command did not complete within {}s", timeout.as_secs())]
    CommandTimeout {
        /// The transition whose command timed out.
        transition: Transition,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// The artifact stage stayed transient past the settle bound after the
    /// command itself reported success.
    #[error("stage stuck at {stage} for more than {}s after command completion", timeout.as_secs())]
    StageSettleTimeout {
        /// The transient stage that never settled.
        stage: Stage,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// The run was cancelled at a poll or trigger boundary.
    #[error("convergence cancelled: {reason}")]
    Cancelled {
        /// The reason supplied to the cancellation token.
        reason: String,
    },

    /// The remote service reported a stage name this crate does not know.
    #[error("unknown stage reported by cluster: {0}")]
    UnknownStage(String),

    /// The caller-supplied request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A transport or API-level error raised by the management service
    /// collaborator.
    #[error("management API error: {0}")]
    Api(String),
}

impl StagerError {
    /// Returns true if the error aborted a run before any mutation.
    #[must_use]
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::VersionResolution { .. })
    }

    /// Returns true for timeout-shaped errors.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. } | Self::StageSettleTimeout { .. }
        )
    }
}
