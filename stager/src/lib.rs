//! # Stager
//!
//! A declarative lifecycle reconciler for staged cluster parcels.
//!
//! The caller states a desired end-state for one versioned parcel on one
//! cluster; stager observes the parcel's current stage, resolves the minimal
//! ordered sequence of lifecycle transitions, and drives the remote
//! management service through them, polling each long-running operation to
//! completion:
//!
//! - **Stage model**: the ordered lifecycle stages and the explicit
//!   transition table between them
//! - **Version resolution**: exact versions, or `"latest"` under natural
//!   ordering
//! - **Desired-state resolution**: logical targets decomposed into adjacent
//!   transitions
//! - **Convergence engine**: trigger, bounded command wait, stage-settle
//!   polling, cooperative cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stager::prelude::*;
//!
//! let engine = ConvergenceEngine::new(EngineConfig::default());
//! let reconciler = Reconciler::new(&api, engine);
//! let report = reconciler
//!     .apply("production", &Request::converge("CDH", "latest", RequestedState::Activated))
//!     .await?;
//! println!("{} (changed: {})", report.msg, report.changed);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod plan;
pub mod remote;
pub mod report;
pub mod run;
pub mod stage;
pub mod testing;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancelToken;
    pub use crate::config::ManagerConfig;
    pub use crate::engine::{ConvergenceEngine, ConvergenceOutcome, EngineConfig};
    pub use crate::errors::{Result, StagerError};
    pub use crate::plan::{plan, DesiredState, Plan};
    pub use crate::remote::{
        CommandHandle, CommandResult, ManagedCluster, ManagerApi, ParcelState,
    };
    pub use crate::report::{ConvergenceReport, ReportMeta};
    pub use crate::run::{Reconciler, Request, RequestedState};
    pub use crate::stage::{Stage, Transition};
    pub use crate::version::{natural_cmp, resolve, LATEST};
}
