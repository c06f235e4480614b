//! Capability traits for the remote management service.
//!
//! The core never dials the network itself; it consumes these traits and is
//! handed an implementation bound to a concrete API client. The same seam
//! lets every test run against the scripted fakes in [`crate::testing`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::Result;
use crate::stage::{Stage, Transition};

/// A read-only snapshot of a parcel as the cluster reports it.
///
/// The parcel itself is owned by the remote service; snapshots are only
/// valid between polling calls and are never cached across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelState {
    /// Product name, e.g. `CDH`.
    pub product: String,
    /// Concrete version string.
    pub version: String,
    /// Observed lifecycle stage.
    pub stage: Stage,
}

impl ParcelState {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(product: impl Into<String>, version: impl Into<String>, stage: Stage) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
            stage,
        }
    }
}

/// Outcome of a triggered remote command, consumed once by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command completed successfully.
    pub success: bool,
    /// Failure detail reported by the service, if any.
    pub detail: Option<String>,
}

impl CommandResult {
    /// A successful command result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            detail: None,
        }
    }

    /// A failed command result with detail.
    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Handle to a long-running remote command.
#[async_trait]
pub trait CommandHandle: Send + Sync {
    /// Blocks until the command finishes, up to `timeout`.
    ///
    /// Implementations report an overrun as an error; the engine
    /// additionally bounds the wait on its side so a misbehaving
    /// collaborator cannot block a run forever.
    async fn await_completion(&self, timeout: Duration) -> Result<CommandResult>;
}

/// A cluster the management service exposes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagedCluster: Send + Sync {
    /// The cluster's display name.
    fn name(&self) -> String;

    /// Every parcel known to the cluster, all products and versions.
    async fn list_parcels(&self) -> Result<Vec<ParcelState>>;

    /// Available version strings for one product.
    async fn list_versions(&self, product: &str) -> Result<Vec<String>>;

    /// Looks up one parcel snapshot, failing with a not-found error if the
    /// product/version pair does not exist.
    async fn get_parcel(&self, product: &str, version: &str) -> Result<ParcelState>;

    /// Triggers the remote operation for one transition and returns the
    /// handle to await.
    async fn trigger(
        &self,
        product: &str,
        version: &str,
        transition: Transition,
    ) -> Result<Box<dyn CommandHandle>>;
}

/// Entry point into the management service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagerApi: Send + Sync {
    /// Looks up a cluster by name.
    async fn get_cluster(&self, name: &str) -> Result<Box<dyn ManagedCluster>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_constructors() {
        assert_eq!(
            CommandResult::ok(),
            CommandResult {
                success: true,
                detail: None
            }
        );
        let failed = CommandResult::failed("disk full");
        assert!(!failed.success);
        assert_eq!(failed.detail.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_parcel_state_serializes_wire_stage() {
        let parcel = ParcelState::new("CDH", "5.13.0-1", Stage::Distributed);
        let json = serde_json::to_value(&parcel).unwrap();
        assert_eq!(json["stage"], "DISTRIBUTED");
        assert_eq!(json["product"], "CDH");
    }
}
