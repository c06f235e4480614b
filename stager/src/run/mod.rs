//! Caller-facing orchestration.
//!
//! Ties the components together for one invocation: validate the request,
//! look up the cluster, fix the version, observe the parcel, resolve the
//! plan, converge, and format the outcome. The `infos` state is a pure
//! read: it never resolves a plan and never triggers a transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::engine::ConvergenceEngine;
use crate::errors::{Result, StagerError};
use crate::plan::{self, DesiredState, Plan};
use crate::remote::{ManagedCluster, ManagerApi, ParcelState};
use crate::report::ConvergenceReport;
use crate::version;


const MSG_INFO_GATHERED: &str = "Parcel information gathered";

/// What the caller asked for: a lifecycle target, or a read-only query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedState {
    /// Converge to at least downloaded.
    #[default]
    Present,
    /// Converge to at least distributed.
    Distributed,
    /// Converge to exactly activated.
    Activated,
    /// Roll back to remote availability.
    Absent,
    /// Report state without changing anything.
    Infos,
}

impl RequestedState {
    /// The convergence target, or `None` for the read-only query.
    #[must_use]
    pub fn desired(self) -> Option<DesiredState> {
        match self {
            Self::Present => Some(DesiredState::Present),
            Self::Distributed => Some(DesiredState::Distributed),
            Self::Activated => Some(DesiredState::Activated),
            Self::Absent => Some(DesiredState::Absent),
            Self::Infos => None,
        }
    }
}

impl fmt::Display for RequestedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Distributed => write!(f, "distributed"),
            Self::Activated => write!(f, "activated"),
            Self::Absent => write!(f, "absent"),
            Self::Infos => write!(f, "infos"),
        }
    }
}

impl FromStr for RequestedState {
    type Err = StagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "distributed" => Ok(Self::Distributed),
            "activated" => Ok(Self::Activated),
            "absent" => Ok(Self::Absent),
            "infos" => Ok(Self::Infos),
            other => Err(StagerError::InvalidRequest(format!(
                "unknown state: {other}"
            ))),
        }
    }
}

/// One invocation's inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Product name as it appears on the management server.
    pub product: Option<String>,
    /// Exact version string, or `"latest"`.
    pub version: Option<String>,
    /// Requested state; defaults to `present`.
    #[serde(default)]
    pub state: RequestedState,
}

impl Request {
    /// A convergence request for one parcel.
    #[must_use]
    pub fn converge(
        product: impl Into<String>,
        version: impl Into<String>,
        state: RequestedState,
    ) -> Self {
        Self {
            product: Some(product.into()),
            version: Some(version.into()),
            state,
        }
    }

    /// A read-only query over every parcel on the cluster.
    #[must_use]
    pub fn cluster_infos() -> Self {
        Self {
            product: None,
            version: None,
            state: RequestedState::Infos,
        }
    }

    /// A read-only query for one parcel.
    #[must_use]
    pub fn parcel_infos(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: Some(product.into()),
            version: Some(version.into()),
            state: RequestedState::Infos,
        }
    }

    /// Checks the product/version requirements of the requested state.
    ///
    /// `infos` takes both or neither; every lifecycle state takes both.
    pub fn validate(&self) -> Result<()> {
        match self.state {
            RequestedState::Infos => {
                if self.product.is_some() != self.version.is_some() {
                    return Err(StagerError::InvalidRequest(
                        "state infos takes product and version together, or neither".to_string(),
                    ));
                }
            }
            state => {
                if self.product.is_none() || self.version.is_none() {
                    return Err(StagerError::InvalidRequest(format!(
                        "state {state} requires both product and version"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Runs one request against one cluster.
pub struct Reconciler<'a> {
    api: &'a dyn ManagerApi,
    engine: ConvergenceEngine,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over the given management service.
    #[must_use]
    pub fn new(api: &'a dyn ManagerApi, engine: ConvergenceEngine) -> Self {
        Self { api, engine }
    }

    /// Performs one synchronous convergence (or query) and formats the
    /// outcome.
    ///
    /// Lookup and version-resolution failures abort before any mutation.
    /// A convergence abort propagates as an error carrying the actual
    /// failure detail; completed transitions stay completed.
    pub async fn apply(&self, cluster_name: &str, request: &Request) -> Result<ConvergenceReport> {
        request.validate()?;
        let cluster = self.api.get_cluster(cluster_name).await?;

        let (Some(product), Some(requested_version)) = (&request.product, &request.version) else {
            let parcels = cluster.list_parcels().await?;
            info!(cluster = cluster_name, count = parcels.len(), "gathered parcel listing");
            return Ok(ConvergenceReport::listing(parcels, MSG_INFO_GATHERED));
        };

        // Exactly one version is resolved before any transition is attempted.
        let resolved = if requested_version == version::LATEST {
            let available = cluster.list_versions(product).await?;
            version::resolve(requested_version, &available, product)?
        } else {
            requested_version.clone()
        };

        let parcel = cluster.get_parcel(product, &resolved).await?;
        let Some(desired) = request.state.desired() else {
            return Ok(ConvergenceReport::parcel(parcel, false, MSG_INFO_GATHERED));
        };

        match plan::plan(parcel.stage, desired)? {
            Plan::Converged => {
                info!(product = %product, version = %resolved, stage = %parcel.stage, "already converged");
                Ok(ConvergenceReport::parcel(parcel, false, already_message(desired)))
            }
            Plan::Blocked { stage } => {
                info!(product = %product, version = %resolved, %stage, "parcel in transient stage, not acting");
                Ok(ConvergenceReport::parcel(
                    parcel,
                    false,
                    format!("Parcel in transient stage {stage}"),
                ))
            }
            Plan::Apply(steps) => {
                let outcome = self
                    .engine
                    .converge(cluster.as_ref(), product, &resolved, parcel.stage, &steps)
                    .await;
                if let Some(err) = outcome.error {
                    return Err(err);
                }
                Ok(ConvergenceReport::parcel(
                    ParcelState::new(product.clone(), resolved, outcome.final_stage),
                    outcome.changed,
                    done_message(desired),
                ))
            }
        }
    }
}

fn already_message(desired: DesiredState) -> &'static str {
    match desired {
        DesiredState::Present => "Parcel already present",
        DesiredState::Distributed => "Parcel already distributed",
        DesiredState::Activated => "Parcel already activated",
        DesiredState::Absent => "Parcel already absent",
    }
}

fn done_message(desired: DesiredState) -> &'static str {
    match desired {
        DesiredState::Present => "Parcel downloaded",
        DesiredState::Distributed => "Parcel distributed",
        DesiredState::Activated => "Parcel activated",
        DesiredState::Absent => "Parcel removed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_state_tokens() {
        assert_eq!(
            "present".parse::<RequestedState>().unwrap(),
            RequestedState::Present
        );
        assert_eq!(
            "infos".parse::<RequestedState>().unwrap(),
            RequestedState::Infos
        );
        assert!("installed".parse::<RequestedState>().is_err());
        assert_eq!(RequestedState::default(), RequestedState::Present);
    }

    #[test]
    fn test_lifecycle_states_require_product_and_version() {
        let request = Request {
            product: Some("CDH".to_string()),
            version: None,
            state: RequestedState::Present,
        };
        assert!(matches!(
            request.validate(),
            Err(StagerError::InvalidRequest(_))
        ));

        let request = Request::converge("CDH", "latest", RequestedState::Absent);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_infos_takes_both_or_neither() {
        assert!(Request::cluster_infos().validate().is_ok());
        assert!(Request::parcel_infos("CDH", "5.13.0-1").validate().is_ok());

        let request = Request {
            product: Some("CDH".to_string()),
            version: None,
            state: RequestedState::Infos,
        };
        assert!(matches!(
            request.validate(),
            Err(StagerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_deserializes_with_default_state() {
        let request: Request =
            serde_json::from_str(r#"{"product": "CDH", "version": "latest"}"#).unwrap();
        assert_eq!(request.state, RequestedState::Present);
    }
}
