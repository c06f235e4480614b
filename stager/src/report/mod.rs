//! Uniform reporting of convergence outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::ParcelState;

/// The `meta` payload of a report: one parcel, or the whole cluster listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportMeta {
    /// A single parcel snapshot.
    Parcel(ParcelState),
    /// Every parcel on the cluster.
    Parcels(Vec<ParcelState>),
}

/// The caller-facing outcome of one invocation.
///
/// Pure data; construction has no side effects and no failure modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    /// Whether any transition fully completed during the run.
    pub changed: bool,
    /// Human-readable outcome message.
    pub msg: String,
    /// Final observed state.
    pub meta: ReportMeta,
    /// When the run finished, UTC.
    pub finished_at: DateTime<Utc>,
}

impl ConvergenceReport {
    /// Report for a single parcel.
    #[must_use]
    pub fn parcel(parcel: ParcelState, changed: bool, msg: impl Into<String>) -> Self {
        Self {
            changed,
            msg: msg.into(),
            meta: ReportMeta::Parcel(parcel),
            finished_at: Utc::now(),
        }
    }

    /// Report for a full cluster listing. Listings never mutate anything.
    #[must_use]
    pub fn listing(parcels: Vec<ParcelState>, msg: impl Into<String>) -> Self {
        Self {
            changed: false,
            msg: msg.into(),
            meta: ReportMeta::Parcels(parcels),
            finished_at: Utc::now(),
        }
    }
}
