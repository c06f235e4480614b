//! In-memory management service fakes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{Result, StagerError};
use crate::remote::{CommandHandle, CommandResult, ManagedCluster, ManagerApi, ParcelState};
use crate::stage::{Stage, Transition};

/// A parcel mid-settle: snapshots keep reading `report` for `polls_left`
/// more polls, then flip to `target`.
struct Pending {
    report: Stage,
    target: Stage,
    polls_left: usize,
}

struct ParcelCell {
    stage: Stage,
    pending: Option<Pending>,
}

#[derive(Default)]
struct Inner {
    parcels: Mutex<HashMap<(String, String), ParcelCell>>,
    triggered: Mutex<Vec<Transition>>,
    poll_count: Mutex<usize>,
    fail_on: Mutex<HashMap<Transition, String>>,
    hang_on: Mutex<HashSet<Transition>>,
    settle_polls: Mutex<usize>,
}

/// A scripted in-memory cluster.
///
/// Triggered commands succeed and move the parcel to the transition's
/// target stage unless told otherwise via [`FakeCluster::fail_on`],
/// [`FakeCluster::hang_on`], or [`FakeCluster::set_settle_polls`]. Clones
/// share state, so a clone handed out as a trait object can still be
/// inspected through the original.
#[derive(Clone)]
pub struct FakeCluster {
    name: String,
    inner: Arc<Inner>,
}

impl FakeCluster {
    /// Creates an empty fake cluster.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Inner::default()),
        }
    }

    /// Adds a parcel at the given stage.
    pub fn add_parcel(&self, product: &str, version: &str, stage: Stage) {
        self.inner.parcels.lock().insert(
            (product.to_string(), version.to_string()),
            ParcelCell {
                stage,
                pending: None,
            },
        );
    }

    /// Makes the given transition's command report failure with `detail`.
    pub fn fail_on(&self, transition: Transition, detail: &str) {
        self.inner
            .fail_on
            .lock()
            .insert(transition, detail.to_string());
    }

    /// Makes the given transition's command never complete.
    pub fn hang_on(&self, transition: Transition) {
        self.inner.hang_on.lock().insert(transition);
    }

    /// Keeps snapshots reading the transient stage for `polls` polls after
    /// each successful command before flipping to the target stage.
    pub fn set_settle_polls(&self, polls: usize) {
        *self.inner.settle_polls.lock() = polls;
    }

    /// Every transition triggered so far, in order.
    #[must_use]
    pub fn triggered(&self) -> Vec<Transition> {
        self.inner.triggered.lock().clone()
    }

    /// How many single-parcel snapshots were taken.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        *self.inner.poll_count.lock()
    }

    fn observed_stage(cell: &ParcelCell) -> Stage {
        cell.pending.as_ref().map_or(cell.stage, |p| p.report)
    }
}

#[async_trait]
impl ManagedCluster for FakeCluster {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn list_parcels(&self) -> Result<Vec<ParcelState>> {
        let parcels = self.inner.parcels.lock();
        let mut listed: Vec<ParcelState> = parcels
            .iter()
            .map(|((product, version), cell)| {
                ParcelState::new(product.clone(), version.clone(), Self::observed_stage(cell))
            })
            .collect();
        listed.sort_by(|a, b| (&a.product, &a.version).cmp(&(&b.product, &b.version)));
        Ok(listed)
    }

    async fn list_versions(&self, product: &str) -> Result<Vec<String>> {
        let parcels = self.inner.parcels.lock();
        Ok(parcels
            .keys()
            .filter(|(p, _)| p == product)
            .map(|(_, version)| version.clone())
            .collect())
    }

    async fn get_parcel(&self, product: &str, version: &str) -> Result<ParcelState> {
        *self.inner.poll_count.lock() += 1;
        let mut parcels = self.inner.parcels.lock();
        let cell = parcels
            .get_mut(&(product.to_string(), version.to_string()))
            .ok_or_else(|| {
                StagerError::NotFound(format!("parcel {product} {version}"))
            })?;

        if let Some(pending) = cell.pending.as_mut() {
            if pending.polls_left == 0 {
                cell.stage = pending.target;
                cell.pending = None;
            } else {
                pending.polls_left -= 1;
            }
        }
        Ok(ParcelState::new(
            product,
            version,
            Self::observed_stage(cell),
        ))
    }

    async fn trigger(
        &self,
        product: &str,
        version: &str,
        transition: Transition,
    ) -> Result<Box<dyn CommandHandle>> {
        self.inner.triggered.lock().push(transition);
        Ok(Box::new(ScriptedCommand {
            inner: Arc::clone(&self.inner),
            product: product.to_string(),
            version: version.to_string(),
            transition,
        }))
    }
}

/// Command handle returned by [`FakeCluster::trigger`].
struct ScriptedCommand {
    inner: Arc<Inner>,
    product: String,
    version: String,
    transition: Transition,
}

#[async_trait]
impl CommandHandle for ScriptedCommand {
    async fn await_completion(&self, _timeout: Duration) -> Result<CommandResult> {
        if self.inner.hang_on.lock().contains(&self.transition) {
            // Outlive any sane test timeout; the engine bounds the wait.
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(detail) = self.inner.fail_on.lock().get(&self.transition) {
            return Ok(CommandResult::failed(detail.clone()));
        }

        let settle_polls = *self.inner.settle_polls.lock();
        let mut parcels = self.inner.parcels.lock();
        if let Some(cell) = parcels.get_mut(&(self.product.clone(), self.version.clone())) {
            if settle_polls > 0 {
                cell.pending = Some(Pending {
                    report: self.transition.settle_while(),
                    target: self.transition.target_stage(),
                    polls_left: settle_polls,
                });
            } else {
                cell.stage = self.transition.target_stage();
                cell.pending = None;
            }
        }
        Ok(CommandResult::ok())
    }
}

/// A management service fake holding named [`FakeCluster`]s.
#[derive(Default)]
pub struct FakeManager {
    clusters: Mutex<HashMap<String, FakeCluster>>,
}

impl FakeManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cluster under its own name.
    pub fn add_cluster(&self, cluster: &FakeCluster) {
        self.clusters
            .lock()
            .insert(cluster.name.clone(), cluster.clone());
    }
}

#[async_trait]
impl ManagerApi for FakeManager {
    async fn get_cluster(&self, name: &str) -> Result<Box<dyn ManagedCluster>> {
        self.clusters
            .lock()
            .get(name)
            .cloned()
            .map(|cluster| Box::new(cluster) as Box<dyn ManagedCluster>)
            .ok_or_else(|| StagerError::NotFound(format!("cluster {name}")))
    }
}
