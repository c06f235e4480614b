//! The convergence engine.
//!
//! Executes a transition plan strictly in order: trigger the remote
//! operation, block on its command handle up to a bound, then settle-poll
//! the stage until the snapshot stops reading the transition's transient
//! stage. Each step fully commits before the next begins; later transitions
//! require the prior stable stage as their precondition. Partial progress is
//! retained on abort, never rolled back, and never reported as success.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancellation::CancelToken;
use crate::errors::{Result, StagerError};
use crate::remote::{CommandHandle, ManagedCluster};
use crate::stage::{Stage, Transition};

/// Timing knobs for a convergence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cadence of the stage-settle polling loop.
    pub poll_interval: Duration,
    /// Bound on each triggered command's completion wait.
    pub command_timeout: Duration,
    /// Bound on the stage-settle wait after a command reports success.
    pub settle_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            command_timeout: Duration::from_secs(300),
            settle_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settle-poll cadence.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-command completion bound.
    #[must_use]
    pub fn with_command_timeout(mut self, bound: Duration) -> Self {
        self.command_timeout = bound;
        self
    }

    /// Sets the stage-settle bound.
    #[must_use]
    pub fn with_settle_timeout(mut self, bound: Duration) -> Self {
        self.settle_timeout = bound;
        self
    }
}

/// What a convergence run produced.
///
/// `changed` reflects only fully-completed transitions; on abort,
/// `final_stage` reports how far the run actually got.
#[derive(Debug)]
pub struct ConvergenceOutcome {
    /// Whether at least one transition fully completed.
    pub changed: bool,
    /// The stage observed when the run ended.
    pub final_stage: Stage,
    /// The error that aborted the run, if any.
    pub error: Option<StagerError>,
}

impl ConvergenceOutcome {
    /// Returns true if the run completed its whole plan.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Engine control state for one plan step.
enum StepState {
    Idle,
    Triggering,
    AwaitingCommand(Box<dyn CommandHandle>),
    AwaitingStageSettle,
    StepDone,
    Failed(StagerError),
}

/// Outcome of one plan step.
struct StepOutcome {
    stage: Stage,
    triggered: bool,
}

/// Drives one parcel from its observed stage through a transition plan.
///
/// Single logical task, cooperative sleeps, no internal parallelism; the
/// cancellation token is honored at every trigger and poll boundary.
pub struct ConvergenceEngine {
    config: EngineConfig,
    cancel: Arc<CancelToken>,
}

impl ConvergenceEngine {
    /// Creates an engine with its own cancellation token.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(CancelToken::new()),
        }
    }

    /// Replaces the cancellation token, e.g. with one shared with a signal
    /// handler.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancelToken>) -> Self {
        self.cancel = token;
        self
    }

    /// The token that cancels this engine's runs.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancelToken> {
        Arc::clone(&self.cancel)
    }

    /// Executes `plan` for one parcel, strictly in order.
    ///
    /// An empty plan returns immediately with `changed = false` and the
    /// caller's observed stage, performing no remote interaction.
    pub async fn converge(
        &self,
        cluster: &dyn ManagedCluster,
        product: &str,
        version: &str,
        current: Stage,
        plan: &[Transition],
    ) -> ConvergenceOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("converge", %run_id, product, version);
        self.converge_inner(cluster, product, version, current, plan)
            .instrument(span)
            .await
    }

    async fn converge_inner(
        &self,
        cluster: &dyn ManagedCluster,
        product: &str,
        version: &str,
        current: Stage,
        plan: &[Transition],
    ) -> ConvergenceOutcome {
        if plan.is_empty() {
            debug!(stage = %current, "empty plan, nothing to converge");
            return ConvergenceOutcome {
                changed: false,
                final_stage: current,
                error: None,
            };
        }

        let mut changed = false;
        let mut stage = current;
        for step in plan {
            match self.run_step(cluster, product, version, *step).await {
                Ok(outcome) => {
                    changed |= outcome.triggered;
                    stage = outcome.stage;
                    info!(step = %step, stage = %stage, "transition complete");
                }
                Err(err) => {
                    warn!(step = %step, error = %err, "convergence aborted");
                    // Best-effort final observation; completed steps are kept.
                    let final_stage = match cluster.get_parcel(product, version).await {
                        Ok(parcel) => parcel.stage,
                        Err(_) => stage,
                    };
                    return ConvergenceOutcome {
                        changed,
                        final_stage,
                        error: Some(err),
                    };
                }
            }
        }
        ConvergenceOutcome {
            changed,
            final_stage: stage,
            error: None,
        }
    }

    /// Runs one step through its control states:
    /// `Idle -> Triggering -> AwaitingCommand -> AwaitingStageSettle ->
    /// StepDone`, with `Failed` aborting the whole run.
    async fn run_step(
        &self,
        cluster: &dyn ManagedCluster,
        product: &str,
        version: &str,
        step: Transition,
    ) -> Result<StepOutcome> {
        let mut state = StepState::Idle;
        let mut stage = step.from_stage();
        let mut triggered = false;
        loop {
            state = match state {
                StepState::Idle => {
                    self.cancel.checkpoint()?;
                    // Re-observe before acting; the plan may be stale.
                    stage = cluster.get_parcel(product, version).await?.stage;
                    if stage == step.target_stage() {
                        debug!(step = %step, "already at step target, nothing to trigger");
                        StepState::StepDone
                    } else if stage == step.from_stage() {
                        StepState::Triggering
                    } else {
                        StepState::Failed(StagerError::UnexpectedStage {
                            expected: step.from_stage(),
                            observed: stage,
                        })
                    }
                }
                StepState::Triggering => {
                    self.cancel.checkpoint()?;
                    info!(step = %step, from = %step.from_stage(), "triggering transition");
                    let handle = cluster.trigger(product, version, step).await?;
                    triggered = true;
                    StepState::AwaitingCommand(handle)
                }
                StepState::AwaitingCommand(handle) => {
                    let bound = self.config.command_timeout;
                    // The handle does the bounded wait, but the engine bounds
                    // it again so a stuck collaborator cannot hold the run.
                    match timeout(bound, handle.await_completion(bound)).await {
                        Err(_) => StepState::Failed(StagerError::CommandTimeout {
                            transition: step,
                            timeout: bound,
                        }),
                        Ok(Err(err)) => StepState::Failed(err),
                        Ok(Ok(result)) if result.success => StepState::AwaitingStageSettle,
                        Ok(Ok(result)) => StepState::Failed(StagerError::CommandFailed {
                            transition: step,
                            stage,
                            detail: result
                                .detail
                                .unwrap_or_else(|| "no detail reported".to_string()),
                        }),
                    }
                }
                StepState::AwaitingStageSettle => {
                    stage = self.await_stage_settle(cluster, product, version, step).await?;
                    StepState::StepDone
                }
                StepState::StepDone => return Ok(StepOutcome { stage, triggered }),
                StepState::Failed(err) => return Err(err),
            };
        }
    }

    /// Polls the stage at the configured cadence while the snapshot still
    /// reads the transition's transient stage.
    ///
    /// The command's own completion signal is the authoritative success
    /// indicator; this loop only keeps the engine from acting on a snapshot
    /// that has not caught up yet. It is bounded so a cluster that confirms
    /// the command but never updates stage surfaces as a timeout instead of
    /// blocking forever.
    async fn await_stage_settle(
        &self,
        cluster: &dyn ManagedCluster,
        product: &str,
        version: &str,
        step: Transition,
    ) -> Result<Stage> {
        let deadline = Instant::now() + self.config.settle_timeout;
        loop {
            let observed = cluster.get_parcel(product, version).await?.stage;
            if observed != step.settle_while() {
                return Ok(observed);
            }
            if Instant::now() >= deadline {
                return Err(StagerError::StageSettleTimeout {
                    stage: observed,
                    timeout: self.config.settle_timeout,
                });
            }
            self.cancel.checkpoint()?;
            debug!(stage = %observed, "stage still settling");
            sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use pretty_assertions::assert_eq;

    fn fast_config() -> EngineConfig {
        EngineConfig::new()
            .with_poll_interval(Duration::from_millis(1))
            .with_command_timeout(Duration::from_millis(50))
            .with_settle_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_empty_plan_is_a_no_op() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::Distributed);
        let engine = ConvergenceEngine::new(fast_config());

        let outcome = engine
            .converge(&cluster, "CDH", "5.13.0-1", Stage::Distributed, &[])
            .await;

        assert!(outcome.is_success());
        assert!(!outcome.changed);
        assert_eq!(outcome.final_stage, Stage::Distributed);
        assert_eq!(cluster.triggered(), Vec::new());
        // No remote interaction at all for an empty plan.
        assert_eq!(cluster.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_single_download_step() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        let engine = ConvergenceEngine::new(fast_config());

        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[Transition::Download],
            )
            .await;

        assert!(outcome.is_success());
        assert!(outcome.changed);
        assert_eq!(outcome.final_stage, Stage::Downloaded);
        assert_eq!(cluster.triggered(), vec![Transition::Download]);
    }

    #[tokio::test]
    async fn test_three_step_forward_plan_runs_in_order() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        let engine = ConvergenceEngine::new(fast_config());

        let plan = [
            Transition::Download,
            Transition::Distribute,
            Transition::Activate,
        ];
        let outcome = engine
            .converge(&cluster, "CDH", "5.13.0-1", Stage::AvailableRemotely, &plan)
            .await;

        assert!(outcome.is_success());
        assert!(outcome.changed);
        assert_eq!(outcome.final_stage, Stage::Activated);
        assert_eq!(cluster.triggered(), plan.to_vec());
    }

    #[tokio::test]
    async fn test_settle_polling_waits_out_transient_stage() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        cluster.set_settle_polls(3);
        let engine = ConvergenceEngine::new(
            fast_config().with_settle_timeout(Duration::from_secs(5)),
        );

        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[Transition::Download],
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.final_stage, Stage::Downloaded);
        // Trigger-guard poll plus at least the transient-stage polls.
        assert!(cluster.poll_count() >= 4);
    }

    #[tokio::test]
    async fn test_stuck_transient_stage_times_out() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        cluster.set_settle_polls(usize::MAX);
        let engine = ConvergenceEngine::new(fast_config());

        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[Transition::Download],
            )
            .await;

        assert!(matches!(
            outcome.error,
            Some(StagerError::StageSettleTimeout { stage: Stage::Downloading, .. })
        ));
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn test_second_step_failure_keeps_first_step() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        cluster.fail_on(Transition::Distribute, "insufficient space on host-3");
        let engine = ConvergenceEngine::new(fast_config());

        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[
                    Transition::Download,
                    Transition::Distribute,
                    Transition::Activate,
                ],
            )
            .await;

        // The download is retained; activation was never attempted.
        assert!(outcome.changed);
        assert_eq!(outcome.final_stage, Stage::Downloaded);
        assert_eq!(
            cluster.triggered(),
            vec![Transition::Download, Transition::Distribute]
        );
        match outcome.error {
            Some(StagerError::CommandFailed {
                transition, detail, ..
            }) => {
                assert_eq!(transition, Transition::Distribute);
                assert_eq!(detail, "insufficient space on host-3");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        cluster.hang_on(Transition::Download);
        let engine = ConvergenceEngine::new(fast_config());

        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[Transition::Download],
            )
            .await;

        assert!(!outcome.changed);
        assert!(matches!(
            outcome.error,
            Some(StagerError::CommandTimeout {
                transition: Transition::Download,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_trigger() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        let engine = ConvergenceEngine::new(fast_config());
        engine.cancel_token().cancel("operator abort");

        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[Transition::Download],
            )
            .await;

        assert!(!outcome.changed);
        assert_eq!(cluster.triggered(), Vec::new());
        assert!(matches!(
            outcome.error,
            Some(StagerError::Cancelled { ref reason }) if reason == "operator abort"
        ));
    }

    #[tokio::test]
    async fn test_stale_plan_refuses_wrong_stage() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::AvailableRemotely);
        let engine = ConvergenceEngine::new(fast_config());

        // Plan says distribute, but the parcel was never downloaded.
        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::Downloaded,
                &[Transition::Distribute],
            )
            .await;

        assert!(!outcome.changed);
        assert_eq!(cluster.triggered(), Vec::new());
        assert!(matches!(
            outcome.error,
            Some(StagerError::UnexpectedStage {
                expected: Stage::Downloaded,
                observed: Stage::AvailableRemotely,
            })
        ));
    }

    #[tokio::test]
    async fn test_step_already_at_target_is_skipped() {
        let cluster = FakeCluster::new("test");
        cluster.add_parcel("CDH", "5.13.0-1", Stage::Downloaded);
        let engine = ConvergenceEngine::new(fast_config());

        // A prior run already downloaded; the step completes without a
        // trigger and does not count as a change.
        let outcome = engine
            .converge(
                &cluster,
                "CDH",
                "5.13.0-1",
                Stage::AvailableRemotely,
                &[Transition::Download],
            )
            .await;

        assert!(outcome.is_success());
        assert!(!outcome.changed);
        assert_eq!(outcome.final_stage, Stage::Downloaded);
        assert_eq!(cluster.triggered(), Vec::new());
    }
}
