// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Orchestrator
//!
//! Executes a [`ProvisioningPlan`]:
//!
//! ```text
//! ready = units whose inputs are all published
//!
//! loop:
//!   start every ready unit (unless cancelled or failed)
//!   wait for the next unit to finish
//!     ok  → publish output (write-once), dependents may become ready
//!     err → record first failure, start nothing new, drain in-flight units
//! ```
//!
//! Independent units run concurrently. Nothing is rolled back: resources of
//! completed units stay in place so a corrected rerun resumes from them.

pub mod plan;
pub mod store;
pub mod unit;
pub mod units;

pub use plan::{preflight, PlannedUnit, ProvisioningPlan};
pub use store::OutputStore;
pub use unit::{ProvisioningUnit, UnitContext, UnitId, UnitOutput};
pub use units::{
    ComputeUnit, DiscoveryUnit, DnsZoneUnit, LockdownUnit, NetworkUnit, PeeringUnit, ServiceTemplate,
    ServiceUnit,
};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::ProvisioningError;
use crate::events::{EventSink, ProvisioningEvent, ProvisioningEventKind, TracingSink};

/// Cooperative cancellation shared with the caller
///
/// Checked before each unit starts. Units already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Completion order
    pub completed: Vec<UnitId>,
    pub skipped: Vec<UnitId>,
    pub outputs: HashMap<UnitId, Arc<UnitOutput>>,
    /// `(unit, operation)` for every deferred operation
    pub deferred_operations: Vec<(UnitId, String)>,
}

impl RunReport {
    pub fn output(&self, unit: &UnitId) -> Option<&UnitOutput> {
        self.outputs.get(unit).map(Arc::as_ref)
    }
}

/// First fatal error of a run
#[derive(Debug, Clone, Error)]
#[error("provisioning unit '{unit}' failed: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub unit: UnitId,
    #[source]
    pub error: ProvisioningError,
    /// Declared inputs of the failing unit that were not published
    pub unmet_inputs: Vec<UnitId>,
    pub completed: Vec<UnitId>,
    /// Units that never started
    pub blocked: Vec<UnitId>,
}

type Finished = (UnitId, Result<UnitOutput, ProvisioningError>);

/// Executes provisioning plans
pub struct ProvisioningOrchestrator {
    sink: Arc<dyn EventSink>,
    cancellation: CancellationFlag,
}

impl Default for ProvisioningOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningOrchestrator {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    async fn emit(&self, run_id: Uuid, kind: ProvisioningEventKind) {
        let event = ProvisioningEvent::new(run_id, kind);
        if let Err(e) = self.sink.emit(&event).await {
            warn!(subject = %event.subject(), error = %e, "Failed to emit run event");
        }
    }

    /// Execute every unit of `plan` in dependency order
    pub async fn run(&self, plan: &ProvisioningPlan) -> Result<RunReport, RunFailure> {
        let run_id = Uuid::now_v7();
        let store = OutputStore::new();
        info!(run = %run_id, units = plan.len(), "🚀 Provisioning run started");
        self.emit(
            run_id,
            ProvisioningEventKind::RunStarted {
                units: plan.order().iter().map(ToString::to_string).collect(),
            },
        )
        .await;

        let mut pending: Vec<UnitId> = plan.order().to_vec();
        let mut published: HashSet<UnitId> = HashSet::new();
        let mut completed = Vec::new();
        let mut skipped = Vec::new();
        let mut deferred_operations = Vec::new();
        let mut failure: Option<(UnitId, ProvisioningError)> = None;
        let mut running = FuturesUnordered::new();

        loop {
            if failure.is_none() {
                let mut index = 0;
                while index < pending.len() {
                    let Some(unit) = plan.unit(&pending[index]) else {
                        index += 1;
                        continue;
                    };
                    if !unit.inputs().iter().all(|input| published.contains(input)) {
                        index += 1;
                        continue;
                    }
                    if self.cancellation.is_cancelled() {
                        warn!(run = %run_id, unit = %unit.id(), "Run cancelled; unit not started");
                        failure = Some((
                            unit.id().clone(),
                            ProvisioningError::Cancelled(unit.id().to_string()),
                        ));
                        break;
                    }

                    let id = pending.remove(index);
                    let context = match store.context_for(&id, unit.inputs()).await {
                        Ok(context) => context,
                        Err(e) => {
                            failure = Some((id, e));
                            break;
                        }
                    };

                    info!(run = %run_id, unit = %id, "▶️ Unit started");
                    self.emit(
                        run_id,
                        ProvisioningEventKind::UnitStarted {
                            unit: id.to_string(),
                            unit_kind: unit.kind(),
                        },
                    )
                    .await;

                    let unit = Arc::clone(unit);
                    running.push(async move {
                        let result = unit.execute(&context).await;
                        (id, result)
                    });
                }
            }

            let Some((id, result)): Option<Finished> = running.next().await else {
                break;
            };
            let unit_kind = match plan.unit(&id) {
                Some(unit) => unit.kind(),
                None => continue,
            };

            let result = match result {
                Ok(output) => store.publish(&id, output).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(output) => {
                    published.insert(id.clone());
                    if let Some(operation) = output.deferred_operation() {
                        deferred_operations.push((id.clone(), operation.to_string()));
                        self.emit(
                            run_id,
                            ProvisioningEventKind::DeferredScheduled {
                                unit: id.to_string(),
                                unit_kind,
                                operation: operation.to_string(),
                            },
                        )
                        .await;
                    }
                    if let UnitOutput::Skipped { reason } = output.as_ref() {
                        info!(run = %run_id, unit = %id, reason = %reason, "⏭️ Unit skipped");
                        skipped.push(id.clone());
                        self.emit(
                            run_id,
                            ProvisioningEventKind::UnitSkipped {
                                unit: id.to_string(),
                                unit_kind,
                                reason: reason.clone(),
                            },
                        )
                        .await;
                    } else {
                        info!(run = %run_id, unit = %id, "✅ Unit completed");
                        self.emit(
                            run_id,
                            ProvisioningEventKind::UnitCompleted {
                                unit: id.to_string(),
                                unit_kind,
                            },
                        )
                        .await;
                    }
                    completed.push(id);
                }
                Err(e) => {
                    error!(run = %run_id, unit = %id, error = %e, "❌ Unit failed");
                    self.emit(
                        run_id,
                        ProvisioningEventKind::UnitFailed {
                            unit: id.to_string(),
                            unit_kind,
                            category: e.category().to_string(),
                            message: e.to_string(),
                        },
                    )
                    .await;
                    if failure.is_none() {
                        failure = Some((id, e));
                    }
                }
            }
        }

        if failure.is_none() {
            if let Some(stuck) = pending.first() {
                let input = plan
                    .unit(stuck)
                    .and_then(|u| u.inputs().iter().find(|i| !published.contains(*i)))
                    .map(ToString::to_string)
                    .unwrap_or_default();
                failure = Some((
                    stuck.clone(),
                    ProvisioningError::DependencyUnavailable {
                        unit: stuck.to_string(),
                        input,
                    },
                ));
            }
        }

        if let Some((unit, error)) = failure {
            let unmet_inputs = plan
                .unit(&unit)
                .map(|u| {
                    u.inputs()
                        .iter()
                        .filter(|input| !published.contains(*input))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            let blocked: Vec<UnitId> = pending.into_iter().filter(|id| *id != unit).collect();

            error!(
                run = %run_id,
                unit = %unit,
                error = %error,
                blocked = blocked.len(),
                "💥 Provisioning run failed"
            );
            self.emit(
                run_id,
                ProvisioningEventKind::RunFailed {
                    unit: unit.to_string(),
                    category: error.category().to_string(),
                    message: error.to_string(),
                },
            )
            .await;

            return Err(RunFailure {
                run_id,
                unit,
                error,
                unmet_inputs,
                completed,
                blocked,
            });
        }

        info!(
            run = %run_id,
            completed = completed.len(),
            skipped = skipped.len(),
            "🏁 Provisioning run completed"
        );
        self.emit(
            run_id,
            ProvisioningEventKind::RunCompleted {
                completed: completed.len(),
                skipped: skipped.len(),
            },
        )
        .await;

        Ok(RunReport {
            run_id,
            completed,
            skipped,
            outputs: store.snapshot().await,
            deferred_operations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProvisioningResult;
    use crate::events::CollectingSink;
    use crate::subjects::UnitKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records its start and optionally fails or cancels the run
    struct ScriptedUnit {
        id: UnitId,
        inputs: Vec<UnitId>,
        fail: bool,
        cancel: Option<CancellationFlag>,
        started: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedUnit {
        fn new(id: &str, inputs: &[&str], started: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id: UnitId::new(id),
                inputs: inputs.iter().map(|i| UnitId::new(*i)).collect(),
                fail: false,
                cancel: None,
                started: Arc::clone(started),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn cancelling(mut self, flag: CancellationFlag) -> Self {
            self.cancel = Some(flag);
            self
        }
    }

    #[async_trait]
    impl ProvisioningUnit for ScriptedUnit {
        fn id(&self) -> &UnitId {
            &self.id
        }

        fn kind(&self) -> UnitKind {
            UnitKind::Network
        }

        fn inputs(&self) -> &[UnitId] {
            &self.inputs
        }

        async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
            for input in &self.inputs {
                context.input(input)?;
            }
            self.started.lock().unwrap().push(self.id.to_string());
            if let Some(flag) = &self.cancel {
                flag.cancel();
            }
            if self.fail {
                return Err(ProvisioningError::Planning("no room".into()));
            }
            Ok(UnitOutput::Skipped {
                reason: "scripted".into(),
            })
        }
    }

    fn plan(units: Vec<ScriptedUnit>) -> ProvisioningPlan {
        ProvisioningPlan::from_units(
            units
                .into_iter()
                .map(|u| Arc::new(u) as Arc<dyn ProvisioningUnit>)
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_units_run_after_their_inputs() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let plan = plan(vec![
            ScriptedUnit::new("c", &["a", "b"], &started),
            ScriptedUnit::new("a", &[], &started),
            ScriptedUnit::new("b", &["a"], &started),
        ]);

        let report = ProvisioningOrchestrator::new().run(&plan).await.unwrap();
        assert_eq!(*started.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.skipped.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_reports_unit_and_blocks_dependents() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let plan = plan(vec![
            ScriptedUnit::new("a", &[], &started),
            ScriptedUnit::new("b", &["a"], &started).failing(),
            ScriptedUnit::new("c", &["b"], &started),
            ScriptedUnit::new("d", &["c"], &started),
        ]);
        let sink = Arc::new(CollectingSink::new());

        let failure = ProvisioningOrchestrator::with_sink(sink.clone())
            .run(&plan)
            .await
            .unwrap_err();

        assert_eq!(failure.unit, UnitId::new("b"));
        assert_eq!(failure.error.category(), "planning");
        assert_eq!(failure.completed, vec![UnitId::new("a")]);
        assert_eq!(failure.blocked, vec![UnitId::new("c"), UnitId::new("d")]);
        assert_eq!(*started.lock().unwrap(), vec!["a", "b"]);

        let subjects = sink.subjects();
        assert_eq!(subjects.first().map(String::as_str), Some("provisioning.run.started"));
        assert_eq!(subjects.last().map(String::as_str), Some("provisioning.run.failed"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let plan = plan(vec![ScriptedUnit::new("a", &[], &started)]);
        let orchestrator = ProvisioningOrchestrator::new();
        orchestrator.cancellation().cancel();

        let failure = orchestrator.run(&plan).await.unwrap_err();
        assert!(matches!(failure.error, ProvisioningError::Cancelled(_)));
        assert!(started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_lets_running_unit_finish() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let flag = CancellationFlag::new();
        let plan = plan(vec![
            ScriptedUnit::new("a", &[], &started).cancelling(flag.clone()),
            ScriptedUnit::new("b", &["a"], &started),
        ]);

        let failure = ProvisioningOrchestrator::new()
            .with_cancellation(flag)
            .run(&plan)
            .await
            .unwrap_err();

        assert_eq!(failure.unit, UnitId::new("b"));
        assert_eq!(failure.completed, vec![UnitId::new("a")]);
        assert_eq!(*started.lock().unwrap(), vec!["a"]);
    }
}
