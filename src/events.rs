// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Run Events
//!
//! Every run emits a stream of events describing unit lifecycle:
//!
//! ```text
//! RunStarted
//!   UnitStarted(network) → UnitCompleted(network)
//!   UnitSkipped(compute-environment)
//!   UnitStarted(discovery-zone) → DeferredScheduled → UnitCompleted
//! RunCompleted | RunFailed
//! ```
//!
//! Events go to an [`EventSink`]. Sinks are observers: a failing sink is
//! logged by the orchestrator and never fails the run.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::ProvisioningResult;
use crate::subjects::{subject_for, Operation, UnitKind};

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisioningEventKind {
    RunStarted {
        units: Vec<String>,
    },
    UnitStarted {
        unit: String,
        unit_kind: UnitKind,
    },
    UnitCompleted {
        unit: String,
        unit_kind: UnitKind,
    },
    UnitSkipped {
        unit: String,
        unit_kind: UnitKind,
        reason: String,
    },
    UnitFailed {
        unit: String,
        unit_kind: UnitKind,
        category: String,
        message: String,
    },
    /// A unit ran a bounded background operation
    DeferredScheduled {
        unit: String,
        unit_kind: UnitKind,
        operation: String,
    },
    RunCompleted {
        completed: usize,
        skipped: usize,
    },
    RunFailed {
        unit: String,
        category: String,
        message: String,
    },
}

/// Run event envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProvisioningEventKind,
}

impl ProvisioningEvent {
    pub fn new(run_id: Uuid, kind: ProvisioningEventKind) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn unit_kind(&self) -> UnitKind {
        match &self.kind {
            ProvisioningEventKind::UnitStarted { unit_kind, .. }
            | ProvisioningEventKind::UnitCompleted { unit_kind, .. }
            | ProvisioningEventKind::UnitSkipped { unit_kind, .. }
            | ProvisioningEventKind::UnitFailed { unit_kind, .. }
            | ProvisioningEventKind::DeferredScheduled { unit_kind, .. } => *unit_kind,
            ProvisioningEventKind::RunStarted { .. }
            | ProvisioningEventKind::RunCompleted { .. }
            | ProvisioningEventKind::RunFailed { .. } => UnitKind::Run,
        }
    }

    pub fn operation(&self) -> Operation {
        match &self.kind {
            ProvisioningEventKind::RunStarted { .. } | ProvisioningEventKind::UnitStarted { .. } => {
                Operation::Started
            }
            ProvisioningEventKind::RunCompleted { .. }
            | ProvisioningEventKind::UnitCompleted { .. } => Operation::Completed,
            ProvisioningEventKind::UnitSkipped { .. } => Operation::Skipped,
            ProvisioningEventKind::RunFailed { .. } | ProvisioningEventKind::UnitFailed { .. } => {
                Operation::Failed
            }
            ProvisioningEventKind::DeferredScheduled { .. } => Operation::Deferred,
        }
    }

    /// NATS subject: `provisioning.{unit_kind}.{operation}`
    pub fn subject(&self) -> String {
        subject_for(self.unit_kind(), self.operation())
    }

    /// Unit the event concerns, if any
    pub fn unit(&self) -> Option<&str> {
        match &self.kind {
            ProvisioningEventKind::UnitStarted { unit, .. }
            | ProvisioningEventKind::UnitCompleted { unit, .. }
            | ProvisioningEventKind::UnitSkipped { unit, .. }
            | ProvisioningEventKind::UnitFailed { unit, .. }
            | ProvisioningEventKind::DeferredScheduled { unit, .. }
            | ProvisioningEventKind::RunFailed { unit, .. } => Some(unit),
            ProvisioningEventKind::RunStarted { .. } | ProvisioningEventKind::RunCompleted { .. } => {
                None
            }
        }
    }
}

/// Receives run events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &ProvisioningEvent) -> ProvisioningResult<()>;
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: &ProvisioningEvent) -> ProvisioningResult<()> {
        let subject = event.subject();
        match &event.kind {
            ProvisioningEventKind::UnitFailed { unit, message, .. }
            | ProvisioningEventKind::RunFailed { unit, message, .. } => {
                error!(run = %event.run_id, %subject, unit = %unit, "{}", message);
            }
            ProvisioningEventKind::UnitSkipped { unit, reason, .. } => {
                warn!(run = %event.run_id, %subject, unit = %unit, "Skipped: {}", reason);
            }
            _ => {
                info!(run = %event.run_id, %subject, unit = event.unit().unwrap_or("-"), "Run event");
            }
        }
        Ok(())
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProvisioningEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProvisioningEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.events().iter().map(ProvisioningEvent::subject).collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, event: &ProvisioningEvent) -> ProvisioningResult<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Fans out to several sinks; the first error is reported after all have run
pub struct CompositeSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for CompositeSink {
    async fn emit(&self, event: &ProvisioningEvent) -> ProvisioningResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failed() -> ProvisioningEvent {
        ProvisioningEvent::new(
            Uuid::now_v7(),
            ProvisioningEventKind::UnitFailed {
                unit: "network".into(),
                unit_kind: UnitKind::Network,
                category: "planning".into(),
                message: "parent too small".into(),
            },
        )
    }

    #[test]
    fn test_subjects() {
        assert_eq!(failed().subject(), "provisioning.network.failed");
        let run = ProvisioningEvent::new(
            Uuid::now_v7(),
            ProvisioningEventKind::RunCompleted {
                completed: 3,
                skipped: 1,
            },
        );
        assert_eq!(run.subject(), "provisioning.run.completed");
        assert_eq!(run.unit(), None);
    }

    #[test]
    fn test_serialized_shape() {
        let event = failed();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unit_failed");
        assert_eq!(json["unit_kind"], "network");
        assert_eq!(json["run_id"], event.run_id.to_string());

        let back: ProvisioningEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_ids_are_time_ordered() {
        let a = failed();
        let b = failed();
        assert_eq!(a.event_id.get_version_num(), 7);
        assert!(a.event_id < b.event_id);
    }

    #[tokio::test]
    async fn test_collecting_and_composite_sinks() {
        let collecting = std::sync::Arc::new(CollectingSink::new());
        let composite = CompositeSink::new(vec![collecting.clone(), std::sync::Arc::new(TracingSink)]);

        composite.emit(&failed()).await.unwrap();
        assert_eq!(collecting.subjects(), vec!["provisioning.network.failed"]);
    }
}
