// Copyright (c) 2025 - Cowboy AI, Inc.
//! Private network provisioning for the Composable Information Machine
//!
//! Builds a dependency-ordered plan of provisioning units (network topology,
//! private service attachments and their DNS zones, compute environment,
//! internal discovery zone, peering) and executes it against a control plane.
//! Run events are published over NATS.

pub mod config;
pub mod control_plane;
pub mod deferred;
pub mod discovery;
pub mod domain;
pub mod errors;
pub mod events;
pub mod graph;
pub mod nats;
pub mod orchestrator;
pub mod outputs;
pub mod peering;
pub mod planner;
pub mod provisioners;
pub mod resolver;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use config::OrchestrationConfig;
pub use control_plane::{ControlPlane, ControlPlaneError, InMemoryControlPlane};
pub use errors::{ProvisioningError, ProvisioningResult};
pub use events::{CollectingSink, EventSink, ProvisioningEvent, TracingSink};
pub use nats::{NatsClient, NatsConfig, NatsEventSink};
pub use orchestrator::{
    CancellationFlag, ProvisioningOrchestrator, ProvisioningPlan, RunFailure, RunReport, UnitId,
};
pub use outputs::DeploymentOutputs;
