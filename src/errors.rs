// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for provisioning operations

use std::time::Duration;

use thiserror::Error;

use crate::control_plane::ControlPlaneError;

/// Errors that can occur while planning or executing a provisioning run
///
/// Every variant is fatal to the run. Resources created by units that
/// completed before the failure are left in place for a corrective rerun.
#[derive(Debug, Clone, Error)]
pub enum ProvisioningError {
    /// Address computation impossible
    #[error("Address planning failed: {0}")]
    Planning(String),

    /// Externally supplied identifier is malformed
    #[error("Malformed resource identifier '{id}': {reason}")]
    ReferenceParse { id: String, reason: String },

    /// A declared input was never published
    #[error("Unit '{unit}' requires output of '{input}' which is not available")]
    DependencyUnavailable { unit: String, input: String },

    /// Deferred operation exceeded its bound
    #[error("Deferred operation '{operation}' did not finish within {timeout:?}")]
    DeferredOperationTimeout { operation: String, timeout: Duration },

    /// Deferred operation task aborted or panicked
    #[error("Deferred operation '{operation}' aborted: {reason}")]
    DeferredOperationAborted { operation: String, reason: String },

    /// Invariant precondition not met
    #[error("State guard violation: {0}")]
    StateGuardViolation(String),

    /// External collaborator rejected a call
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dependency graph contains a cycle
    #[error("Dependency cycle detected at unit '{0}'")]
    CycleDetected(String),

    /// Run cancelled before the unit started
    #[error("Run cancelled before unit '{0}' started")]
    Cancelled(String),

    /// Messaging error
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for provisioning operations
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

impl ProvisioningError {
    /// Short machine-readable category, used in run events
    pub fn category(&self) -> &'static str {
        match self {
            ProvisioningError::Planning(_) => "planning",
            ProvisioningError::ReferenceParse { .. } => "reference_parse",
            ProvisioningError::DependencyUnavailable { .. } => "dependency_unavailable",
            ProvisioningError::DeferredOperationTimeout { .. } => "deferred_timeout",
            ProvisioningError::DeferredOperationAborted { .. } => "deferred_aborted",
            ProvisioningError::StateGuardViolation(_) => "state_guard",
            ProvisioningError::ControlPlane(_) => "control_plane",
            ProvisioningError::Configuration(_) => "configuration",
            ProvisioningError::CycleDetected(_) => "cycle",
            ProvisioningError::Cancelled(_) => "cancelled",
            ProvisioningError::Messaging(_) => "messaging",
            ProvisioningError::Serialization(_) => "serialization",
        }
    }
}

impl From<async_nats::Error> for ProvisioningError {
    fn from(err: async_nats::Error) -> Self {
        ProvisioningError::Messaging(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisioningError {
    fn from(err: serde_json::Error) -> Self {
        ProvisioningError::Serialization(err.to_string())
    }
}
