// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Units
//!
//! A unit is a named step with declared inputs. It reads the published
//! outputs of its inputs through a [`UnitContext`] and returns its own
//! output, which the executor publishes exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryOutcome;
use crate::domain::ServiceKind;
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::peering::PeeringResult;
use crate::provisioners::{
    ComputeEnvironment, LockdownOutcome, PrivateZone, ServiceConnectivity, Topology, ZoneLink,
};
use crate::subjects::UnitKind;

/// Identity of a unit within a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn network() -> Self {
        Self::new("network")
    }

    pub fn dns_zone(suffix: &str) -> Self {
        Self(format!("dns-zone:{}", suffix))
    }

    pub fn service(kind: ServiceKind) -> Self {
        Self(format!("service:{}", kind.key()))
    }

    pub fn lockdown(kind: ServiceKind) -> Self {
        Self(format!("lockdown:{}", kind.key()))
    }

    pub fn compute() -> Self {
        Self::new("compute-environment")
    }

    pub fn discovery() -> Self {
        Self::new("discovery-zone")
    }

    pub fn peering() -> Self {
        Self::new("peering")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output published by a unit
#[derive(Debug, Clone)]
pub enum UnitOutput {
    Topology(Topology),
    DnsZone(PrivateZone),
    Service(ServiceConnectivity),
    Lockdown(LockdownOutcome),
    Compute(ComputeEnvironment),
    Discovery(DiscoveryOutcome),
    Peering {
        result: PeeringResult,
        /// Link from the discovery zone to the remote network
        discovery_link: Option<ZoneLink>,
    },
    /// Unit was skipped on request; dependents see "not yet available"
    Skipped { reason: String },
}

impl UnitOutput {
    pub fn is_skipped(&self) -> bool {
        matches!(self, UnitOutput::Skipped { .. })
    }

    /// Deferred operation the unit went through, if any
    pub fn deferred_operation(&self) -> Option<&'static str> {
        match self {
            UnitOutput::Discovery(outcome) if outcome.deferred => Some("discovery-zone"),
            UnitOutput::Peering { result, .. } if result.deferred => Some("remote-peering"),
            _ => None,
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            UnitOutput::Topology(_) => "topology",
            UnitOutput::DnsZone(_) => "dns zone",
            UnitOutput::Service(_) => "service connectivity",
            UnitOutput::Lockdown(_) => "lockdown",
            UnitOutput::Compute(_) => "compute environment",
            UnitOutput::Discovery(_) => "discovery",
            UnitOutput::Peering { .. } => "peering",
            UnitOutput::Skipped { .. } => "skipped",
        }
    }
}

/// A step of the provisioning plan
#[async_trait]
pub trait ProvisioningUnit: Send + Sync {
    fn id(&self) -> &UnitId;

    fn kind(&self) -> UnitKind;

    /// Units whose outputs must be published before this one starts
    fn inputs(&self) -> &[UnitId];

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput>;
}

/// Read-only view of a unit's published inputs
#[derive(Debug, Clone)]
pub struct UnitContext {
    unit: UnitId,
    inputs: HashMap<UnitId, Arc<UnitOutput>>,
}

impl UnitContext {
    pub fn new(unit: UnitId, inputs: HashMap<UnitId, Arc<UnitOutput>>) -> Self {
        Self { unit, inputs }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    /// Output of `input`; fails if it was never published
    pub fn input(&self, input: &UnitId) -> ProvisioningResult<&UnitOutput> {
        self.inputs
            .get(input)
            .map(Arc::as_ref)
            .ok_or_else(|| ProvisioningError::DependencyUnavailable {
                unit: self.unit.to_string(),
                input: input.to_string(),
            })
    }

    fn unexpected(&self, input: &UnitId, expected: &str, found: &UnitOutput) -> ProvisioningError {
        ProvisioningError::StateGuardViolation(format!(
            "unit '{}' expected {} output from '{}', found {}",
            self.unit,
            expected,
            input,
            found.variant()
        ))
    }

    pub fn topology(&self, input: &UnitId) -> ProvisioningResult<&Topology> {
        match self.input(input)? {
            UnitOutput::Topology(topology) => Ok(topology),
            other => Err(self.unexpected(input, "topology", other)),
        }
    }

    pub fn zone(&self, input: &UnitId) -> ProvisioningResult<&PrivateZone> {
        match self.input(input)? {
            UnitOutput::DnsZone(zone) => Ok(zone),
            other => Err(self.unexpected(input, "dns zone", other)),
        }
    }

    pub fn service(&self, input: &UnitId) -> ProvisioningResult<&ServiceConnectivity> {
        match self.input(input)? {
            UnitOutput::Service(service) => Ok(service),
            other => Err(self.unexpected(input, "service connectivity", other)),
        }
    }

    /// Compute environment, or `None` when the compute unit was skipped
    pub fn compute(&self, input: &UnitId) -> ProvisioningResult<Option<&ComputeEnvironment>> {
        match self.input(input)? {
            UnitOutput::Compute(environment) => Ok(Some(environment)),
            UnitOutput::Skipped { .. } => Ok(None),
            other => Err(self.unexpected(input, "compute environment", other)),
        }
    }

    pub fn discovery(&self, input: &UnitId) -> ProvisioningResult<&DiscoveryOutcome> {
        match self.input(input)? {
            UnitOutput::Discovery(outcome) => Ok(outcome),
            other => Err(self.unexpected(input, "discovery", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(UnitId::network(), "network")]
    #[test_case(UnitId::dns_zone("privatelink.vaultcore.azure.net"), "dns-zone:privatelink.vaultcore.azure.net")]
    #[test_case(UnitId::service(ServiceKind::KeyVault), "service:vault")]
    #[test_case(UnitId::lockdown(ServiceKind::KeyVault), "lockdown:vault")]
    #[test_case(UnitId::compute(), "compute-environment")]
    #[test_case(UnitId::discovery(), "discovery-zone")]
    fn test_unit_ids(id: UnitId, expected: &str) {
        assert_eq!(id.to_string(), expected);
    }

    #[test]
    fn test_missing_input_is_dependency_unavailable() {
        let context = UnitContext::new(UnitId::discovery(), HashMap::new());
        let err = context.compute(&UnitId::compute()).unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::DependencyUnavailable { ref unit, ref input }
                if unit == "discovery-zone" && input == "compute-environment"
        ));
    }

    #[test]
    fn test_skipped_compute_reads_as_none() {
        let mut inputs = HashMap::new();
        inputs.insert(
            UnitId::compute(),
            Arc::new(UnitOutput::Skipped {
                reason: "second phase".into(),
            }),
        );
        let context = UnitContext::new(UnitId::discovery(), inputs);
        assert!(context.compute(&UnitId::compute()).unwrap().is_none());

        let err = context.topology(&UnitId::compute()).unwrap_err();
        assert_eq!(err.category(), "state_guard");
    }
}
