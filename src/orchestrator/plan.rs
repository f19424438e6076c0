// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Plan
//!
//! Turns a configuration document into units and a dependency graph:
//!
//! ```text
//! network ──┬── dns-zone:{suffix} ── service:{key} ── lockdown:{key}
//!           ├── compute-environment ──┐
//!           └─────────────────────────┴── discovery-zone ── peering
//! ```
//!
//! Every externally supplied identifier is parsed before the plan exists, so
//! a malformed one fails the run before any control-plane call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::unit::{ProvisioningUnit, UnitId};
use super::units::{
    ComputeUnit, DiscoveryUnit, DnsZoneUnit, LockdownUnit, NetworkUnit, PeeringUnit, ServiceTemplate,
    ServiceUnit,
};
use crate::config::{OrchestrationConfig, PublicNetworkAccess};
use crate::control_plane::ControlPlane;
use crate::deferred::DeferredExecutor;
use crate::discovery::{DiscoveryRequest, InternalDiscoveryZoneManager};
use crate::domain::{ResourceKind, ResourceNamer, ZoneName};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::DependencyGraph;
use crate::peering::{PeeringManager, PeeringOptions};
use crate::provisioners::{PrivateZoneRequest, TopologyRequest};
use crate::resolver::parse_external;
use crate::subjects::UnitKind;

/// Printable description of a planned unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub inputs: Vec<UnitId>,
}

/// Units in dependency order
pub struct ProvisioningPlan {
    units: HashMap<UnitId, Arc<dyn ProvisioningUnit>>,
    graph: DependencyGraph<UnitId>,
    order: Vec<UnitId>,
}

impl std::fmt::Debug for ProvisioningPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningPlan")
            .field("order", &self.order)
            .finish()
    }
}

impl ProvisioningPlan {
    /// Build a plan from arbitrary units
    ///
    /// Unit ids must be unique and every declared input must be a unit of the
    /// plan.
    pub fn from_units(units: Vec<Arc<dyn ProvisioningUnit>>) -> ProvisioningResult<Self> {
        let mut graph = DependencyGraph::new();
        let mut by_id = HashMap::with_capacity(units.len());

        for unit in &units {
            if graph.contains(unit.id()) {
                return Err(ProvisioningError::Configuration(format!(
                    "unit '{}' is declared twice",
                    unit.id()
                )));
            }
            graph.add_node(unit.id().clone());
        }
        for unit in units {
            for input in unit.inputs() {
                graph.add_dependency(input, unit.id())?;
            }
            by_id.insert(unit.id().clone(), unit);
        }

        let order = graph.toposort()?;
        debug!(?order, "Provisioning plan ordered");

        Ok(Self {
            units: by_id,
            graph,
            order,
        })
    }

    /// Build the standard plan for a configuration document
    pub fn from_config(
        config: &OrchestrationConfig,
        control_plane: Arc<dyn ControlPlane>,
    ) -> ProvisioningResult<Self> {
        config.validate()?;
        preflight(config)?;

        let scope = config.scope()?;
        let namer = ResourceNamer::new(
            &config.subscription_id,
            &config.resource_group,
            &config.environment_name,
            &config.location,
        );
        let deferred = DeferredExecutor::new(config.deferred_timeout());

        let mut units: Vec<Arc<dyn ProvisioningUnit>> = vec![Arc::new(NetworkUnit::new(
            Arc::clone(&control_plane),
            TopologyRequest::from_config(config, &scope, &namer),
        ))];

        let kinds = config.service_kinds();

        let mut suffixes: Vec<&str> = Vec::new();
        for kind in &kinds {
            if !suffixes.contains(&kind.dns_zone_suffix()) {
                suffixes.push(kind.dns_zone_suffix());
            }
        }
        for suffix in suffixes {
            let name = ZoneName::new(suffix)
                .map_err(|e| ProvisioningError::Configuration(format!("zone '{}': {}", suffix, e)))?;
            units.push(Arc::new(DnsZoneUnit::new(
                Arc::clone(&control_plane),
                PrivateZoneRequest {
                    name,
                    existing_zone_id: config.existing_dns_zone_ids.get(suffix).cloned(),
                    managed_zone_id: scope.resource_id(ResourceKind::PrivateDnsZone, suffix),
                },
            )));
        }

        for kind in kinds {
            let service = config.service(kind);
            let name = service
                .and_then(|s| s.name.clone())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| namer.service_name(kind));
            units.push(Arc::new(ServiceUnit::new(
                Arc::clone(&control_plane),
                ServiceTemplate {
                    kind,
                    existing_resource_id: service.and_then(|s| s.existing_resource_id.clone()),
                    managed_service_id: scope.resource_id(kind.resource_kind(), name),
                    endpoint_id: scope
                        .resource_id(ResourceKind::PrivateEndpoint, namer.endpoint_name(kind)),
                    location: config.location.clone(),
                },
            )));
            if config.public_network_access == PublicNetworkAccess::Disabled {
                units.push(Arc::new(LockdownUnit::new(Arc::clone(&control_plane), kind)));
            }
        }

        let compute_name = config
            .compute
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| namer.name(ResourceKind::ComputeEnvironment));
        units.push(Arc::new(ComputeUnit::new(
            Arc::clone(&control_plane),
            scope.resource_id(ResourceKind::ComputeEnvironment, compute_name),
            config.location.clone(),
            config.compute.deploy_compute,
        )));

        units.push(Arc::new(DiscoveryUnit::new(
            InternalDiscoveryZoneManager::new(Arc::clone(&control_plane), deferred.clone()),
            DiscoveryRequest {
                master_enabled: config.discovery.master_enabled,
                mode: config.discovery.mode,
                explicit_zone: config.explicit_zone_name()?,
                consumer_network_ids: config.discovery.consumer_network_ids.clone(),
                scope: scope.clone(),
            },
        )));

        if let Some(peering) = &config.peering {
            units.push(Arc::new(PeeringUnit::new(
                PeeringManager::new(Arc::clone(&control_plane), deferred),
                Arc::clone(&control_plane),
                peering.remote_network_id.clone(),
                PeeringOptions::from(peering),
            )));
        }

        Self::from_units(units)
    }

    pub fn order(&self) -> &[UnitId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &UnitId) -> bool {
        self.units.contains_key(id)
    }

    pub fn unit(&self, id: &UnitId) -> Option<&Arc<dyn ProvisioningUnit>> {
        self.units.get(id)
    }

    /// Units that can never start once `id` fails
    pub fn blocked_by(&self, id: &UnitId) -> ProvisioningResult<Vec<UnitId>> {
        self.graph.transitive_dependents(id)
    }

    /// Plan in execution order, for printing
    pub fn describe(&self) -> Vec<PlannedUnit> {
        self.order
            .iter()
            .filter_map(|id| self.units.get(id))
            .map(|unit| PlannedUnit {
                id: unit.id().clone(),
                kind: unit.kind(),
                inputs: unit.inputs().to_vec(),
            })
            .collect()
    }
}

/// Parse every externally supplied identifier
pub fn preflight(config: &OrchestrationConfig) -> ProvisioningResult<()> {
    // Parsed whether or not `useExisting` is set
    parse_external(
        config.network.existing_network_id.as_deref(),
        ResourceKind::VirtualNetwork,
    )?;
    for service in &config.services {
        parse_external(
            service.existing_resource_id.as_deref(),
            service.kind.resource_kind(),
        )?;
    }
    for zone_id in config.existing_dns_zone_ids.values() {
        parse_external(Some(zone_id.as_str()), ResourceKind::PrivateDnsZone)?;
    }
    for network in &config.discovery.consumer_network_ids {
        parse_external(Some(network.as_str()), ResourceKind::VirtualNetwork)?;
    }
    if let Some(peering) = &config.peering {
        parse_external(
            Some(peering.remote_network_id.as_str()),
            ResourceKind::VirtualNetwork,
        )?;
    }
    Ok(())
}
