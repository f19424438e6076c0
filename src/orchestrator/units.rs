// Copyright (c) 2025 - Cowboy AI, Inc.
//! Concrete provisioning units
//!
//! Each unit wraps one provisioner and only reads the outputs of its inputs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::unit::{ProvisioningUnit, UnitContext, UnitId, UnitOutput};
use crate::control_plane::ControlPlane;
use crate::discovery::{DiscoveryRequest, InternalDiscoveryZoneManager};
use crate::domain::{ResourceId, ServiceKind, SubnetRole};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::peering::{PeeringManager, PeeringOptions};
use crate::provisioners::{
    link_zone, provision_compute, NetworkTopologyProvisioner, PrivateConnectivityProvisioner,
    PrivateZoneRequest, ServiceConnectRequest, TopologyRequest,
};
use crate::subjects::UnitKind;

fn missing_subnet(unit: &UnitId, role: SubnetRole) -> ProvisioningError {
    ProvisioningError::StateGuardViolation(format!(
        "unit '{}' requires the {} subnet, which the topology does not have",
        unit, role
    ))
}

/// Primary network and subnets
pub struct NetworkUnit {
    id: UnitId,
    control_plane: Arc<dyn ControlPlane>,
    request: TopologyRequest,
}

impl NetworkUnit {
    pub fn new(control_plane: Arc<dyn ControlPlane>, request: TopologyRequest) -> Self {
        Self {
            id: UnitId::network(),
            control_plane,
            request,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for NetworkUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Network
    }

    fn inputs(&self) -> &[UnitId] {
        &[]
    }

    async fn execute(&self, _context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        let topology = NetworkTopologyProvisioner::new(self.control_plane.as_ref())
            .provision(&self.request)
            .await?;
        Ok(UnitOutput::Topology(topology))
    }
}

/// One well-known private zone, shared by every service with its suffix
pub struct DnsZoneUnit {
    id: UnitId,
    inputs: Vec<UnitId>,
    control_plane: Arc<dyn ControlPlane>,
    request: PrivateZoneRequest,
}

impl DnsZoneUnit {
    pub fn new(control_plane: Arc<dyn ControlPlane>, request: PrivateZoneRequest) -> Self {
        Self {
            id: UnitId::dns_zone(request.name.as_str()),
            inputs: vec![UnitId::network()],
            control_plane,
            request,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for DnsZoneUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::DnsZone
    }

    fn inputs(&self) -> &[UnitId] {
        &self.inputs
    }

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        let topology = context.topology(&UnitId::network())?;
        let zone = PrivateConnectivityProvisioner::new(self.control_plane.as_ref())
            .ensure_zone(&self.request, topology.network_id())
            .await?;
        Ok(UnitOutput::DnsZone(zone))
    }
}

/// Service parameters known before the network exists
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTemplate {
    pub kind: ServiceKind,
    pub existing_resource_id: Option<String>,
    pub managed_service_id: ResourceId,
    pub endpoint_id: ResourceId,
    pub location: String,
}

/// Service, its private endpoint and the zone binding
pub struct ServiceUnit {
    id: UnitId,
    inputs: Vec<UnitId>,
    control_plane: Arc<dyn ControlPlane>,
    template: ServiceTemplate,
}

impl ServiceUnit {
    pub fn new(control_plane: Arc<dyn ControlPlane>, template: ServiceTemplate) -> Self {
        Self {
            id: UnitId::service(template.kind),
            inputs: vec![
                UnitId::network(),
                UnitId::dns_zone(template.kind.dns_zone_suffix()),
            ],
            control_plane,
            template,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for ServiceUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Service
    }

    fn inputs(&self) -> &[UnitId] {
        &self.inputs
    }

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        let topology = context.topology(&self.inputs[0])?;
        let zone = context.zone(&self.inputs[1])?;
        let subnet = topology
            .subnet(SubnetRole::PrivateEndpoint)
            .ok_or_else(|| missing_subnet(&self.id, SubnetRole::PrivateEndpoint))?;

        let request = ServiceConnectRequest {
            kind: self.template.kind,
            existing_resource_id: self.template.existing_resource_id.clone(),
            managed_service_id: self.template.managed_service_id.clone(),
            endpoint_id: self.template.endpoint_id.clone(),
            location: self.template.location.clone(),
            subnet_id: subnet.id.clone(),
        };
        let connectivity = PrivateConnectivityProvisioner::new(self.control_plane.as_ref())
            .connect(&request, zone)
            .await?;
        Ok(UnitOutput::Service(connectivity))
    }
}

/// Disables public access after the private path is in place
///
/// The service belongs to its service unit. This unit only patches
/// `publicNetworkAccess` on the service id read from that unit's published
/// output, and never creates or replaces the service itself.
pub struct LockdownUnit {
    id: UnitId,
    inputs: Vec<UnitId>,
    control_plane: Arc<dyn ControlPlane>,
}

impl LockdownUnit {
    pub fn new(control_plane: Arc<dyn ControlPlane>, kind: ServiceKind) -> Self {
        Self {
            id: UnitId::lockdown(kind),
            inputs: vec![UnitId::service(kind)],
            control_plane,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for LockdownUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Lockdown
    }

    fn inputs(&self) -> &[UnitId] {
        &self.inputs
    }

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        let connectivity = context.service(&self.inputs[0])?;
        let outcome = PrivateConnectivityProvisioner::new(self.control_plane.as_ref())
            .lockdown(connectivity)
            .await?;
        Ok(UnitOutput::Lockdown(outcome))
    }
}

/// Compute environment; skipped in the first phase of a two-phase deployment
pub struct ComputeUnit {
    id: UnitId,
    inputs: Vec<UnitId>,
    control_plane: Arc<dyn ControlPlane>,
    environment_id: ResourceId,
    location: String,
    deploy: bool,
}

impl ComputeUnit {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        environment_id: ResourceId,
        location: impl Into<String>,
        deploy: bool,
    ) -> Self {
        Self {
            id: UnitId::compute(),
            inputs: vec![UnitId::network()],
            control_plane,
            environment_id,
            location: location.into(),
            deploy,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for ComputeUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Compute
    }

    fn inputs(&self) -> &[UnitId] {
        &self.inputs
    }

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        if !self.deploy {
            info!(environment = %self.environment_id, "Compute deployment deferred to a later phase");
            return Ok(UnitOutput::Skipped {
                reason: "deployCompute is false".to_string(),
            });
        }

        let topology = context.topology(&self.inputs[0])?;
        let subnet = topology
            .subnet(SubnetRole::ComputeDelegated)
            .ok_or_else(|| missing_subnet(&self.id, SubnetRole::ComputeDelegated))?;

        let environment = provision_compute(
            self.control_plane.as_ref(),
            self.environment_id.clone(),
            &self.location,
            &subnet.id,
        )
        .await?;
        Ok(UnitOutput::Compute(environment))
    }
}

/// Internal discovery zone
pub struct DiscoveryUnit {
    id: UnitId,
    inputs: Vec<UnitId>,
    manager: InternalDiscoveryZoneManager,
    request: DiscoveryRequest,
}

impl DiscoveryUnit {
    pub fn new(manager: InternalDiscoveryZoneManager, request: DiscoveryRequest) -> Self {
        Self {
            id: UnitId::discovery(),
            inputs: vec![UnitId::network(), UnitId::compute()],
            manager,
            request,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for DiscoveryUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Discovery
    }

    fn inputs(&self) -> &[UnitId] {
        &self.inputs
    }

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        let topology = context.topology(&self.inputs[0])?;
        let compute = context.compute(&self.inputs[1])?;
        let outcome = self
            .manager
            .manage(&self.request, topology.network_id(), compute)
            .await?;
        Ok(UnitOutput::Discovery(outcome))
    }
}

/// Peering with a consumer network, which is also linked to the discovery zone
///
/// The discovery zone belongs to the discovery unit. This unit only adds a
/// link for the remote network under the zone id taken from that unit's
/// published output; the zone and its records are left untouched.
pub struct PeeringUnit {
    id: UnitId,
    inputs: Vec<UnitId>,
    manager: PeeringManager,
    control_plane: Arc<dyn ControlPlane>,
    remote_network_id: String,
    options: PeeringOptions,
}

impl PeeringUnit {
    pub fn new(
        manager: PeeringManager,
        control_plane: Arc<dyn ControlPlane>,
        remote_network_id: impl Into<String>,
        options: PeeringOptions,
    ) -> Self {
        Self {
            id: UnitId::peering(),
            inputs: vec![UnitId::network(), UnitId::discovery()],
            manager,
            control_plane,
            remote_network_id: remote_network_id.into(),
            options,
        }
    }
}

#[async_trait]
impl ProvisioningUnit for PeeringUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Peering
    }

    fn inputs(&self) -> &[UnitId] {
        &self.inputs
    }

    async fn execute(&self, context: &UnitContext) -> ProvisioningResult<UnitOutput> {
        let topology = context.topology(&self.inputs[0])?;
        let discovery = context.discovery(&self.inputs[1])?;

        let remote = self.manager.resolve_remote(&self.remote_network_id).await?;
        let result = self
            .manager
            .peer(&topology.network, &remote, self.options)
            .await?;

        let discovery_link = match &discovery.zone_id {
            Some(zone) => Some(link_zone(self.control_plane.as_ref(), zone, remote.id()).await?),
            None => {
                debug!(remote = %remote.id(), "No discovery zone this run; remote network not linked");
                None
            }
        };
        Ok(UnitOutput::Peering {
            result,
            discovery_link,
        })
    }
}
