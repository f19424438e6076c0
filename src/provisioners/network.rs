// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Topology Provisioner
//!
//! Creates or imports the primary network and its three role subnets.
//!
//! ```text
//! useExisting = false            useExisting = true
//! ───────────────────            ──────────────────
//! plan(parent, role) ×3          get(existing network)
//! ensure(network)                  └── parent = addressSpace[0]
//! ensure(subnet) ×3              plan(parent, role) ×3
//!                                ensure(subnet) ×3   (partial create)
//! ```
//!
//! Subnets are detected by name. An existing subnet is never mutated: its
//! address is reported as found, even when it differs from the planned one.
//! Re-running against a provisioned topology therefore issues no creates.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::OrchestrationConfig;
use crate::control_plane::{ensure, ControlPlane, ResourceSpec};
use crate::domain::{
    AddressBlock, ResourceId, ResourceKind, ResourceNamer, ResourceReference, ResourceScope,
    Subnet, SubnetRole,
};
use crate::errors::ProvisioningResult;
use crate::planner;
use crate::resolver::ResourceExistenceResolver;

/// Desired subnet
#[derive(Debug, Clone, PartialEq)]
pub struct SubnetRequest {
    pub role: SubnetRole,
    pub name: String,
    pub explicit_address: Option<AddressBlock>,
}

/// Desired network topology
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyRequest {
    pub use_existing: bool,
    pub existing_network_id: Option<String>,
    /// Identifier the network gets when it is managed
    pub managed_network_id: ResourceId,
    pub location: String,
    pub address_space: Option<AddressBlock>,
    pub subnets: Vec<SubnetRequest>,
}

impl TopologyRequest {
    pub fn from_config(
        config: &OrchestrationConfig,
        scope: &ResourceScope,
        namer: &ResourceNamer,
    ) -> Self {
        let network_name = config
            .network
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| namer.name(ResourceKind::VirtualNetwork));

        Self {
            use_existing: config.network.use_existing,
            existing_network_id: config.network.existing_network_id.clone(),
            managed_network_id: scope.resource_id(ResourceKind::VirtualNetwork, network_name),
            location: config.location.clone(),
            address_space: config.network.address_space,
            subnets: SubnetRole::ALL
                .iter()
                .map(|role| SubnetRequest {
                    role: *role,
                    name: config.network.subnets.name_for(*role),
                    explicit_address: config.network.subnets.for_role(*role).address_prefix,
                })
                .collect(),
        }
    }
}

/// A subnet as it exists after provisioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedSubnet {
    pub subnet: Subnet,
    pub id: ResourceId,
    pub created: bool,
}

/// Resolved network topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub network: ResourceReference,
    pub address_space: Option<AddressBlock>,
    pub subnets: Vec<ProvisionedSubnet>,
}

impl Topology {
    pub fn network_id(&self) -> &ResourceId {
        self.network.id()
    }

    pub fn subnet(&self, role: SubnetRole) -> Option<&ProvisionedSubnet> {
        self.subnets.iter().find(|s| s.subnet.role == role)
    }

    /// Number of subnets created by this run
    pub fn created_subnets(&self) -> usize {
        self.subnets.iter().filter(|s| s.created).count()
    }
}

/// Creates or imports the primary network topology
pub struct NetworkTopologyProvisioner<'a> {
    control_plane: &'a dyn ControlPlane,
}

impl<'a> NetworkTopologyProvisioner<'a> {
    pub fn new(control_plane: &'a dyn ControlPlane) -> Self {
        Self { control_plane }
    }

    pub async fn provision(&self, request: &TopologyRequest) -> ProvisioningResult<Topology> {
        let external_id = if request.use_existing {
            request.existing_network_id.as_deref()
        } else {
            None
        };

        let network = ResourceExistenceResolver::new(self.control_plane)
            .resolve(
                external_id,
                ResourceKind::VirtualNetwork,
                request.managed_network_id.clone(),
                &request.location,
            )
            .await?;

        let address_space = match &network {
            ResourceReference::External { id, .. } => self.read_address_space(id).await?,
            ResourceReference::Managed { .. } => request.address_space,
        };

        // Plan every address before the first create
        let mut planned = Vec::with_capacity(request.subnets.len());
        for subnet in &request.subnets {
            let address =
                planner::resolve(address_space.as_ref(), subnet.role, subnet.explicit_address)?;
            planned.push(Subnet::for_role(subnet.name.clone(), address, subnet.role));
        }

        if let ResourceReference::Managed { id, location } = &network {
            let prefixes: Vec<String> = match address_space {
                Some(parent) => vec![parent.as_cidr()],
                None => planned.iter().map(|s| s.address.as_cidr()).collect(),
            };
            let ensured = ensure(
                self.control_plane,
                ResourceSpec::new(id.clone(), location.clone())
                    .with_property("addressSpace", json!({ "addressPrefixes": prefixes })),
            )
            .await?;
            if ensured.created {
                info!(network = %id, "🌐 Created virtual network");
            }
        }

        let mut subnets = Vec::with_capacity(planned.len());
        for subnet in planned {
            subnets.push(self.ensure_subnet(network.id(), network.location(), subnet).await?);
        }

        info!(
            network = %network.id(),
            origin = ?network.origin(),
            created_subnets = subnets.iter().filter(|s| s.created).count(),
            "✅ Network topology ready"
        );

        Ok(Topology {
            network,
            address_space,
            subnets,
        })
    }

    async fn read_address_space(&self, id: &ResourceId) -> ProvisioningResult<Option<AddressBlock>> {
        let block = self
            .control_plane
            .get(id)
            .await?
            .and_then(|network| {
                network
                    .attribute("addressSpace")
                    .and_then(|space| space.get("addressPrefixes"))
                    .and_then(Value::as_array)
                    .and_then(|prefixes| {
                        prefixes
                            .iter()
                            .filter_map(Value::as_str)
                            .find_map(|p| AddressBlock::new(p).ok())
                    })
            });
        if block.is_none() {
            warn!(network = %id, "Imported network has no readable address space");
        }
        Ok(block)
    }

    async fn ensure_subnet(
        &self,
        network: &ResourceId,
        location: &str,
        planned: Subnet,
    ) -> ProvisioningResult<ProvisionedSubnet> {
        let id = network.child(ResourceKind::Subnet, planned.name.clone());

        let mut spec = ResourceSpec::new(id.clone(), location)
            .with_property("addressPrefix", planned.address.as_cidr());
        if let Some(delegation) = &planned.delegation {
            spec = spec.with_property(
                "delegations",
                json!([{ "name": "delegation", "serviceName": delegation.service_name }]),
            );
        }
        if planned.role == SubnetRole::PrivateEndpoint {
            spec = spec.with_property("privateEndpointNetworkPolicies", "Disabled");
        }

        let ensured = ensure(self.control_plane, spec).await?;

        let subnet = if ensured.created {
            info!(subnet = %id, address = %planned.address, role = %planned.role, "Created subnet");
            planned
        } else {
            let found = ensured
                .resource
                .str_attribute("addressPrefix")
                .and_then(|p| AddressBlock::new(p).ok());
            match found {
                Some(address) if address != planned.address => {
                    warn!(
                        subnet = %id,
                        existing = %address,
                        planned = %planned.address,
                        "Existing subnet address differs from plan; keeping existing address"
                    );
                    Subnet { address, ..planned }
                }
                _ => {
                    debug!(subnet = %id, "Subnet already exists");
                    planned
                }
            }
        };

        Ok(ProvisionedSubnet {
            subnet,
            id,
            created: ensured.created,
        })
    }
}
