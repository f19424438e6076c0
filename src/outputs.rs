// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Outputs
//!
//! The contract consumed by the application deployment step. Field names are
//! stable; the discovery zone name is an empty string when it is not known
//! yet, which consumers treat as "query later".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryZoneState;
use crate::domain::{ResourceId, SubnetRole};
use crate::errors::ProvisioningResult;
use crate::orchestrator::{RunReport, UnitOutput};
use crate::peering::{PeeringHealth, PeeringState, RemotePeeringRequest};
use crate::provisioners::LockdownState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetOutput {
    pub id: ResourceId,
    pub address_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOutput {
    pub service_id: ResourceId,
    pub private_endpoint_id: ResourceId,
    pub private_dns_zone_id: ResourceId,
    pub private_ip_address: Option<String>,
    /// `None` when the service keeps public access (transitional bring-up)
    pub lockdown: Option<LockdownState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOutput {
    pub id: Option<ResourceId>,
    pub default_domain: String,
    pub static_ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOutput {
    pub state: DiscoveryZoneState,
    /// Empty when unresolved this run
    pub zone_name: String,
    pub zone_id: Option<ResourceId>,
    pub linked_network_ids: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeeringOutput {
    pub local_state: PeeringState,
    pub remote_state: PeeringState,
    pub health: PeeringHealth,
    pub local_peering_id: Option<ResourceId>,
    pub remote_peering_id: ResourceId,
    pub remote_request: Option<RemotePeeringRequest>,
}

/// Published outputs of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutputs {
    pub network_id: Option<ResourceId>,
    pub network_name: String,
    /// Keyed by subnet role
    pub subnets: BTreeMap<String, SubnetOutput>,
    /// Keyed by service key
    pub services: BTreeMap<String, ServiceOutput>,
    pub compute: ComputeOutput,
    pub discovery: DiscoveryOutput,
    pub peering: Option<PeeringOutput>,
    pub deferred_operations: Vec<String>,
}

impl DeploymentOutputs {
    pub fn from_report(report: &RunReport) -> Self {
        let mut outputs = Self {
            network_id: None,
            network_name: String::new(),
            subnets: BTreeMap::new(),
            services: BTreeMap::new(),
            compute: ComputeOutput {
                id: None,
                default_domain: String::new(),
                static_ip: String::new(),
            },
            discovery: DiscoveryOutput {
                state: DiscoveryZoneState::Disabled,
                zone_name: String::new(),
                zone_id: None,
                linked_network_ids: Vec::new(),
            },
            peering: None,
            deferred_operations: report
                .deferred_operations
                .iter()
                .map(|(_, operation)| operation.clone())
                .collect(),
        };

        let mut lockdowns = BTreeMap::new();

        // Completion order keeps service entries ahead of their lockdowns
        for unit in &report.completed {
            let Some(output) = report.output(unit) else {
                continue;
            };
            match output {
                UnitOutput::Topology(topology) => {
                    outputs.network_id = Some(topology.network_id().clone());
                    outputs.network_name = topology.network_id().name().to_string();
                    for role in SubnetRole::ALL {
                        if let Some(subnet) = topology.subnet(role) {
                            outputs.subnets.insert(
                                role.to_string(),
                                SubnetOutput {
                                    id: subnet.id.clone(),
                                    address_prefix: subnet.subnet.address.to_string(),
                                },
                            );
                        }
                    }
                }
                UnitOutput::Service(connectivity) => {
                    outputs.services.insert(
                        connectivity.kind.key().to_string(),
                        ServiceOutput {
                            service_id: connectivity.service.id().clone(),
                            private_endpoint_id: connectivity.endpoint_id.clone(),
                            private_dns_zone_id: connectivity.zone_id.clone(),
                            private_ip_address: connectivity.private_ip_address.clone(),
                            lockdown: None,
                        },
                    );
                }
                UnitOutput::Lockdown(outcome) => {
                    lockdowns.insert(outcome.kind.key().to_string(), outcome.state);
                }
                UnitOutput::Compute(environment) => {
                    outputs.compute = ComputeOutput {
                        id: Some(environment.id.clone()),
                        default_domain: environment.default_domain.clone().unwrap_or_default(),
                        static_ip: environment
                            .static_ip
                            .map(|ip| ip.to_string())
                            .unwrap_or_default(),
                    };
                }
                UnitOutput::Discovery(outcome) => {
                    outputs.discovery = DiscoveryOutput {
                        state: outcome.state.clone(),
                        zone_name: outcome.zone_name(),
                        zone_id: outcome.zone_id.clone(),
                        linked_network_ids: outcome.links.iter().map(|l| l.network_id.clone()).collect(),
                    };
                }
                UnitOutput::Peering {
                    result,
                    discovery_link,
                } => {
                    if let Some(link) = discovery_link {
                        if !outputs.discovery.linked_network_ids.contains(&link.network_id) {
                            outputs.discovery.linked_network_ids.push(link.network_id.clone());
                        }
                    }
                    outputs.peering = Some(PeeringOutput {
                        local_state: result.local_state,
                        remote_state: result.remote_state,
                        health: result.health(),
                        local_peering_id: result.local_peering_id.clone(),
                        remote_peering_id: result.remote_peering_id.clone(),
                        remote_request: result.remote_request.clone(),
                    });
                }
                UnitOutput::DnsZone(_) | UnitOutput::Skipped { .. } => {}
            }
        }

        for (key, state) in lockdowns {
            if let Some(service) = outputs.services.get_mut(&key) {
                service.lockdown = Some(state);
            }
        }

        outputs
    }

    pub fn to_json(&self) -> ProvisioningResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
