// Copyright (c) 2025 - Cowboy AI, Inc.
//! Private Connectivity Provisioner
//!
//! One parameterized unit per dependent service, driven by [`ServiceKind`]:
//!
//! ```text
//!   zone(suffix)  ──link──▶ primary network        (one per DNS suffix)
//!        ▲
//!        │ zone group "default"
//!        │
//!   endpoint ──▶ private-endpoint subnet
//!        │
//!        └──▶ service (publicNetworkAccess = Enabled during bring-up)
//!
//!   lockdown: verify endpoint Approved + zone group bound
//!             └──▶ publicNetworkAccess = Disabled   (managed services only)
//! ```
//!
//! Lockdown is a separate step that only runs once the attachment and its
//! DNS binding are confirmed, so a service is never cut off from both its
//! public and private paths at the same time.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::control_plane::{ensure, ControlPlane, ResourceSpec};
use crate::domain::{
    ReferenceOrigin, ResourceId, ResourceKind, ResourceNamer, ResourceReference, ServiceKind,
    ZoneName,
};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::resolver::ResourceExistenceResolver;

/// Location of global DNS resources
pub const GLOBAL_LOCATION: &str = "global";

/// Name of the zone group binding an endpoint to its zone
pub const ZONE_GROUP_NAME: &str = "default";

/// Connection state reported for a usable endpoint
pub const APPROVED: &str = "Approved";

/// A network link of a private zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneLink {
    pub id: ResourceId,
    pub network_id: ResourceId,
    pub created: bool,
}

/// Idempotently link `zone` to `network` with registration disabled
///
/// The link name depends only on the network, so reruns find the link from
/// the previous run and treat it as success.
pub async fn link_zone(
    control_plane: &dyn ControlPlane,
    zone: &ResourceId,
    network: &ResourceId,
) -> ProvisioningResult<ZoneLink> {
    let id = zone.child(
        ResourceKind::PrivateDnsZoneLink,
        ResourceNamer::zone_link_name(network),
    );
    let ensured = ensure(
        control_plane,
        ResourceSpec::new(id.clone(), GLOBAL_LOCATION)
            .with_property("virtualNetworkId", network.to_string())
            .with_property("registrationEnabled", false),
    )
    .await?;

    if ensured.created {
        info!(zone = %zone.name(), network = %network, "🔗 Linked private zone");
    } else {
        debug!(link = %id, "Zone link already exists");
    }

    Ok(ZoneLink {
        id,
        network_id: network.clone(),
        created: ensured.created,
    })
}

/// Desired well-known private zone
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateZoneRequest {
    pub name: ZoneName,
    pub existing_zone_id: Option<String>,
    pub managed_zone_id: ResourceId,
}

/// A private zone and its links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateZone {
    pub name: ZoneName,
    pub zone: ResourceReference,
    pub links: Vec<ZoneLink>,
}

impl PrivateZone {
    pub fn id(&self) -> &ResourceId {
        self.zone.id()
    }
}

/// Desired private attachment for one service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConnectRequest {
    pub kind: ServiceKind,
    pub existing_resource_id: Option<String>,
    pub managed_service_id: ResourceId,
    pub endpoint_id: ResourceId,
    pub location: String,
    pub subnet_id: ResourceId,
}

/// A service reachable through a private attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConnectivity {
    pub kind: ServiceKind,
    pub service: ResourceReference,
    pub endpoint_id: ResourceId,
    pub private_ip_address: Option<String>,
    pub connection_state: Option<String>,
    pub zone_group_id: ResourceId,
    pub zone_id: ResourceId,
}

/// Result of the lockdown step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockdownState {
    /// Public network access disabled by this or a previous run
    Disabled,
    /// Service not owned by the orchestrator; left untouched
    SkippedExternal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockdownOutcome {
    pub kind: ServiceKind,
    pub service_id: ResourceId,
    pub state: LockdownState,
}

/// Provisions private attachments, their zones and the final lockdown
pub struct PrivateConnectivityProvisioner<'a> {
    control_plane: &'a dyn ControlPlane,
}

impl<'a> PrivateConnectivityProvisioner<'a> {
    pub fn new(control_plane: &'a dyn ControlPlane) -> Self {
        Self { control_plane }
    }

    /// Create or import a well-known zone and link it to `network`
    pub async fn ensure_zone(
        &self,
        request: &PrivateZoneRequest,
        network: &ResourceId,
    ) -> ProvisioningResult<PrivateZone> {
        let zone = ResourceExistenceResolver::new(self.control_plane)
            .resolve(
                request.existing_zone_id.as_deref(),
                ResourceKind::PrivateDnsZone,
                request.managed_zone_id.clone(),
                GLOBAL_LOCATION,
            )
            .await?;

        if zone.is_managed() {
            let ensured = ensure(
                self.control_plane,
                ResourceSpec::new(zone.id().clone(), GLOBAL_LOCATION),
            )
            .await?;
            if ensured.created {
                info!(zone = %request.name, "Created private zone");
            }
        }

        let link = link_zone(self.control_plane, zone.id(), network).await?;

        Ok(PrivateZone {
            name: request.name.clone(),
            zone,
            links: vec![link],
        })
    }

    /// Create the service (if managed), its endpoint and the zone binding
    pub async fn connect(
        &self,
        request: &ServiceConnectRequest,
        zone: &PrivateZone,
    ) -> ProvisioningResult<ServiceConnectivity> {
        let service = ResourceExistenceResolver::new(self.control_plane)
            .resolve(
                request.existing_resource_id.as_deref(),
                request.kind.resource_kind(),
                request.managed_service_id.clone(),
                &request.location,
            )
            .await?;

        if let ResourceReference::Managed { id, location } = &service {
            let ensured = ensure(
                self.control_plane,
                ResourceSpec::new(id.clone(), location.clone())
                    .with_property("publicNetworkAccess", "Enabled"),
            )
            .await?;
            if ensured.created {
                info!(service = %request.kind, id = %id, "Created service");
            }
        }

        let endpoint = ensure(
            self.control_plane,
            ResourceSpec::new(request.endpoint_id.clone(), request.location.clone())
                .with_property("subnetId", request.subnet_id.to_string())
                .with_property("privateLinkServiceId", service.id().to_string())
                .with_property("groupIds", json!([request.kind.group_id()])),
        )
        .await?;

        let zone_group_id = request
            .endpoint_id
            .child(ResourceKind::PrivateDnsZoneGroup, ZONE_GROUP_NAME);
        ensure(
            self.control_plane,
            ResourceSpec::new(zone_group_id.clone(), request.location.clone()).with_property(
                "privateDnsZoneConfigs",
                json!([{
                    "name": ResourceNamer::zone_config_name(&zone.name),
                    "privateDnsZoneId": zone.id().to_string(),
                }]),
            ),
        )
        .await?;

        let connectivity = ServiceConnectivity {
            kind: request.kind,
            endpoint_id: request.endpoint_id.clone(),
            private_ip_address: endpoint
                .resource
                .str_attribute("privateIpAddress")
                .map(str::to_string),
            connection_state: endpoint
                .resource
                .str_attribute("connectionState")
                .map(str::to_string),
            zone_group_id,
            zone_id: zone.id().clone(),
            service,
        };

        info!(
            service = %request.kind,
            endpoint = %connectivity.endpoint_id,
            ip = connectivity.private_ip_address.as_deref().unwrap_or("-"),
            "🔒 Private attachment bound to zone"
        );
        Ok(connectivity)
    }

    /// Disable public network access once the private path is confirmed
    pub async fn lockdown(
        &self,
        connectivity: &ServiceConnectivity,
    ) -> ProvisioningResult<LockdownOutcome> {
        let service_id = connectivity.service.id().clone();

        let endpoint = self
            .control_plane
            .get(&connectivity.endpoint_id)
            .await?
            .ok_or_else(|| {
                ProvisioningError::StateGuardViolation(format!(
                    "private endpoint {} missing; refusing to disable public access of {}",
                    connectivity.endpoint_id, service_id
                ))
            })?;
        if endpoint.str_attribute("connectionState") != Some(APPROVED) {
            return Err(ProvisioningError::StateGuardViolation(format!(
                "private endpoint {} is not approved; refusing to disable public access of {}",
                connectivity.endpoint_id, service_id
            )));
        }
        if self
            .control_plane
            .get(&connectivity.zone_group_id)
            .await?
            .is_none()
        {
            return Err(ProvisioningError::StateGuardViolation(format!(
                "DNS binding {} missing; refusing to disable public access of {}",
                connectivity.zone_group_id, service_id
            )));
        }

        if connectivity.service.origin() == ReferenceOrigin::External {
            info!(service = %service_id, "Service is not managed here; leaving public access untouched");
            return Ok(LockdownOutcome {
                kind: connectivity.kind,
                service_id,
                state: LockdownState::SkippedExternal,
            });
        }

        let current = self.control_plane.get(&service_id).await?.ok_or_else(|| {
            ProvisioningError::StateGuardViolation(format!("service {} disappeared", service_id))
        })?;
        if current.str_attribute("publicNetworkAccess") == Some("Disabled") {
            debug!(service = %service_id, "Public access already disabled");
        } else {
            self.control_plane
                .create_or_update(
                    ResourceSpec::new(service_id.clone(), current.location.clone())
                        .with_property("publicNetworkAccess", "Disabled"),
                )
                .await?;
            info!(service = %service_id, "🚫 Public network access disabled");
        }

        Ok(LockdownOutcome {
            kind: connectivity.kind,
            service_id,
            state: LockdownState::Disabled,
        })
    }
}
