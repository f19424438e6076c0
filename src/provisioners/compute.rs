// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compute Environment Boundary
//!
//! The compute environment itself belongs to the application deployment.
//! Provisioning only creates the environment shell on the delegated subnet
//! and reads back the two platform-assigned attributes the discovery zone
//! depends on: the default domain and the static ingress address.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::control_plane::{ensure, ControlPlane, Resource, ResourceSpec};
use crate::domain::ResourceId;
use crate::errors::ProvisioningResult;

/// Compute environment as read back after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironment {
    pub id: ResourceId,
    pub default_domain: Option<String>,
    pub static_ip: Option<Ipv4Addr>,
    pub created: bool,
}

impl ComputeEnvironment {
    pub fn from_resource(resource: &Resource, created: bool) -> Self {
        Self {
            id: resource.id.clone(),
            default_domain: resource.str_attribute("defaultDomain").map(str::to_string),
            static_ip: resource
                .str_attribute("staticIp")
                .and_then(|ip| ip.parse().ok()),
            created,
        }
    }
}

/// Create the environment on the compute-delegated subnet
pub async fn provision_compute(
    control_plane: &dyn ControlPlane,
    id: ResourceId,
    location: &str,
    infrastructure_subnet: &ResourceId,
) -> ProvisioningResult<ComputeEnvironment> {
    let ensured = ensure(
        control_plane,
        ResourceSpec::new(id, location)
            .with_property("infrastructureSubnetId", infrastructure_subnet.to_string())
            .with_property("internal", true),
    )
    .await?;

    let environment = ComputeEnvironment::from_resource(&ensured.resource, ensured.created);
    info!(
        environment = %environment.id,
        domain = environment.default_domain.as_deref().unwrap_or("-"),
        created = environment.created,
        "🖥️ Compute environment ready"
    );
    Ok(environment)
}
