// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-private-network
//!
//! Deterministic deployment identities, configuration documents and a seeded
//! in-memory control plane. Identifiers are fixed constants so resource names
//! and tokens are reproducible across runs.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Map};

use cim_private_network::config::{DiscoveryMode, PeeringConfig, PublicNetworkAccess, ServiceConfig};
use cim_private_network::control_plane::Resource;
use cim_private_network::domain::{ResourceId, ResourceKind, ResourceScope, ServiceKind};
use cim_private_network::{
    CollectingSink, ControlPlane, InMemoryControlPlane, OrchestrationConfig,
    ProvisioningOrchestrator, ProvisioningPlan, RunFailure, RunReport,
};

pub const SUBSCRIPTION_ID: &str = "6f1c2a9e-0000-4000-8000-00000000a001";
pub const RESOURCE_GROUP: &str = "rg-contoso-dev";
pub const ENVIRONMENT: &str = "contoso-dev";
pub const LOCATION: &str = "eastus";

pub const HUB_SUBSCRIPTION_ID: &str = "6f1c2a9e-0000-4000-8000-00000000b002";
pub const HUB_RESOURCE_GROUP: &str = "rg-hub";
pub const HUB_NETWORK: &str = "vnet-hub";

pub const DISCOVERY_ZONE: &str = "internal.contoso.dev";

pub fn scope() -> ResourceScope {
    ResourceScope::new(SUBSCRIPTION_ID, RESOURCE_GROUP).expect("Invalid fixture scope")
}

pub fn hub_scope() -> ResourceScope {
    ResourceScope::new(HUB_SUBSCRIPTION_ID, HUB_RESOURCE_GROUP).expect("Invalid hub scope")
}

pub fn hub_network_id() -> ResourceId {
    hub_scope().resource_id(ResourceKind::VirtualNetwork, HUB_NETWORK)
}

/// Deployment with default network and nothing else
pub fn base_config() -> OrchestrationConfig {
    OrchestrationConfig::new(ENVIRONMENT, LOCATION, SUBSCRIPTION_ID, RESOURCE_GROUP)
}

pub fn service(kind: ServiceKind) -> ServiceConfig {
    ServiceConfig {
        kind,
        name: None,
        existing_resource_id: None,
    }
}

/// Two managed services behind private endpoints, public access locked down
pub fn private_services_config() -> OrchestrationConfig {
    let mut config = base_config();
    config.services = vec![service(ServiceKind::KeyVault), service(ServiceKind::StorageBlob)];
    config.public_network_access = PublicNetworkAccess::Disabled;
    config
}

/// Every unit enabled: services, compute, explicit discovery and hub peering
pub fn full_config() -> OrchestrationConfig {
    let mut config = private_services_config();
    config.discovery.master_enabled = true;
    config.discovery.mode = DiscoveryMode::Explicit;
    config.discovery.zone_name = Some(DISCOVERY_ZONE.to_string());
    let mut peering = PeeringConfig::new(hub_network_id().to_string());
    peering.create_remote_to_primary = true;
    peering.remote_write_permission = true;
    config.peering = Some(peering);
    config
}

pub fn control_plane() -> Arc<InMemoryControlPlane> {
    Arc::new(InMemoryControlPlane::new())
}

/// Seed the hub network a peering targets
pub fn seed_hub_network(plane: &InMemoryControlPlane) -> ResourceId {
    let id = hub_network_id();
    let mut properties = Map::new();
    properties.insert(
        "addressSpace".into(),
        json!({ "addressPrefixes": ["10.100.0.0/16"] }),
    );
    plane.insert(Resource {
        id: id.clone(),
        location: LOCATION.to_string(),
        properties,
    });
    id
}

/// Seed a resource that exists before the run
pub fn seed(plane: &InMemoryControlPlane, id: &ResourceId, properties: serde_json::Value) {
    let properties = match properties {
        serde_json::Value::Object(map) => map,
        _ => Map::new(),
    };
    plane.insert(Resource {
        id: id.clone(),
        location: LOCATION.to_string(),
        properties,
    });
}

/// Build the standard plan and run it, collecting run events
pub async fn run(
    config: &OrchestrationConfig,
    plane: &Arc<InMemoryControlPlane>,
) -> (Result<RunReport, RunFailure>, Arc<CollectingSink>) {
    let control_plane: Arc<dyn ControlPlane> = plane.clone();
    let plan = ProvisioningPlan::from_config(config, control_plane).expect("Invalid plan");
    let sink = Arc::new(CollectingSink::new());
    let result = ProvisioningOrchestrator::with_sink(sink.clone()).run(&plan).await;
    (result, sink)
}
