// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Memory Control Plane
//!
//! A faithful in-process control plane. It keeps resources in a map, records
//! every call for inspection, and assigns the platform attributes the
//! orchestrator reads back after creation:
//!
//! - compute environments get a `defaultDomain` and a `staticIp`
//! - private endpoints get a `privateIpAddress` and an approved connection
//! - peerings get a `peeringState` that becomes `Connected` for both
//!   directions once the reverse peering exists
//!
//! Scopes can be marked read-only to simulate missing write permission, and
//! per-kind latency can be injected to exercise deferred-operation timeouts.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ControlPlane, ControlPlaneError, ControlPlaneResult, Resource, ResourceSpec};
use crate::domain::naming::resource_token;
use crate::domain::{AddressBlock, ResourceId, ResourceKind};

/// Recorded call kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Get,
    CreateOrUpdate,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneCall {
    pub kind: CallKind,
    pub id: ResourceId,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, Resource>,
    calls: Vec<ControlPlaneCall>,
}

/// In-process [`ControlPlane`] implementation
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: Mutex<MemoryState>,
    denied_scopes: Vec<String>,
    latency: BTreeMap<ResourceKind, Duration>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes in a resource group
    pub fn with_denied_scope(mut self, subscription_id: &str, resource_group: &str) -> Self {
        self.denied_scopes
            .push(scope_key(subscription_id, resource_group));
        self
    }

    /// Delay every create of `kind`
    pub fn with_latency(mut self, kind: ResourceKind, delay: Duration) -> Self {
        self.latency.insert(kind, delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a pre-existing resource without recording a call
    pub fn insert(&self, resource: Resource) {
        self.lock().resources.insert(resource.id.key(), resource);
    }

    /// Current state of a resource without recording a call
    pub fn resource(&self, id: &ResourceId) -> Option<Resource> {
        self.lock().resources.get(&id.key()).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.lock().calls.clone()
    }

    /// Ids targeted by create-or-update calls, including rejected ones
    pub fn create_calls(&self) -> Vec<ResourceId> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind == CallKind::CreateOrUpdate)
            .map(|call| call.id.clone())
            .collect()
    }

    pub fn create_count(&self) -> usize {
        self.create_calls().len()
    }

    /// Create-or-update calls that targeted a resource group
    pub fn creates_in_scope(&self, subscription_id: &str, resource_group: &str) -> usize {
        let key = scope_key(subscription_id, resource_group);
        self.create_calls()
            .iter()
            .filter(|id| scope_key(id.subscription_id(), id.resource_group()) == key)
            .count()
    }

    /// Create-or-update calls for a resource kind
    pub fn creates_of(&self, kind: ResourceKind) -> usize {
        self.create_calls()
            .iter()
            .filter(|id| id.kind() == Some(kind))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn get(&self, id: &ResourceId) -> ControlPlaneResult<Option<Resource>> {
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall {
            kind: CallKind::Get,
            id: id.clone(),
        });
        Ok(state.resources.get(&id.key()).cloned())
    }

    async fn create_or_update(&self, spec: ResourceSpec) -> ControlPlaneResult<Resource> {
        let kind = spec.id.kind();

        if let Some(delay) = kind.and_then(|k| self.latency.get(&k)).copied() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.push(ControlPlaneCall {
            kind: CallKind::CreateOrUpdate,
            id: spec.id.clone(),
        });

        let scope = scope_key(spec.id.subscription_id(), spec.id.resource_group());
        if self.denied_scopes.contains(&scope) {
            return Err(ControlPlaneError::Forbidden {
                scope: format!(
                    "/subscriptions/{}/resourceGroups/{}",
                    spec.id.subscription_id(),
                    spec.id.resource_group()
                ),
                operation: "write".to_string(),
            });
        }

        if let Some(parent) = spec.id.parent() {
            if !state.resources.contains_key(&parent.key()) {
                return Err(ControlPlaneError::NotFound(parent.to_string()));
            }
        }

        let existing = state.resources.get(&spec.id.key()).cloned();
        let mut properties = existing
            .as_ref()
            .map(|r| r.properties.clone())
            .unwrap_or_default();
        for (key, value) in spec.properties {
            properties.insert(key, value);
        }
        properties.insert("provisioningState".into(), json!("Succeeded"));

        match kind {
            Some(ResourceKind::Subnet) if existing.is_none() => {
                check_subnet_overlap(&state, &spec.id, &properties)?;
            }
            Some(ResourceKind::ComputeEnvironment) => {
                assign_compute_attributes(&state, &spec.id, &spec.location, &mut properties)?;
            }
            Some(ResourceKind::PrivateEndpoint) if existing.is_none() => {
                assign_endpoint_attributes(&state, &mut properties)?;
            }
            Some(ResourceKind::VirtualNetworkPeering) => {
                link_peering(&mut state, &spec.id, &mut properties);
            }
            _ => {}
        }

        let resource = Resource {
            id: spec.id.clone(),
            location: spec.location,
            properties,
        };
        debug!(id = %resource.id, created = existing.is_none(), "In-memory create_or_update");
        state.resources.insert(spec.id.key(), resource.clone());
        Ok(resource)
    }
}

fn scope_key(subscription_id: &str, resource_group: &str) -> String {
    format!("{}/{}", subscription_id, resource_group).to_lowercase()
}

fn children_of<'a>(
    state: &'a MemoryState,
    parent: &'a ResourceId,
    kind: ResourceKind,
) -> impl Iterator<Item = &'a Resource> + 'a {
    state.resources.values().filter(move |r| {
        r.id.kind() == Some(kind) && r.id.parent().as_ref() == Some(parent)
    })
}

fn subnet_prefix(resource: &Resource) -> Option<AddressBlock> {
    resource
        .str_attribute("addressPrefix")
        .and_then(|p| AddressBlock::new(p).ok())
}

fn check_subnet_overlap(
    state: &MemoryState,
    id: &ResourceId,
    properties: &Map<String, Value>,
) -> ControlPlaneResult<()> {
    let prefix = properties
        .get("addressPrefix")
        .and_then(Value::as_str)
        .and_then(|p| AddressBlock::new(p).ok())
        .ok_or_else(|| ControlPlaneError::Backend(format!("subnet {} has no valid addressPrefix", id)))?;

    let Some(network) = id.parent() else {
        return Ok(());
    };
    for sibling in children_of(state, &network, ResourceKind::Subnet) {
        if let Some(other) = subnet_prefix(sibling) {
            if other.overlaps(&prefix) {
                return Err(ControlPlaneError::Backend(format!(
                    "subnet {} ({}) overlaps {} ({})",
                    id.name(),
                    prefix,
                    sibling.id.name(),
                    other
                )));
            }
        }
    }
    Ok(())
}

fn referenced_subnet(
    state: &MemoryState,
    properties: &Map<String, Value>,
    key: &str,
) -> ControlPlaneResult<(ResourceId, AddressBlock)> {
    let subnet_id = properties
        .get(key)
        .and_then(Value::as_str)
        .and_then(|id| ResourceId::parse(id).ok())
        .ok_or_else(|| ControlPlaneError::Backend(format!("missing or invalid '{}'", key)))?;
    let subnet = state
        .resources
        .get(&subnet_id.key())
        .ok_or_else(|| ControlPlaneError::NotFound(subnet_id.to_string()))?;
    let prefix = subnet_prefix(subnet)
        .ok_or_else(|| ControlPlaneError::Backend(format!("subnet {} has no addressPrefix", subnet_id)))?;
    Ok((subnet_id, prefix))
}

fn assign_compute_attributes(
    state: &MemoryState,
    id: &ResourceId,
    location: &str,
    properties: &mut Map<String, Value>,
) -> ControlPlaneResult<()> {
    if !properties.contains_key("defaultDomain") {
        let token = resource_token(&[&id.key()]);
        properties.insert(
            "defaultDomain".into(),
            json!(format!("{}.{}.azurecontainerapps.io", &token[..10], location.to_lowercase())),
        );
    }
    if !properties.contains_key("staticIp") {
        let (_, prefix) = referenced_subnet(state, properties, "infrastructureSubnetId")?;
        let ip = prefix
            .host(4)
            .ok_or_else(|| ControlPlaneError::Backend(format!("subnet {} too small", prefix)))?;
        properties.insert("staticIp".into(), json!(ip.to_string()));
    }
    Ok(())
}

fn assign_endpoint_attributes(
    state: &MemoryState,
    properties: &mut Map<String, Value>,
) -> ControlPlaneResult<()> {
    let target = properties
        .get("privateLinkServiceId")
        .and_then(Value::as_str)
        .and_then(|id| ResourceId::parse(id).ok())
        .ok_or_else(|| ControlPlaneError::Backend("missing 'privateLinkServiceId'".into()))?;
    if !state.resources.contains_key(&target.key()) {
        return Err(ControlPlaneError::NotFound(target.to_string()));
    }

    let (subnet_id, prefix) = referenced_subnet(state, properties, "subnetId")?;
    let in_use = state
        .resources
        .values()
        .filter(|r| r.id.kind() == Some(ResourceKind::PrivateEndpoint))
        .filter(|r| {
            r.str_attribute("subnetId")
                .and_then(|s| ResourceId::parse(s).ok())
                .as_ref()
                == Some(&subnet_id)
        })
        .count();
    let offset = u32::try_from(in_use + 4).unwrap_or(u32::MAX);
    let ip = prefix
        .host(offset)
        .ok_or_else(|| ControlPlaneError::Backend(format!("subnet {} exhausted", prefix)))?;

    properties.insert("privateIpAddress".into(), json!(ip.to_string()));
    properties.insert("connectionState".into(), json!("Approved"));
    Ok(())
}

fn link_peering(state: &mut MemoryState, id: &ResourceId, properties: &mut Map<String, Value>) {
    let local_network = id.parent();
    let remote_network = properties
        .get("remoteVirtualNetworkId")
        .and_then(Value::as_str)
        .and_then(|r| ResourceId::parse(r).ok());

    let (Some(local_network), Some(remote_network)) = (local_network, remote_network) else {
        properties.insert("peeringState".into(), json!("Disconnected"));
        return;
    };

    let reverse_key = state
        .resources
        .values()
        .filter(|r| r.id.kind() == Some(ResourceKind::VirtualNetworkPeering))
        .filter(|r| r.id.parent().as_ref() == Some(&remote_network))
        .find(|r| {
            r.str_attribute("remoteVirtualNetworkId")
                .and_then(|s| ResourceId::parse(s).ok())
                .as_ref()
                == Some(&local_network)
        })
        .map(|r| r.id.key());

    match reverse_key.and_then(|key| state.resources.get_mut(&key)) {
        Some(reverse) => {
            reverse
                .properties
                .insert("peeringState".into(), json!("Connected"));
            properties.insert("peeringState".into(), json!("Connected"));
        }
        None => {
            properties.insert("peeringState".into(), json!("Initiated"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::ensure;
    use crate::domain::ResourceScope;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn scope(rg: &str) -> ResourceScope {
        ResourceScope::new(SUB, rg).unwrap()
    }

    async fn network_with_subnet(plane: &InMemoryControlPlane, rg: &str, name: &str) -> ResourceId {
        let vnet = scope(rg).resource_id(ResourceKind::VirtualNetwork, name);
        plane
            .create_or_update(ResourceSpec::new(vnet.clone(), "eastus"))
            .await
            .unwrap();
        plane
            .create_or_update(
                ResourceSpec::new(vnet.child(ResourceKind::Subnet, "snet"), "eastus")
                    .with_property("addressPrefix", "10.0.1.0/24"),
            )
            .await
            .unwrap();
        vnet
    }

    #[tokio::test]
    async fn test_child_requires_parent() {
        let plane = InMemoryControlPlane::new();
        let vnet = scope("rg").resource_id(ResourceKind::VirtualNetwork, "vnet");
        let err = plane
            .create_or_update(
                ResourceSpec::new(vnet.child(ResourceKind::Subnet, "snet"), "eastus")
                    .with_property("addressPrefix", "10.0.0.0/24"),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ControlPlaneError::NotFound(vnet.to_string()));
    }

    #[tokio::test]
    async fn test_overlapping_subnets_are_rejected() {
        let plane = InMemoryControlPlane::new();
        let vnet = network_with_subnet(&plane, "rg", "vnet").await;
        let err = plane
            .create_or_update(
                ResourceSpec::new(vnet.child(ResourceKind::Subnet, "other"), "eastus")
                    .with_property("addressPrefix", "10.0.0.0/23"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::Backend(_)));
    }

    #[tokio::test]
    async fn test_compute_environment_gets_domain_and_ip() {
        let plane = InMemoryControlPlane::new();
        let vnet = network_with_subnet(&plane, "rg", "vnet").await;
        let env = scope("rg").resource_id(ResourceKind::ComputeEnvironment, "cae");

        let resource = plane
            .create_or_update(
                ResourceSpec::new(env, "EastUS").with_property(
                    "infrastructureSubnetId",
                    vnet.child(ResourceKind::Subnet, "snet").to_string(),
                ),
            )
            .await
            .unwrap();

        let domain = resource.str_attribute("defaultDomain").unwrap();
        assert!(domain.ends_with(".eastus.azurecontainerapps.io"));
        assert_eq!(resource.str_attribute("staticIp"), Some("10.0.1.4"));
    }

    #[tokio::test]
    async fn test_peering_connects_when_both_sides_exist() {
        let plane = InMemoryControlPlane::new();
        let hub = network_with_subnet(&plane, "rg-hub", "hub").await;
        let spoke = network_with_subnet(&plane, "rg-spoke", "spoke").await;

        let forward = hub.child(ResourceKind::VirtualNetworkPeering, "hub-to-spoke");
        let reverse = spoke.child(ResourceKind::VirtualNetworkPeering, "spoke-to-hub");

        let first = plane
            .create_or_update(
                ResourceSpec::new(forward.clone(), "eastus")
                    .with_property("remoteVirtualNetworkId", spoke.to_string()),
            )
            .await
            .unwrap();
        assert_eq!(first.str_attribute("peeringState"), Some("Initiated"));

        plane
            .create_or_update(
                ResourceSpec::new(reverse, "eastus")
                    .with_property("remoteVirtualNetworkId", hub.to_string()),
            )
            .await
            .unwrap();

        let forward_now = plane.resource(&forward).unwrap();
        assert_eq!(forward_now.str_attribute("peeringState"), Some("Connected"));
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let plane = InMemoryControlPlane::new();
        let zone = scope("rg").resource_id(ResourceKind::PrivateDnsZone, "privatelink.azurecr.io");
        ensure(&plane, ResourceSpec::new(zone.clone(), "global"))
            .await
            .unwrap();

        assert_eq!(plane.create_calls(), vec![zone]);
        assert_eq!(plane.creates_of(ResourceKind::PrivateDnsZone), 1);
        assert_eq!(plane.creates_in_scope(SUB, "rg"), 1);
        assert_eq!(plane.creates_in_scope(SUB, "other"), 0);
    }
}
