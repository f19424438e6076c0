// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Peering
//!
//! Bidirectional peering between the primary network and an external
//! consumer network (e.g. an API gateway's network).
//!
//! ```text
//! primary ──(local, synchronous)──▶ remote
//! primary ◀─(remote side)────────── remote
//!              ├── remoteWritePermission      → synchronous create
//!              ├── no permission              → deferred create (bounded)
//!              └── createRemoteToPrimary=false → no call, out-of-band request
//! ```
//!
//! Both directions are reported separately. A half-connected peering is a
//! distinct, diagnosable state, not a boolean `false`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PeeringConfig;
use crate::control_plane::{ensure, ControlPlane, ControlPlaneError, Resource, ResourceSpec};
use crate::deferred::DeferredExecutor;
use crate::domain::{ResourceId, ResourceKind, ResourceNamer, ResourceReference};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::resolver::parse_external;

/// State of one peering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeeringState {
    /// Direction not requested by configuration
    NotRequested,
    /// Must be created by someone with permission on the remote network
    PendingOutOfBand,
    /// Created; waiting for the opposite direction
    Initiated,
    Connected,
    Disconnected,
}

impl PeeringState {
    fn observed(resource: &Resource) -> Self {
        match resource.str_attribute("peeringState") {
            Some(s) if s.eq_ignore_ascii_case("connected") => Self::Connected,
            Some(s) if s.eq_ignore_ascii_case("initiated") => Self::Initiated,
            _ => Self::Disconnected,
        }
    }
}

/// Overall peering health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeeringHealth {
    /// Both directions connected; cross-network resolution works
    Connected,
    /// One direction only: valid but not functional
    Partial,
    NotPeered,
}

/// Peering flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeeringOptions {
    pub create_local_to_remote: bool,
    pub create_remote_to_primary: bool,
    pub remote_write_permission: bool,
    pub allow_forwarded_traffic: bool,
    pub allow_gateway_transit: bool,
    pub use_remote_gateways: bool,
    pub require_connected: bool,
}

impl From<&PeeringConfig> for PeeringOptions {
    fn from(config: &PeeringConfig) -> Self {
        Self {
            create_local_to_remote: config.create_local_to_remote,
            create_remote_to_primary: config.create_remote_to_primary,
            remote_write_permission: config.remote_write_permission,
            allow_forwarded_traffic: config.allow_forwarded_traffic,
            allow_gateway_transit: config.allow_gateway_transit,
            use_remote_gateways: config.use_remote_gateways,
            require_connected: config.require_connected,
        }
    }
}

/// Remote-side operation an operator with permission must perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePeeringRequest {
    pub remote_subscription_id: String,
    pub remote_resource_group: String,
    pub remote_network_name: String,
    pub peering_name: String,
    pub primary_network_id: ResourceId,
    pub allow_forwarded_traffic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeeringResult {
    pub local_state: PeeringState,
    pub remote_state: PeeringState,
    pub local_peering_id: Option<ResourceId>,
    pub remote_peering_id: ResourceId,
    pub remote_request: Option<RemotePeeringRequest>,
    /// The remote side went through the deferred executor
    pub deferred: bool,
}

impl PeeringResult {
    pub fn health(&self) -> PeeringHealth {
        use PeeringState::*;
        match (self.local_state, self.remote_state) {
            (Connected, Connected) => PeeringHealth::Connected,
            (NotRequested | Disconnected, NotRequested | PendingOutOfBand | Disconnected) => {
                PeeringHealth::NotPeered
            }
            _ => PeeringHealth::Partial,
        }
    }
}

/// Establishes peering between the primary and a remote network
pub struct PeeringManager {
    control_plane: Arc<dyn ControlPlane>,
    deferred: DeferredExecutor,
}

impl PeeringManager {
    pub fn new(control_plane: Arc<dyn ControlPlane>, deferred: DeferredExecutor) -> Self {
        Self {
            control_plane,
            deferred,
        }
    }

    /// Resolve the remote network; it must already exist
    pub async fn resolve_remote(&self, remote_network_id: &str) -> ProvisioningResult<ResourceReference> {
        let id = parse_external(Some(remote_network_id), ResourceKind::VirtualNetwork)?.ok_or_else(|| {
            ProvisioningError::Configuration("peering requires a remote network identifier".into())
        })?;
        let network = self
            .control_plane
            .get(&id)
            .await?
            .ok_or_else(|| ControlPlaneError::NotFound(id.to_string()))?;
        Ok(ResourceReference::External {
            id,
            location: network.location,
        })
    }

    pub async fn peer(
        &self,
        primary: &ResourceReference,
        remote: &ResourceReference,
        options: PeeringOptions,
    ) -> ProvisioningResult<PeeringResult> {
        let primary_id = primary.id();
        let remote_id = remote.id();

        let local_peering_id = primary_id.child(
            ResourceKind::VirtualNetworkPeering,
            ResourceNamer::peering_name(primary_id, remote_id),
        );
        let remote_peering_name = ResourceNamer::peering_name(remote_id, primary_id);
        let remote_peering_id =
            remote_id.child(ResourceKind::VirtualNetworkPeering, remote_peering_name.clone());

        let local_spec = peering_spec(&local_peering_id, primary.location(), remote_id, &options, false);

        if options.create_local_to_remote {
            let ensured = ensure(self.control_plane.as_ref(), local_spec).await?;
            info!(
                peering = %local_peering_id,
                state = ?PeeringState::observed(&ensured.resource),
                "🔀 Local peering ensured"
            );
        }

        let mut remote_request = None;
        let remote_state = if !options.create_remote_to_primary {
            // Observe only: an operator may already have created it
            match self.control_plane.get(&remote_peering_id).await? {
                Some(existing) => PeeringState::observed(&existing),
                None => {
                    info!(
                        peering = %remote_peering_id,
                        "Remote peering left to an operator with permission on the remote network"
                    );
                    remote_request = Some(RemotePeeringRequest {
                        remote_subscription_id: remote_id.subscription_id().to_string(),
                        remote_resource_group: remote_id.resource_group().to_string(),
                        remote_network_name: remote_id.name().to_string(),
                        peering_name: remote_peering_name,
                        primary_network_id: primary_id.clone(),
                        allow_forwarded_traffic: options.allow_forwarded_traffic,
                    });
                    PeeringState::PendingOutOfBand
                }
            }
        } else {
            let spec = peering_spec(&remote_peering_id, remote.location(), primary_id, &options, true);
            let resource = if options.remote_write_permission {
                ensure(self.control_plane.as_ref(), spec).await?.resource
            } else {
                let control_plane = Arc::clone(&self.control_plane);
                self.deferred
                    .run("remote-peering", async move {
                        ensure_remote_peering(control_plane.as_ref(), spec).await
                    })
                    .await?
            };
            PeeringState::observed(&resource)
        };

        let local_state = if options.create_local_to_remote {
            match self.control_plane.get(&local_peering_id).await? {
                Some(resource) => PeeringState::observed(&resource),
                None => PeeringState::Disconnected,
            }
        } else {
            PeeringState::NotRequested
        };

        let result = PeeringResult {
            local_state,
            remote_state,
            local_peering_id: options.create_local_to_remote.then_some(local_peering_id),
            remote_peering_id,
            remote_request,
            deferred: options.create_remote_to_primary && !options.remote_write_permission,
        };

        match result.health() {
            PeeringHealth::Connected => {
                info!(remote = %remote_id, "✅ Peering connected in both directions");
            }
            health if options.require_connected => {
                return Err(ProvisioningError::StateGuardViolation(format!(
                    "peering with {} is {:?} (local {:?}, remote {:?}) but must be connected",
                    remote_id, health, result.local_state, result.remote_state
                )));
            }
            PeeringHealth::Partial => {
                warn!(
                    remote = %remote_id,
                    local = ?result.local_state,
                    remote_side = ?result.remote_state,
                    "Peering is partial; cross-network resolution is not guaranteed"
                );
            }
            PeeringHealth::NotPeered => debug!(remote = %remote_id, "No peering requested"),
        }

        Ok(result)
    }
}

/// Deferred remote-side operation: skip if a same-named peering exists
async fn ensure_remote_peering(
    control_plane: &dyn ControlPlane,
    spec: ResourceSpec,
) -> ProvisioningResult<Resource> {
    debug!(
        resource_group = spec.id.resource_group(),
        network = spec.id.parent().map(|p| p.name().to_string()).unwrap_or_default(),
        peering = spec.id.name(),
        "Resolving remote peering"
    );
    let ensured = ensure(control_plane, spec).await?;
    if !ensured.created {
        info!(peering = %ensured.resource.id, "Remote peering already exists");
    }
    Ok(ensured.resource)
}

fn peering_spec(
    id: &ResourceId,
    location: &str,
    remote_network: &ResourceId,
    options: &PeeringOptions,
    remote_side: bool,
) -> ResourceSpec {
    // Gateway flags are mirrored: transit on one side pairs with use-remote on the other
    let (allow_transit, use_remote) = if remote_side {
        (options.use_remote_gateways, options.allow_gateway_transit)
    } else {
        (options.allow_gateway_transit, options.use_remote_gateways)
    };
    ResourceSpec::new(id.clone(), location)
        .with_property("remoteVirtualNetworkId", remote_network.to_string())
        .with_property("allowVirtualNetworkAccess", true)
        .with_property("allowForwardedTraffic", options.allow_forwarded_traffic)
        .with_property("allowGatewayTransit", allow_transit)
        .with_property("useRemoteGateways", use_remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::InMemoryControlPlane;
    use crate::domain::ResourceScope;
    use std::time::Duration;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn options() -> PeeringOptions {
        PeeringOptions::from(&PeeringConfig::new("unused"))
    }

    async fn networks(plane: &InMemoryControlPlane) -> (ResourceReference, ResourceReference) {
        let primary = ResourceScope::new(SUB, "rg-ai")
            .unwrap()
            .resource_id(ResourceKind::VirtualNetwork, "vnet-ai");
        let remote = ResourceScope::new(SUB, "rg-apim")
            .unwrap()
            .resource_id(ResourceKind::VirtualNetwork, "vnet-apim");
        for id in [&primary, &remote] {
            plane
                .create_or_update(ResourceSpec::new(id.clone(), "eastus"))
                .await
                .unwrap();
        }
        plane.clear_calls();
        (
            ResourceReference::Managed {
                id: primary,
                location: "eastus".into(),
            },
            ResourceReference::External {
                id: remote,
                location: "eastus".into(),
            },
        )
    }

    fn manager(plane: &Arc<InMemoryControlPlane>) -> (PeeringManager, DeferredExecutor) {
        let deferred = DeferredExecutor::new(Duration::from_secs(5));
        let control_plane: Arc<dyn ControlPlane> = plane.clone();
        (PeeringManager::new(control_plane, deferred.clone()), deferred)
    }

    #[tokio::test]
    async fn test_local_only_is_partial_and_never_touches_remote() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let (primary, remote) = networks(&plane).await;
        let (manager, deferred) = manager(&plane);

        let result = manager.peer(&primary, &remote, options()).await.unwrap();

        assert_eq!(result.local_state, PeeringState::Initiated);
        assert_eq!(result.remote_state, PeeringState::PendingOutOfBand);
        assert_eq!(result.health(), PeeringHealth::Partial);
        assert_eq!(plane.creates_in_scope(SUB, "rg-apim"), 0);
        assert_eq!(deferred.scheduled_count(), 0);

        let request = result.remote_request.unwrap();
        assert_eq!(request.remote_resource_group, "rg-apim");
        assert_eq!(request.peering_name, "peer-vnet-apim-to-vnet-ai");
    }

    #[tokio::test]
    async fn test_partial_fails_when_connection_required() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let (primary, remote) = networks(&plane).await;
        let (manager, _) = manager(&plane);

        let opts = PeeringOptions {
            require_connected: true,
            ..options()
        };
        let err = manager.peer(&primary, &remote, opts).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::StateGuardViolation(_)));
    }

    #[tokio::test]
    async fn test_remote_with_permission_connects_synchronously() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let (primary, remote) = networks(&plane).await;
        let (manager, deferred) = manager(&plane);

        let opts = PeeringOptions {
            create_remote_to_primary: true,
            remote_write_permission: true,
            ..options()
        };
        let result = manager.peer(&primary, &remote, opts).await.unwrap();

        assert_eq!(result.local_state, PeeringState::Connected);
        assert_eq!(result.remote_state, PeeringState::Connected);
        assert_eq!(result.health(), PeeringHealth::Connected);
        assert_eq!(deferred.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_without_permission_is_deferred_and_idempotent() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let (primary, remote) = networks(&plane).await;
        let (manager, deferred) = manager(&plane);

        let opts = PeeringOptions {
            create_remote_to_primary: true,
            ..options()
        };
        let first = manager.peer(&primary, &remote, opts).await.unwrap();
        assert_eq!(first.health(), PeeringHealth::Connected);
        assert_eq!(deferred.scheduled_count(), 1);
        assert_eq!(plane.creates_in_scope(SUB, "rg-apim"), 1);

        plane.clear_calls();
        let second = manager.peer(&primary, &remote, opts).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(plane.create_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_timeout_fails_the_step() {
        let plane = Arc::new(
            InMemoryControlPlane::new()
                .with_latency(ResourceKind::VirtualNetworkPeering, Duration::from_millis(500)),
        );
        let (primary, remote) = networks(&plane).await;
        let deferred = DeferredExecutor::new(Duration::from_millis(20));
        let control_plane: Arc<dyn ControlPlane> = plane.clone();
        let manager = PeeringManager::new(control_plane, deferred);

        let opts = PeeringOptions {
            create_local_to_remote: false,
            create_remote_to_primary: true,
            ..options()
        };
        let err = manager.peer(&primary, &remote, opts).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::DeferredOperationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_remote_network_is_not_found() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let (manager, _) = manager(&plane);
        let missing = format!(
            "/subscriptions/{}/resourceGroups/rg-x/providers/Microsoft.Network/virtualNetworks/nope",
            SUB
        );
        assert!(matches!(
            manager.resolve_remote(&missing).await,
            Err(ProvisioningError::ControlPlane(_))
        ));
    }

    #[test]
    fn test_health_matrix() {
        let result = |local, remote| PeeringResult {
            local_state: local,
            remote_state: remote,
            local_peering_id: None,
            remote_peering_id: ResourceScope::new(SUB, "rg")
                .unwrap()
                .resource_id(ResourceKind::VirtualNetwork, "v")
                .child(ResourceKind::VirtualNetworkPeering, "p"),
            remote_request: None,
            deferred: false,
        };
        use PeeringState::*;
        assert_eq!(result(Connected, Connected).health(), PeeringHealth::Connected);
        assert_eq!(result(Initiated, PendingOutOfBand).health(), PeeringHealth::Partial);
        assert_eq!(result(NotRequested, Initiated).health(), PeeringHealth::Partial);
        assert_eq!(result(NotRequested, PendingOutOfBand).health(), PeeringHealth::NotPeered);
    }
}
