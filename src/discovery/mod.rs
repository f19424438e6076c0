// Copyright (c) 2025 - Cowboy AI, Inc.
//! Internal Discovery Zone
//!
//! Private DNS zone through which consumers on permitted networks resolve
//! the compute workload's internal address.
//!
//! # State Machine
//!
//! ```text
//!                 ConfigureExplicit(zone)
//!   ┌──────────┐ ─────────────────────────▶ ┌────────────────┐
//!   │ Disabled │                            │ Explicit(zone) │  synchronous
//!   └──────────┘ ──────┐                    └────────────────┘
//!                      │ ConfigureAuto
//!                      ▼
//!               ┌─────────────┐  DomainResolved(domain)  ┌──────────────────────┐
//!               │ AutoPending │ ───────────────────────▶ │ AutoResolved(zone)   │
//!               └─────────────┘   (deferred step)        └──────────────────────┘
//! ```
//!
//! In auto mode the zone name is `internal.{defaultDomain}`, and the default
//! domain only exists after the compute environment has been created. The
//! manager resolves this by running zone creation as a deferred step that
//! reads the domain back first. When the compute environment is not part of
//! the run (two-phase provisioning) the manager stays `Disabled`.
//!
//! # Invariants
//!
//! - `masterEnabled = false` always ends in `Disabled`
//! - `AutoResolved` is only reachable with a compute environment in the run
//! - Explicit mode never schedules a deferred step
//! - Zones, links and records are created idempotently; reruns reuse them

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::DiscoveryMode;
use crate::control_plane::{ensure, ControlPlane, ResourceSpec};
use crate::deferred::DeferredExecutor;
use crate::domain::{ResourceId, ResourceKind, ResourceScope, ZoneName};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::provisioners::compute::ComputeEnvironment;
use crate::provisioners::private_connectivity::{link_zone, ZoneLink, GLOBAL_LOCATION};
use crate::resolver::parse_external;
use crate::state_machine::{
    StateMachine, TrackedMachine, TransitionError, TransitionRecord, TransitionResult,
};

/// Record names written into the discovery zone
pub const RECORD_NAMES: [&str; 2] = ["*", "@"];

/// TTL of discovery records, in seconds
pub const RECORD_TTL: u64 = 3600;

/// Discovery zone lifecycle within one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "zoneName", rename_all = "camelCase")]
pub enum DiscoveryZoneState {
    Disabled,
    /// Zone name depends on a domain that is not known yet
    AutoPending,
    AutoResolved(ZoneName),
    Explicit(ZoneName),
}

impl DiscoveryZoneState {
    pub fn zone_name(&self) -> Option<&ZoneName> {
        match self {
            Self::AutoResolved(zone) | Self::Explicit(zone) => Some(zone),
            Self::Disabled | Self::AutoPending => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::AutoPending => "AutoPending",
            Self::AutoResolved(_) => "AutoResolved",
            Self::Explicit(_) => "Explicit",
        }
    }
}

/// Observed facts that drive the discovery zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryInput {
    ConfigureExplicit(ZoneName),
    ConfigureAuto,
    /// Compute environment's default domain, read back after creation
    DomainResolved(String),
}

impl StateMachine for DiscoveryZoneState {
    type Input = DiscoveryInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        match (self, input) {
            (Self::Disabled, DiscoveryInput::ConfigureExplicit(zone)) => {
                Ok((Self::Explicit(zone.clone()), ()))
            }
            (Self::Disabled, DiscoveryInput::ConfigureAuto) => Ok((Self::AutoPending, ())),
            (Self::AutoPending, DiscoveryInput::DomainResolved(domain)) => {
                let zone = ZoneName::internal_for(domain).map_err(|e| {
                    TransitionError::PreconditionFailed(format!(
                        "default domain '{}' does not form a zone name: {}",
                        domain, e
                    ))
                })?;
                Ok((Self::AutoResolved(zone), ()))
            }
            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.label().to_string(),
                input: match input {
                    DiscoveryInput::ConfigureExplicit(_) => "ConfigureExplicit",
                    DiscoveryInput::ConfigureAuto => "ConfigureAuto",
                    DiscoveryInput::DomainResolved(_) => "DomainResolved",
                }
                .to_string(),
            }),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::AutoResolved(_) | Self::Explicit(_))
    }
}

/// Discovery settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest {
    pub master_enabled: bool,
    pub mode: DiscoveryMode,
    pub explicit_zone: Option<ZoneName>,
    pub consumer_network_ids: Vec<String>,
    /// Where the zone is created
    pub scope: ResourceScope,
}

/// End state of the discovery zone for a run
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub state: DiscoveryZoneState,
    pub zone_id: Option<ResourceId>,
    pub links: Vec<ZoneLink>,
    pub records: Vec<ResourceId>,
    /// True when zone creation ran as a deferred step
    pub deferred: bool,
    pub history: Vec<TransitionRecord<DiscoveryZoneState, DiscoveryInput>>,
}

impl DiscoveryOutcome {
    fn disabled() -> Self {
        Self {
            state: DiscoveryZoneState::Disabled,
            zone_id: None,
            links: Vec::new(),
            records: Vec::new(),
            deferred: false,
            history: Vec::new(),
        }
    }

    /// Zone name, or empty when unresolved this run ("query later")
    pub fn zone_name(&self) -> String {
        self.state
            .zone_name()
            .map(|z| z.to_string())
            .unwrap_or_default()
    }
}

/// Zone, links and records written for a resolved zone name
#[derive(Debug, Clone)]
struct ZoneArtifacts {
    zone_id: ResourceId,
    links: Vec<ZoneLink>,
    records: Vec<ResourceId>,
}

/// Manages the discovery zone state machine and its resources
pub struct InternalDiscoveryZoneManager {
    control_plane: Arc<dyn ControlPlane>,
    deferred: DeferredExecutor,
}

impl InternalDiscoveryZoneManager {
    pub fn new(control_plane: Arc<dyn ControlPlane>, deferred: DeferredExecutor) -> Self {
        Self {
            control_plane,
            deferred,
        }
    }

    /// Drive the zone to its end state for this run
    ///
    /// `compute` is `Some` only when the compute environment is part of the run.
    pub async fn manage(
        &self,
        request: &DiscoveryRequest,
        primary_network: &ResourceId,
        compute: Option<&ComputeEnvironment>,
    ) -> ProvisioningResult<DiscoveryOutcome> {
        let mut networks = vec![primary_network.clone()];
        for raw in &request.consumer_network_ids {
            if let Some(id) = parse_external(Some(raw.as_str()), ResourceKind::VirtualNetwork)? {
                if !networks.contains(&id) {
                    networks.push(id);
                }
            }
        }

        if !request.master_enabled {
            debug!("Discovery zone disabled by master flag");
            return Ok(DiscoveryOutcome::disabled());
        }

        let mut machine = TrackedMachine::new(DiscoveryZoneState::Disabled);

        match request.mode {
            DiscoveryMode::None => {
                debug!("Discovery zone mode is none");
                Ok(DiscoveryOutcome::disabled())
            }
            DiscoveryMode::Explicit => {
                let zone = request.explicit_zone.clone().ok_or_else(|| {
                    ProvisioningError::Configuration(
                        "discovery mode 'explicit' requires a zone name".into(),
                    )
                })?;
                machine.apply(DiscoveryInput::ConfigureExplicit(zone.clone()))?;

                let static_ip = compute.and_then(|c| c.static_ip);
                let artifacts = provision_zone(
                    self.control_plane.as_ref(),
                    &request.scope,
                    &zone,
                    &networks,
                    static_ip,
                )
                .await?;

                info!(zone = %zone, links = artifacts.links.len(), "📛 Discovery zone ready (explicit)");
                Ok(outcome(machine, Some(artifacts), false))
            }
            DiscoveryMode::Auto => {
                let Some(compute) = compute else {
                    info!("Compute environment is not part of this run; discovery zone stays disabled");
                    return Ok(DiscoveryOutcome::disabled());
                };
                machine.apply(DiscoveryInput::ConfigureAuto)?;

                let control_plane = Arc::clone(&self.control_plane);
                let compute_id = compute.id.clone();
                let scope = request.scope.clone();
                let (domain, artifacts) = self
                    .deferred
                    .run("discovery-zone", async move {
                        resolve_auto_zone(control_plane.as_ref(), &compute_id, &scope, &networks).await
                    })
                    .await?;

                machine.apply(DiscoveryInput::DomainResolved(domain))?;
                info!(
                    zone = %machine.state().zone_name().map(ZoneName::as_str).unwrap_or_default(),
                    links = artifacts.links.len(),
                    "📛 Discovery zone resolved; promote to explicit mode for deterministic reruns"
                );
                Ok(outcome(machine, Some(artifacts), true))
            }
        }
    }
}

fn outcome(
    machine: TrackedMachine<DiscoveryZoneState>,
    artifacts: Option<ZoneArtifacts>,
    deferred: bool,
) -> DiscoveryOutcome {
    let (state, history) = machine.into_parts();
    let (zone_id, links, records) = match artifacts {
        Some(a) => (Some(a.zone_id), a.links, a.records),
        None => (None, Vec::new(), Vec::new()),
    };
    DiscoveryOutcome {
        state,
        zone_id,
        links,
        records,
        deferred,
        history,
    }
}

/// Deferred step: read the domain back, then create the zone it names
async fn resolve_auto_zone(
    control_plane: &dyn ControlPlane,
    compute_id: &ResourceId,
    scope: &ResourceScope,
    networks: &[ResourceId],
) -> ProvisioningResult<(String, ZoneArtifacts)> {
    let environment = control_plane.get(compute_id).await?.ok_or_else(|| {
        ProvisioningError::StateGuardViolation(format!(
            "compute environment {} does not exist; cannot discover its domain",
            compute_id
        ))
    })?;
    let environment = ComputeEnvironment::from_resource(&environment, false);

    let domain = environment.default_domain.clone().ok_or_else(|| {
        ProvisioningError::StateGuardViolation(format!(
            "compute environment {} has no default domain yet",
            compute_id
        ))
    })?;
    let zone = ZoneName::internal_for(&domain).map_err(|e| {
        ProvisioningError::StateGuardViolation(format!("default domain '{}': {}", domain, e))
    })?;

    let artifacts =
        provision_zone(control_plane, scope, &zone, networks, environment.static_ip).await?;
    Ok((domain, artifacts))
}

/// Ensure the zone, its network links and the wildcard/apex records
async fn provision_zone(
    control_plane: &dyn ControlPlane,
    scope: &ResourceScope,
    zone: &ZoneName,
    networks: &[ResourceId],
    static_ip: Option<Ipv4Addr>,
) -> ProvisioningResult<ZoneArtifacts> {
    let zone_id = scope.resource_id(ResourceKind::PrivateDnsZone, zone.as_str());
    let ensured = ensure(control_plane, ResourceSpec::new(zone_id.clone(), GLOBAL_LOCATION)).await?;
    if ensured.created {
        info!(zone = %zone, "Created discovery zone");
    } else {
        debug!(zone = %zone, "Discovery zone already exists");
    }

    let mut links = Vec::with_capacity(networks.len());
    for network in networks {
        links.push(link_zone(control_plane, &zone_id, network).await?);
    }

    let mut records = Vec::new();
    match static_ip {
        Some(ip) => {
            for name in RECORD_NAMES {
                let record_id = zone_id.child(ResourceKind::PrivateDnsARecord, name);
                ensure_record(control_plane, &record_id, ip).await?;
                records.push(record_id);
            }
        }
        None => warn!(zone = %zone, "No compute static address available; zone has no records"),
    }

    Ok(ZoneArtifacts {
        zone_id,
        links,
        records,
    })
}

/// Point an A record at `ip`, rewriting it when it holds another address
async fn ensure_record(
    control_plane: &dyn ControlPlane,
    record_id: &ResourceId,
    ip: Ipv4Addr,
) -> ProvisioningResult<()> {
    let spec = ResourceSpec::new(record_id.clone(), GLOBAL_LOCATION)
        .with_property("ttl", RECORD_TTL)
        .with_property("aRecords", json!([{ "ipv4Address": ip.to_string() }]));

    let Some(existing) = control_plane.get(record_id).await? else {
        control_plane.create_or_update(spec).await?;
        return Ok(());
    };

    let current = existing
        .attribute("aRecords")
        .and_then(|records| records.get(0))
        .and_then(|record| record.get("ipv4Address"))
        .and_then(|address| address.as_str())
        .and_then(|address| address.parse::<Ipv4Addr>().ok());
    if current == Some(ip) {
        debug!(record = %record_id, %ip, "Discovery record already current");
        return Ok(());
    }

    warn!(
        record = %record_id,
        stale = current.map(|a| a.to_string()).as_deref().unwrap_or("-"),
        current = %ip,
        "Discovery record points at a stale address; rewriting"
    );
    control_plane.create_or_update(spec).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::InMemoryControlPlane;
    use crate::provisioners::compute::provision_compute;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn scope() -> ResourceScope {
        ResourceScope::new(SUB, "rg-ai").unwrap()
    }

    fn request(master_enabled: bool, mode: DiscoveryMode) -> DiscoveryRequest {
        DiscoveryRequest {
            master_enabled,
            mode,
            explicit_zone: None,
            consumer_network_ids: vec![format!(
                "/subscriptions/{}/resourceGroups/rg-apim/providers/Microsoft.Network/virtualNetworks/vnet-apim",
                SUB
            )],
            scope: scope(),
        }
    }

    async fn fixture() -> (Arc<InMemoryControlPlane>, ResourceId, ComputeEnvironment) {
        let plane = Arc::new(InMemoryControlPlane::new());
        let vnet = scope().resource_id(ResourceKind::VirtualNetwork, "vnet-ai");
        plane
            .create_or_update(ResourceSpec::new(vnet.clone(), "eastus"))
            .await
            .unwrap();
        let subnet = vnet.child(ResourceKind::Subnet, "snet-compute");
        plane
            .create_or_update(
                ResourceSpec::new(subnet.clone(), "eastus").with_property("addressPrefix", "10.0.0.0/24"),
            )
            .await
            .unwrap();
        let compute = provision_compute(
            &*plane,
            scope().resource_id(ResourceKind::ComputeEnvironment, "cae-ai"),
            "eastus",
            &subnet,
        )
        .await
        .unwrap();
        (plane, vnet, compute)
    }

    fn manager(plane: &Arc<InMemoryControlPlane>) -> (InternalDiscoveryZoneManager, DeferredExecutor) {
        let deferred = DeferredExecutor::new(Duration::from_secs(5));
        let control_plane: Arc<dyn ControlPlane> = plane.clone();
        (
            InternalDiscoveryZoneManager::new(control_plane, deferred.clone()),
            deferred,
        )
    }

    #[test]
    fn test_state_transitions() {
        let zone = ZoneName::new("internal.contoso.io").unwrap();
        let (explicit, _) = DiscoveryZoneState::Disabled
            .transition(&DiscoveryInput::ConfigureExplicit(zone.clone()))
            .unwrap();
        assert_eq!(explicit, DiscoveryZoneState::Explicit(zone));
        assert!(explicit.is_terminal());

        let (pending, _) = DiscoveryZoneState::Disabled
            .transition(&DiscoveryInput::ConfigureAuto)
            .unwrap();
        assert!(!pending.is_terminal());
        let (resolved, _) = pending
            .transition(&DiscoveryInput::DomainResolved("abc.eastus.example.io".into()))
            .unwrap();
        assert_eq!(
            resolved.zone_name().map(ZoneName::as_str),
            Some("internal.abc.eastus.example.io")
        );
    }

    #[test]
    fn test_auto_resolved_requires_pending() {
        assert!(!DiscoveryZoneState::Disabled
            .accepts(&DiscoveryInput::DomainResolved("abc.example.io".into())));
        assert!(!DiscoveryZoneState::AutoPending
            .accepts(&DiscoveryInput::DomainResolved("not a domain".into())));
    }

    #[tokio::test]
    async fn test_master_flag_off_is_always_disabled() {
        let (plane, vnet, compute) = fixture().await;
        let (manager, deferred) = manager(&plane);
        plane.clear_calls();

        for mode in [DiscoveryMode::Auto, DiscoveryMode::Explicit, DiscoveryMode::None] {
            let mut req = request(false, mode);
            req.explicit_zone = ZoneName::new("internal.contoso.io").ok();
            let outcome = manager.manage(&req, &vnet, Some(&compute)).await.unwrap();
            assert_eq!(outcome.state, DiscoveryZoneState::Disabled);
            assert_eq!(outcome.zone_name(), "");
        }
        assert_eq!(plane.create_count(), 0);
        assert_eq!(deferred.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_auto_without_compute_stays_disabled() {
        let (plane, vnet, _) = fixture().await;
        let (manager, deferred) = manager(&plane);
        plane.clear_calls();

        let outcome = manager
            .manage(&request(true, DiscoveryMode::Auto), &vnet, None)
            .await
            .unwrap();
        assert_eq!(outcome.state, DiscoveryZoneState::Disabled);
        assert_eq!(plane.create_count(), 0);
        assert_eq!(deferred.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_auto_resolves_through_deferred_step() {
        let (plane, vnet, compute) = fixture().await;
        let (manager, deferred) = manager(&plane);

        let outcome = manager
            .manage(&request(true, DiscoveryMode::Auto), &vnet, Some(&compute))
            .await
            .unwrap();

        let expected = format!("internal.{}", compute.default_domain.clone().unwrap());
        assert_eq!(outcome.zone_name(), expected);
        assert!(matches!(outcome.state, DiscoveryZoneState::AutoResolved(_)));
        assert!(outcome.deferred);
        assert_eq!(deferred.scheduled_count(), 1);
        assert_eq!(outcome.links.len(), 2);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[0].to, DiscoveryZoneState::AutoPending);
    }

    #[tokio::test]
    async fn test_auto_rerun_reuses_zone_and_links() {
        let (plane, vnet, compute) = fixture().await;
        let (manager, _) = manager(&plane);
        let req = request(true, DiscoveryMode::Auto);

        let first = manager.manage(&req, &vnet, Some(&compute)).await.unwrap();
        plane.clear_calls();
        let second = manager.manage(&req, &vnet, Some(&compute)).await.unwrap();

        assert_eq!(plane.create_count(), 0);
        assert_eq!(first.zone_id, second.zone_id);
        assert!(second.links.iter().all(|l| !l.created));
    }

    #[tokio::test]
    async fn test_explicit_is_synchronous() {
        let (plane, vnet, compute) = fixture().await;
        let (manager, deferred) = manager(&plane);
        let mut req = request(true, DiscoveryMode::Explicit);
        req.explicit_zone = ZoneName::new("internal.contoso.io").ok();

        let outcome = manager.manage(&req, &vnet, Some(&compute)).await.unwrap();

        assert_eq!(
            outcome.state,
            DiscoveryZoneState::Explicit(ZoneName::new("internal.contoso.io").unwrap())
        );
        assert!(!outcome.deferred);
        assert_eq!(deferred.scheduled_count(), 0);
        assert_eq!(plane.creates_of(ResourceKind::PrivateDnsZone), 1);
        assert_eq!(plane.creates_of(ResourceKind::PrivateDnsZoneLink), 2);
        assert_eq!(plane.creates_of(ResourceKind::PrivateDnsARecord), 2);
    }

    #[tokio::test]
    async fn test_stale_record_is_repointed_at_compute() {
        let (plane, vnet, compute) = fixture().await;
        let zone = ZoneName::new("internal.contoso.io").unwrap();
        let zone_id = scope().resource_id(ResourceKind::PrivateDnsZone, zone.as_str());
        let wildcard = zone_id.child(ResourceKind::PrivateDnsARecord, "*");
        plane
            .create_or_update(ResourceSpec::new(zone_id.clone(), GLOBAL_LOCATION))
            .await
            .unwrap();
        plane
            .create_or_update(
                ResourceSpec::new(wildcard.clone(), GLOBAL_LOCATION)
                    .with_property("aRecords", json!([{ "ipv4Address": "10.9.9.9" }])),
            )
            .await
            .unwrap();

        let (manager, _) = manager(&plane);
        let mut req = request(true, DiscoveryMode::Explicit);
        req.explicit_zone = Some(zone);
        manager.manage(&req, &vnet, Some(&compute)).await.unwrap();

        let expected = compute.static_ip.unwrap().to_string();
        for name in RECORD_NAMES {
            let record = plane
                .resource(&zone_id.child(ResourceKind::PrivateDnsARecord, name))
                .unwrap();
            assert_eq!(
                record.attribute("aRecords"),
                Some(&json!([{ "ipv4Address": expected }]))
            );
        }

        // Current records are left alone on the next run
        plane.clear_calls();
        manager.manage(&req, &vnet, Some(&compute)).await.unwrap();
        assert_eq!(plane.creates_of(ResourceKind::PrivateDnsARecord), 0);
    }

    #[tokio::test]
    async fn test_explicit_without_compute_has_no_records() {
        let (plane, vnet, _) = fixture().await;
        let (manager, _) = manager(&plane);
        let mut req = request(true, DiscoveryMode::Explicit);
        req.explicit_zone = ZoneName::new("internal.contoso.io").ok();

        let outcome = manager.manage(&req, &vnet, None).await.unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.links.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_consumer_network_is_rejected() {
        let (plane, vnet, compute) = fixture().await;
        let (manager, _) = manager(&plane);
        let mut req = request(true, DiscoveryMode::Auto);
        req.consumer_network_ids = vec!["/subscriptions/nope".into()];

        let err = manager.manage(&req, &vnet, Some(&compute)).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::ReferenceParse { .. }));
    }
}
