// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run Configuration
//!
//! One JSON document configures an orchestration run:
//!
//! ```json
//! {
//!   "environmentName": "dev",
//!   "location": "eastus",
//!   "subscriptionId": "00000000-0000-0000-0000-000000000001",
//!   "resourceGroup": "rg-ai",
//!   "network": { "useExisting": false, "addressSpace": "10.0.0.0/16" },
//!   "services": [{ "kind": "cosmosDb" }, { "kind": "search" }],
//!   "compute": { "deployCompute": true },
//!   "discovery": { "masterEnabled": true, "mode": "auto" },
//!   "peering": { "remoteNetworkId": "/subscriptions/.../virtualNetworks/vnet-apim" }
//! }
//! ```
//!
//! Identity fields can be overlaid from the environment (`AZURE_ENV_NAME`,
//! `AZURE_LOCATION`, `AZURE_SUBSCRIPTION_ID`, `AZURE_RESOURCE_GROUP`).
//! [`OrchestrationConfig::validate`] rejects structurally invalid documents
//! before any unit runs. External identifiers are parsed later, during
//! preflight, so they surface as reference parse errors.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{AddressBlock, ResourceScope, ServiceKind, SubnetRole, ZoneName};
use crate::errors::{ProvisioningError, ProvisioningResult};

/// Default parent address block for a managed network
pub const DEFAULT_ADDRESS_SPACE: (Ipv4Addr, u8) = (Ipv4Addr::new(10, 0, 0, 0), 16);

fn default_address_space() -> Option<AddressBlock> {
    AddressBlock::from_parts(DEFAULT_ADDRESS_SPACE.0, DEFAULT_ADDRESS_SPACE.1).ok()
}

fn default_deferred_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

/// Complete configuration of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationConfig {
    pub environment_name: String,
    pub location: String,
    pub subscription_id: String,
    pub resource_group: String,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Pre-existing private zones by DNS suffix (cross-group or shared hub zones)
    #[serde(default)]
    pub existing_dns_zone_ids: BTreeMap<String, String>,

    #[serde(default)]
    pub public_network_access: PublicNetworkAccess,

    #[serde(default)]
    pub compute: ComputeConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub peering: Option<PeeringConfig>,

    /// Bound applied to every deferred operation
    #[serde(default = "default_deferred_timeout_secs")]
    pub deferred_timeout_secs: u64,
}

/// Network topology selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Import an existing network instead of creating one
    #[serde(default)]
    pub use_existing: bool,

    #[serde(default)]
    pub existing_network_id: Option<String>,

    /// Parent block for a managed network; ignored when importing
    #[serde(default = "default_address_space")]
    pub address_space: Option<AddressBlock>,

    /// Managed network name override
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub subnets: SubnetsConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            use_existing: false,
            existing_network_id: None,
            address_space: default_address_space(),
            name: None,
            subnets: SubnetsConfig::default(),
        }
    }
}

/// Per-role subnet overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetsConfig {
    #[serde(default)]
    pub compute: SubnetConfig,
    #[serde(default)]
    pub private_endpoint: SubnetConfig,
    #[serde(default)]
    pub infrastructure: SubnetConfig,
}

impl SubnetsConfig {
    pub fn for_role(&self, role: SubnetRole) -> &SubnetConfig {
        match role {
            SubnetRole::ComputeDelegated => &self.compute,
            SubnetRole::PrivateEndpoint => &self.private_endpoint,
            SubnetRole::Infrastructure => &self.infrastructure,
        }
    }

    /// Configured name, or the role's default
    pub fn name_for(&self, role: SubnetRole) -> String {
        self.for_role(role)
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| role.default_subnet_name().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Explicit prefix; used verbatim instead of planning
    #[serde(default)]
    pub address_prefix: Option<AddressBlock>,
}

/// A dependent service reached through a private attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub kind: ServiceKind,
    /// Managed name override
    #[serde(default)]
    pub name: Option<String>,
    /// Reuse an existing service instead of creating one
    #[serde(default)]
    pub existing_resource_id: Option<String>,
}

/// Public network access of managed services after provisioning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicNetworkAccess {
    /// Transitional bring-up: attachments present, public access still on
    Enabled,
    /// Locked down once attachments and DNS bindings are confirmed
    #[default]
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeConfig {
    /// Two-phase flag: false skips compute-environment creation for this run
    #[serde(default = "default_true")]
    pub deploy_compute: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            deploy_compute: true,
            name: None,
        }
    }
}

/// Discovery zone mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    Auto,
    Explicit,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub master_enabled: bool,
    #[serde(default)]
    pub mode: DiscoveryMode,
    /// Required when mode is explicit
    #[serde(default)]
    pub zone_name: Option<String>,
    /// Networks linked in addition to the primary network
    #[serde(default)]
    pub consumer_network_ids: Vec<String>,
}

/// Peering with an external consumer network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeeringConfig {
    pub remote_network_id: String,
    #[serde(default = "default_true")]
    pub create_local_to_remote: bool,
    #[serde(default)]
    pub create_remote_to_primary: bool,
    /// Orchestrator may write to the remote network directly
    #[serde(default)]
    pub remote_write_permission: bool,
    #[serde(default = "default_true")]
    pub allow_forwarded_traffic: bool,
    #[serde(default)]
    pub allow_gateway_transit: bool,
    #[serde(default)]
    pub use_remote_gateways: bool,
    /// Fail the run when peering is only partially connected
    #[serde(default)]
    pub require_connected: bool,
}

impl PeeringConfig {
    pub fn new(remote_network_id: impl Into<String>) -> Self {
        Self {
            remote_network_id: remote_network_id.into(),
            create_local_to_remote: true,
            create_remote_to_primary: false,
            remote_write_permission: false,
            allow_forwarded_traffic: true,
            allow_gateway_transit: false,
            use_remote_gateways: false,
            require_connected: false,
        }
    }
}

impl OrchestrationConfig {
    /// Minimal configuration for a deployment identity
    pub fn new(
        environment_name: impl Into<String>,
        location: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            environment_name: environment_name.into(),
            location: location.into(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            network: NetworkConfig::default(),
            services: Vec::new(),
            existing_dns_zone_ids: BTreeMap::new(),
            public_network_access: PublicNetworkAccess::default(),
            compute: ComputeConfig::default(),
            discovery: DiscoveryConfig::default(),
            peering: None,
            deferred_timeout_secs: default_deferred_timeout_secs(),
        }
    }

    pub fn from_json(json: &str) -> ProvisioningResult<Self> {
        serde_json::from_str(json).map_err(|e| ProvisioningError::Configuration(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> ProvisioningResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProvisioningError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Overlay identity fields from process environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay identity fields from an arbitrary variable source
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 4] = [
            ("AZURE_ENV_NAME", &mut self.environment_name),
            ("AZURE_LOCATION", &mut self.location),
            ("AZURE_SUBSCRIPTION_ID", &mut self.subscription_id),
            ("AZURE_RESOURCE_GROUP", &mut self.resource_group),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value;
            }
        }
    }

    /// Deployment scope (subscription + resource group)
    pub fn scope(&self) -> ProvisioningResult<ResourceScope> {
        ResourceScope::new(&self.subscription_id, &self.resource_group)
            .map_err(|e| ProvisioningError::Configuration(e.to_string()))
    }

    pub fn deferred_timeout(&self) -> Duration {
        Duration::from_secs(self.deferred_timeout_secs)
    }

    /// Services sorted by kind, as they are scheduled
    pub fn service_kinds(&self) -> Vec<ServiceKind> {
        let kinds: BTreeSet<ServiceKind> = self.services.iter().map(|s| s.kind).collect();
        kinds.into_iter().collect()
    }

    pub fn service(&self, kind: ServiceKind) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.kind == kind)
    }

    /// Explicit discovery zone name, validated
    pub fn explicit_zone_name(&self) -> ProvisioningResult<Option<ZoneName>> {
        match self.discovery.zone_name.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => ZoneName::new(name)
                .map(Some)
                .map_err(|e| ProvisioningError::Configuration(format!("discovery zoneName: {}", e))),
        }
    }

    /// Reject structurally invalid documents
    pub fn validate(&self) -> ProvisioningResult<()> {
        if self.environment_name.trim().is_empty() {
            return Err(ProvisioningError::Configuration(
                "environmentName must not be empty".into(),
            ));
        }
        if self.location.trim().is_empty() {
            return Err(ProvisioningError::Configuration("location must not be empty".into()));
        }
        self.scope()?;

        if self.network.use_existing
            && self
                .network
                .existing_network_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(ProvisioningError::Configuration(
                "network.useExisting requires network.existingNetworkId".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for service in &self.services {
            if !seen.insert(service.kind) {
                return Err(ProvisioningError::Configuration(format!(
                    "service '{}' is configured more than once",
                    service.kind
                )));
            }
        }

        for suffix in self.existing_dns_zone_ids.keys() {
            ZoneName::new(suffix).map_err(|e| {
                ProvisioningError::Configuration(format!("existingDnsZoneIds key '{}': {}", suffix, e))
            })?;
        }

        if self.discovery.mode == DiscoveryMode::Explicit {
            let zone = self.explicit_zone_name()?;
            if self.discovery.master_enabled && zone.is_none() {
                return Err(ProvisioningError::Configuration(
                    "discovery mode 'explicit' requires a non-empty zoneName".into(),
                ));
            }
        }

        if let Some(peering) = &self.peering {
            if peering.remote_network_id.trim().is_empty() {
                return Err(ProvisioningError::Configuration(
                    "peering.remoteNetworkId must not be empty".into(),
                ));
            }
        }

        if self.deferred_timeout_secs == 0 {
            return Err(ProvisioningError::Configuration(
                "deferredTimeoutSecs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn config() -> OrchestrationConfig {
        OrchestrationConfig::new("dev", "eastus", SUB, "rg-ai")
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = format!(
            r#"{{"environmentName":"dev","location":"eastus","subscriptionId":"{}","resourceGroup":"rg-ai"}}"#,
            SUB
        );
        let parsed = OrchestrationConfig::from_json(&json).unwrap();

        assert_eq!(parsed, config());
        assert_eq!(
            parsed.network.address_space.map(|b| b.as_cidr()),
            Some("10.0.0.0/16".to_string())
        );
        assert!(parsed.compute.deploy_compute);
        assert_eq!(parsed.discovery.mode, DiscoveryMode::None);
        assert_eq!(parsed.public_network_access, PublicNetworkAccess::Disabled);
        assert_eq!(parsed.deferred_timeout(), Duration::from_secs(600));
        parsed.validate().unwrap();
    }

    #[test]
    fn test_full_document() {
        let json = format!(
            r#"{{
                "environmentName": "dev",
                "location": "eastus",
                "subscriptionId": "{sub}",
                "resourceGroup": "rg-ai",
                "network": {{
                    "addressSpace": "10.10.0.0/16",
                    "subnets": {{ "privateEndpoint": {{ "name": "pe", "addressPrefix": "10.10.9.0/24" }} }}
                }},
                "services": [{{ "kind": "cosmosDb" }}, {{ "kind": "containerRegistry", "name": "acrshared" }}],
                "publicNetworkAccess": "Enabled",
                "compute": {{ "deployCompute": false }},
                "discovery": {{ "masterEnabled": true, "mode": "explicit", "zoneName": "internal.contoso.io" }},
                "peering": {{ "remoteNetworkId": "/subscriptions/{sub}/resourceGroups/rg-apim/providers/Microsoft.Network/virtualNetworks/vnet-apim", "createRemoteToPrimary": true }},
                "deferredTimeoutSecs": 30
            }}"#,
            sub = SUB
        );
        let parsed = OrchestrationConfig::from_json(&json).unwrap();
        parsed.validate().unwrap();

        assert_eq!(parsed.network.subnets.name_for(SubnetRole::PrivateEndpoint), "pe");
        assert_eq!(
            parsed.network.subnets.name_for(SubnetRole::ComputeDelegated),
            "snet-compute"
        );
        assert_eq!(
            parsed.service_kinds(),
            vec![ServiceKind::CosmosDb, ServiceKind::ContainerRegistry]
        );
        assert!(!parsed.compute.deploy_compute);
        let peering = parsed.peering.unwrap();
        assert!(peering.create_local_to_remote);
        assert!(peering.create_remote_to_primary);
        assert!(!peering.remote_write_permission);
    }

    #[test]
    fn test_env_overlay() {
        let mut cfg = config();
        cfg.apply_env_with(|key| match key {
            "AZURE_LOCATION" => Some("westeurope".to_string()),
            "AZURE_ENV_NAME" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.location, "westeurope");
        assert_eq!(cfg.environment_name, "dev");
    }

    #[test]
    fn test_explicit_mode_requires_zone_name() {
        let mut cfg = config();
        cfg.discovery.master_enabled = true;
        cfg.discovery.mode = DiscoveryMode::Explicit;
        assert!(matches!(
            cfg.validate(),
            Err(ProvisioningError::Configuration(_))
        ));

        cfg.discovery.zone_name = Some("internal.contoso.io".into());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_use_existing_requires_network_id() {
        let mut cfg = config();
        cfg.network.use_existing = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_duplicate_services_rejected() {
        let mut cfg = config();
        let cosmos = ServiceConfig {
            kind: ServiceKind::CosmosDb,
            name: None,
            existing_resource_id: None,
        };
        cfg.services = vec![cosmos.clone(), cosmos];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_identity_is_configuration_error() {
        let cfg = OrchestrationConfig::new("dev", "eastus", "not-a-guid", "rg-ai");
        assert!(matches!(
            cfg.validate(),
            Err(ProvisioningError::Configuration(_))
        ));
    }
}
