// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioned Resource Taxonomy
//!
//! Defines the kinds of resources the orchestrator creates, imports or links,
//! together with their provider type paths and naming constraints. Dependent
//! services that receive a private attachment are described by [`ServiceKind`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource kinds known to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // Network topology
    VirtualNetwork,
    Subnet,
    VirtualNetworkPeering,

    // Private connectivity
    PrivateEndpoint,
    PrivateDnsZoneGroup,
    PrivateDnsZone,
    PrivateDnsZoneLink,
    PrivateDnsARecord,

    // Compute
    ComputeEnvironment,

    // Dependent services
    CosmosAccount,
    SearchService,
    StorageAccount,
    ContainerRegistry,
    KeyVault,
}

/// How a managed name is rendered for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `{abbr}-{token}`, lowercase, at most `max` characters
    Hyphenated { max: usize },
    /// `{abbr}{token}`, lowercase alphanumerics only, at most `max` characters
    Compact { max: usize },
}

impl ResourceKind {
    /// Provider namespace (e.g. `Microsoft.Network`)
    pub fn provider_namespace(&self) -> &'static str {
        match self {
            Self::VirtualNetwork
            | Self::Subnet
            | Self::VirtualNetworkPeering
            | Self::PrivateEndpoint
            | Self::PrivateDnsZoneGroup
            | Self::PrivateDnsZone
            | Self::PrivateDnsZoneLink
            | Self::PrivateDnsARecord => "Microsoft.Network",
            Self::ComputeEnvironment => "Microsoft.App",
            Self::CosmosAccount => "Microsoft.DocumentDB",
            Self::SearchService => "Microsoft.Search",
            Self::StorageAccount => "Microsoft.Storage",
            Self::ContainerRegistry => "Microsoft.ContainerRegistry",
            Self::KeyVault => "Microsoft.KeyVault",
        }
    }

    /// Type segments below the namespace, outermost first
    pub fn type_segments(&self) -> &'static [&'static str] {
        match self {
            Self::VirtualNetwork => &["virtualNetworks"],
            Self::Subnet => &["virtualNetworks", "subnets"],
            Self::VirtualNetworkPeering => &["virtualNetworks", "virtualNetworkPeerings"],
            Self::PrivateEndpoint => &["privateEndpoints"],
            Self::PrivateDnsZoneGroup => &["privateEndpoints", "privateDnsZoneGroups"],
            Self::PrivateDnsZone => &["privateDnsZones"],
            Self::PrivateDnsZoneLink => &["privateDnsZones", "virtualNetworkLinks"],
            Self::PrivateDnsARecord => &["privateDnsZones", "A"],
            Self::ComputeEnvironment => &["managedEnvironments"],
            Self::CosmosAccount => &["databaseAccounts"],
            Self::SearchService => &["searchServices"],
            Self::StorageAccount => &["storageAccounts"],
            Self::ContainerRegistry => &["registries"],
            Self::KeyVault => &["vaults"],
        }
    }

    /// Full resource type, e.g. `Microsoft.Network/virtualNetworks/subnets`
    pub fn resource_type(&self) -> String {
        format!(
            "{}/{}",
            self.provider_namespace(),
            self.type_segments().join("/")
        )
    }

    /// Match a full resource type string (case-insensitive)
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.resource_type().eq_ignore_ascii_case(resource_type))
    }

    /// Abbreviation used in managed names
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::VirtualNetwork => "vnet",
            Self::Subnet => "snet",
            Self::VirtualNetworkPeering => "peer",
            Self::PrivateEndpoint => "pe",
            Self::PrivateDnsZoneGroup => "pdzg",
            Self::PrivateDnsZone => "pdz",
            Self::PrivateDnsZoneLink => "link",
            Self::PrivateDnsARecord => "a",
            Self::ComputeEnvironment => "cae",
            Self::CosmosAccount => "cosmos",
            Self::SearchService => "srch",
            Self::StorageAccount => "st",
            Self::ContainerRegistry => "cr",
            Self::KeyVault => "kv",
        }
    }

    /// Naming constraints for managed names
    pub fn name_style(&self) -> NameStyle {
        match self {
            Self::StorageAccount => NameStyle::Compact { max: 24 },
            Self::ContainerRegistry => NameStyle::Compact { max: 50 },
            Self::KeyVault => NameStyle::Hyphenated { max: 24 },
            Self::CosmosAccount => NameStyle::Hyphenated { max: 44 },
            Self::SearchService => NameStyle::Hyphenated { max: 60 },
            Self::ComputeEnvironment => NameStyle::Hyphenated { max: 60 },
            _ => NameStyle::Hyphenated { max: 80 },
        }
    }

    /// Global resources are not bound to a region
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Self::PrivateDnsZone | Self::PrivateDnsZoneLink | Self::PrivateDnsARecord
        )
    }

    pub const ALL: [ResourceKind; 14] = [
        Self::VirtualNetwork,
        Self::Subnet,
        Self::VirtualNetworkPeering,
        Self::PrivateEndpoint,
        Self::PrivateDnsZoneGroup,
        Self::PrivateDnsZone,
        Self::PrivateDnsZoneLink,
        Self::PrivateDnsARecord,
        Self::ComputeEnvironment,
        Self::CosmosAccount,
        Self::SearchService,
        Self::StorageAccount,
        Self::ContainerRegistry,
        Self::KeyVault,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_type())
    }
}

/// Dependent services reachable through a private attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceKind {
    CosmosDb,
    Search,
    StorageBlob,
    ContainerRegistry,
    KeyVault,
}

impl ServiceKind {
    /// Resource kind backing the service
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::CosmosDb => ResourceKind::CosmosAccount,
            Self::Search => ResourceKind::SearchService,
            Self::StorageBlob => ResourceKind::StorageAccount,
            Self::ContainerRegistry => ResourceKind::ContainerRegistry,
            Self::KeyVault => ResourceKind::KeyVault,
        }
    }

    /// Well-known private zone suffix for the service's public name
    pub fn dns_zone_suffix(&self) -> &'static str {
        match self {
            Self::CosmosDb => "privatelink.documents.azure.com",
            Self::Search => "privatelink.search.windows.net",
            Self::StorageBlob => "privatelink.blob.core.windows.net",
            Self::ContainerRegistry => "privatelink.azurecr.io",
            Self::KeyVault => "privatelink.vaultcore.azure.net",
        }
    }

    /// Sub-resource the attachment connects to
    pub fn group_id(&self) -> &'static str {
        match self {
            Self::CosmosDb => "Sql",
            Self::Search => "searchService",
            Self::StorageBlob => "blob",
            Self::ContainerRegistry => "registry",
            Self::KeyVault => "vault",
        }
    }

    /// Stable short key used in unit ids and names
    pub fn key(&self) -> &'static str {
        match self {
            Self::CosmosDb => "cosmos",
            Self::Search => "search",
            Self::StorageBlob => "blob",
            Self::ContainerRegistry => "registry",
            Self::KeyVault => "vault",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_paths() {
        assert_eq!(
            ResourceKind::Subnet.resource_type(),
            "Microsoft.Network/virtualNetworks/subnets"
        );
        assert_eq!(
            ResourceKind::ComputeEnvironment.resource_type(),
            "Microsoft.App/managedEnvironments"
        );
    }

    #[test]
    fn test_from_resource_type_is_case_insensitive() {
        assert_eq!(
            ResourceKind::from_resource_type("microsoft.network/VIRTUALNETWORKS"),
            Some(ResourceKind::VirtualNetwork)
        );
        assert_eq!(ResourceKind::from_resource_type("Microsoft.Web/sites"), None);
    }

    #[test]
    fn test_all_kinds_round_trip_through_type() {
        for kind in ResourceKind::ALL {
            assert_eq!(
                ResourceKind::from_resource_type(&kind.resource_type()),
                Some(kind)
            );
        }
    }

    #[test]
    fn test_service_zone_suffixes_are_private_link() {
        for kind in [
            ServiceKind::CosmosDb,
            ServiceKind::Search,
            ServiceKind::StorageBlob,
            ServiceKind::ContainerRegistry,
            ServiceKind::KeyVault,
        ] {
            assert!(kind.dns_zone_suffix().starts_with("privatelink."));
        }
    }
}
