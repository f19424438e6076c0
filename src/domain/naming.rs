// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deterministic Resource Naming
//!
//! Managed resource names are derived from a resource token that depends only
//! on the deployment identity (subscription, resource group, environment,
//! location). Reruns with the same identity therefore address the same
//! resources, which is what makes every unit idempotent.

use sha2::{Digest, Sha256};

use super::resource_id::ResourceId;
use super::resource_kind::{NameStyle, ResourceKind, ServiceKind};
use super::zone_name::ZoneName;

/// Length of the resource token
pub const TOKEN_LENGTH: usize = 13;

/// Compute the resource token for a deployment identity
///
/// # Examples
///
/// ```rust
/// use cim_private_network::domain::naming::resource_token;
///
/// let a = resource_token(&["sub", "rg", "dev", "eastus"]);
/// let b = resource_token(&["sub", "rg", "dev", "eastus"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 13);
/// ```
pub fn resource_token(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.to_lowercase().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..TOKEN_LENGTH].to_string()
}

/// Short stable hash of an arbitrary key
fn short_hash(value: &str, len: usize) -> String {
    let digest = hex::encode(Sha256::digest(value.to_lowercase().as_bytes()));
    digest[..len].to_string()
}

/// Derives managed names for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamer {
    token: String,
}

impl ResourceNamer {
    pub fn new(
        subscription_id: &str,
        resource_group: &str,
        environment_name: &str,
        location: &str,
    ) -> Self {
        Self {
            token: resource_token(&[subscription_id, resource_group, environment_name, location]),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Managed name for a top-level resource
    pub fn name(&self, kind: ResourceKind) -> String {
        render(kind.name_style(), kind.abbreviation(), &self.token)
    }

    /// Managed name for a dependent service
    pub fn service_name(&self, service: ServiceKind) -> String {
        self.name(service.resource_kind())
    }

    /// Private endpoint name for a service
    pub fn endpoint_name(&self, service: ServiceKind) -> String {
        format!(
            "{}-{}-{}",
            ResourceKind::PrivateEndpoint.abbreviation(),
            service.key(),
            self.token
        )
    }

    /// Zone link name, unique per linked network and stable across reruns
    pub fn zone_link_name(network: &ResourceId) -> String {
        let base = truncate(network.name(), 60);
        format!("{}-{}", base, short_hash(&network.key(), 8))
    }

    /// Zone config name inside a DNS zone group
    pub fn zone_config_name(zone: &ZoneName) -> String {
        zone.as_str().replace('.', "-")
    }

    /// Peering name from `local` towards `remote`
    pub fn peering_name(local: &ResourceId, remote: &ResourceId) -> String {
        format!(
            "peer-{}-to-{}",
            truncate(local.name(), 30),
            truncate(remote.name(), 30)
        )
    }
}

fn render(style: NameStyle, abbreviation: &str, token: &str) -> String {
    match style {
        NameStyle::Hyphenated { max } => {
            truncate(&format!("{}-{}", abbreviation, token).to_lowercase(), max)
        }
        NameStyle::Compact { max } => {
            let compact: String = format!("{}{}", abbreviation, token)
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            truncate(&compact.to_lowercase(), max)
        }
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
