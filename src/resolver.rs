// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Existence Resolver
//!
//! Decides, once, whether a dependency is imported or created:
//!
//! ```text
//! None / ""            → Managed(default id)
//! "/subscriptions/..." → parse → get → External(id)
//!                          │       └── absent → NotFound (never "create instead")
//!                          └── malformed → ReferenceParse
//! ```
//!
//! A malformed or dangling external identifier always fails the run. Falling
//! back to a fresh resource would silently create a duplicate.

use tracing::{debug, info};

use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::domain::{ResourceId, ResourceKind, ResourceReference};
use crate::errors::{ProvisioningError, ProvisioningResult};

/// Parse an optional external identifier without touching the control plane
///
/// Returns `Ok(None)` for an absent or blank identifier.
pub fn parse_external(
    external_id: Option<&str>,
    expected: ResourceKind,
) -> ProvisioningResult<Option<ResourceId>> {
    match external_id.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => ResourceId::parse_kind(raw, expected)
            .map(Some)
            .map_err(|e| ProvisioningError::ReferenceParse {
                id: raw.to_string(),
                reason: e.to_string(),
            }),
    }
}

/// Resolves optional external identifiers into [`ResourceReference`]s
pub struct ResourceExistenceResolver<'a> {
    control_plane: &'a dyn ControlPlane,
}

impl<'a> ResourceExistenceResolver<'a> {
    pub fn new(control_plane: &'a dyn ControlPlane) -> Self {
        Self { control_plane }
    }

    /// Resolve a dependency reference
    ///
    /// `managed_id` and `default_location` describe the resource the
    /// orchestrator would create when no external identifier is supplied.
    pub async fn resolve(
        &self,
        external_id: Option<&str>,
        expected: ResourceKind,
        managed_id: ResourceId,
        default_location: &str,
    ) -> ProvisioningResult<ResourceReference> {
        let Some(id) = parse_external(external_id, expected)? else {
            debug!(id = %managed_id, "No external identifier, resource will be managed");
            return Ok(ResourceReference::Managed {
                id: managed_id,
                location: default_location.to_string(),
            });
        };

        let resource = self
            .control_plane
            .get(&id)
            .await?
            .ok_or_else(|| ProvisioningError::ControlPlane(ControlPlaneError::NotFound(id.to_string())))?;

        info!(id = %id, location = %resource.location, "📎 Importing existing resource");
        Ok(ResourceReference::External {
            id,
            location: resource.location,
        })
    }
}
