// Copyright (c) 2025 - Cowboy AI, Inc.
//! Control Plane Contract
//!
//! The orchestrator never talks to a cloud provider directly. Every unit
//! goes through the provider-agnostic [`ControlPlane`] trait, which offers
//! exactly what provisioning needs:
//!
//! ```text
//! get(id)               → read a resource and its attributes (None if absent)
//! create_or_update(spec) → create or update a resource and wait for completion
//! ```
//!
//! Retries belong to the implementation behind the trait, never to the
//! orchestrator. [`ensure`] layers idempotent creation on top: an existing
//! resource is success, not an error, and is returned untouched.
//!
//! [`InMemoryControlPlane`] is a complete in-process implementation used by
//! the test suites and by the `provision` binary's simulation mode.

pub mod memory;

pub use memory::{CallKind, ControlPlaneCall, InMemoryControlPlane};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{ResourceId, ResourceKind};

/// Errors reported by a control plane implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    /// Resource (or its parent) does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Caller lacks write permission on the target scope
    #[error("Forbidden: {operation} on {scope}")]
    Forbidden { scope: String, operation: String },

    /// Concurrent create of the same resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Desired state of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub id: ResourceId,
    pub location: String,
    pub properties: Map<String, Value>,
}

impl ResourceSpec {
    pub fn new(id: ResourceId, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
            properties: Map::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Observed state of a resource, including platform-assigned attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub location: String,
    pub properties: Map<String, Value>,
}

impl Resource {
    pub fn kind(&self) -> Option<ResourceKind> {
        self.id.kind()
    }

    /// Read an attribute
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Read a string attribute
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// Provider-agnostic control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Read a resource; `Ok(None)` if it does not exist
    async fn get(&self, id: &ResourceId) -> ControlPlaneResult<Option<Resource>>;

    /// Create or update a resource and wait for the operation to complete
    async fn create_or_update(&self, spec: ResourceSpec) -> ControlPlaneResult<Resource>;
}

/// Outcome of an idempotent create
#[derive(Debug, Clone, PartialEq)]
pub struct Ensured {
    pub resource: Resource,
    /// False when the resource already existed and was left untouched
    pub created: bool,
}

/// Create `spec` unless a resource with the same id already exists
///
/// A `Conflict` from a concurrent create is resolved by reading the winner
/// back, so "already exists" never surfaces as an error.
pub async fn ensure(
    control_plane: &dyn ControlPlane,
    spec: ResourceSpec,
) -> ControlPlaneResult<Ensured> {
    if let Some(existing) = control_plane.get(&spec.id).await? {
        debug!(id = %spec.id, "Resource already exists, skipping create");
        return Ok(Ensured {
            resource: existing,
            created: false,
        });
    }

    let id = spec.id.clone();
    match control_plane.create_or_update(spec).await {
        Ok(resource) => Ok(Ensured {
            resource,
            created: true,
        }),
        Err(ControlPlaneError::Conflict(reason)) => {
            debug!(id = %id, %reason, "Concurrent create detected, reading existing resource");
            let resource = control_plane
                .get(&id)
                .await?
                .ok_or(ControlPlaneError::Conflict(reason))?;
            Ok(Ensured {
                resource,
                created: false,
            })
        }
        Err(err) => Err(err),
    }
}
