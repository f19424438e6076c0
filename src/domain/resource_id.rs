// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Identifiers and References
//!
//! Parses hierarchical resource identifiers of the form
//!
//! ```text
//! /subscriptions/{guid}/resourceGroups/{group}/providers/{namespace}/{type}/{name}[/{type}/{name}]*
//! ```
//!
//! and models the create-or-import duality as a single tagged
//! [`ResourceReference`]. Downstream code only ever reads the resolved
//! [`EffectiveResource`] shape and never branches on which path produced it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::resource_kind::ResourceKind;

/// Identifier parse error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceParseError {
    #[error("identifier is empty")]
    Empty,

    #[error("missing '{0}' segment")]
    MissingSegment(&'static str),

    #[error("subscription '{0}' is not a GUID")]
    InvalidSubscription(String),

    #[error("resource group '{0}' is invalid")]
    InvalidResourceGroup(String),

    #[error("provider namespace '{0}' is invalid")]
    InvalidProvider(String),

    #[error("name '{name}' for type '{resource_type}' is invalid")]
    InvalidName { resource_type: String, name: String },

    #[error("type segment '{0}' has no name")]
    UnpairedSegment(String),

    #[error("expected a {expected} identifier, found {actual}")]
    UnexpectedType { expected: String, actual: String },
}

/// Subscription and resource group that own a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceScope {
    subscription_id: String,
    resource_group: String,
}

impl ResourceScope {
    pub fn new(
        subscription_id: impl AsRef<str>,
        resource_group: impl AsRef<str>,
    ) -> Result<Self, ReferenceParseError> {
        Ok(Self {
            subscription_id: validate_subscription(subscription_id.as_ref())?,
            resource_group: validate_resource_group(resource_group.as_ref())?,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Identifier of a top-level resource in this scope
    pub fn resource_id(&self, kind: ResourceKind, name: impl Into<String>) -> ResourceId {
        let segments = kind.type_segments();
        ResourceId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            provider_namespace: kind.provider_namespace().to_string(),
            segments: vec![(segments[0].to_string(), name.into())],
        }
    }
}

/// Parsed hierarchical resource identifier
///
/// Comparison and hashing are case-insensitive, matching how the control
/// plane treats identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    subscription_id: String,
    resource_group: String,
    provider_namespace: String,
    segments: Vec<(String, String)>,
}

impl ResourceId {
    /// Parse an identifier, failing fast on any structurally invalid component
    pub fn parse(id: &str) -> Result<Self, ReferenceParseError> {
        let trimmed = id.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ReferenceParseError::Empty);
        }

        let mut parts = trimmed.trim_start_matches('/').split('/');

        expect_keyword(parts.next(), "subscriptions")?;
        let subscription_id = validate_subscription(
            parts
                .next()
                .ok_or(ReferenceParseError::MissingSegment("subscriptions"))?,
        )?;

        expect_keyword(parts.next(), "resourceGroups")?;
        let resource_group = validate_resource_group(
            parts
                .next()
                .ok_or(ReferenceParseError::MissingSegment("resourceGroups"))?,
        )?;

        expect_keyword(parts.next(), "providers")?;
        let provider_namespace = parts
            .next()
            .ok_or(ReferenceParseError::MissingSegment("providers"))?;
        if !is_valid_provider(provider_namespace) {
            return Err(ReferenceParseError::InvalidProvider(
                provider_namespace.to_string(),
            ));
        }

        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            return Err(ReferenceParseError::MissingSegment("resource type"));
        }

        let mut segments = Vec::with_capacity(rest.len() / 2);
        for pair in rest.chunks(2) {
            let resource_type = pair[0];
            let name = pair
                .get(1)
                .ok_or_else(|| ReferenceParseError::UnpairedSegment(resource_type.to_string()))?;
            if resource_type.is_empty() || !is_valid_name(name) {
                return Err(ReferenceParseError::InvalidName {
                    resource_type: resource_type.to_string(),
                    name: name.to_string(),
                });
            }
            segments.push((resource_type.to_string(), name.to_string()));
        }

        Ok(Self {
            subscription_id,
            resource_group,
            provider_namespace: provider_namespace.to_string(),
            segments,
        })
    }

    /// Parse and require a specific resource kind
    pub fn parse_kind(id: &str, expected: ResourceKind) -> Result<Self, ReferenceParseError> {
        let parsed = Self::parse(id)?;
        if !parsed.resource_type().eq_ignore_ascii_case(&expected.resource_type()) {
            return Err(ReferenceParseError::UnexpectedType {
                expected: expected.resource_type(),
                actual: parsed.resource_type(),
            });
        }
        Ok(parsed)
    }

    /// Identifier of a child resource (`kind` must be nested one level below)
    pub fn child(&self, kind: ResourceKind, name: impl Into<String>) -> ResourceId {
        let child_type = kind
            .type_segments()
            .last()
            .copied()
            .unwrap_or_default()
            .to_string();
        let mut segments = self.segments.clone();
        segments.push((child_type, name.into()));
        ResourceId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            provider_namespace: self.provider_namespace.clone(),
            segments,
        }
    }

    /// Identifier of the enclosing resource, if this is a child
    pub fn parent(&self) -> Option<ResourceId> {
        if self.segments.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn scope(&self) -> ResourceScope {
        ResourceScope {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }

    /// Leaf resource name
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .unwrap_or_default()
    }

    /// Full resource type, e.g. `Microsoft.Network/virtualNetworks/subnets`
    pub fn resource_type(&self) -> String {
        let types: Vec<&str> = self.segments.iter().map(|(t, _)| t.as_str()).collect();
        format!("{}/{}", self.provider_namespace, types.join("/"))
    }

    /// Known resource kind, if the type is part of the taxonomy
    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::from_resource_type(&self.resource_type())
    }

    /// Case-folded key for maps and comparisons
    pub fn key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.subscription_id, self.resource_group, self.provider_namespace
        )?;
        for (resource_type, name) in &self.segments {
            write!(f, "/{}/{}", resource_type, name)?;
        }
        Ok(())
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl FromStr for ResourceId {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ReferenceParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

fn expect_keyword(part: Option<&str>, keyword: &'static str) -> Result<(), ReferenceParseError> {
    match part {
        Some(found) if found.eq_ignore_ascii_case(keyword) => Ok(()),
        _ => Err(ReferenceParseError::MissingSegment(keyword)),
    }
}

fn validate_subscription(value: &str) -> Result<String, ReferenceParseError> {
    Uuid::parse_str(value)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| ReferenceParseError::InvalidSubscription(value.to_string()))
}

fn validate_resource_group(value: &str) -> Result<String, ReferenceParseError> {
    let valid_chars = value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'));
    if value.is_empty() || value.len() > 90 || value.ends_with('.') || !valid_chars {
        return Err(ReferenceParseError::InvalidResourceGroup(value.to_string()));
    }
    Ok(value.to_string())
}

fn is_valid_provider(value: &str) -> bool {
    value.contains('.')
        && !value.starts_with('.')
        && !value.ends_with('.')
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

fn is_valid_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, '?' | '#' | '%' | '&' | '\\' | '<' | '>'))
}

/// Which path produced a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceOrigin {
    External,
    Managed,
}

/// Create-new or import-existing, resolved exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ResourceReference {
    /// Caller-supplied resource verified to exist
    External { id: ResourceId, location: String },
    /// Resource the orchestrator creates and owns
    Managed { id: ResourceId, location: String },
}

impl ResourceReference {
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::External { id, .. } | Self::Managed { id, .. } => id,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::External { location, .. } | Self::Managed { location, .. } => location,
        }
    }

    pub fn name(&self) -> &str {
        self.id().name()
    }

    pub fn origin(&self) -> ReferenceOrigin {
        match self {
            Self::External { .. } => ReferenceOrigin::External,
            Self::Managed { .. } => ReferenceOrigin::Managed,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Managed { .. })
    }

    /// Uniform view consumed by downstream units
    pub fn effective(&self) -> EffectiveResource {
        let id = self.id().clone();
        EffectiveResource {
            name: id.name().to_string(),
            subscription_id: id.subscription_id().to_string(),
            resource_group: id.resource_group().to_string(),
            location: self.location().to_string(),
            origin: self.origin(),
            id,
        }
    }
}

/// Effective name + location tuple of a resolved reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveResource {
    pub id: ResourceId,
    pub name: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    pub origin: ReferenceOrigin,
}
