// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for provisioning run events
//!
//! # Subject Pattern
//!
//! All run events follow the hierarchical pattern:
//!
//! ```text
//! provisioning.{unit_kind}.{operation}
//! ```
//!
//! This allows for:
//! - Precise subscriptions (`provisioning.discovery.completed`)
//! - Unit-level wildcards (`provisioning.peering.>`)
//! - Global subscriptions (`provisioning.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_private_network::subjects::{SubjectBuilder, UnitKind, Operation};
//!
//! let subject = SubjectBuilder::new()
//!     .unit_kind(UnitKind::Discovery)
//!     .operation(Operation::Completed)
//!     .build();
//! assert_eq!(subject, Some("provisioning.discovery.completed".to_string()));
//!
//! let wildcard = SubjectBuilder::new()
//!     .unit_kind(UnitKind::Network)
//!     .build_wildcard();
//! assert_eq!(wildcard, Some("provisioning.network.>".to_string()));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root namespace for all provisioning subjects
pub const PROVISIONING_ROOT: &str = "provisioning";

/// Kinds of provisioning units, plus the run itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Run lifecycle (not a unit)
    Run,
    /// Primary network and subnets
    Network,
    /// Well-known private zone for a service DNS suffix
    DnsZone,
    /// Dependent service with its private attachment
    Service,
    /// Public access lockdown of a service
    Lockdown,
    /// Compute environment
    Compute,
    /// Internal discovery zone
    Discovery,
    /// Network peering
    Peering,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Run => write!(f, "run"),
            UnitKind::Network => write!(f, "network"),
            UnitKind::DnsZone => write!(f, "dns_zone"),
            UnitKind::Service => write!(f, "service"),
            UnitKind::Lockdown => write!(f, "lockdown"),
            UnitKind::Compute => write!(f, "compute"),
            UnitKind::Discovery => write!(f, "discovery"),
            UnitKind::Peering => write!(f, "peering"),
        }
    }
}

/// Run event operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Started,
    Completed,
    Skipped,
    Failed,
    /// A unit ran a bounded background operation
    Deferred,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Started => write!(f, "started"),
            Operation::Completed => write!(f, "completed"),
            Operation::Skipped => write!(f, "skipped"),
            Operation::Failed => write!(f, "failed"),
            Operation::Deferred => write!(f, "deferred"),
        }
    }
}

/// Builder for provisioning NATS subjects
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    unit_kind: Option<UnitKind>,
    operation: Option<Operation>,
}

impl SubjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_kind(mut self, unit_kind: UnitKind) -> Self {
        self.unit_kind = Some(unit_kind);
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Build the complete subject; `None` unless both parts are set
    pub fn build(self) -> Option<String> {
        let unit_kind = self.unit_kind?;
        let operation = self.operation?;
        Some(format!("{}.{}.{}", PROVISIONING_ROOT, unit_kind, operation))
    }

    /// `provisioning.{unit_kind}.>`
    pub fn build_wildcard(self) -> Option<String> {
        let unit_kind = self.unit_kind?;
        Some(format!("{}.{}.>", PROVISIONING_ROOT, unit_kind))
    }

    /// `provisioning.>`
    pub fn build_all() -> String {
        format!("{}.>", PROVISIONING_ROOT)
    }
}

/// Subject for a unit kind and operation
pub fn subject_for(unit_kind: UnitKind, operation: Operation) -> String {
    format!("{}.{}.{}", PROVISIONING_ROOT, unit_kind, operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_builder() {
        let subject = SubjectBuilder::new()
            .unit_kind(UnitKind::DnsZone)
            .operation(Operation::Started)
            .build();
        assert_eq!(subject.as_deref(), Some("provisioning.dns_zone.started"));
    }

    #[test]
    fn test_incomplete_builder() {
        assert_eq!(SubjectBuilder::new().operation(Operation::Failed).build(), None);
        assert_eq!(SubjectBuilder::new().build_wildcard(), None);
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(
            SubjectBuilder::new()
                .unit_kind(UnitKind::Peering)
                .build_wildcard()
                .as_deref(),
            Some("provisioning.peering.>")
        );
        assert_eq!(SubjectBuilder::build_all(), "provisioning.>");
    }

    #[test]
    fn test_subject_for() {
        assert_eq!(
            subject_for(UnitKind::Run, Operation::Completed),
            "provisioning.run.completed"
        );
        assert_eq!(
            subject_for(UnitKind::Discovery, Operation::Deferred),
            "provisioning.discovery.deferred"
        );
    }
}
