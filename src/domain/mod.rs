// Copyright (c) 2025 - Cowboy AI, Inc.
//! Private Network Domain Models
//!
//! Value objects with validation invariants shared by every provisioning unit.
//!
//! # Value Objects with Invariants
//!
//! - [`AddressBlock`] - IPv4 CIDR block without host bits
//! - [`Subnet`] / [`SubnetRole`] - subnets tagged with their intended workload
//! - [`ZoneName`] - canonical private DNS zone names (RFC 1123 labels)
//! - [`ResourceId`] - parsed hierarchical resource identifiers
//! - [`ResourceReference`] - create-new or import-existing, resolved once
//! - [`ResourceKind`] / [`ServiceKind`] - provisioned resource taxonomy
//! - [`ResourceNamer`] - deterministic managed names

pub mod naming;
pub mod network;
pub mod resource_id;
pub mod resource_kind;
pub mod zone_name;

pub use naming::ResourceNamer;
pub use network::{AddressBlock, Delegation, NetworkError, Subnet, SubnetRole};
pub use resource_id::{
    EffectiveResource, ReferenceOrigin, ReferenceParseError, ResourceId, ResourceReference,
    ResourceScope,
};
pub use resource_kind::{NameStyle, ResourceKind, ServiceKind};
pub use zone_name::{ZoneName, ZoneNameError};
