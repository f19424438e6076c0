// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Planner
//!
//! Computes deterministic, non-overlapping subnet blocks inside a parent
//! address block. The parent is split into four equal slots:
//!
//! ```text
//! parent 10.0.0.0/16
//! ├── slot 0  10.0.0.0/24   compute-delegated
//! ├── slot 1  10.0.1.0/24   private-endpoint
//! └── slot 2+3 10.0.2.0/23  infrastructure (double width)
//! ```
//!
//! The slot width is a /24 for any parent of /22 or wider and shrinks with
//! smaller parents so the three blocks always fit. Allocation depends only on
//! the parent and the role, never on what already exists, so reruns never move
//! an address out from under a created subnet.
//!
//! # Invariants
//!
//! - Planned blocks are pairwise disjoint
//! - Planned blocks are contained in the parent
//! - An explicit address is used verbatim, with no containment check

use std::net::Ipv4Addr;

use tracing::debug;

use crate::domain::{AddressBlock, SubnetRole};
use crate::errors::{ProvisioningError, ProvisioningResult};

/// Widest slot prefix handed out to a single-width role
pub const DEFAULT_SLOT_PREFIX: u8 = 24;

/// Narrowest slot prefix that still leaves usable hosts after platform reservations
pub const MAX_SLOT_PREFIX: u8 = 29;

/// Plan the block for `role` inside `parent`
///
/// # Examples
///
/// ```rust
/// use cim_private_network::domain::{AddressBlock, SubnetRole};
/// use cim_private_network::planner::plan;
///
/// let parent = AddressBlock::new("10.0.0.0/16").unwrap();
/// let infra = plan(&parent, SubnetRole::Infrastructure).unwrap();
/// assert_eq!(infra.as_cidr(), "10.0.2.0/23");
/// ```
pub fn plan(parent: &AddressBlock, role: SubnetRole) -> ProvisioningResult<AddressBlock> {
    let slot_prefix = slot_prefix(parent)?;
    let slot_size = 1u32 << (32 - u32::from(slot_prefix));

    let (slot, prefix) = match role {
        SubnetRole::ComputeDelegated => (0, slot_prefix),
        SubnetRole::PrivateEndpoint => (1, slot_prefix),
        SubnetRole::Infrastructure => (2, slot_prefix - 1),
    };

    let base = u32::from(parent.network());
    let network = Ipv4Addr::from(base + slot * slot_size);
    let block = AddressBlock::from_parts(network, prefix)
        .map_err(|e| ProvisioningError::Planning(format!("{} in {}: {}", role, parent, e)))?;

    debug!(%parent, %role, %block, "Planned subnet block");
    Ok(block)
}

/// Resolve a subnet address: explicit configuration wins, otherwise plan
///
/// With no explicit address and no parent block (e.g. an imported network
/// whose address space could not be read) this fails instead of inventing
/// an unrelated block.
pub fn resolve(
    parent: Option<&AddressBlock>,
    role: SubnetRole,
    explicit: Option<AddressBlock>,
) -> ProvisioningResult<AddressBlock> {
    if let Some(address) = explicit {
        return Ok(address);
    }
    let parent = parent.ok_or_else(|| {
        ProvisioningError::Planning(format!(
            "no explicit address for {} subnet and no parent address block available",
            role
        ))
    })?;
    plan(parent, role)
}

/// Plan every role in allocation order
pub fn plan_all(parent: &AddressBlock) -> ProvisioningResult<Vec<(SubnetRole, AddressBlock)>> {
    SubnetRole::ALL
        .iter()
        .map(|role| plan(parent, *role).map(|block| (*role, block)))
        .collect()
}

fn slot_prefix(parent: &AddressBlock) -> ProvisioningResult<u8> {
    let prefix = DEFAULT_SLOT_PREFIX.max(parent.prefix_len() + 2);
    if prefix > MAX_SLOT_PREFIX {
        return Err(ProvisioningError::Planning(format!(
            "parent block {} is too small for three subnets (needs /{} or wider)",
            parent,
            MAX_SLOT_PREFIX - 2
        )));
    }
    Ok(prefix)
}
