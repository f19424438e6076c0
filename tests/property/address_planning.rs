// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Address Planning
//!
//! Every parent block wide enough for three subnets must yield the same
//! disjoint allocations, all inside the parent, on every call.

use std::net::Ipv4Addr;

use cim_private_network::domain::{AddressBlock, SubnetRole};
use cim_private_network::planner::{plan_all, resolve, MAX_SLOT_PREFIX};
use proptest::prelude::*;

fn block(address: u32, prefix_len: u8) -> AddressBlock {
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    AddressBlock::from_parts(Ipv4Addr::from(address & mask), prefix_len).unwrap()
}

/// Parent blocks the planner accepts
fn plannable_parent() -> impl Strategy<Value = AddressBlock> {
    (any::<u32>(), 0u8..=MAX_SLOT_PREFIX - 2).prop_map(|(address, prefix)| block(address, prefix))
}

fn too_small_parent() -> impl Strategy<Value = AddressBlock> {
    (any::<u32>(), MAX_SLOT_PREFIX - 1..=32u8).prop_map(|(address, prefix)| block(address, prefix))
}

proptest! {
    /// Planning is a pure function of the parent block
    #[test]
    fn prop_planning_is_deterministic(parent in plannable_parent()) {
        prop_assert_eq!(plan_all(&parent).unwrap(), plan_all(&parent).unwrap());
    }

    #[test]
    fn prop_allocations_are_contained_and_disjoint(parent in plannable_parent()) {
        let planned = plan_all(&parent).unwrap();
        prop_assert_eq!(planned.len(), 3);

        for (role, block) in &planned {
            prop_assert!(parent.contains(block), "{} {} escapes {}", role, block, parent);
        }
        for (i, (_, a)) in planned.iter().enumerate() {
            for (_, b) in &planned[i + 1..] {
                prop_assert!(!a.overlaps(b), "{} overlaps {}", a, b);
            }
        }
    }

    /// Roles come back in allocation order with the infrastructure block
    /// twice the size of the others
    #[test]
    fn prop_role_order_and_sizes(parent in plannable_parent()) {
        let planned = plan_all(&parent).unwrap();
        let roles: Vec<SubnetRole> = planned.iter().map(|(role, _)| *role).collect();
        prop_assert_eq!(roles, SubnetRole::ALL.to_vec());

        let sizes: Vec<u64> = planned.iter().map(|(_, block)| block.size()).collect();
        prop_assert_eq!(sizes[0], sizes[1]);
        prop_assert_eq!(sizes[2], sizes[0] * 2);
        prop_assert!(planned[0].1.prefix_len() >= 24);
    }

    #[test]
    fn prop_small_parents_are_rejected(parent in too_small_parent()) {
        let err = plan_all(&parent).unwrap_err();
        prop_assert_eq!(err.category(), "planning");
    }

    /// An explicit address is taken as-is even when a parent is known
    #[test]
    fn prop_explicit_address_wins(
        parent in plannable_parent(),
        explicit in (any::<u32>(), 8u8..=30).prop_map(|(a, p)| block(a, p)),
    ) {
        for role in SubnetRole::ALL {
            prop_assert_eq!(resolve(Some(&parent), role, Some(explicit)).unwrap(), explicit);
        }
    }
}
