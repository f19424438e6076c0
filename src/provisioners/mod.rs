// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Provisioners
//!
//! Each provisioner owns the lifecycle of one family of resources and only
//! reads the outputs of others.

pub mod compute;
pub mod network;
pub mod private_connectivity;

pub use compute::{provision_compute, ComputeEnvironment};
pub use network::{NetworkTopologyProvisioner, ProvisionedSubnet, SubnetRequest, Topology, TopologyRequest};
pub use private_connectivity::{
    link_zone, LockdownOutcome, LockdownState, PrivateConnectivityProvisioner, PrivateZone,
    PrivateZoneRequest, ServiceConnectRequest, ServiceConnectivity, ZoneLink,
};
