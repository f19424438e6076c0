// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Address {address} is not the network address of /{prefix}")]
    HostBitsSet { address: Ipv4Addr, prefix: u8 },
}

/// IPv4 address block in CIDR notation
///
/// Invariants:
/// - Valid IPv4 network address
/// - No host bits set (`10.0.1.0/24`, never `10.0.1.7/24`)
///
/// # Examples
///
/// ```rust
/// use cim_private_network::domain::AddressBlock;
///
/// let block = AddressBlock::new("10.0.0.0/16").unwrap();
/// assert_eq!(block.prefix_len(), 16);
/// assert!(block.contains(&AddressBlock::new("10.0.2.0/23").unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressBlock(Ipv4Net);

impl AddressBlock {
    /// Parse an address block, rejecting host bits
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref().trim();
        let net = Ipv4Net::from_str(cidr).map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        if net.addr() != net.network() {
            return Err(NetworkError::HostBitsSet {
                address: net.addr(),
                prefix: net.prefix_len(),
            });
        }

        Ok(Self(net))
    }

    /// Create from a network address and prefix length
    pub fn from_parts(network: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        let net = Ipv4Net::new(network, prefix_len)
            .map_err(|_| NetworkError::InvalidPrefixLength(prefix_len))?;
        if net.addr() != net.network() {
            return Err(NetworkError::HostBitsSet {
                address: network,
                prefix: prefix_len,
            });
        }
        Ok(Self(net))
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Last address in the block
    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Number of addresses covered by the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.0.prefix_len()))
    }

    /// True if `other` lies entirely within this block
    pub fn contains(&self, other: &AddressBlock) -> bool {
        self.0.contains(&other.0)
    }

    /// True if the two blocks share at least one address
    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        self.0.contains(&other.0.network()) || other.0.contains(&self.0.network())
    }

    /// Host address at `offset` from the network address, if inside the block
    pub fn host(&self, offset: u32) -> Option<Ipv4Addr> {
        if u64::from(offset) >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network()) + offset))
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AddressBlock {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AddressBlock {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AddressBlock> for String {
    fn from(block: AddressBlock) -> Self {
        block.as_cidr()
    }
}

/// Intended workload of a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetRole {
    /// Hosts the compute environment; requires a platform delegation
    ComputeDelegated,
    /// Hosts private network attachments for dependent services
    PrivateEndpoint,
    /// General infrastructure (agents, jump hosts, tooling)
    Infrastructure,
}

impl SubnetRole {
    /// All roles in allocation order
    pub const ALL: [SubnetRole; 3] = [
        SubnetRole::ComputeDelegated,
        SubnetRole::PrivateEndpoint,
        SubnetRole::Infrastructure,
    ];

    /// Platform delegation required by this role
    pub fn delegation(&self) -> Option<Delegation> {
        match self {
            SubnetRole::ComputeDelegated => Some(Delegation::compute_environment()),
            SubnetRole::PrivateEndpoint | SubnetRole::Infrastructure => None,
        }
    }

    /// Default subnet name for the role
    pub fn default_subnet_name(&self) -> &'static str {
        match self {
            SubnetRole::ComputeDelegated => "snet-compute",
            SubnetRole::PrivateEndpoint => "snet-private-endpoints",
            SubnetRole::Infrastructure => "snet-infrastructure",
        }
    }
}

impl fmt::Display for SubnetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetRole::ComputeDelegated => write!(f, "compute-delegated"),
            SubnetRole::PrivateEndpoint => write!(f, "private-endpoint"),
            SubnetRole::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

/// Service delegation tag on a subnet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delegation {
    /// Platform service the subnet is delegated to
    pub service_name: String,
}

impl Delegation {
    /// Service name of the compute environment delegation
    pub const COMPUTE_ENVIRONMENT: &'static str = "Microsoft.App/environments";

    pub fn compute_environment() -> Self {
        Self {
            service_name: Self::COMPUTE_ENVIRONMENT.to_string(),
        }
    }
}

/// Subnet value object
///
/// The address is fixed once allocated; changing it means recreating the
/// subnet, never mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    pub address: AddressBlock,
    pub role: SubnetRole,
    pub delegation: Option<Delegation>,
}

impl Subnet {
    /// Create a subnet whose delegation follows its role
    pub fn for_role(name: impl Into<String>, address: AddressBlock, role: SubnetRole) -> Self {
        Self {
            name: name.into(),
            address,
            role,
            delegation: role.delegation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_block_parse() {
        let block = AddressBlock::new("10.0.0.0/16").unwrap();
        assert_eq!(block.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(block.prefix_len(), 16);
        assert_eq!(block.size(), 65536);
        assert_eq!(block.as_cidr(), "10.0.0.0/16");
    }

    #[test]
    fn test_invalid_blocks() {
        assert!(AddressBlock::new("10.0.0.0").is_err());
        assert!(AddressBlock::new("10.0.0.0/33").is_err());
        assert!(AddressBlock::new("999.0.0.0/8").is_err());
        assert!(AddressBlock::new("2001:db8::/32").is_err());
        assert_eq!(
            AddressBlock::new("10.0.1.7/24"),
            Err(NetworkError::HostBitsSet {
                address: Ipv4Addr::new(10, 0, 1, 7),
                prefix: 24
            })
        );
    }

    #[test]
    fn test_containment_and_overlap() {
        let parent = AddressBlock::new("10.0.0.0/16").unwrap();
        let a = AddressBlock::new("10.0.0.0/24").unwrap();
        let b = AddressBlock::new("10.0.1.0/24").unwrap();
        let c = AddressBlock::new("10.0.0.0/23").unwrap();
        let outside = AddressBlock::new("10.1.0.0/24").unwrap();

        assert!(parent.contains(&a));
        assert!(!parent.contains(&outside));
        assert!(!a.overlaps(&b));
        assert!(c.overlaps(&a));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_host_offset() {
        let block = AddressBlock::new("10.0.1.0/24").unwrap();
        assert_eq!(block.host(4), Some(Ipv4Addr::new(10, 0, 1, 4)));
        assert_eq!(block.host(256), None);
    }

    #[test]
    fn test_serde_as_string() {
        let block = AddressBlock::new("10.0.2.0/23").unwrap();
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, "\"10.0.2.0/23\"");
        let back: AddressBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_role_delegation() {
        assert_eq!(
            SubnetRole::ComputeDelegated.delegation(),
            Some(Delegation::compute_environment())
        );
        assert_eq!(SubnetRole::PrivateEndpoint.delegation(), None);
        assert_eq!(SubnetRole::Infrastructure.delegation(), None);
    }
}
