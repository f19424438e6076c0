// Copyright (c) 2025 - Cowboy AI, Inc.
//! DNS Zone Name Value Object with RFC 1123 Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Zone name validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZoneNameError {
    #[error("Zone name is empty")]
    Empty,

    #[error("Zone name exceeds maximum length of 253 characters: {0}")]
    TooLong(usize),

    #[error("Label exceeds maximum length of 63 characters: {0}")]
    LabelTooLong(String),

    #[error("Invalid character in zone name: {0}")]
    InvalidCharacter(char),

    #[error("Label cannot start or end with hyphen: {0}")]
    InvalidLabelFormat(String),

    #[error("Zone name must have at least two labels: {0}")]
    SingleLabel(String),
}

/// Fully qualified, lowercase DNS zone name
///
/// Private zones are global resources identified by their suffix, so two
/// spellings of the same suffix must compare equal. The name is stored
/// lowercase without a trailing dot.
///
/// # Examples
///
/// ```rust
/// use cim_private_network::domain::ZoneName;
///
/// let zone = ZoneName::new("privatelink.blob.core.windows.net").unwrap();
/// assert_eq!(zone.first_label(), "privatelink");
///
/// let internal = ZoneName::internal_for("Proud-Sea-1234.EastUS.example.io").unwrap();
/// assert_eq!(internal.as_str(), "internal.proud-sea-1234.eastus.example.io");
///
/// assert!(ZoneName::new("localhost").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZoneName(String);

impl ZoneName {
    pub const MAX_LENGTH: usize = 253;
    pub const MAX_LABEL_LENGTH: usize = 63;

    /// Label prepended to the compute environment's domain for discovery zones
    pub const INTERNAL_LABEL: &'static str = "internal";

    pub fn new(name: impl AsRef<str>) -> Result<Self, ZoneNameError> {
        let name = name.as_ref().trim().trim_end_matches('.').to_lowercase();

        if name.is_empty() {
            return Err(ZoneNameError::Empty);
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(ZoneNameError::TooLong(name.len()));
        }

        for label in name.split('.') {
            Self::validate_label(label)?;
        }

        if !name.contains('.') {
            return Err(ZoneNameError::SingleLabel(name));
        }

        Ok(Self(name))
    }

    /// Discovery zone for a compute environment's assigned domain
    pub fn internal_for(domain: impl AsRef<str>) -> Result<Self, ZoneNameError> {
        let domain = domain.as_ref().trim().trim_end_matches('.');
        if domain.is_empty() {
            return Err(ZoneNameError::Empty);
        }
        Self::new(format!("{}.{}", Self::INTERNAL_LABEL, domain))
    }

    fn validate_label(label: &str) -> Result<(), ZoneNameError> {
        if label.is_empty() {
            return Err(ZoneNameError::Empty);
        }

        if label.len() > Self::MAX_LABEL_LENGTH {
            return Err(ZoneNameError::LabelTooLong(label.to_string()));
        }

        if let Some(ch) = label
            .chars()
            .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-')
        {
            return Err(ZoneNameError::InvalidCharacter(ch));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(ZoneNameError::InvalidLabelFormat(label.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn first_label(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ZoneName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ZoneName {
    type Error = ZoneNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ZoneName {
    type Error = ZoneNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ZoneName> for String {
    fn from(zone: ZoneName) -> Self {
        zone.0
    }
}
