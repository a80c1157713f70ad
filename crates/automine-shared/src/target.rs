//! Targets ("mines") and their observed availability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// On-chain address of a target, stored lowercase.
///
/// Two addresses that differ only in hex case are the same target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;

        if hex.len() != 40 {
            return Err(AddressError::BadLength {
                value: trimmed.to_string(),
                len: hex.len(),
            });
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::NotHex(trimmed.to_string()));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First and last four hex digits, for log lines
    pub fn short(&self) -> String {
        format!("{}..{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

/// Availability of one target as seen by a single poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub id: Address,
    pub label: String,
    pub is_available: bool,
    pub observed_at: DateTime<Utc>,
}

impl TargetStatus {
    pub fn new(id: Address, label: impl Into<String>, is_available: bool, observed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            label: label.into(),
            is_available,
            observed_at,
        }
    }
}

/// One recorded availability transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub is_available: bool,
    pub at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(is_available: bool, at: DateTime<Utc>) -> Self {
        Self { is_available, at }
    }
}
