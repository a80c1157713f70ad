//! Error types for shared values.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("address must have 40 hex digits, got {len}: {value}")]
    BadLength { value: String, len: usize },

    #[error("address contains non-hex characters: {0}")]
    NotHex(String),
}
