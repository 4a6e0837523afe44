//! Shared domain vocabulary for the ops portal.
//!
//! Everything here is pure: string-backed enums stored in SQLite columns,
//! the permission-string table that gates routes and operations, task
//! template category derivation, and currency conversion. The server crate
//! owns persistence and HTTP.

#[macro_use]
mod macros;

pub mod access;
pub mod enums;
pub mod money;
pub mod templates;

pub use enums::*;

use thiserror::Error;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} '{value}'. Valid values: {valid}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub valid: String,
}
