//! Typed error hierarchy for the portal.
//!
//! Database methods return `anyhow::Result`; domain failures are raised as
//! [`PortalError`] and travel inside the `anyhow::Error` until the HTTP layer
//! downcasts them into a status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("Version mismatch. Expected {expected}, but current version is {current}")]
    VersionConflict { expected: i64, current: i64 },

    #[error("Note {id} not found or is not current")]
    NoteNotCurrent { id: i64 },

    #[error("Key '{key}' is already in use")]
    DuplicateKey { key: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User entity ID not available")]
    MissingActor,

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl PortalError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<portal_common::ParseEnumError> for PortalError {
    fn from(e: portal_common::ParseEnumError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_message() {
        let err = PortalError::VersionConflict {
            expected: 2,
            current: 3,
        };
        assert_eq!(
            err.to_string(),
            "Version mismatch. Expected 2, but current version is 3"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = PortalError::not_found("Package", 12);
        assert_eq!(err.to_string(), "Package 12 not found");
        assert!(matches!(err, PortalError::NotFound { id: 12, .. }));
    }

    #[test]
    fn test_enum_parse_error_becomes_validation() {
        let parse_err = "bogus"
            .parse::<portal_common::PartnerStatus>()
            .unwrap_err();
        let err: PortalError = parse_err.into();
        match err {
            PortalError::Validation(msg) => assert!(msg.contains("prospect, active")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = PortalError::NoteNotCurrent { id: 5 }.into();
        let portal = err.downcast_ref::<PortalError>();
        assert!(matches!(portal, Some(PortalError::NoteNotCurrent { id: 5 })));
    }
}
