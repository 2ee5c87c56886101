//! Error handling for residue.
//!
//! This module provides:
//! - [`ResidueError`]: The main error enum for all shell operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`suggest_for_error`]: Context-aware recovery hints on top of the
//!   static per-code suggestions
//!
//! The taxonomy keeps two distinctions callers depend on: analysis errors
//! (observe/trace failed) versus infrastructure errors (collapse could not
//! run at all), and registry conditions a caller can recover from
//! (`ShellNotFound`) versus conditions that are fatal where they occur
//! (`DuplicateRegistration`, invalid metadata).

mod codes;
mod suggestions;

use std::io;

use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;
pub use suggestions::{suggest_for_error, suggest_similar_shells};

/// Main error type for residue operations.
#[derive(Error, Debug)]
pub enum ResidueError {
    #[error("Shell not found: {0}")]
    ShellNotFound(String),

    #[error("Shell already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Invalid shell metadata for '{shell_id}': {reason}")]
    InvalidMetadata { shell_id: String, reason: String },

    #[error("Invalid shell version for '{shell_id}': {reason}")]
    InvalidVersion { shell_id: String, reason: String },

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Observation failed in shell '{shell_id}': {reason}")]
    ObservationFailed { shell_id: String, reason: String },

    #[error("Trace failed in shell '{shell_id}': {reason}")]
    TraceFailed { shell_id: String, reason: String },

    #[error("Collapse could not run in shell '{shell_id}': {reason}")]
    Infrastructure { shell_id: String, reason: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ResidueError {
    /// Build an observation-phase analysis error.
    pub fn observation_failed(shell_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ObservationFailed {
            shell_id: shell_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a trace-phase analysis error.
    pub fn trace_failed(shell_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TraceFailed {
            shell_id: shell_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an infrastructure error: the collapse phase could not run.
    pub fn infrastructure(shell_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Infrastructure {
            shell_id: shell_id.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures of the analysis phases (observe/trace).
    #[must_use]
    pub const fn is_analysis(&self) -> bool {
        matches!(
            self,
            Self::ObservationFailed { .. } | Self::TraceFailed { .. }
        )
    }

    /// True when the collapse phase could not run at all. A successful run
    /// whose target resisted the intended failure is not an error.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }

    /// Attribute a foreign error to the observation phase, keeping errors
    /// that already carry a phase.
    #[must_use]
    pub fn into_observation_failure(self, shell_id: &str) -> Self {
        match self {
            Self::ObservationFailed { .. } => self,
            other => Self::observation_failed(shell_id, other),
        }
    }

    /// Attribute a foreign error to the trace phase.
    #[must_use]
    pub fn into_trace_failure(self, shell_id: &str) -> Self {
        match self {
            Self::TraceFailed { .. } => self,
            other => Self::trace_failed(shell_id, other),
        }
    }

    /// Attribute a foreign error to the collapse phase as infrastructure.
    #[must_use]
    pub fn into_infrastructure(self, shell_id: &str) -> Self {
        match self {
            Self::Infrastructure { .. } => self,
            other => Self::infrastructure(shell_id, other),
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ShellNotFound(_) => ErrorCode::ShellNotFound,
            Self::DuplicateRegistration(_) => ErrorCode::DuplicateRegistration,
            Self::InvalidMetadata { .. } => ErrorCode::MetadataInvalid,
            Self::InvalidVersion { .. } => ErrorCode::VersionInvalid,
            Self::ConfigNotFound(_) => ErrorCode::ConfigNotFound,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::ObservationFailed { .. } => ErrorCode::ObservationFailed,
            Self::TraceFailed { .. } => ErrorCode::TraceFailed,
            Self::Infrastructure { .. } => ErrorCode::InfrastructureFailure,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::Io(_) => ErrorCode::IoError,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::ShellNotFound(id) | Self::DuplicateRegistration(id) => {
                Some(serde_json::json!({ "shell_id": id }))
            }
            Self::InvalidMetadata { shell_id, reason }
            | Self::InvalidVersion { shell_id, reason }
            | Self::ObservationFailed { shell_id, reason }
            | Self::TraceFailed { shell_id, reason }
            | Self::Infrastructure { shell_id, reason } => {
                Some(serde_json::json!({ "shell_id": shell_id, "reason": reason }))
            }
            Self::ConfigNotFound(path) => Some(serde_json::json!({ "path": path })),
            _ => None,
        }
    }
}

/// Result type alias using ResidueError.
pub type Result<T> = std::result::Result<T, ResidueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ResidueError::ShellNotFound("test".into()).code(),
            ErrorCode::ShellNotFound
        );
        assert_eq!(
            ResidueError::Config("bad".into()).code(),
            ErrorCode::ConfigInvalid
        );
        assert_eq!(
            ResidueError::infrastructure("v1.memtrace", "target offline").code(),
            ErrorCode::InfrastructureFailure
        );
    }

    #[test]
    fn test_error_context() {
        let err = ResidueError::ShellNotFound("collapse.001".into());
        let ctx = err.context().unwrap();
        assert_eq!(ctx.get("shell_id").unwrap(), "collapse.001");

        let err = ResidueError::observation_failed("v1.memtrace", "no signal");
        let ctx = err.context().unwrap();
        assert_eq!(ctx.get("shell_id").unwrap(), "v1.memtrace");
        assert_eq!(ctx.get("reason").unwrap(), "no signal");
    }

    #[test]
    fn test_phase_classification() {
        assert!(ResidueError::observation_failed("s", "x").is_analysis());
        assert!(ResidueError::trace_failed("s", "x").is_analysis());
        assert!(!ResidueError::observation_failed("s", "x").is_infrastructure());

        assert!(ResidueError::infrastructure("s", "x").is_infrastructure());
        assert!(!ResidueError::infrastructure("s", "x").is_analysis());

        assert!(!ResidueError::ShellNotFound("s".into()).is_analysis());
    }

    #[test]
    fn test_phase_attribution_preserves_existing_phase() {
        let err = ResidueError::observation_failed("v1.memtrace", "no signal");
        let attributed = err.into_observation_failure("v1.memtrace");
        match attributed {
            ResidueError::ObservationFailed { reason, .. } => {
                assert_eq!(reason, "no signal");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_phase_attribution_wraps_foreign_errors() {
        let err = ResidueError::Io(io::Error::other("socket closed"));
        let attributed = err.into_infrastructure("v1.memtrace");
        assert!(attributed.is_infrastructure());
        assert!(attributed.to_string().contains("socket closed"));
        assert!(attributed.to_string().contains("v1.memtrace"));
    }
}
