//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Registry errors
//! - 2xx: Metadata errors
//! - 3xx: Config errors
//! - 4xx: Analysis errors (observe/trace)
//! - 5xx: Infrastructure errors (collapse could not run)
//! - 6xx: Serialization errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for reporting consumers.
///
/// Each variant maps to a numeric code (e.g., `ShellNotFound` -> E101).
/// Codes are grouped by category for easy identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Registry errors (1xx)
    // ========================================
    /// E101: Requested shell id is not registered
    ShellNotFound,
    /// E102: Shell id was already registered; the first entry is kept
    DuplicateRegistration,

    // ========================================
    // Metadata errors (2xx)
    // ========================================
    /// E201: Shell metadata failed validation
    MetadataInvalid,
    /// E202: Shell version is not a semantic version
    VersionInvalid,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file named explicitly or via RESIDUE_CONFIG is missing
    ConfigNotFound,
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,

    // ========================================
    // Analysis errors (4xx)
    // ========================================
    /// E401: The observation phase failed; the run never reached collapse
    ObservationFailed,
    /// E402: The trace phase failed after a completed collapse
    TraceFailed,

    // ========================================
    // Infrastructure errors (5xx)
    // ========================================
    /// E501: The collapse phase could not run at all (target unreachable,
    /// malformed input), as distinct from a collapse the model resisted
    InfrastructureFailure,

    // ========================================
    // Serialization errors (6xx)
    // ========================================
    /// E601: Serialization/deserialization failed
    SerializationError,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ShellNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            // Registry errors (1xx)
            Self::ShellNotFound => 101,
            Self::DuplicateRegistration => 102,

            // Metadata errors (2xx)
            Self::MetadataInvalid => 201,
            Self::VersionInvalid => 202,

            // Config errors (3xx)
            Self::ConfigNotFound => 301,
            Self::ConfigInvalid => 302,

            // Analysis errors (4xx)
            Self::ObservationFailed => 401,
            Self::TraceFailed => 402,

            // Infrastructure errors (5xx)
            Self::InfrastructureFailure => 501,

            // Serialization errors (6xx)
            Self::SerializationError => 601,

            // Internal errors (9xx)
            Self::IoError => 901,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            // Registry errors
            Self::ShellNotFound => "Check the id against registry::installed(), or call shells::install_builtins() if the builtin catalog has not been registered yet",
            Self::DuplicateRegistration => "Each shell_id may be registered once. Pick a distinct id, or look up the existing entry with get()",

            // Metadata errors
            Self::MetadataInvalid => "Fix the metadata before registering. Ids are lowercase dotted identifiers and name must be non-empty",
            Self::VersionInvalid => "Use a semantic version (MAJOR.MINOR.PATCH) when the registry enforces semver",

            // Config errors
            Self::ConfigNotFound => "Create the config file, or unset RESIDUE_CONFIG to fall back to defaults",
            Self::ConfigInvalid => "Check TOML syntax and section names ([runner], [registry]) in the config file",

            // Analysis errors
            Self::ObservationFailed => "The shell could not read the target. Verify the target answers probes before running shells against it",
            Self::TraceFailed => "The shell could not derive an attribution trace from this run. Inspect the observation and collapse payloads",

            // Infrastructure errors
            Self::InfrastructureFailure => "The collapse phase never ran. Check that the target is reachable and accepts perturbing probes",

            // Serialization errors
            Self::SerializationError => "The data format may be corrupted. Check run records and payloads for validity",

            // Internal errors
            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable by the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            // The caller can fall back, fix the target, or retry elsewhere
            Self::ShellNotFound
            | Self::ConfigNotFound
            | Self::ConfigInvalid
            | Self::ObservationFailed
            | Self::TraceFailed
            | Self::InfrastructureFailure
            | Self::IoError => true,

            // Fatal at the point they occur; require a code or metadata fix
            Self::DuplicateRegistration
            | Self::MetadataInvalid
            | Self::VersionInvalid
            | Self::SerializationError => false,
        }
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "registry",
            2 => "metadata",
            3 => "config",
            4 => "analysis",
            5 => "infrastructure",
            6 => "serialization",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ShellNotFound,
            Self::DuplicateRegistration,
            Self::MetadataInvalid,
            Self::VersionInvalid,
            Self::ConfigNotFound,
            Self::ConfigInvalid,
            Self::ObservationFailed,
            Self::TraceFailed,
            Self::InfrastructureFailure,
            Self::SerializationError,
            Self::IoError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::ShellNotFound.numeric(), 101);
        assert_eq!(ErrorCode::MetadataInvalid.numeric(), 201);
        assert_eq!(ErrorCode::ConfigNotFound.numeric(), 301);
        assert_eq!(ErrorCode::ObservationFailed.numeric(), 401);
        assert_eq!(ErrorCode::InfrastructureFailure.numeric(), 501);
        assert_eq!(ErrorCode::SerializationError.numeric(), 601);
        assert_eq!(ErrorCode::IoError.numeric(), 901);
    }

    #[test]
    fn test_error_code_string() {
        assert_eq!(ErrorCode::ShellNotFound.code_string(), "E101");
        assert_eq!(ErrorCode::DuplicateRegistration.code_string(), "E102");
        assert_eq!(ErrorCode::TraceFailed.code_string(), "E402");
    }

    #[test]
    fn test_all_codes_have_suggestions() {
        for code in ErrorCode::all() {
            let suggestion = code.suggestion();
            assert!(
                !suggestion.is_empty(),
                "ErrorCode::{:?} has empty suggestion",
                code
            );
        }
    }

    #[test]
    fn test_all_codes_have_categories() {
        for code in ErrorCode::all() {
            let category = code.category();
            assert!(
                !category.is_empty() && category != "unknown",
                "ErrorCode::{:?} has invalid category",
                code
            );
        }
    }

    #[test]
    fn test_error_code_serialization() {
        let code = ErrorCode::ShellNotFound;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"SHELL_NOT_FOUND\"");

        let deserialized: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_recoverable_categorization() {
        // The caller can act on these
        assert!(ErrorCode::ShellNotFound.is_recoverable());
        assert!(ErrorCode::InfrastructureFailure.is_recoverable());

        // Fatal at registration time
        assert!(!ErrorCode::DuplicateRegistration.is_recoverable());
        assert!(!ErrorCode::MetadataInvalid.is_recoverable());
    }

    #[test]
    fn test_category_assignment() {
        assert_eq!(ErrorCode::ShellNotFound.category(), "registry");
        assert_eq!(ErrorCode::MetadataInvalid.category(), "metadata");
        assert_eq!(ErrorCode::ConfigInvalid.category(), "config");
        assert_eq!(ErrorCode::ObservationFailed.category(), "analysis");
        assert_eq!(ErrorCode::InfrastructureFailure.category(), "infrastructure");
        assert_eq!(ErrorCode::SerializationError.category(), "serialization");
        assert_eq!(ErrorCode::IoError.category(), "internal");
    }

    #[test]
    fn test_all_iterator_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            assert!(
                seen.insert(code.numeric()),
                "Duplicate numeric code: {}",
                code.numeric()
            );
        }
    }
}
