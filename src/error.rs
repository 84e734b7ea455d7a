//! Error types for the transform engine.
//!
//! `TransformError` is the only failure `transform()` surfaces. Everything else
//! (unmapped constructs, validator findings) degrades into diagnostics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// Malformed input. Fatal for the request.
    ParseFailure,
    /// A recognized call shape with no registry entry. Node left as-is.
    UnsupportedConstruct,
    /// Post-hoc marker check failed. Advisory only.
    ValidationWarning,
    /// More than one pattern kind claimed the same call.
    AmbiguousPattern,
    /// A rewrite dropped arguments the platform call has no slot for.
    DiscardedArguments,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::ParseFailure => "PARSE_FAILURE",
            DiagnosticCode::UnsupportedConstruct => "UNSUPPORTED_CONSTRUCT",
            DiagnosticCode::ValidationWarning => "VALIDATION_WARNING",
            DiagnosticCode::AmbiguousPattern => "AMBIGUOUS_PATTERN",
            DiagnosticCode::DiscardedArguments => "DISCARDED_ARGUMENTS",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("parse failure in {filename}{}: {message}", position_suffix(.line, .column))]
    ParseFailure {
        filename: String,
        message: String,
        /// 1-based line of the first reported error, when the parser labelled one.
        line: Option<u32>,
        /// 0-based column of the first reported error.
        column: Option<u32>,
        /// The offending source line, or the head of the input when no position is known.
        snippet: String,
    },
}

impl TransformError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            TransformError::ParseFailure { .. } => DiagnosticCode::ParseFailure,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            TransformError::ParseFailure { filename, .. } => filename,
        }
    }
}

fn position_suffix(line: &Option<u32>, column: &Option<u32>) -> String {
    match (*line, *column) {
        (Some(line), Some(column)) => format!(" at {}:{}", line, column),
        (Some(line), None) => format!(" at line {}", line),
        _ => String::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STARTUP ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Raised while populating the mapping registry. Registration happens once at
/// startup, so these are caller bugs rather than transform-time conditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("platform event \"{0}\" is already registered")]
    DuplicateEventName(String),

    #[error("web trigger \"{event_type}\" (selector {selector:?}) is already mapped to \"{existing}\"")]
    DuplicateTrigger {
        event_type: String,
        selector: Option<String>,
        existing: String,
    },

    #[error("platform API \"{0}\" is already registered")]
    DuplicateApiName(String),

    #[error("route {method} {path_prefix} is already mapped to \"{existing}\"")]
    DuplicateRoute {
        method: String,
        path_prefix: String,
        existing: String,
    },

    #[error("API mapping \"{0}\" has an empty path prefix")]
    EmptyPathPrefix(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("callee \"{0}\" is configured as both an event registration and a fetch call")]
    OverlappingCallee(String),

    #[error("platform call name for {0} must not be empty")]
    EmptyPlatformCall(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_display_includes_position() {
        let err = TransformError::ParseFailure {
            filename: "app.js".to_string(),
            message: "Unexpected token".to_string(),
            line: Some(3),
            column: Some(7),
            snippet: "foo({".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse failure in app.js at 3:7: Unexpected token"
        );
        assert_eq!(err.code(), DiagnosticCode::ParseFailure);
    }

    #[test]
    fn test_parse_failure_display_without_position() {
        let err = TransformError::ParseFailure {
            filename: "app.js".to_string(),
            message: "Unexpected end of input".to_string(),
            line: None,
            column: None,
            snippet: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "parse failure in app.js: Unexpected end of input"
        );
    }

    #[test]
    fn test_diagnostic_code_serializes_screaming() {
        let json = serde_json::to_string(&DiagnosticCode::UnsupportedConstruct).unwrap();
        assert_eq!(json, "\"UNSUPPORTED_CONSTRUCT\"");
        assert_eq!(DiagnosticCode::AmbiguousPattern.as_str(), "AMBIGUOUS_PATTERN");
    }
}
