//! Error classification for code around the engine.
//!
//! Build tooling wraps whatever failed (a transform, a mock request, a bad
//! mapping) in a [`BridgeError`] carrying a type, context and suggestions.
//! The [`ErrorHandler`] keeps a bounded log of them. The engine itself only
//! ever returns [`TransformError`]; it converts losslessly into this form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::recorder::RingBuffer;

const ERROR_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Transform,
    Runtime,
    Mapping,
    Validation,
    Network,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Transform => "TRANSFORM_ERROR",
            ErrorType::Runtime => "RUNTIME_ERROR",
            ErrorType::Mapping => "MAPPING_ERROR",
            ErrorType::Validation => "VALIDATION_ERROR",
            ErrorType::Network => "NETWORK_ERROR",
            ErrorType::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Mapping and validation problems are fixed in user code.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ErrorType::Mapping | ErrorType::Validation)
    }

    fn default_suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorType::Transform => &[
                "Check the source for syntax errors",
                "Check for JavaScript features the transformer does not support",
                "Check the TypeScript type definitions",
            ],
            ErrorType::Runtime => &[
                "Check that every variable is defined",
                "Check that accessed object properties exist",
                "Check that functions are called correctly",
            ],
            ErrorType::Mapping => &[
                "Check that an event mapping is defined for this trigger",
                "Use a supported event type",
                "Check that the selector is correct",
            ],
            ErrorType::Validation => &[
                "Check parameter types and values",
                "Check that required fields are filled in",
                "Check the data format",
            ],
            ErrorType::Network => &[
                "Check the network connection",
                "Check the API endpoint URL",
                "Check that the dev server is running",
            ],
            ErrorType::Unknown => &[],
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub source_code: Option<String>,
    pub transformed_code: Option<String>,
    pub event_type: Option<String>,
    pub api_endpoint: Option<String>,
    /// Display text of the wrapped error, when there was one.
    pub original_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        ErrorContext {
            filename: None,
            line: None,
            column: None,
            source_code: None,
            transformed_code: None,
            event_type: None,
            api_endpoint: None,
            original_error: None,
            timestamp: Utc::now(),
        }
    }
}

impl ErrorContext {
    fn summary(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(filename) = &self.filename {
            parts.push(format!("File: {}", filename));
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            parts.push(format!("Line: {}, Column: {}", line, column));
        }
        if let Some(event_type) = &self.event_type {
            parts.push(format!("Event: {}", event_type));
        }
        if let Some(endpoint) = &self.api_endpoint {
            parts.push(format!("API: {}", endpoint));
        }
        parts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeError {
    pub message: String,
    pub error_type: ErrorType,
    pub context: ErrorContext,
    pub suggestions: Vec<String>,
    pub is_user_error: bool,
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)?;
        let context = self.context.summary();
        if !context.is_empty() {
            write!(f, "\n  Context: {}", context.join(", "))?;
        }
        if !self.suggestions.is_empty() {
            write!(f, "\n  Suggestions:\n    {}", self.suggestions.join("\n    "))?;
        }
        Ok(())
    }
}

impl std::error::Error for BridgeError {}

impl BridgeError {
    pub fn new(message: impl Into<String>, error_type: ErrorType, context: ErrorContext) -> Self {
        BridgeError {
            message: message.into(),
            error_type,
            context,
            suggestions: Vec::new(),
            is_user_error: error_type.is_user_error(),
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    fn with_default_suggestions(self) -> Self {
        let defaults = self.error_type.default_suggestions();
        self.with_suggestions(defaults.iter().copied())
    }

    /// Infer a type for an arbitrary error from its message.
    pub fn classify(error: &(dyn std::error::Error + 'static), context: ErrorContext) -> Self {
        if let Some(bridge) = error.downcast_ref::<BridgeError>() {
            return bridge.clone();
        }
        if let Some(transform) = error.downcast_ref::<TransformError>() {
            return BridgeError::from(transform.clone());
        }

        let message = error.to_string();
        let error_type = classify_message(&message);
        let context = ErrorContext {
            original_error: Some(message.clone()),
            ..context
        };
        BridgeError::new(message, error_type, context).with_default_suggestions()
    }
}

fn classify_message(message: &str) -> ErrorType {
    if message.contains("fetch") {
        ErrorType::Network
    } else if message.contains("transform") || message.contains("AST") {
        ErrorType::Transform
    } else if message.contains("mapping") || message.contains("event") {
        ErrorType::Mapping
    } else if message.contains("TypeError") || message.contains("ReferenceError") {
        ErrorType::Runtime
    } else {
        ErrorType::Unknown
    }
}

impl From<TransformError> for BridgeError {
    fn from(error: TransformError) -> Self {
        let TransformError::ParseFailure {
            filename,
            message,
            line,
            column,
            snippet,
        } = error;
        BridgeError::new(
            message,
            ErrorType::Transform,
            ErrorContext {
                filename: Some(filename),
                line,
                column,
                source_code: (!snippet.is_empty()).then_some(snippet),
                ..ErrorContext::default()
            },
        )
        .with_default_suggestions()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVENIENCE CONSTRUCTORS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn transform_error(
    message: impl Into<String>,
    filename: impl Into<String>,
    source_code: impl Into<String>,
    transformed_code: Option<String>,
    line: Option<u32>,
    column: Option<u32>,
) -> BridgeError {
    BridgeError::new(
        message,
        ErrorType::Transform,
        ErrorContext {
            filename: Some(filename.into()),
            source_code: Some(source_code.into()),
            transformed_code,
            line,
            column,
            ..ErrorContext::default()
        },
    )
    .with_default_suggestions()
}

/// Default suggestions apply when `suggestions` is empty.
pub fn mapping_error(
    message: impl Into<String>,
    event_type: impl Into<String>,
    suggestions: Vec<String>,
) -> BridgeError {
    let error = BridgeError::new(
        message,
        ErrorType::Mapping,
        ErrorContext {
            event_type: Some(event_type.into()),
            ..ErrorContext::default()
        },
    );
    if suggestions.is_empty() {
        error.with_default_suggestions()
    } else {
        error.with_suggestions(suggestions)
    }
}

pub fn network_error(
    message: impl Into<String>,
    api_endpoint: impl Into<String>,
    original: Option<&dyn std::error::Error>,
) -> BridgeError {
    BridgeError::new(
        message,
        ErrorType::Network,
        ErrorContext {
            api_endpoint: Some(api_endpoint.into()),
            original_error: original.map(|e| e.to_string()),
            ..ErrorContext::default()
        },
    )
    .with_default_suggestions()
}

pub fn validation_error(message: impl Into<String>, context: ErrorContext) -> BridgeError {
    BridgeError::new(message, ErrorType::Validation, context).with_default_suggestions()
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLER
// ═══════════════════════════════════════════════════════════════════════════════

type ErrorCallback = Box<dyn Fn(&BridgeError) + Send + Sync>;

pub struct ErrorHandler {
    log: RingBuffer<BridgeError>,
    on_error: Option<ErrorCallback>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("logged", &self.log.len())
            .field("has_callback", &self.on_error.is_some())
            .finish()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::with_capacity(ERROR_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ErrorHandler {
            log: RingBuffer::new(capacity),
            on_error: None,
        }
    }

    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    /// Classify, log and report `error`. Returns the classified form.
    pub fn handle_error(
        &mut self,
        error: &(dyn std::error::Error + 'static),
        context: ErrorContext,
    ) -> BridgeError {
        self.handle(BridgeError::classify(error, context))
    }

    pub fn handle(&mut self, error: BridgeError) -> BridgeError {
        if error.is_user_error {
            tracing::warn!(kind = %error.error_type, "{}", error.message);
        } else {
            tracing::error!(kind = %error.error_type, "{}", error.message);
        }
        if let Some(callback) = &self.on_error {
            callback(&error);
        }
        self.log.push(error.clone());
        error
    }

    pub fn error_log(&self) -> Vec<BridgeError> {
        self.log.iter().cloned().collect()
    }

    pub fn errors_by_type(&self, error_type: ErrorType) -> Vec<&BridgeError> {
        self.log
            .iter()
            .filter(|e| e.error_type == error_type)
            .collect()
    }

    pub fn user_errors(&self) -> Vec<&BridgeError> {
        self.log.iter().filter(|e| e.is_user_error).collect()
    }

    pub fn recent_errors(&self, count: usize) -> Vec<&BridgeError> {
        let skip = self.log.len().saturating_sub(count);
        self.log.iter().skip(skip).collect()
    }

    pub fn clear_error_log(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct Plain(String);

    fn classify(message: &str) -> ErrorType {
        BridgeError::classify(&Plain(message.to_string()), ErrorContext::default()).error_type
    }

    #[test]
    fn test_classification_by_message() {
        assert_eq!(classify("fetch failed: connection refused"), ErrorType::Network);
        assert_eq!(classify("could not transform file"), ErrorType::Transform);
        assert_eq!(classify("bad AST node"), ErrorType::Transform);
        assert_eq!(classify("no mapping for click"), ErrorType::Mapping);
        assert_eq!(classify("TypeError: x is undefined"), ErrorType::Runtime);
        assert_eq!(classify("something else"), ErrorType::Unknown);
    }

    #[test]
    fn test_transform_error_converts_with_context() {
        let err = TransformError::ParseFailure {
            filename: "a.js".to_string(),
            message: "Unexpected token".to_string(),
            line: Some(1),
            column: Some(4),
            snippet: "foo(".to_string(),
        };
        let bridge = BridgeError::classify(&err, ErrorContext::default());
        assert_eq!(bridge.error_type, ErrorType::Transform);
        assert_eq!(bridge.context.filename.as_deref(), Some("a.js"));
        assert_eq!(bridge.context.source_code.as_deref(), Some("foo("));
        assert!(!bridge.is_user_error);
        assert_eq!(bridge.suggestions.len(), 3);
    }

    #[test]
    fn test_display_includes_context_and_suggestions() {
        let err = mapping_error("no mapping for click", "click", vec!["Map it".to_string()]);
        let text = err.to_string();
        assert!(text.starts_with("[MAPPING_ERROR] no mapping for click"));
        assert!(text.contains("Context: Event: click"));
        assert!(text.ends_with("Suggestions:\n    Map it"));
        assert!(err.is_user_error);
    }

    #[test]
    fn test_constructors_fill_context() {
        let net = network_error("timeout", "/k/v1/records.json", Some(&Plain("io".into())));
        assert_eq!(net.context.api_endpoint.as_deref(), Some("/k/v1/records.json"));
        assert_eq!(net.context.original_error.as_deref(), Some("io"));

        let val = validation_error("app is required", ErrorContext::default());
        assert!(val.is_user_error);

        let tr = transform_error("failed", "b.js", "src", None, Some(3), Some(1));
        assert!(tr.to_string().contains("Line: 3, Column: 1"));
    }

    #[test]
    fn test_handler_log_is_bounded_and_filterable() {
        let mut handler = ErrorHandler::with_capacity(3);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        handler.set_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handler.handle_error(&Plain("fetch failed".into()), ErrorContext::default());
        handler.handle(mapping_error("unmapped", "click", Vec::new()));
        handler.handle(validation_error("bad", ErrorContext::default()));
        handler.handle_error(&Plain("other".into()), ErrorContext::default());

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert_eq!(handler.error_log().len(), 3);
        assert!(handler.errors_by_type(ErrorType::Network).is_empty());
        assert_eq!(handler.user_errors().len(), 2);
        let recent = handler.recent_errors(1);
        assert_eq!(recent[0].error_type, ErrorType::Unknown);

        handler.clear_error_log();
        assert!(handler.error_log().is_empty());
    }
}
