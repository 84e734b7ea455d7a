#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST / RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Matcher runs for diagnostics only. Output is an identity transform.
    Development,
    #[default]
    Production,
}

impl TargetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Development => "development",
            TargetMode::Production => "production",
        }
    }

    pub fn rewrites(&self) -> bool {
        matches!(self, TargetMode::Production)
    }
}

impl std::fmt::Display for TargetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_FILENAME: &str = "unknown.js";

/// Caller-facing options of the invocation contract. Every field is optional
/// on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    pub filename: Option<String>,
    pub target_mode: Option<TargetMode>,
    #[serde(alias = "wantSourceMap")]
    pub source_map: Option<bool>,
}

impl TransformOptions {
    pub fn development() -> Self {
        TransformOptions {
            target_mode: Some(TargetMode::Development),
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        TransformOptions {
            target_mode: Some(TargetMode::Production),
            ..Default::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_source_map(mut self, enabled: bool) -> Self {
        self.source_map = Some(enabled);
        self
    }
}

/// One transform invocation with every option resolved. Never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub source_text: String,
    pub filename: String,
    pub target_mode: TargetMode,
    pub want_source_map: bool,
}

impl TransformRequest {
    pub fn new(source_text: impl Into<String>, options: TransformOptions) -> Self {
        TransformRequest {
            source_text: source_text.into(),
            filename: options
                .filename
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            target_mode: options.target_mode.unwrap_or_default(),
            want_source_map: options.source_map.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub generated_text: String,
    pub source_map: Option<String>,
    pub dependency_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// 1-based.
    pub line: u32,
    /// 0-based, UTF-16 units.
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME VALUE SHAPES
// ═══════════════════════════════════════════════════════════════════════════════

/// A DOM-side event as seen by web code: a type plus its `detail` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub detail: Value,
}

impl WebEvent {
    pub fn new(event_type: impl Into<String>, detail: Value) -> Self {
        WebEvent {
            event_type: event_type.into(),
            detail,
        }
    }

    pub fn detail_field(&self, key: &str) -> Option<&Value> {
        self.detail.get(key).filter(|v| !v.is_null())
    }
}

/// The platform's lifecycle event object handed to registered handlers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Value>,
}

/// Body of a web request. At build time the body is an expression in the
/// source, so it is carried as `Deferred` and spliced by the rewriter.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebRequest {
    pub url: String,
    pub method: String,
    pub body: Option<RequestBody>,
}

impl WebRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        WebRequest {
            url: url.into(),
            method: method.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// Parameter key under which a spread body is carried. The rewriter renders
/// it as `...body` rather than as a property.
pub const SPREAD_KEY: &str = "...";

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Json(Value),
    /// Placeholder for the request body expression.
    Body,
    /// The body's own properties spread into the parameter object.
    SpreadBody,
}

impl From<RequestBody> for ParamValue {
    fn from(body: RequestBody) -> Self {
        match body {
            RequestBody::Json(value) => ParamValue::Json(value),
            RequestBody::Deferred => ParamValue::Body,
        }
    }
}

/// A call to the platform's RPC-style API: path, HTTP method and an ordered
/// parameter object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlatformRequest {
    pub path: String,
    pub method: String,
    pub params: Vec<(String, ParamValue)>,
}

impl PlatformRequest {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        PlatformRequest {
            path: path.into(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    /// Insert or replace a parameter, keeping first-insertion order.
    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) {
        let key = key.into();
        if let Some(slot) = self.params.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.params.push((key, value));
        }
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn json_param(&self, key: &str) -> Option<&Value> {
        match self.param(key) {
            Some(ParamValue::Json(value)) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl WebResponse {
    pub fn json(value: &Value) -> Self {
        WebResponse {
            status: 200,
            content_type: "application/json".to_string(),
            body: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_follow_options() {
        let req = TransformRequest::new("x", TransformOptions::default());
        assert_eq!(req.filename, DEFAULT_FILENAME);
        assert_eq!(req.target_mode, TargetMode::Production);
        assert!(!req.want_source_map);
    }

    #[test]
    fn test_options_from_json_contract() {
        let options: TransformOptions = serde_json::from_str(
            r#"{ "filename": "a.ts", "targetMode": "development", "wantSourceMap": true }"#,
        )
        .unwrap();
        let req = TransformRequest::new("x", options);
        assert_eq!(req.filename, "a.ts");
        assert_eq!(req.target_mode, TargetMode::Development);
        assert!(req.want_source_map);
    }

    #[test]
    fn test_platform_request_set_replaces_in_place() {
        let mut req = PlatformRequest::new("/k/v1/record.json", "PUT");
        req.set("app", ParamValue::Json(Value::from(1)));
        req.set("id", ParamValue::Json(Value::from(2)));
        req.set("app", ParamValue::Json(Value::from(3)));
        let keys: Vec<&str> = req.params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["app", "id"]);
        assert_eq!(req.json_param("app"), Some(&Value::from(3)));
    }
}
