//! Engine and recorder configuration.
//!
//! Both structs deserialize from the camelCase JSON the build-tool adapter
//! passes through, and fall back to the kintone defaults field by field.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformCalls {
    /// Dotted callee of the platform's event registration function.
    pub event_registration: String,
    /// Dotted callee of the platform's API invocation function.
    pub api_invocation: String,
}

impl Default for PlatformCalls {
    fn default() -> Self {
        PlatformCalls {
            event_registration: "kintone.events.on".to_string(),
            api_invocation: "kintone.api".to_string(),
        }
    }
}

/// Call shapes the matcher recognizes, plus the platform calls rewrites target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Dotted callees treated as DOM event registration, e.g. `document.addEventListener`.
    pub event_callees: Vec<String>,
    /// Element queries whose first argument becomes the trigger selector,
    /// as in `document.querySelector(sel).addEventListener(...)`.
    pub selector_queries: Vec<String>,
    /// Dotted callees treated as network fetches.
    pub fetch_callees: Vec<String>,
    /// Origins whose absolute URLs are matched like relative paths, e.g.
    /// `https://example.cybozu.com`. Absolute URLs on any other origin are
    /// left alone.
    pub allowed_origins: Vec<String>,
    pub platform: PlatformCalls,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            event_callees: vec![
                "document.addEventListener".to_string(),
                "window.addEventListener".to_string(),
            ],
            selector_queries: vec!["document.querySelector".to_string()],
            fetch_callees: vec!["fetch".to_string()],
            allowed_origins: Vec::new(),
            platform: PlatformCalls::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Event and fetch callees must be disjoint so that no call can match both
    /// pattern kinds, and neither may name a platform call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let events: HashSet<&str> = self.event_callees.iter().map(String::as_str).collect();
        if let Some(shared) = self
            .fetch_callees
            .iter()
            .find(|callee| events.contains(callee.as_str()))
        {
            return Err(ConfigError::OverlappingCallee(shared.clone()));
        }
        // Rewritten output must not be re-matched on a second pass.
        for platform_call in [&self.platform.event_registration, &self.platform.api_invocation] {
            if events.contains(platform_call.as_str())
                || self.fetch_callees.iter().any(|c| c == platform_call)
            {
                return Err(ConfigError::OverlappingCallee(platform_call.clone()));
            }
        }
        if self.platform.event_registration.trim().is_empty() {
            return Err(ConfigError::EmptyPlatformCall("event registration"));
        }
        if self.platform.api_invocation.trim().is_empty() {
            return Err(ConfigError::EmptyPlatformCall("API invocation"));
        }
        Ok(())
    }

    /// Method names that make `<query>(sel).<method>(...)` an event registration.
    pub fn registration_methods(&self) -> HashSet<String> {
        self.event_callees
            .iter()
            .filter_map(|callee| callee.rsplit('.').next())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderOptions {
    pub trace_capacity: usize,
    pub debug_info_capacity: usize,
    pub enable_transform_trace: bool,
    pub enable_error_details: bool,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        RecorderOptions {
            trace_capacity: 100,
            debug_info_capacity: 50,
            enable_transform_trace: true,
            enable_error_details: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "fetchCallees": ["networkGet"] }"#).unwrap();
        assert_eq!(config.fetch_callees, vec!["networkGet".to_string()]);
        assert_eq!(config.platform.api_invocation, "kintone.api");
        assert!(config.allowed_origins.is_empty());
        assert!(config
            .event_callees
            .contains(&"document.addEventListener".to_string()));
    }

    #[test]
    fn test_overlapping_callee_rejected() {
        let err = EngineConfig::from_json_str(
            r#"{ "eventCallees": ["hook"], "fetchCallees": ["hook"] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingCallee(ref c) if c == "hook"));
    }

    #[test]
    fn test_platform_call_cannot_be_recognized() {
        let err = EngineConfig::from_json_str(r#"{ "fetchCallees": ["fetch", "kintone.api"] }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingCallee(ref c) if c == "kintone.api"));
    }

    #[test]
    fn test_empty_platform_call_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "platform": { "apiInvocation": " " } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPlatformCall(_)));
    }

    #[test]
    fn test_registration_methods_use_last_segment() {
        let config = EngineConfig::default();
        let methods = config.registration_methods();
        assert_eq!(methods.len(), 1);
        assert!(methods.contains("addEventListener"));
    }

    #[test]
    fn test_recorder_defaults() {
        let opts: RecorderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.trace_capacity, 100);
        assert_eq!(opts.debug_info_capacity, 50);
        assert!(opts.enable_transform_trace);
    }
}
