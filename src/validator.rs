//! Post-hoc marker checks on transform output.
//!
//! Heuristic text scans comparing original and generated code. Findings are
//! advisory diagnostics; they never fail a transform.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::EngineConfig;
use crate::error::DiagnosticCode;
use crate::recorder::{DiagnosticEntry, Severity};
use crate::types::TargetMode;

lazy_static! {
    static ref LEGACY_APIS: Vec<(&'static str, Regex)> = vec![
        ("XMLHttpRequest", Regex::new(r"\bXMLHttpRequest\b").unwrap()),
        ("jQuery", Regex::new(r"\bjQuery\b").unwrap()),
        ("$", Regex::new(r"(?:^|[^\w$.])\$\s*\(").unwrap()),
    ];
}

#[derive(Debug, Clone)]
pub struct TransformValidator {
    event_markers: Option<Regex>,
    fetch_markers: Option<Regex>,
    platform_event: Regex,
    platform_api: Regex,
}

/// `name(` for any of `names`. Member calls also match after a `.`, so
/// `addEventListener` counts `document.addEventListener(`.
fn call_pattern<'s>(names: impl IntoIterator<Item = &'s str>, member: bool) -> Option<Regex> {
    let alternatives: Vec<String> = names
        .into_iter()
        .filter(|name| !name.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let boundary = if member { r"[^\w$]" } else { r"[^\w$.]" };
    Regex::new(&format!(
        r"(?:^|{})(?:{})\s*\(",
        boundary,
        alternatives.join("|")
    ))
    .ok()
}

impl TransformValidator {
    pub fn new(config: &EngineConfig) -> Self {
        let methods = config.registration_methods();
        let platform_event = call_pattern([config.platform.event_registration.as_str()], false);
        let platform_api = call_pattern([config.platform.api_invocation.as_str()], false);
        TransformValidator {
            event_markers: call_pattern(methods.iter().map(String::as_str), true),
            fetch_markers: call_pattern(config.fetch_callees.iter().map(String::as_str), false),
            // Validated configs always name both platform calls.
            platform_event: platform_event.unwrap_or_else(never_matches),
            platform_api: platform_api.unwrap_or_else(never_matches),
        }
    }

    pub fn validate(
        &self,
        original: &str,
        generated: &str,
        mode: TargetMode,
    ) -> Vec<DiagnosticEntry> {
        let findings = match mode {
            TargetMode::Production => self.validate_production(original, generated),
            TargetMode::Development => self.validate_development(original, generated),
        };
        for finding in &findings {
            tracing::warn!(severity = finding.severity.as_str(), "{}", finding.message);
        }
        findings
    }

    fn validate_production(&self, original: &str, generated: &str) -> Vec<DiagnosticEntry> {
        let mut findings = Vec::new();
        let platform_events = self.platform_event.find_iter(generated).count();
        let platform_apis = self.platform_api.find_iter(generated).count();

        if platform_events == 0 && platform_apis == 0 {
            findings.push(
                warning("Transformed code does not contain platform API calls")
                    .suggest("Check that web APIs are mapped to platform APIs"),
            );
        }

        let original_events = count(&self.event_markers, original);
        if original_events > 0 && platform_events == 0 {
            findings.push(
                error(format!(
                    "{} event listener(s) in the original but no platform event registration in the output",
                    original_events
                ))
                .suggest("Check the event mapping configuration"),
            );
        }

        let original_fetches = count(&self.fetch_markers, original);
        if original_fetches > 0 && platform_apis == 0 {
            findings.push(
                error(format!(
                    "{} fetch call(s) in the original but no platform API call in the output",
                    original_fetches
                ))
                .suggest("Check the API mapping configuration"),
            );
        }

        for (name, pattern) in LEGACY_APIS.iter() {
            if pattern.is_match(original) {
                findings.push(
                    warning(format!("Unsupported API '{}' found in original code", name))
                        .suggest(format!("Replace '{}' with web standard alternatives", name)),
                );
            }
        }
        findings
    }

    /// Development output must be an identity transform.
    fn validate_development(&self, original: &str, generated: &str) -> Vec<DiagnosticEntry> {
        let before = self.platform_event.find_iter(original).count()
            + self.platform_api.find_iter(original).count();
        let after = self.platform_event.find_iter(generated).count()
            + self.platform_api.find_iter(generated).count();
        if after > before {
            vec![error(format!(
                "Development output gained {} platform call(s)",
                after - before
            ))
            .suggest("Development mode must not rewrite calls")]
        } else {
            Vec::new()
        }
    }
}

fn count(pattern: &Option<Regex>, text: &str) -> usize {
    pattern
        .as_ref()
        .map(|p| p.find_iter(text).count())
        .unwrap_or(0)
}

fn never_matches() -> Regex {
    lazy_static! {
        static ref NEVER: Regex = Regex::new(r"[^\s\S]").unwrap();
    }
    NEVER.clone()
}

fn warning(message: impl Into<String>) -> DiagnosticEntry {
    DiagnosticEntry::new(DiagnosticCode::ValidationWarning, Severity::Warning, message)
}

fn error(message: impl Into<String>) -> DiagnosticEntry {
    DiagnosticEntry::new(DiagnosticCode::ValidationWarning, Severity::Error, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TransformValidator {
        TransformValidator::new(&EngineConfig::default())
    }

    fn messages(findings: &[DiagnosticEntry]) -> Vec<&str> {
        findings.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn test_clean_production_output_has_no_findings() {
        let findings = validator().validate(
            "document.addEventListener('DOMContentLoaded', init);",
            "kintone.events.on(\"app.record.index.show\", (event) => { init(event); return event; });",
            TargetMode::Production,
        );
        assert!(findings.is_empty(), "{:?}", messages(&findings));
    }

    #[test]
    fn test_unrewritten_markers_are_errors() {
        let original = "document.addEventListener('click', go);\nfetch(url);";
        let findings = validator().validate(original, original, TargetMode::Production);
        assert_eq!(findings.len(), 3, "{:?}", messages(&findings));
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[1].severity, Severity::Error);
        assert!(findings[1].message.starts_with("1 event listener(s)"));
        assert!(findings[2].message.starts_with("1 fetch call(s)"));
        assert!(findings.iter().all(|f| f.code == DiagnosticCode::ValidationWarning));
    }

    #[test]
    fn test_legacy_apis_flagged() {
        let original = "const x = new XMLHttpRequest(); jQuery.ajax(); $('#a');";
        let findings = validator().validate(original, "kintone.api('/x', 'GET', {})", TargetMode::Production);
        let found = messages(&findings);
        assert!(found.contains(&"Unsupported API 'XMLHttpRequest' found in original code"));
        assert!(found.contains(&"Unsupported API 'jQuery' found in original code"));
        assert!(found.contains(&"Unsupported API '$' found in original code"));
    }

    #[test]
    fn test_fetch_marker_ignores_lookalikes() {
        let original = "prefetch('/x'); cache.fetch('/y');";
        let findings = validator().validate(original, original, TargetMode::Production);
        assert_eq!(findings.len(), 1, "{:?}", messages(&findings));
    }

    #[test]
    fn test_development_identity_check() {
        let v = validator();
        let src = "document.addEventListener('DOMContentLoaded', init);";
        assert!(v.validate(src, src, TargetMode::Development).is_empty());

        let findings = v.validate(
            src,
            "kintone.events.on('app.record.index.show', init);",
            TargetMode::Development,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
    }
}
