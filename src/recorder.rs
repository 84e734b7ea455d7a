//! Diagnostic & Trace Recorder
//!
//! Per-session rewrite events are collected by a [`TransformSession`] while
//! the orchestrator walks the tree, then handed to the shared
//! [`DiagnosticRecorder`], which keeps two bounded FIFO buffers (debug info
//! and transform traces) and renders the text reports build tooling shows.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RecorderOptions;
use crate::error::{DiagnosticCode, TransformError};
use crate::matcher::PatternKind;
use crate::position::PositionMapping;
use crate::types::{SourceLocation, TargetMode};

// ═══════════════════════════════════════════════════════════════════════════════
// RING BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-capacity FIFO. Pushing onto a full buffer evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Returns the evicted entry, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.items.back_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteEvent {
    pub web_construct: String,
    /// Registry key of the mapping used, or the best candidate for failures.
    pub platform_construct: String,
    pub source_location: SourceLocation,
    pub outcome: Outcome,
    pub failure_reason: Option<String>,
    /// False in development mode, where matches are reported but not rewritten.
    pub applied: bool,
    /// HTTP method of network rewrites.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl RewriteEvent {
    pub fn success(
        web_construct: impl Into<String>,
        platform_construct: impl Into<String>,
        at: SourceLocation,
        applied: bool,
    ) -> Self {
        RewriteEvent {
            web_construct: web_construct.into(),
            platform_construct: platform_construct.into(),
            source_location: at,
            outcome: Outcome::Success,
            failure_reason: None,
            applied,
            method: None,
        }
    }

    pub fn failure(
        web_construct: impl Into<String>,
        platform_construct: impl Into<String>,
        at: SourceLocation,
        reason: impl Into<String>,
    ) -> Self {
        RewriteEvent {
            web_construct: web_construct.into(),
            platform_construct: platform_construct.into(),
            source_location: at,
            outcome: Outcome::Failure,
            failure_reason: Some(reason.into()),
            applied: false,
            method: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEntry {
    pub message: String,
    pub location: Option<SourceLocation>,
    pub severity: Severity,
    pub code: DiagnosticCode,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl DiagnosticEntry {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        DiagnosticEntry {
            message: message.into(),
            location: None,
            severity,
            code,
            suggestions: Vec::new(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub filename: String,
    pub target_mode: TargetMode,
    pub event_mappings: Vec<RewriteEvent>,
    pub api_mappings: Vec<RewriteEvent>,
    pub errors: Vec<DiagnosticEntry>,
    pub recorded_at: DateTime<Utc>,
}

impl DebugInfo {
    pub fn new(filename: impl Into<String>, target_mode: TargetMode) -> Self {
        DebugInfo {
            filename: filename.into(),
            target_mode,
            event_mappings: Vec::new(),
            api_mappings: Vec::new(),
            errors: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RewriteEvent> {
        self.event_mappings
            .iter()
            .chain(self.api_mappings.iter())
            .filter(|event| !event.succeeded())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformTrace {
    pub filename: String,
    pub original_text: String,
    pub generated_text: String,
    pub source_map_text: Option<String>,
    pub mappings: Vec<PositionMapping>,
    pub duration_ms: f64,
    pub recorded_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Parsing,
    Matching,
    Generating,
    Recorded,
    Failed,
}

impl SessionPhase {
    fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Parsing)
                | (Parsing, Matching)
                | (Parsing, Failed)
                | (Matching, Generating)
                | (Generating, Recorded)
        )
    }
}

/// Request-scoped collector driven by the orchestrator.
#[derive(Debug)]
pub struct TransformSession {
    phase: SessionPhase,
    info: DebugInfo,
}

impl TransformSession {
    pub fn new(filename: &str, target_mode: TargetMode) -> Self {
        TransformSession {
            phase: SessionPhase::Idle,
            info: DebugInfo::new(filename, target_mode),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn advance(&mut self, next: SessionPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal session transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::trace!(filename = %self.info.filename, from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
    }

    pub fn rewrite(&mut self, kind: PatternKind, event: RewriteEvent) {
        match kind {
            PatternKind::EventRegistration => self.info.event_mappings.push(event),
            PatternKind::NetworkFetch => self.info.api_mappings.push(event),
        }
    }

    pub fn diagnostic(&mut self, entry: DiagnosticEntry) {
        self.info.errors.push(entry);
    }

    pub fn info(&self) -> &DebugInfo {
        &self.info
    }

    /// Terminal parse failure: the session keeps a single error entry.
    pub fn fail(mut self, error: &TransformError) -> DebugInfo {
        self.advance(SessionPhase::Failed);
        let TransformError::ParseFailure {
            message,
            line,
            column,
            ..
        } = error;
        let mut entry = DiagnosticEntry::new(error.code(), Severity::Error, message.clone())
            .suggest("Fix the syntax error before transforming");
        if let (Some(line), Some(column)) = (line, column) {
            entry = entry.at(SourceLocation::new(*line, *column));
        }
        self.info.event_mappings.clear();
        self.info.api_mappings.clear();
        self.info.errors = vec![entry];
        self.info
    }

    pub fn finish(mut self) -> DebugInfo {
        self.advance(SessionPhase::Recorded);
        self.info
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatistics {
    pub total_event_mappings: usize,
    pub successful_event_mappings: usize,
    pub failed_event_mappings: usize,
    pub total_api_mappings: usize,
    pub successful_api_mappings: usize,
    pub failed_api_mappings: usize,
    pub total_errors: usize,
    pub total_transforms: usize,
    pub recent_transforms: usize,
    pub average_transform_size: f64,
}

#[derive(Debug)]
pub struct DiagnosticRecorder {
    options: RecorderOptions,
    debug_info: RingBuffer<DebugInfo>,
    traces: RingBuffer<TransformTrace>,
}

impl Default for DiagnosticRecorder {
    fn default() -> Self {
        Self::new(RecorderOptions::default())
    }
}

impl DiagnosticRecorder {
    pub fn new(options: RecorderOptions) -> Self {
        DiagnosticRecorder {
            debug_info: RingBuffer::new(options.debug_info_capacity),
            traces: RingBuffer::new(options.trace_capacity),
            options,
        }
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    pub fn record_debug_info(&mut self, info: DebugInfo) {
        tracing::debug!(
            filename = %info.filename,
            events = info.event_mappings.len(),
            apis = info.api_mappings.len(),
            errors = info.errors.len(),
            "debug info recorded"
        );
        if let Some(evicted) = self.debug_info.push(info) {
            tracing::trace!(filename = %evicted.filename, "debug info evicted");
        }
    }

    pub fn record_trace(&mut self, trace: TransformTrace) {
        if !self.options.enable_transform_trace {
            return;
        }
        tracing::debug!(filename = %trace.filename, "transform trace recorded");
        self.traces.push(trace);
    }

    /// Append post-hoc findings to the most recent debug info entry.
    pub fn append_findings(&mut self, findings: Vec<DiagnosticEntry>) {
        if findings.is_empty() {
            return;
        }
        if let Some(latest) = self.debug_info.last_mut() {
            latest.errors.extend(findings);
        }
    }

    pub fn debug_infos(&self) -> impl DoubleEndedIterator<Item = &DebugInfo> {
        self.debug_info.iter()
    }

    pub fn traces(&self) -> impl DoubleEndedIterator<Item = &TransformTrace> {
        self.traces.iter()
    }

    pub fn latest_debug_info(&self) -> Option<&DebugInfo> {
        self.debug_info.iter().next_back()
    }

    /// Traces recorded within `window` of now. Eviction stays capacity-based.
    pub fn traces_within(&self, window: Duration) -> Vec<&TransformTrace> {
        let cutoff = Utc::now() - window;
        self.traces
            .iter()
            .filter(|trace| trace.recorded_at >= cutoff)
            .collect()
    }

    pub fn clear(&mut self) {
        self.debug_info.clear();
        self.traces.clear();
        tracing::debug!("recorder cleared");
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Reports
    // ───────────────────────────────────────────────────────────────────────────

    /// Most recent trace for `filename`.
    pub fn transform_report(&self, filename: &str) -> String {
        if !self.options.enable_transform_trace {
            return "Transform trace not enabled".to_string();
        }
        match self.traces.iter().rev().find(|t| t.filename == filename) {
            Some(trace) => render_trace(trace),
            None => format!("No transform trace found for {}", filename),
        }
    }

    pub fn comparison_report(original: &str, generated: &str) -> String {
        let original_lines: Vec<&str> = original.split('\n').collect();
        let generated_lines: Vec<&str> = generated.split('\n').collect();

        let mut out = String::new();
        let _ = writeln!(out, "=== Code Comparison Report ===");
        let _ = writeln!(out, "Original: {} lines", original_lines.len());
        let _ = writeln!(out, "Transformed: {} lines", generated_lines.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "Side-by-side comparison:");
        let _ = writeln!(out);

        let rows = original_lines.len().max(generated_lines.len());
        for i in 0..rows {
            let left = original_lines.get(i).copied().unwrap_or("");
            let right = generated_lines.get(i).copied().unwrap_or("");
            let _ = writeln!(out, "{:>3} | {:<50} | {}", i + 1, left, right);
        }
        out.trim_end().to_string()
    }

    pub fn diagnostic_report(&self) -> String {
        let events: Vec<&RewriteEvent> =
            self.debug_info.iter().flat_map(|i| &i.event_mappings).collect();
        let apis: Vec<&RewriteEvent> =
            self.debug_info.iter().flat_map(|i| &i.api_mappings).collect();
        let errors: Vec<&DiagnosticEntry> =
            self.debug_info.iter().flat_map(|i| &i.errors).collect();

        let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        for entry in &errors {
            *by_severity.entry(entry.severity).or_default() += 1;
        }

        let mut out = String::new();
        let _ = writeln!(out, "Diagnostic Report");
        let _ = writeln!(out, "Event Mappings: {}", events.len());
        let _ = writeln!(out, "API Mappings: {}", apis.len());
        let _ = writeln!(out, "Errors: {}", errors.len());
        for (severity, count) in &by_severity {
            let _ = writeln!(out, "  {}: {}", severity.as_str(), count);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Event Mapping Details:");
        for event in events.iter().take(3) {
            let _ = writeln!(out, "  {}", describe_rewrite(event));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "API Mapping Details:");
        for api in apis.iter().take(3) {
            let _ = writeln!(out, "  {}", describe_rewrite(api));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Recent Issues:");
        for entry in errors.iter().skip(errors.len().saturating_sub(3)) {
            let _ = writeln!(
                out,
                "  {} [{}]: {}",
                entry.severity.as_str().to_ascii_uppercase(),
                entry.code,
                entry.message
            );
        }
        out.trim_end().to_string()
    }

    pub fn performance_report(&self) -> String {
        self.performance_report_within(Duration::minutes(5))
    }

    pub fn performance_report_within(&self, window: Duration) -> String {
        let recent = self.traces_within(window);
        let count = recent.len();
        let (original_avg, generated_avg, duration_avg) = if count == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let n = count as f64;
            (
                recent.iter().map(|t| t.original_text.len()).sum::<usize>() as f64 / n,
                recent.iter().map(|t| t.generated_text.len()).sum::<usize>() as f64 / n,
                recent.iter().map(|t| t.duration_ms).sum::<f64>() / n,
            )
        };
        let ratio = if original_avg > 0.0 {
            generated_avg / original_avg * 100.0
        } else {
            0.0
        };

        let mut out = String::new();
        let _ = writeln!(out, "=== Performance Report ===");
        let _ = writeln!(out, "Recent transforms: {}", count);
        let _ = writeln!(out, "Average original size: {} chars", original_avg.round());
        let _ = writeln!(out, "Average transformed size: {} chars", generated_avg.round());
        let _ = writeln!(out, "Size ratio: {:.1}%", ratio);
        let _ = writeln!(out, "Average duration: {:.2}ms", duration_avg);
        let _ = writeln!(out);
        let _ = writeln!(out, "Transform times:");
        for trace in recent.iter().skip(count.saturating_sub(5)) {
            let _ = writeln!(
                out,
                "  {}: {} ({:.2}ms)",
                trace.filename,
                trace.recorded_at.to_rfc3339(),
                trace.duration_ms
            );
        }
        out.trim_end().to_string()
    }

    pub fn statistics(&self) -> RecorderStatistics {
        let mut stats = RecorderStatistics::default();
        for info in self.debug_info.iter() {
            stats.total_event_mappings += info.event_mappings.len();
            stats.successful_event_mappings +=
                info.event_mappings.iter().filter(|e| e.succeeded()).count();
            stats.total_api_mappings += info.api_mappings.len();
            stats.successful_api_mappings +=
                info.api_mappings.iter().filter(|e| e.succeeded()).count();
            stats.total_errors += info.errors.len();
        }
        stats.failed_event_mappings = stats.total_event_mappings - stats.successful_event_mappings;
        stats.failed_api_mappings = stats.total_api_mappings - stats.successful_api_mappings;
        stats.total_transforms = self.traces.len();
        stats.recent_transforms = self.traces_within(Duration::hours(1)).len();
        if !self.traces.is_empty() {
            let total: usize = self.traces.iter().map(|t| t.generated_text.len()).sum();
            stats.average_transform_size = total as f64 / self.traces.len() as f64;
        }
        stats
    }

    /// Multi-line description of a parse failure, or just its message when
    /// error details are disabled.
    pub fn error_details(&self, error: &TransformError) -> String {
        let TransformError::ParseFailure {
            filename,
            message,
            line,
            column,
            snippet,
        } = error;
        if !self.options.enable_error_details {
            return message.clone();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Error: {}", message);
        let _ = writeln!(out, "File: {}", filename);
        if let Some(line) = line {
            let _ = writeln!(out, "Line: {}", line);
        }
        if let Some(column) = column {
            let _ = writeln!(out, "Column: {}", column);
        }
        if !snippet.is_empty() {
            let _ = writeln!(out, "Code: {}", snippet);
        }
        let _ = write!(out, "Kind: {}", error.code());
        out
    }

    /// Everything the recorder holds, as one text document. Writing it
    /// anywhere is up to the host.
    pub fn export_text(&self) -> String {
        let mut sections = vec![
            self.diagnostic_report(),
            self.performance_report(),
            "=== All Transform Traces ===".to_string(),
        ];
        sections.extend(self.traces.iter().map(render_trace));
        sections.join("\n\n")
    }
}

fn describe_rewrite(event: &RewriteEvent) -> String {
    let status = match (event.outcome, event.applied) {
        (Outcome::Success, true) => "Success".to_string(),
        (Outcome::Success, false) => "Matched".to_string(),
        (Outcome::Failure, _) => format!(
            "Failed: {}",
            event.failure_reason.as_deref().unwrap_or("unknown reason")
        ),
    };
    format!(
        "{} → {} at {} ({})",
        event.web_construct, event.platform_construct, event.source_location, status
    )
}

fn render_trace(trace: &TransformTrace) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Transform Report: {}", trace.filename);
    let _ = writeln!(out, "Timestamp: {}", trace.recorded_at.to_rfc3339());
    let _ = writeln!(out, "Duration: {:.2}ms", trace.duration_ms);
    let _ = writeln!(out);
    let _ = writeln!(out, "Original Code:");
    let _ = writeln!(out, "{}", trace.original_text);
    let _ = writeln!(out);
    let _ = writeln!(out, "Transformed Code:");
    let _ = writeln!(out, "{}", trace.generated_text);
    if !trace.mappings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Mappings:");
        for mapping in &trace.mappings {
            let _ = writeln!(
                out,
                "  {} → {} ({})",
                mapping.original, mapping.generated, mapping.name
            );
        }
    }
    if let Some(map) = &trace.source_map_text {
        let _ = writeln!(out);
        let _ = writeln!(out, "Source Map:");
        let _ = writeln!(out, "{}", map);
    }
    out.trim_end().to_string()
}
