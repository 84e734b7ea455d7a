//! Transform Orchestrator
//!
//! Drives one request through parse → match/rewrite → generate → map →
//! record. The registry and recorder are injected; [`TransformEngine::with_defaults`]
//! wires the kintone catalogue for simple callers.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "napi")]
use lazy_static::lazy_static;
#[cfg(feature = "napi")]
use napi_derive::napi;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, walk_mut, Visit, VisitMut};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::{ConfigError, DiagnosticCode, TransformError};
use crate::matcher::{
    literal_expression, CallMatch, Classification, EventCall, FetchCall, MethodSpec, PatternKind,
    PatternMatcher,
};
use crate::position::{LineIndex, PositionMapper, RawToken};
use crate::recorder::{
    DiagnosticEntry, DiagnosticRecorder, RewriteEvent, SessionPhase, Severity, TransformSession,
    TransformTrace,
};
use crate::registry::{ApiMapping, EventMapping, MappingRegistry};
use crate::rewriter::Rewriter;
use crate::types::{SourceLocation, TargetMode, TransformOptions, TransformRequest, TransformResult};
use crate::validator::TransformValidator;

/// Characters of input shown when a parse error carries no position.
const SNIPPET_HEAD: usize = 80;

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TransformEngine {
    registry: Arc<MappingRegistry>,
    recorder: Arc<Mutex<DiagnosticRecorder>>,
    config: EngineConfig,
    matcher: PatternMatcher,
    validator: TransformValidator,
}

impl TransformEngine {
    pub fn new(
        registry: Arc<MappingRegistry>,
        recorder: Arc<Mutex<DiagnosticRecorder>>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let matcher = PatternMatcher::new(&config);
        Self::with_matcher(registry, recorder, config, matcher)
    }

    /// Like [`new`](Self::new), with a matcher carrying extra recognizers.
    /// Recognizers that claim the same call are reported as ambiguous.
    pub fn with_matcher(
        registry: Arc<MappingRegistry>,
        recorder: Arc<Mutex<DiagnosticRecorder>>,
        config: EngineConfig,
        matcher: PatternMatcher,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TransformEngine {
            matcher,
            validator: TransformValidator::new(&config),
            registry,
            recorder,
            config,
        })
    }

    /// Default kintone registry, a fresh recorder and the default call shapes.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(
            Arc::new(MappingRegistry::with_defaults()?),
            Arc::new(Mutex::new(DiagnosticRecorder::default())),
            EngineConfig::default(),
        )
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<Mutex<DiagnosticRecorder>> {
        &self.recorder
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transform_source(
        &self,
        source_text: &str,
        options: TransformOptions,
    ) -> Result<TransformResult, TransformError> {
        self.transform(&TransformRequest::new(source_text, options))
    }

    /// Independent requests in parallel. Results keep the order of `requests`.
    pub fn transform_batch(
        &self,
        requests: &[TransformRequest],
    ) -> Vec<Result<TransformResult, TransformError>> {
        requests.par_iter().map(|request| self.transform(request)).collect()
    }

    pub fn transform(&self, request: &TransformRequest) -> Result<TransformResult, TransformError> {
        let started = Instant::now();
        let mut session = TransformSession::new(&request.filename, request.target_mode);
        session.advance(SessionPhase::Parsing);

        let allocator = Allocator::default();
        let source_type = SourceType::from_path(&request.filename)
            .unwrap_or_else(|_| SourceType::mjs().with_jsx(true));
        let parsed = Parser::new(&allocator, &request.source_text, source_type).parse();
        let lines = LineIndex::new(&request.source_text);

        if parsed.panicked || !parsed.errors.is_empty() {
            let first = parsed.errors.first();
            let offset = first
                .and_then(|diag| diag.labels.as_ref())
                .and_then(|labels| labels.first())
                .map(|label| label.offset() as u32);
            let position = offset.map(|offset| lines.location(offset));
            let error = TransformError::ParseFailure {
                filename: request.filename.clone(),
                message: first
                    .map(|diag| diag.to_string())
                    .unwrap_or_else(|| "parser aborted".to_string()),
                line: position.map(|at| at.line),
                column: position.map(|at| at.column),
                snippet: match position {
                    Some(at) => lines.line_text(at.line).to_string(),
                    None => request.source_text.chars().take(SNIPPET_HEAD).collect(),
                },
            };
            tracing::error!(filename = %request.filename, "{}", error);
            let info = session.fail(&error);
            self.recorder.lock().record_debug_info(info);
            return Err(error);
        }

        let mut program = parsed.program;
        session.advance(SessionPhase::Matching);

        let mut visitor = RewriteVisitor {
            allocator: &allocator,
            engine: self,
            mode: request.target_mode,
            lines,
            rewrites: Vec::new(),
            diagnostics: Vec::new(),
            mapper: PositionMapper::new(),
        };
        visitor.visit_program(&mut program);
        let RewriteVisitor {
            mut rewrites,
            diagnostics,
            mapper,
            ..
        } = visitor;

        // Nested rewrites finish before their enclosing call; report in
        // document order.
        rewrites.sort_by_key(|(_, event)| event.source_location);
        for (kind, event) in rewrites {
            session.rewrite(kind, event);
        }
        for entry in diagnostics {
            session.diagnostic(entry);
        }

        session.advance(SessionPhase::Generating);
        let dependency_list = collect_dependencies(&program);

        let codegen = Codegen::new()
            .with_options(CodegenOptions {
                source_map_path: request
                    .want_source_map
                    .then(|| PathBuf::from(&request.filename)),
                ..CodegenOptions::default()
            })
            .build(&program);

        let source_map = codegen.map.map(|map| {
            let tokens = map.get_tokens().map(|token| RawToken {
                dst_line: token.get_dst_line(),
                dst_col: token.get_dst_col(),
                src_line: token.get_src_line(),
                src_col: token.get_src_col(),
                mapped: token.get_source_id().is_some(),
            });
            mapper.finalize(tokens, &request.filename, &request.source_text)
        });

        let result = TransformResult {
            generated_text: codegen.code,
            source_map,
            dependency_list,
        };

        let info = session.finish();
        let (events, apis, failures) = (
            info.event_mappings.len(),
            info.api_mappings.len(),
            info.failures().count(),
        );
        let findings =
            self.validator
                .validate(&request.source_text, &result.generated_text, request.target_mode);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        {
            // One lock for all three so findings land on this request's entry.
            let mut recorder = self.recorder.lock();
            recorder.record_debug_info(info);
            recorder.record_trace(TransformTrace {
                filename: request.filename.clone(),
                original_text: request.source_text.clone(),
                generated_text: result.generated_text.clone(),
                source_map_text: result.source_map.clone(),
                mappings: mapper.into_entries(),
                duration_ms,
                recorded_at: chrono::Utc::now(),
            });
            recorder.append_findings(findings);
        }

        tracing::info!(
            filename = %request.filename,
            mode = %request.target_mode,
            events,
            apis,
            failures,
            duration_ms,
            "transform finished"
        );
        Ok(result)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWRITE VISITOR
// ═══════════════════════════════════════════════════════════════════════════════

/// A production rewrite decided before the call's children are visited.
enum Plan<'e> {
    Event {
        call: EventCall,
        mapping: &'e EventMapping,
        at: SourceLocation,
    },
    Fetch {
        call: FetchCall,
        method: String,
        mapping: &'e ApiMapping,
        at: SourceLocation,
    },
}

struct RewriteVisitor<'a, 'e> {
    allocator: &'a Allocator,
    engine: &'e TransformEngine,
    mode: TargetMode,
    lines: LineIndex<'e>,
    rewrites: Vec<(PatternKind, RewriteEvent)>,
    diagnostics: Vec<DiagnosticEntry>,
    mapper: PositionMapper,
}

impl<'a, 'e> RewriteVisitor<'a, 'e> {
    fn plan(&mut self, call: &CallExpression<'a>) -> Option<Plan<'e>> {
        let matched = match self.engine.matcher.classify(call) {
            Classification::Irrelevant => return None,
            Classification::Matched(matched) => matched,
            Classification::Ambiguous(kinds) => {
                self.ambiguous(call, &kinds);
                return None;
            }
        };
        let at = self.lines.location(call.span.start);
        let engine: &'e TransformEngine = self.engine;
        let registry: &'e MappingRegistry = &engine.registry;

        match matched {
            CallMatch::Event(event) => {
                let Some(mapping) =
                    registry.lookup_event_by_trigger(&event.event_type, event.selector.as_deref())
                else {
                    self.unmapped(
                        PatternKind::EventRegistration,
                        RewriteEvent::failure(
                            &event.event_type,
                            "",
                            at,
                            format!("no event mapping for '{}'", event.event_type),
                        ),
                    );
                    return None;
                };
                tracing::debug!(
                    web = %event.event_type,
                    platform = %mapping.platform_event_name,
                    %at,
                    "event registration matched"
                );
                if !self.mode.rewrites() {
                    self.rewrites.push((
                        PatternKind::EventRegistration,
                        RewriteEvent::success(&event.event_type, &mapping.platform_event_name, at, false),
                    ));
                    return None;
                }
                Some(Plan::Event {
                    call: event,
                    mapping,
                    at,
                })
            }
            CallMatch::Fetch(fetch) => {
                let method = match &fetch.method {
                    MethodSpec::Static(method) => method.clone(),
                    MethodSpec::Dynamic => {
                        self.unmapped(
                            PatternKind::NetworkFetch,
                            RewriteEvent::failure(&fetch.url, "", at, "HTTP method is not a literal"),
                        );
                        return None;
                    }
                    MethodSpec::Opaque => {
                        self.unmapped(
                            PatternKind::NetworkFetch,
                            RewriteEvent::failure(
                                &fetch.url,
                                "",
                                at,
                                "fetch init is not a plain object literal",
                            ),
                        );
                        return None;
                    }
                };
                let Some(mapping) = registry.lookup_api_by_route(&method, &fetch.url) else {
                    self.unmapped(
                        PatternKind::NetworkFetch,
                        RewriteEvent::failure(
                            &fetch.url,
                            "",
                            at,
                            format!("no API mapping for {} {}", method, fetch.url),
                        )
                        .with_method(&method),
                    );
                    return None;
                };
                tracing::debug!(
                    web = %fetch.url,
                    platform = %mapping.platform_api_name,
                    %method,
                    %at,
                    "network fetch matched"
                );
                if !self.mode.rewrites() {
                    self.rewrites.push((
                        PatternKind::NetworkFetch,
                        RewriteEvent::success(&fetch.url, &mapping.platform_api_name, at, false)
                            .with_method(&method),
                    ));
                    return None;
                }
                Some(Plan::Fetch {
                    call: fetch,
                    method,
                    mapping,
                    at,
                })
            }
        }
    }

    /// Unmapped constructs only matter when the output is meant to run on
    /// the platform.
    fn unmapped(&mut self, kind: PatternKind, event: RewriteEvent) {
        if !self.mode.rewrites() {
            return;
        }
        let reason = event.failure_reason.clone().unwrap_or_default();
        tracing::warn!(web = %event.web_construct, at = %event.source_location, "{}", reason);
        self.diagnostics.push(
            DiagnosticEntry::new(DiagnosticCode::UnsupportedConstruct, Severity::Warning, reason)
                .at(event.source_location)
                .suggest("Register a mapping for this construct or rewrite it by hand"),
        );
        self.rewrites.push((kind, event));
    }

    fn ambiguous(&mut self, call: &CallExpression<'a>, kinds: &[PatternKind]) {
        let names: Vec<&str> = kinds.iter().map(PatternKind::as_str).collect();
        debug_assert!(kinds.len() > 1, "ambiguity needs several kinds: {:?}", names);
        let at = self.lines.location(call.span.start);
        let reason = format!("call matches several patterns: {}", names.join(", "));
        tracing::warn!(%at, "{}", reason);
        self.diagnostics.push(
            DiagnosticEntry::new(DiagnosticCode::AmbiguousPattern, Severity::Error, reason.clone())
                .at(at),
        );
        if let Some(&kind) = kinds.first() {
            let web = crate::matcher::callee_path(&call.callee).unwrap_or_default();
            self.rewrites
                .push((kind, RewriteEvent::failure(web, "", at, reason)));
        }
    }

    fn apply(&mut self, expr: &mut Expression<'a>, plan: Plan<'e>) {
        let Expression::CallExpression(call) = expr else {
            return;
        };
        let rewriter = Rewriter::new(self.allocator, &self.engine.config.platform);
        let mut discarded = 0;
        let (kind, web, platform, at, method, replacement) = match plan {
            Plan::Event { call: event, mapping, at } => {
                discarded = event.discarded_arguments;
                (
                    PatternKind::EventRegistration,
                    event.event_type.clone(),
                    mapping.platform_event_name.clone(),
                    at,
                    None,
                    rewriter.event_replacement(call, &event, mapping),
                )
            }
            Plan::Fetch {
                call: fetch,
                method,
                mapping,
                at,
            } => {
                let replacement = rewriter.fetch_replacement(call, &fetch, &method, mapping);
                (
                    PatternKind::NetworkFetch,
                    fetch.url.clone(),
                    mapping.platform_api_name.clone(),
                    at,
                    Some(method),
                    replacement,
                )
            }
        };

        let event = match replacement {
            Ok(replacement) => {
                *expr = replacement;
                self.mapper.record(at, &web, &platform);
                if discarded > 0 {
                    let message = format!(
                        "{} argument(s) after the '{}' handler were dropped",
                        discarded, web
                    );
                    tracing::warn!(%at, "{}", message);
                    self.diagnostics.push(
                        DiagnosticEntry::new(DiagnosticCode::DiscardedArguments, Severity::Warning, message)
                            .at(at)
                            .suggest("Listener options such as once or capture have no platform equivalent"),
                    );
                }
                RewriteEvent::success(web, platform, at, true)
            }
            Err(failure) => {
                tracing::warn!(web = %web, %at, "rewrite failed: {}", failure);
                RewriteEvent::failure(web, platform, at, failure.to_string())
            }
        };
        let event = match method {
            Some(method) => event.with_method(method),
            None => event,
        };
        self.rewrites.push((kind, event));
    }
}

impl<'a, 'e> VisitMut<'a> for RewriteVisitor<'a, 'e> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        let plan = match expr {
            Expression::CallExpression(call) => self.plan(call),
            _ => None,
        };
        // Children first, so a replacement copies already-rewritten arguments.
        walk_mut::walk_expression(self, expr);
        if let Some(plan) = plan {
            self.apply(expr, plan);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct DependencyCollector {
    seen: HashSet<String>,
    list: Vec<String>,
}

impl DependencyCollector {
    fn push(&mut self, specifier: &str) {
        if self.seen.insert(specifier.to_string()) {
            self.list.push(specifier.to_string());
        }
    }
}

impl<'a> Visit<'a> for DependencyCollector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        self.push(decl.source.value.as_str());
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.push(decl.source.value.as_str());
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            self.push(source.value.as_str());
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Some(specifier) = literal_expression(&expr.source) {
            self.push(&specifier);
        }
        walk::walk_import_expression(self, expr);
    }
}

/// Static import and re-export sources plus literal `import()` specifiers,
/// in document order without duplicates.
fn collect_dependencies(program: &Program<'_>) -> Vec<String> {
    let mut collector = DependencyCollector::default();
    collector.visit_program(program);
    collector.list
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDING
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
lazy_static! {
    static ref DEFAULT_ENGINE: Result<TransformEngine, String> =
        TransformEngine::with_defaults().map_err(|e| e.to_string());
}

#[cfg(feature = "napi")]
#[napi]
pub fn transform_native(
    source_text: String,
    options_json: Option<String>,
) -> napi::Result<TransformResult> {
    let options: TransformOptions = match options_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => TransformOptions::default(),
    };
    let engine = DEFAULT_ENGINE
        .as_ref()
        .map_err(|e| napi::Error::from_reason(format!("Engine setup failed: {}", e)))?;
    engine
        .transform(&TransformRequest::new(source_text, options))
        .map_err(|e| napi::Error::from_reason(crate::error_handler::BridgeError::from(e).to_string()))
}
