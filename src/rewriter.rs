//! AST Rewriter
//!
//! Builds platform-side replacement expressions for matched calls. The shape
//! of each replacement is written as JavaScript text with named holes, parsed
//! into the request's allocator, and then the holes are filled with copies of
//! the original call's argument nodes. The caller performs the single in-place
//! substitution.

use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::*;
use oxc_ast_visit::{walk_mut, Visit, VisitMut};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span, SPAN};
use thiserror::Error;

use crate::config::PlatformCalls;
use crate::matcher::{init_property, stringify_argument, BodySpec, EventCall, FetchCall};
use crate::registry::{ApiMapping, EventMapping};
use crate::types::{ParamValue, PlatformRequest, RequestBody, WebRequest};

const HANDLER_HOLE: &str = "__ktn_handler";
const BODY_HOLE: &str = "__ktn_body";
/// Wrapper parameter used when the handler itself refers to `event`.
const EVENT_FALLBACK: &str = "__ktnEvent";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RewriteFailure {
    #[error("handler argument {0} is not an expression")]
    MissingHandler(usize),

    #[error("request body could not be located in the fetch init object")]
    MissingBody,

    #[error("replacement template failed to parse: {0}")]
    Template(String),
}

pub struct Rewriter<'a, 'c> {
    allocator: &'a Allocator,
    platform: &'c PlatformCalls,
}

impl<'a, 'c> Rewriter<'a, 'c> {
    pub fn new(allocator: &'a Allocator, platform: &'c PlatformCalls) -> Self {
        Rewriter {
            allocator,
            platform,
        }
    }

    /// `on("<event>", (event) => { handler(event); return event; })`
    ///
    /// The wrapper parameter is renamed when the handler references an
    /// `event` binding of its own, so the copy keeps closing over it.
    pub fn event_replacement(
        &self,
        call: &CallExpression<'a>,
        event: &EventCall,
        mapping: &EventMapping,
    ) -> Result<Expression<'a>, RewriteFailure> {
        let handler = call
            .arguments
            .get(event.handler_index)
            .and_then(|arg| arg.as_expression())
            .ok_or(RewriteFailure::MissingHandler(event.handler_index))?;

        let param = event_parameter(handler);
        let template = format!(
            "{}({}, ({param}) => {{ {}({param}); return {param}; }})",
            self.platform.event_registration,
            js_string(&mapping.platform_event_name),
            HANDLER_HOLE,
        );
        self.splice(
            &template,
            Holes {
                handler: Some(handler),
                body: None,
            },
            call,
        )
    }

    /// `api("<path>", "<METHOD>", { ...params })`
    pub fn fetch_replacement(
        &self,
        call: &CallExpression<'a>,
        fetch: &FetchCall,
        method: &str,
        mapping: &ApiMapping,
    ) -> Result<Expression<'a>, RewriteFailure> {
        let body = match fetch.body {
            BodySpec::Absent => None,
            BodySpec::Stringified => Some(
                init_property(call, "body")
                    .and_then(stringify_argument)
                    .ok_or(RewriteFailure::MissingBody)?,
            ),
            BodySpec::Raw => Some(init_property(call, "body").ok_or(RewriteFailure::MissingBody)?),
        };

        let mut request = WebRequest::new(fetch.url.clone(), method);
        if body.is_some() {
            request = request.with_body(RequestBody::Deferred);
        }
        let platform_request = mapping.transform_request(&request);

        let body_text = match fetch.body {
            BodySpec::Raw => format!("JSON.parse({})", BODY_HOLE),
            _ => BODY_HOLE.to_string(),
        };
        let template = format!(
            "{}({}, {}, {})",
            self.platform.api_invocation,
            js_string(&platform_request.path),
            js_string(&platform_request.method),
            params_object(&platform_request, &body_text),
        );
        self.splice(
            &template,
            Holes {
                handler: None,
                body,
            },
            call,
        )
    }

    fn splice(
        &self,
        template: &str,
        holes: Holes<'_, 'a>,
        original: &CallExpression<'a>,
    ) -> Result<Expression<'a>, RewriteFailure> {
        let text = self.allocator.alloc_str(template);
        let mut replacement = Parser::new(self.allocator, text, SourceType::mjs())
            .parse_expression()
            .map_err(|errors| {
                RewriteFailure::Template(
                    errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            })?;

        let mut splicer = HoleSplicer {
            allocator: self.allocator,
            holes,
        };
        splicer.visit_expression(&mut replacement);

        // The generator maps a call by its end and an identifier by its
        // start. Anchoring the leading identifier on the original callee gives
        // the rewrite a token at the web construct's first character.
        if let Expression::CallExpression(call) = &mut replacement {
            call.span = original.span;
            if let Some(ident) = leading_identifier(&mut call.callee) {
                ident.span = Span::new(original.span.start, original.callee.span().end);
            }
        }
        Ok(replacement)
    }
}

/// `kintone` of `kintone.events.on`.
fn leading_identifier<'r, 'a>(
    expr: &'r mut Expression<'a>,
) -> Option<&'r mut IdentifierReference<'a>> {
    match expr {
        Expression::Identifier(ident) => Some(&mut **ident),
        Expression::StaticMemberExpression(member) => leading_identifier(&mut member.object),
        _ => None,
    }
}

#[derive(Default)]
struct ReferencedNames {
    names: std::collections::HashSet<String>,
}

impl<'a> Visit<'a> for ReferencedNames {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.names.insert(ident.name.to_string());
    }
}

/// `event` unless the handler refers to that name; then the first free
/// `__ktnEvent`, `__ktnEvent1`, ...
fn event_parameter(handler: &Expression<'_>) -> String {
    let mut referenced = ReferencedNames::default();
    referenced.visit_expression(handler);
    if !referenced.names.contains("event") {
        return "event".to_string();
    }
    let mut suffix = 0;
    loop {
        let candidate = match suffix {
            0 => EVENT_FALLBACK.to_string(),
            n => format!("{}{}", EVENT_FALLBACK, n),
        };
        if !referenced.names.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn params_object(request: &PlatformRequest, body_text: &str) -> String {
    let props: Vec<String> = request
        .params
        .iter()
        .map(|(key, value)| {
            let value_text = match value {
                ParamValue::Json(json) => json.to_string(),
                ParamValue::Body => body_text.to_string(),
                ParamValue::SpreadBody => return format!("...{}", body_text),
            };
            if is_identifier(key) {
                format!("{}: {}", key, value_text)
            } else {
                format!("{}: {}", js_string(key), value_text)
            }
        })
        .collect();
    format!("{{ {} }}", props.join(", "))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOLE SPLICER
// ═══════════════════════════════════════════════════════════════════════════════

struct Holes<'h, 'a> {
    handler: Option<&'h Expression<'a>>,
    body: Option<&'h Expression<'a>>,
}

struct HoleSplicer<'h, 'a> {
    allocator: &'a Allocator,
    holes: Holes<'h, 'a>,
}

impl<'h, 'a> HoleSplicer<'h, 'a> {
    fn fill_for(&self, name: &str) -> Option<&'h Expression<'a>> {
        match name {
            HANDLER_HOLE => self.holes.handler,
            BODY_HOLE => self.holes.body,
            _ => None,
        }
    }
}

impl<'h, 'a> VisitMut<'a> for HoleSplicer<'h, 'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        let fill = match &*expr {
            Expression::Identifier(ident) => self.fill_for(ident.name.as_str()),
            _ => None,
        };
        match fill {
            // Spliced nodes keep their original spans.
            Some(original) => *expr = original.clone_in(self.allocator),
            None => walk_mut::walk_expression(self, expr),
        }
    }

    // Template text offsets mean nothing in the original file.
    fn visit_span(&mut self, span: &mut Span) {
        *span = SPAN;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::default_api_mappings;
    use crate::events::default_event_mappings;
    use crate::matcher::{CallMatch, Classification, MethodSpec, PatternMatcher};
    use crate::config::EngineConfig;
    use oxc_codegen::Codegen;

    fn squash(code: &str) -> String {
        code.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Rewrite the first statement's call expression and print the program.
    fn rewrite_first_statement(source: &str) -> String {
        let allocator = Allocator::default();
        let config = EngineConfig::default();
        let mut ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        assert!(ret.errors.is_empty(), "{:?}", ret.errors);

        let Some(Statement::ExpressionStatement(stmt)) = ret.program.body.first_mut() else {
            panic!("expected expression statement");
        };
        let replacement = {
            let Expression::CallExpression(call) = &stmt.expression else {
                panic!("expected call");
            };
            let rewriter = Rewriter::new(&allocator, &config.platform);
            match PatternMatcher::new(&config).classify(call) {
                Classification::Matched(CallMatch::Event(event)) => {
                    let mapping = default_event_mappings()
                        .into_iter()
                        .find(|m| m.web_trigger.event_type == event.event_type)
                        .unwrap();
                    rewriter.event_replacement(call, &event, &mapping).unwrap()
                }
                Classification::Matched(CallMatch::Fetch(fetch)) => {
                    let MethodSpec::Static(method) = fetch.method.clone() else {
                        panic!("dynamic method");
                    };
                    let mapping = default_api_mappings()
                        .into_iter()
                        .find(|m| m.http_method == method && fetch.url.starts_with(&m.path_prefix))
                        .unwrap();
                    rewriter
                        .fetch_replacement(call, &fetch, &method, &mapping)
                        .unwrap()
                }
                other => panic!("unexpected classification {:?}", other),
            }
        };
        stmt.expression = replacement;
        Codegen::new().build(&ret.program).code
    }

    #[test]
    fn test_event_replacement_wraps_handler() {
        let out = rewrite_first_statement("document.addEventListener('DOMContentLoaded', init);");
        assert_eq!(
            squash(&out),
            squash(
                r#"kintone.events.on("app.record.index.show", (event) => { init(event); return event; });"#
            )
        );
    }

    #[test]
    fn test_inline_handler_is_copied() {
        let out = rewrite_first_statement(
            "document.addEventListener('DOMContentLoaded', (e) => console.log(e.records));",
        );
        let squashed = squash(&out);
        assert!(squashed.contains("console.log(e.records)"), "{}", out);
        assert!(squashed.contains("returnevent;"), "{}", out);
        assert!(!squashed.contains(HANDLER_HOLE), "{}", out);
    }

    #[test]
    fn test_handler_closing_over_event_keeps_its_binding() {
        let out = rewrite_first_statement(
            "document.addEventListener('DOMContentLoaded', () => log(event));",
        );
        assert_eq!(
            squash(&out),
            squash(
                r#"kintone.events.on("app.record.index.show", (__ktnEvent) => { (() => log(event))(__ktnEvent); return __ktnEvent; });"#
            )
        );
    }

    #[test]
    fn test_event_parameter_skips_taken_names() {
        let allocator = Allocator::default();
        let handler = Parser::new(&allocator, "(e) => f(event, __ktnEvent)", SourceType::mjs())
            .parse_expression()
            .unwrap();
        assert_eq!(event_parameter(&handler), "__ktnEvent1");

        let handler = Parser::new(&allocator, "(event) => f(event.records)", SourceType::mjs())
            .parse_expression()
            .unwrap();
        // A handler's own parameter is still a reference inside its body.
        assert_eq!(event_parameter(&handler), "__ktnEvent");

        let handler = Parser::new(&allocator, "init", SourceType::mjs())
            .parse_expression()
            .unwrap();
        assert_eq!(event_parameter(&handler), "event");
    }

    #[test]
    fn test_fetch_replacement_builds_params() {
        let out = rewrite_first_statement("fetch('/api/records?app=1&fields=title,description');");
        assert_eq!(
            squash(&out),
            squash(
                r#"kintone.api("/k/v1/records.json", "GET", { app: 1, fields: ["title", "description"] });"#
            )
        );
    }

    #[test]
    fn test_stringified_body_is_unwrapped() {
        let out = rewrite_first_statement(
            "fetch('/api/record?app=1', { method: 'POST', body: JSON.stringify(record) });",
        );
        assert_eq!(
            squash(&out),
            squash(r#"kintone.api("/k/v1/record.json", "POST", { app: 1, record });"#)
        );
    }

    #[test]
    fn test_raw_body_is_parsed() {
        let out = rewrite_first_statement(
            "fetch('/api/record', { method: 'PUT', body: payloadText });",
        );
        assert!(
            squash(&out).contains("record:JSON.parse(payloadText)"),
            "{}",
            out
        );
    }

    #[test]
    fn test_params_object_quotes_non_identifier_keys() {
        let mut request = PlatformRequest::new("/k/v1/x.json", "GET");
        request.set("app", ParamValue::Json(serde_json::json!(1)));
        request.set("field-code", ParamValue::Json(serde_json::json!("a")));
        request.set(crate::types::SPREAD_KEY, ParamValue::SpreadBody);
        assert_eq!(
            params_object(&request, BODY_HOLE),
            r#"{ app: 1, "field-code": "a", ...__ktn_body }"#
        );
    }
}
