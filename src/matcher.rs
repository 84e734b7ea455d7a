//! Pattern Matcher
//!
//! Structural classification of call expressions. Each recognized web
//! construct is a [`PatternRecognizer`] in the matcher's dispatch table; the
//! matcher itself only runs the table and reports how many entries claimed a
//! call. Nothing here consults the mapping registry.

use oxc_ast::ast::*;

use crate::config::EngineConfig;
use crate::query::url_origin;

// ═══════════════════════════════════════════════════════════════════════════════
// MATCH TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    EventRegistration,
    NetworkFetch,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::EventRegistration => "event-registration",
            PatternKind::NetworkFetch => "network-fetch",
        }
    }
}

/// `target.addEventListener("type", handler)` with a literal type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCall {
    pub callee: String,
    pub event_type: String,
    /// Selector of a `querySelector(sel).addEventListener(...)` receiver.
    pub selector: Option<String>,
    pub handler_index: usize,
    /// Arguments after the handler, such as an options object or capture
    /// flag. The platform registration has no slot for them.
    pub discarded_arguments: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSpec {
    Static(String),
    /// `method` is present but not a literal.
    Dynamic,
    /// The init argument is not a plain object literal (a variable, a spread,
    /// a computed key), so neither method nor body can be read.
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySpec {
    Absent,
    /// `body: JSON.stringify(x)`; `x` is spliced directly.
    Stringified,
    /// Any other body expression; spliced as `JSON.parse(body)`.
    Raw,
}

/// `fetch("/literal/url", init?)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub callee: String,
    pub url: String,
    pub method: MethodSpec,
    pub body: BodySpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallMatch {
    Event(EventCall),
    Fetch(FetchCall),
}

impl CallMatch {
    pub fn kind(&self) -> PatternKind {
        match self {
            CallMatch::Event(_) => PatternKind::EventRegistration,
            CallMatch::Fetch(_) => PatternKind::NetworkFetch,
        }
    }

    /// The web construct as it appears in diagnostics and position names.
    pub fn web_construct(&self) -> &str {
        match self {
            CallMatch::Event(event) => &event.event_type,
            CallMatch::Fetch(fetch) => &fetch.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Irrelevant,
    Matched(CallMatch),
    Ambiguous(Vec<PatternKind>),
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECOGNIZERS
// ═══════════════════════════════════════════════════════════════════════════════

pub trait PatternRecognizer: Send + Sync {
    fn kind(&self) -> PatternKind;
    fn recognize(&self, call: &CallExpression<'_>) -> Option<CallMatch>;
}

pub struct EventRegistrationRecognizer {
    callees: Vec<String>,
    selector_queries: Vec<String>,
    methods: std::collections::HashSet<String>,
}

impl EventRegistrationRecognizer {
    pub fn new(config: &EngineConfig) -> Self {
        EventRegistrationRecognizer {
            callees: config.event_callees.clone(),
            selector_queries: config.selector_queries.clone(),
            methods: config.registration_methods(),
        }
    }

    /// `query("<sel>").<method>` receivers yield their selector.
    fn scoped_selector(&self, callee: &Expression<'_>) -> Option<String> {
        let Expression::StaticMemberExpression(member) = callee.without_parentheses() else {
            return None;
        };
        if !self.methods.contains(member.property.name.as_str()) {
            return None;
        }
        let Expression::CallExpression(query) = member.object.without_parentheses() else {
            return None;
        };
        let query_path = callee_path(&query.callee)?;
        if !self.selector_queries.iter().any(|q| *q == query_path) {
            return None;
        }
        literal_argument(query.arguments.first()?)
    }
}

impl PatternRecognizer for EventRegistrationRecognizer {
    fn kind(&self) -> PatternKind {
        PatternKind::EventRegistration
    }

    fn recognize(&self, call: &CallExpression<'_>) -> Option<CallMatch> {
        let (callee, selector) = match callee_path(&call.callee) {
            Some(path) if self.callees.iter().any(|c| *c == path) => (path, None),
            _ => {
                let selector = self.scoped_selector(&call.callee)?;
                let method = match call.callee.without_parentheses() {
                    Expression::StaticMemberExpression(member) => member.property.name.to_string(),
                    _ => return None,
                };
                (method, Some(selector))
            }
        };

        let event_type = literal_argument(call.arguments.first()?)?;
        // A registration without a handler has nothing to bridge.
        call.arguments.get(1)?.as_expression()?;

        Some(CallMatch::Event(EventCall {
            callee,
            event_type,
            selector,
            handler_index: 1,
            discarded_arguments: call.arguments.len().saturating_sub(2),
        }))
    }
}

pub struct NetworkFetchRecognizer {
    callees: Vec<String>,
    allowed_origins: Vec<String>,
}

impl NetworkFetchRecognizer {
    pub fn new(config: &EngineConfig) -> Self {
        NetworkFetchRecognizer {
            callees: config.fetch_callees.clone(),
            allowed_origins: config
                .allowed_origins
                .iter()
                .map(|origin| origin.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Relative URLs always qualify. Absolute ones only on an allowed origin;
    /// a protocol-relative URL matches an allowed origin's authority.
    fn same_origin(&self, url: &str) -> bool {
        let Some(origin) = url_origin(url) else {
            return true;
        };
        let origin = origin.to_ascii_lowercase();
        self.allowed_origins.iter().any(|allowed| {
            *allowed == origin
                || (origin.starts_with("//")
                    && allowed
                        .split_once("://")
                        .is_some_and(|(_, authority)| authority == &origin[2..]))
        })
    }
}

impl PatternRecognizer for NetworkFetchRecognizer {
    fn kind(&self) -> PatternKind {
        PatternKind::NetworkFetch
    }

    fn recognize(&self, call: &CallExpression<'_>) -> Option<CallMatch> {
        let callee = callee_path(&call.callee)?;
        if !self.callees.iter().any(|c| *c == callee) {
            return None;
        }
        // Computed URLs are never matched.
        let url = literal_argument(call.arguments.first()?)?;
        if !self.same_origin(&url) {
            return None;
        }

        let (method, body) = match init_object(call) {
            InitObject::Opaque => (MethodSpec::Opaque, BodySpec::Absent),
            InitObject::Absent | InitObject::Literal(_) => {
                let method = match init_property(call, "method") {
                    None => MethodSpec::Static("GET".to_string()),
                    Some(expr) => match literal_expression(expr) {
                        Some(method) => MethodSpec::Static(method.to_ascii_uppercase()),
                        None => MethodSpec::Dynamic,
                    },
                };
                let body = match init_property(call, "body") {
                    None => BodySpec::Absent,
                    Some(expr) if stringify_argument(expr).is_some() => BodySpec::Stringified,
                    Some(_) => BodySpec::Raw,
                };
                (method, body)
            }
        };

        Some(CallMatch::Fetch(FetchCall {
            callee,
            url,
            method,
            body,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATCHER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct PatternMatcher {
    recognizers: Vec<Box<dyn PatternRecognizer>>,
}

impl PatternMatcher {
    pub fn new(config: &EngineConfig) -> Self {
        PatternMatcher {
            recognizers: vec![
                Box::new(EventRegistrationRecognizer::new(config)),
                Box::new(NetworkFetchRecognizer::new(config)),
            ],
        }
    }

    /// Add a recognizer for a further web construct.
    pub fn with_recognizer(mut self, recognizer: Box<dyn PatternRecognizer>) -> Self {
        self.recognizers.push(recognizer);
        self
    }

    pub fn classify(&self, call: &CallExpression<'_>) -> Classification {
        let mut matches: Vec<(PatternKind, CallMatch)> = self
            .recognizers
            .iter()
            .filter_map(|recognizer| Some((recognizer.kind(), recognizer.recognize(call)?)))
            .collect();

        match matches.len() {
            0 => Classification::Irrelevant,
            1 => Classification::Matched(matches.remove(0).1),
            _ => Classification::Ambiguous(matches.into_iter().map(|(kind, _)| kind).collect()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURAL HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Dotted name of an identifier or static member chain, e.g. `document.addEventListener`.
pub fn callee_path(expr: &Expression<'_>) -> Option<String> {
    match expr.without_parentheses() {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        Expression::StaticMemberExpression(member) => {
            let object = callee_path(&member.object)?;
            Some(format!("{}.{}", object, member.property.name))
        }
        _ => None,
    }
}

/// String value of a literal expression: a string literal or a template with
/// no substitutions.
pub fn literal_expression(expr: &Expression<'_>) -> Option<String> {
    match expr.without_parentheses() {
        Expression::StringLiteral(lit) => Some(lit.value.to_string()),
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

fn literal_argument(arg: &Argument<'_>) -> Option<String> {
    literal_expression(arg.as_expression()?)
}

enum InitObject<'b, 'a> {
    Absent,
    Literal(&'b ObjectExpression<'a>),
    Opaque,
}

/// Shape of a fetch call's second argument. A literal only counts when every
/// property is a plain `key: value` with a static key.
fn init_object<'b, 'a>(call: &'b CallExpression<'a>) -> InitObject<'b, 'a> {
    let Some(arg) = call.arguments.get(1) else {
        return InitObject::Absent;
    };
    let Some(Expression::ObjectExpression(init)) = arg.as_expression().map(|e| e.without_parentheses())
    else {
        return InitObject::Opaque;
    };
    let readable = init.properties.iter().all(|prop| match prop {
        ObjectPropertyKind::ObjectProperty(prop) => {
            !prop.computed
                && prop.kind == PropertyKind::Init
                && matches!(
                    prop.key,
                    PropertyKey::StaticIdentifier(_) | PropertyKey::StringLiteral(_)
                )
        }
        ObjectPropertyKind::SpreadProperty(_) => false,
    });
    if readable {
        InitObject::Literal(&**init)
    } else {
        InitObject::Opaque
    }
}

/// Value of `key` in the object literal passed as a fetch call's second argument.
pub fn init_property<'b, 'a>(call: &'b CallExpression<'a>, key: &str) -> Option<&'b Expression<'a>> {
    let InitObject::Literal(init) = init_object(call) else {
        return None;
    };

    init.properties.iter().find_map(|prop| match prop {
        ObjectPropertyKind::ObjectProperty(prop) => {
            let name = match &prop.key {
                PropertyKey::StaticIdentifier(id) => id.name.as_str(),
                PropertyKey::StringLiteral(lit) => lit.value.as_str(),
                _ => return None,
            };
            (name == key).then_some(&prop.value)
        }
        ObjectPropertyKind::SpreadProperty(_) => None,
    })
}

/// `x` of a `JSON.stringify(x)` call.
pub fn stringify_argument<'b, 'a>(expr: &'b Expression<'a>) -> Option<&'b Expression<'a>> {
    let Expression::CallExpression(call) = expr.without_parentheses() else {
        return None;
    };
    if callee_path(&call.callee).as_deref() != Some("JSON.stringify") {
        return None;
    }
    call.arguments.first()?.as_expression()
}
