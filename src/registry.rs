//! Mapping Registry
//!
//! Static tables describing each recognized web-side pattern and its platform
//! equivalent. Populated once at startup and read-only afterwards; every
//! lookup is a key-indexed read and absence is an ordinary `None`.

use std::collections::HashMap;

use crate::error::RegistryError;
use crate::types::{PlatformEvent, PlatformRequest, WebEvent, WebRequest, WebResponse};

pub type ToPlatformEvent = fn(&WebEvent) -> PlatformEvent;
pub type ToWebEvent = fn(&PlatformEvent) -> WebEvent;
pub type RequestTransform = fn(&WebRequest) -> PlatformRequest;
pub type ResponseTransform = fn(&serde_json::Value) -> WebResponse;

// ═══════════════════════════════════════════════════════════════════════════════
// MAPPING TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebTrigger {
    pub event_type: String,
    pub element_selector: Option<String>,
    pub description: String,
}

#[derive(Clone, Copy)]
pub struct EventValueTransform {
    pub to_platform: ToPlatformEvent,
    pub to_web: ToWebEvent,
}

impl std::fmt::Debug for EventValueTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventValueTransform { .. }")
    }
}

#[derive(Clone, Copy)]
pub struct ApiValueTransform {
    pub request: RequestTransform,
    pub response: ResponseTransform,
}

impl std::fmt::Debug for ApiValueTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiValueTransform { .. }")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingExample {
    pub web: String,
    pub platform: String,
}

#[derive(Debug, Clone)]
pub struct EventMapping {
    pub platform_event_name: String,
    pub web_trigger: WebTrigger,
    pub value_transform: EventValueTransform,
    pub example: MappingExample,
    pub introduced_version: Option<String>,
    pub deprecated: bool,
}

impl EventMapping {
    /// A mapping with identity-style value transforms. Use the builder methods
    /// to refine it before registration.
    pub fn new(platform_event_name: impl Into<String>, event_type: impl Into<String>) -> Self {
        EventMapping {
            platform_event_name: platform_event_name.into(),
            web_trigger: WebTrigger {
                event_type: event_type.into(),
                element_selector: None,
                description: String::new(),
            },
            value_transform: EventValueTransform {
                to_platform: passthrough_to_platform,
                to_web: passthrough_to_web,
            },
            example: MappingExample::default(),
            introduced_version: None,
            deprecated: false,
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.web_trigger.element_selector = Some(selector.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.web_trigger.description = description.into();
        self
    }

    pub fn transform(mut self, to_platform: ToPlatformEvent, to_web: ToWebEvent) -> Self {
        self.value_transform = EventValueTransform {
            to_platform,
            to_web,
        };
        self
    }

    pub fn example(mut self, web: impl Into<String>, platform: impl Into<String>) -> Self {
        self.example = MappingExample {
            web: web.into(),
            platform: platform.into(),
        };
        self
    }

    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.introduced_version = Some(version.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn to_platform(&self, event: &WebEvent) -> PlatformEvent {
        (self.value_transform.to_platform)(event)
    }

    pub fn to_web(&self, event: &PlatformEvent) -> WebEvent {
        (self.value_transform.to_web)(event)
    }
}

fn passthrough_to_platform(event: &WebEvent) -> PlatformEvent {
    PlatformEvent {
        event_type: event.event_type.clone(),
        record: event.detail_field("record").cloned(),
        records: event.detail_field("records").cloned(),
        ..Default::default()
    }
}

fn passthrough_to_web(event: &PlatformEvent) -> WebEvent {
    WebEvent::new(
        event.event_type.clone(),
        serde_json::to_value(event).unwrap_or_default(),
    )
}

#[derive(Debug, Clone)]
pub struct ApiMapping {
    pub platform_api_name: String,
    /// Web-side call family, e.g. `fetch`.
    pub web_method: String,
    pub http_method: String,
    /// Web URL path prefix this mapping claims, matched on segment boundaries.
    pub path_prefix: String,
    /// Platform endpoint the rewritten call targets.
    pub platform_path: String,
    pub description: String,
    pub value_transform: ApiValueTransform,
    pub example: MappingExample,
}

impl ApiMapping {
    pub fn new(
        platform_api_name: impl Into<String>,
        http_method: impl Into<String>,
        path_prefix: impl Into<String>,
        platform_path: impl Into<String>,
        request_transform: RequestTransform,
    ) -> Self {
        ApiMapping {
            platform_api_name: platform_api_name.into(),
            web_method: "fetch".to_string(),
            http_method: http_method.into().to_ascii_uppercase(),
            path_prefix: normalize_prefix(&path_prefix.into()),
            platform_path: platform_path.into(),
            description: String::new(),
            value_transform: ApiValueTransform {
                request: request_transform,
                response: WebResponse::json,
            },
            example: MappingExample::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn response(mut self, transform: ResponseTransform) -> Self {
        self.value_transform.response = transform;
        self
    }

    pub fn example(mut self, web: impl Into<String>, platform: impl Into<String>) -> Self {
        self.example = MappingExample {
            web: web.into(),
            platform: platform.into(),
        };
        self
    }

    pub fn transform_request(&self, request: &WebRequest) -> PlatformRequest {
        (self.value_transform.request)(request)
    }

    pub fn transform_response(&self, response: &serde_json::Value) -> WebResponse {
        (self.value_transform.response)(response)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

type TriggerKey = (String, Option<String>);
type RouteKey = (String, String);

#[derive(Debug, Default)]
pub struct MappingRegistry {
    events: Vec<EventMapping>,
    apis: Vec<ApiMapping>,
    events_by_name: HashMap<String, usize>,
    events_by_trigger: HashMap<TriggerKey, usize>,
    /// First-registered mapping per event type; the fallback when a call site
    /// names no selector or an unregistered one.
    default_by_event_type: HashMap<String, usize>,
    apis_by_name: HashMap<String, usize>,
    apis_by_route: HashMap<RouteKey, usize>,
    /// First-registered mapping per path prefix, regardless of HTTP method.
    apis_by_prefix: HashMap<String, usize>,
}

/// One registrable entry. `register` accepts either kind.
pub enum Mapping {
    Event(EventMapping),
    Api(ApiMapping),
}

impl From<EventMapping> for Mapping {
    fn from(mapping: EventMapping) -> Self {
        Mapping::Event(mapping)
    }
}

impl From<ApiMapping> for Mapping {
    fn from(mapping: ApiMapping) -> Self {
        Mapping::Api(mapping)
    }
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The kintone catalogue shipped with the engine.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let mut registry = MappingRegistry::new();
        for mapping in crate::events::default_event_mappings() {
            registry.register(mapping)?;
        }
        for mapping in crate::apis::default_api_mappings() {
            registry.register(mapping)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, mapping: impl Into<Mapping>) -> Result<(), RegistryError> {
        match mapping.into() {
            Mapping::Event(event) => self.register_event(event),
            Mapping::Api(api) => self.register_api(api),
        }
    }

    fn register_event(&mut self, mapping: EventMapping) -> Result<(), RegistryError> {
        let name = mapping.platform_event_name.clone();
        if self.events_by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateEventName(name));
        }
        let trigger: TriggerKey = (
            mapping.web_trigger.event_type.clone(),
            mapping.web_trigger.element_selector.clone(),
        );
        if let Some(&existing) = self.events_by_trigger.get(&trigger) {
            return Err(RegistryError::DuplicateTrigger {
                event_type: trigger.0,
                selector: trigger.1,
                existing: self.events[existing].platform_event_name.clone(),
            });
        }

        let index = self.events.len();
        self.default_by_event_type
            .entry(trigger.0.clone())
            .or_insert(index);
        self.events_by_trigger.insert(trigger, index);
        self.events_by_name.insert(name, index);
        tracing::debug!(
            event = %mapping.platform_event_name,
            trigger = %mapping.web_trigger.event_type,
            "registered event mapping"
        );
        self.events.push(mapping);
        Ok(())
    }

    fn register_api(&mut self, mapping: ApiMapping) -> Result<(), RegistryError> {
        let name = mapping.platform_api_name.clone();
        if mapping.path_prefix.is_empty() {
            return Err(RegistryError::EmptyPathPrefix(name));
        }
        if self.apis_by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateApiName(name));
        }
        let route: RouteKey = (mapping.http_method.clone(), mapping.path_prefix.clone());
        if let Some(&existing) = self.apis_by_route.get(&route) {
            return Err(RegistryError::DuplicateRoute {
                method: route.0,
                path_prefix: route.1,
                existing: self.apis[existing].platform_api_name.clone(),
            });
        }

        let index = self.apis.len();
        self.apis_by_prefix.entry(route.1.clone()).or_insert(index);
        self.apis_by_route.insert(route, index);
        self.apis_by_name.insert(name, index);
        tracing::debug!(
            api = %mapping.platform_api_name,
            method = %mapping.http_method,
            prefix = %mapping.path_prefix,
            "registered API mapping"
        );
        self.apis.push(mapping);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Lookups
    // ───────────────────────────────────────────────────────────────────────────

    pub fn lookup_event_by_name(&self, name: &str) -> Option<&EventMapping> {
        self.events_by_name.get(name).map(|&i| &self.events[i])
    }

    /// Exact (type, selector) match first, then the type's default mapping.
    pub fn lookup_event_by_trigger(
        &self,
        event_type: &str,
        selector: Option<&str>,
    ) -> Option<&EventMapping> {
        if let Some(selector) = selector {
            let key = (event_type.to_string(), Some(selector.to_string()));
            if let Some(&i) = self.events_by_trigger.get(&key) {
                return Some(&self.events[i]);
            }
        }
        self.default_by_event_type
            .get(event_type)
            .map(|&i| &self.events[i])
    }

    pub fn lookup_api_by_name(&self, name: &str) -> Option<&ApiMapping> {
        self.apis_by_name.get(name).map(|&i| &self.apis[i])
    }

    /// Longest registered prefix of `path`, on segment boundaries. A full URL
    /// is accepted; its query string and origin are ignored.
    pub fn lookup_api_by_path_prefix(&self, path: &str) -> Option<&ApiMapping> {
        self.lookup_api_with(path, |prefix| self.apis_by_prefix.get(prefix).copied())
    }

    /// Like [`lookup_api_by_path_prefix`](Self::lookup_api_by_path_prefix) but
    /// restricted to mappings registered for `http_method`.
    pub fn lookup_api_by_route(&self, http_method: &str, path: &str) -> Option<&ApiMapping> {
        let method = http_method.to_ascii_uppercase();
        self.lookup_api_with(path, |prefix| {
            self.apis_by_route
                .get(&(method.clone(), prefix.to_string()))
                .copied()
        })
    }

    fn lookup_api_with<F>(&self, path: &str, find: F) -> Option<&ApiMapping>
    where
        F: Fn(&str) -> Option<usize>,
    {
        let path = crate::query::url_path(path).trim_end_matches('/');
        let mut candidate = path;
        loop {
            if candidate.is_empty() {
                return None;
            }
            if let Some(i) = find(candidate) {
                return Some(&self.apis[i]);
            }
            match candidate.rfind('/') {
                Some(cut) => candidate = &candidate[..cut],
                None => return None,
            }
        }
    }

    pub fn event_mappings(&self) -> &[EventMapping] {
        &self.events
    }

    pub fn api_mappings(&self) -> &[ApiMapping] {
        &self.apis
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.apis.is_empty()
    }
}
