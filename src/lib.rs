//! # ktn-bridge Native Transform Engine
//!
//! Build-time source-to-source rewrite of web-standard idioms onto the kintone
//! platform API.
//!
//! ## Pipeline
//!
//! 1. **Parse**: `oxc_parser` yields a mutable tree. A parse failure is the only
//!    error a transform returns.
//! 2. **Match**: every call expression is classified once, in document order,
//!    as an event registration, a network fetch, or irrelevant.
//! 3. **Rewrite**: production mode replaces each mapped call in place.
//!    Development mode only reports what would change.
//! 4. **Generate**: `oxc_codegen` renders the tree; recorded positions name the
//!    source-map tokens `<web>-><platform>`.
//! 5. **Record**: debug info, a trace and validator findings go to the
//!    injected [`DiagnosticRecorder`].
//!
//! ## Call Shapes
//!
//! | Web | Platform |
//! |-----|----------|
//! | `document.addEventListener(type, cb)` | `kintone.events.on(event, (event) => { cb(event); return event; })` |
//! | `document.querySelector(sel).addEventListener(type, cb)` | same, selector-scoped lookup |
//! | `fetch("/literal?x=1", { method, body })` | `kintone.api(path, METHOD, { x: 1, ... })` |
//!
//! Computed URLs and event names are never matched, nor are absolute URLs
//! outside `EngineConfig::allowed_origins`. A fetch whose init argument cannot
//! be read as a plain object literal is reported, not rewritten.

mod apis;
mod cache;
mod config;
mod error;
mod error_handler;
mod events;
mod matcher;
mod position;
mod query;
mod recorder;
mod registry;
mod rewriter;
mod transform;
mod types;
mod validator;


pub use cache::TransformCache;
pub use config::{EngineConfig, PlatformCalls, RecorderOptions};
pub use error::{ConfigError, DiagnosticCode, RegistryError, TransformError};
pub use error_handler::{
    mapping_error, network_error, transform_error, validation_error, BridgeError, ErrorContext,
    ErrorHandler, ErrorType,
};
pub use matcher::{
    BodySpec, CallMatch, Classification, EventCall, EventRegistrationRecognizer, FetchCall,
    MethodSpec, NetworkFetchRecognizer, PatternKind, PatternMatcher, PatternRecognizer,
};
pub use position::{LineIndex, PositionMapper, PositionMapping, RawToken};
pub use query::{coerce_scalar, parse_query, percent_decode, query_object, url_origin, url_path};
pub use recorder::{
    DebugInfo, DiagnosticEntry, DiagnosticRecorder, Outcome, RecorderStatistics, RewriteEvent,
    RingBuffer, SessionPhase, Severity, TransformSession, TransformTrace,
};
pub use registry::{
    ApiMapping, ApiValueTransform, EventMapping, EventValueTransform, Mapping, MappingExample,
    MappingRegistry, WebTrigger,
};
pub use rewriter::{RewriteFailure, Rewriter};
pub use transform::TransformEngine;
pub use types::{
    ParamValue, PlatformEvent, PlatformRequest, RequestBody, SourceLocation, TargetMode,
    TransformOptions, TransformRequest, TransformResult, WebEvent, WebRequest, WebResponse,
    DEFAULT_FILENAME, SPREAD_KEY,
};
pub use validator::TransformValidator;

#[cfg(feature = "napi")]
pub use transform::transform_native;
