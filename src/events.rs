//! Built-in event mappings: DOM lifecycle events onto kintone record screens.
//!
//! Show events are raised on `DOMContentLoaded` scoped by a `data-page`
//! selector; submit events on `submit` scoped by a `data-form` selector.

use serde_json::{json, Map, Value};

use crate::registry::EventMapping;
use crate::types::{PlatformEvent, WebEvent};

const PAGELOAD: &str = "pageload";
const FORMSUBMIT: &str = "formsubmit";

pub fn default_event_mappings() -> Vec<EventMapping> {
    vec![
        EventMapping::new("app.record.index.show", "DOMContentLoaded")
            .selector(r#"[data-page="record-list"]"#)
            .description("Record list screen finished rendering")
            .transform(index_show_to_platform, show_to_web)
            .example(
                "document.addEventListener('DOMContentLoaded', (e) => {\n  const records = e.detail.records;\n  console.log('record list shown', records.length);\n});",
                "kintone.events.on('app.record.index.show', (event) => {\n  const records = event.records;\n  console.log('record list shown', records.length);\n  return event;\n});",
            )
            .since("2019.02"),
        EventMapping::new("app.record.detail.show", "DOMContentLoaded")
            .selector(r#"[data-page="record-detail"]"#)
            .description("Record detail screen finished rendering")
            .transform(record_show_to_platform, show_to_web)
            .example(
                "document.querySelector('[data-page=\"record-detail\"]').addEventListener('DOMContentLoaded', (e) => {\n  render(e.detail.record);\n});",
                "kintone.events.on('app.record.detail.show', (event) => {\n  render(event.record);\n  return event;\n});",
            ),
        EventMapping::new("app.record.create.show", "DOMContentLoaded")
            .selector(r#"[data-page="record-create"]"#)
            .description("Record create screen finished rendering")
            .transform(record_show_to_platform, show_to_web)
            .example(
                "document.querySelector('[data-page=\"record-create\"]').addEventListener('DOMContentLoaded', (e) => {\n  prefill(e.detail.record);\n});",
                "kintone.events.on('app.record.create.show', (event) => {\n  prefill(event.record);\n  return event;\n});",
            ),
        EventMapping::new("app.record.edit.show", "DOMContentLoaded")
            .selector(r#"[data-page="record-edit"]"#)
            .description("Record edit screen finished rendering")
            .transform(record_show_to_platform, show_to_web)
            .example(
                "document.querySelector('[data-page=\"record-edit\"]').addEventListener('DOMContentLoaded', (e) => {\n  lockFields(e.detail.record);\n});",
                "kintone.events.on('app.record.edit.show', (event) => {\n  lockFields(event.record);\n  return event;\n});",
            ),
        EventMapping::new("app.record.create.submit", "submit")
            .selector(r#"[data-form="record-create"]"#)
            .description("Record create form submitted")
            .transform(submit_to_platform, submit_to_web)
            .example(
                "document.querySelector('[data-form=\"record-create\"]').addEventListener('submit', (e) => {\n  validate(e.detail.record);\n});",
                "kintone.events.on('app.record.create.submit', (event) => {\n  validate(event.record);\n  return event;\n});",
            ),
        EventMapping::new("app.record.edit.submit", "submit")
            .selector(r#"[data-form="record-edit"]"#)
            .description("Record edit form submitted")
            .transform(submit_to_platform, submit_to_web)
            .example(
                "document.querySelector('[data-form=\"record-edit\"]').addEventListener('submit', (e) => {\n  validate(e.detail.record);\n});",
                "kintone.events.on('app.record.edit.submit', (event) => {\n  validate(event.record);\n  return event;\n});",
            ),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE TRANSFORMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Ids arrive as numbers or strings depending on the page; the platform
/// carries them as strings.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn index_show_to_platform(event: &WebEvent) -> PlatformEvent {
    PlatformEvent {
        event_type: "app.record.index.show".to_string(),
        app_id: id_string(event.detail_field("appId")),
        records: Some(
            event
                .detail_field("records")
                .cloned()
                .unwrap_or_else(|| json!([])),
        ),
        ..Default::default()
    }
}

/// Shared by detail/create/edit screens. The platform event name comes from
/// the web event's page marker so one transform can serve all three.
fn record_show_to_platform(event: &WebEvent) -> PlatformEvent {
    let screen = match event.detail_field("page").and_then(Value::as_str) {
        Some("record-create") => "create",
        Some("record-edit") => "edit",
        _ => "detail",
    };
    PlatformEvent {
        event_type: format!("app.record.{}.show", screen),
        app_id: id_string(event.detail_field("appId")),
        record_id: id_string(event.detail_field("recordId")),
        record: event.detail_field("record").cloned(),
        ..Default::default()
    }
}

fn submit_to_platform(event: &WebEvent) -> PlatformEvent {
    let screen = match event.detail_field("form").and_then(Value::as_str) {
        Some("record-edit") => "edit",
        _ => "create",
    };
    PlatformEvent {
        event_type: format!("app.record.{}.submit", screen),
        app_id: id_string(event.detail_field("appId")),
        record_id: id_string(event.detail_field("recordId")),
        record: event.detail_field("record").cloned(),
        ..Default::default()
    }
}

fn platform_detail(event: &PlatformEvent) -> Map<String, Value> {
    let mut detail = Map::new();
    if let Some(records) = &event.records {
        detail.insert("records".to_string(), records.clone());
    }
    if let Some(record) = &event.record {
        detail.insert("record".to_string(), record.clone());
    }
    if let Some(app_id) = &event.app_id {
        detail.insert("appId".to_string(), Value::String(app_id.clone()));
    }
    if let Some(record_id) = &event.record_id {
        detail.insert("recordId".to_string(), Value::String(record_id.clone()));
    }
    detail
}

fn show_to_web(event: &PlatformEvent) -> WebEvent {
    WebEvent::new(PAGELOAD, Value::Object(platform_detail(event)))
}

fn submit_to_web(event: &PlatformEvent) -> WebEvent {
    WebEvent::new(FORMSUBMIT, Value::Object(platform_detail(event)))
}
