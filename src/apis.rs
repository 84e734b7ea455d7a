//! Built-in API mappings: REST-style `fetch` routes onto the kintone REST API.

use serde_json::Value;

use crate::query::parse_query;
use crate::registry::ApiMapping;
use crate::types::{
    ParamValue, PlatformRequest, RequestBody, WebRequest, WebResponse, SPREAD_KEY,
};

const RECORDS_PATH: &str = "/k/v1/records.json";
const RECORD_PATH: &str = "/k/v1/record.json";

pub fn default_api_mappings() -> Vec<ApiMapping> {
    vec![
        ApiMapping::new("records.get", "GET", "/api/records", RECORDS_PATH, records_get)
            .description("Fetch records matching a query")
            .response(records_response)
            .example(
                "const response = await fetch('/api/records?app=1&fields=title,description');",
                "const response = await kintone.api('/k/v1/records.json', 'GET', { app: 1, fields: ['title', 'description'] });",
            ),
        ApiMapping::new("record.get", "GET", "/api/record", RECORD_PATH, record_get)
            .description("Fetch a single record")
            .example(
                "const response = await fetch('/api/record?app=1&id=5');",
                "const response = await kintone.api('/k/v1/record.json', 'GET', { app: 1, id: 5 });",
            ),
        ApiMapping::new("record.post", "POST", "/api/record", RECORD_PATH, record_post)
            .description("Create a record")
            .example(
                "await fetch('/api/record?app=1', { method: 'POST', body: JSON.stringify(record) });",
                "await kintone.api('/k/v1/record.json', 'POST', { app: 1, record: record });",
            ),
        ApiMapping::new("record.put", "PUT", "/api/record", RECORD_PATH, record_put)
            .description("Update a record")
            .example(
                "await fetch('/api/record?app=1&id=5', { method: 'PUT', body: JSON.stringify(changes) });",
                "await kintone.api('/k/v1/record.json', 'PUT', { app: 1, id: 5, record: changes });",
            ),
        ApiMapping::new("record.delete", "DELETE", "/api/record", RECORDS_PATH, record_delete)
            .description("Delete records by id")
            .example(
                "await fetch('/api/record?app=1&ids=123,124', { method: 'DELETE' });",
                "await kintone.api('/k/v1/records.json', 'DELETE', { app: 1, ids: [123, 124] });",
            ),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST TRANSFORMS
// ═══════════════════════════════════════════════════════════════════════════════

fn with_query(path: &str, req: &WebRequest) -> PlatformRequest {
    let mut out = PlatformRequest::new(path, req.method.to_ascii_uppercase());
    for (key, value) in parse_query(&req.url) {
        out.set(key, ParamValue::Json(value));
    }
    out
}

/// Merge a body that is not nested under a key. Known JSON objects are merged
/// field by field; deferred bodies are spread at build time.
fn spread_body(out: &mut PlatformRequest, body: Option<&RequestBody>) {
    match body {
        Some(RequestBody::Json(Value::Object(fields))) => {
            for (key, value) in fields {
                out.set(key.clone(), ParamValue::Json(value.clone()));
            }
        }
        Some(RequestBody::Json(_)) | None => {}
        Some(RequestBody::Deferred) => out.set(SPREAD_KEY, ParamValue::SpreadBody),
    }
}

fn records_get(req: &WebRequest) -> PlatformRequest {
    let mut out = with_query(RECORDS_PATH, req);
    spread_body(&mut out, req.body.as_ref());
    out
}

fn record_get(req: &WebRequest) -> PlatformRequest {
    let mut out = with_query(RECORD_PATH, req);
    spread_body(&mut out, req.body.as_ref());
    out
}

fn record_write(req: &WebRequest) -> PlatformRequest {
    let mut out = with_query(RECORD_PATH, req);
    if let Some(body) = &req.body {
        out.set("record", ParamValue::from(body.clone()));
    }
    out
}

fn record_post(req: &WebRequest) -> PlatformRequest {
    record_write(req)
}

fn record_put(req: &WebRequest) -> PlatformRequest {
    record_write(req)
}

fn record_delete(req: &WebRequest) -> PlatformRequest {
    let mut out = with_query(RECORDS_PATH, req);
    // A single id still goes out as a one-element list.
    if let Some(ParamValue::Json(ids)) = out.param("ids").cloned() {
        let list = match ids {
            Value::Array(items) => items,
            single => vec![single],
        };
        out.set("ids", ParamValue::Json(Value::Array(list)));
    }
    spread_body(&mut out, req.body.as_ref());
    out
}

/// `records.get` answers carry `totalCount` as a string; web callers expect a number.
fn records_response(res: &Value) -> WebResponse {
    let mut body = res.clone();
    if let Some(count) = body.get_mut("totalCount") {
        if let Some(parsed) = count.as_str().and_then(|s| s.parse::<u64>().ok()) {
            *count = Value::from(parsed);
        }
    }
    WebResponse::json(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(name: &str) -> ApiMapping {
        default_api_mappings()
            .into_iter()
            .find(|m| m.platform_api_name == name)
            .unwrap_or_else(|| panic!("missing mapping {}", name))
    }

    #[test]
    fn test_records_get_decomposes_query() {
        let m = mapping("records.get");
        let req = m.transform_request(&WebRequest::new(
            "/api/records?app=1&fields=title,description&totalCount=true",
            "get",
        ));
        assert_eq!(req.path, "/k/v1/records.json");
        assert_eq!(req.method, "GET");
        assert_eq!(req.json_param("app"), Some(&json!(1)));
        assert_eq!(req.json_param("fields"), Some(&json!(["title", "description"])));
        assert_eq!(req.json_param("totalCount"), Some(&json!(true)));
    }

    #[test]
    fn test_record_post_nests_body_under_record() {
        let m = mapping("record.post");
        let req = m.transform_request(
            &WebRequest::new("/api/record?app=3", "POST")
                .with_body(RequestBody::Json(json!({ "title": { "value": "a" } }))),
        );
        assert_eq!(req.path, "/k/v1/record.json");
        assert_eq!(req.json_param("app"), Some(&json!(3)));
        assert_eq!(
            req.json_param("record"),
            Some(&json!({ "title": { "value": "a" } }))
        );
    }

    #[test]
    fn test_deferred_bodies_become_placeholders() {
        let put = mapping("record.put")
            .transform_request(&WebRequest::new("/api/record", "PUT").with_body(RequestBody::Deferred));
        assert_eq!(put.param("record"), Some(&ParamValue::Body));

        let get = mapping("record.get")
            .transform_request(&WebRequest::new("/api/record?id=1", "GET").with_body(RequestBody::Deferred));
        assert_eq!(get.param(SPREAD_KEY), Some(&ParamValue::SpreadBody));
    }

    #[test]
    fn test_delete_targets_records_with_id_list() {
        let m = mapping("record.delete");
        let req = m.transform_request(&WebRequest::new("/api/record?app=1&ids=123,124", "DELETE"));
        assert_eq!(req.path, "/k/v1/records.json");
        assert_eq!(req.json_param("ids"), Some(&json!([123, 124])));

        let single = m.transform_request(&WebRequest::new("/api/record?app=1&ids=9", "DELETE"));
        assert_eq!(single.json_param("ids"), Some(&json!([9])));
    }

    #[test]
    fn test_records_response_normalizes_total_count() {
        let m = mapping("records.get");
        let res = m.transform_response(&json!({ "records": [], "totalCount": "42" }));
        assert_eq!(res.status, 200);
        let body: Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(body["totalCount"], json!(42));
    }
}
