//! URL decomposition for fetch-style calls.
//!
//! Static URLs are split into a path and a typed parameter map. Values are
//! coerced the way the platform API expects them: integers and booleans are
//! unquoted, comma lists become arrays.

use serde_json::{Map, Number, Value};

/// Path component of a URL. Scheme and authority are dropped, as are the
/// query string and fragment.
pub fn url_path(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);

    match url_origin(without_query) {
        Some(origin) => match &without_query[origin.len()..] {
            "" => "/",
            path => path,
        },
        None => without_query,
    }
}

/// `scheme://authority` of an absolute URL, or `//authority` of a
/// protocol-relative one. Relative URLs have no origin.
pub fn url_origin(url: &str) -> Option<&str> {
    let head = &url[..url.find(['?', '#']).unwrap_or(url.len())];
    let authority_start = if head.starts_with("//") {
        2
    } else {
        let scheme_end = head.find("://")?;
        let scheme = &head[..scheme_end];
        let valid = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return None;
        }
        scheme_end + 3
    };
    let authority_end = head[authority_start..]
        .find('/')
        .map_or(head.len(), |i| authority_start + i);
    Some(&head[..authority_end])
}

/// Raw query string of a URL (without `?`), if any.
pub fn query_string(url: &str) -> Option<&str> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    without_fragment
        .split_once('?')
        .map(|(_, query)| query)
        .filter(|query| !query.is_empty())
}

/// Decode `application/x-www-form-urlencoded` text. Malformed escapes are kept
/// verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Coerce a single decoded query value.
pub fn coerce_scalar(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        // Leading zeros are identifiers (e.g. zip codes), not numbers.
        if !(raw.len() > 1 && raw.starts_with('0')) && !raw.starts_with('+') {
            return Value::Number(Number::from(int));
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Parse the query string of `url` into an ordered list of typed parameters.
/// Repeated keys keep their last value.
pub fn parse_query(url: &str) -> Vec<(String, Value)> {
    let mut params: Vec<(String, Value)> = Vec::new();
    let Some(query) = query_string(url) else {
        return params;
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(raw_key);
        // Split lists before decoding so an encoded comma stays inside its element.
        let value = if raw_value.contains(',') {
            Value::Array(
                raw_value
                    .split(',')
                    .map(|part| coerce_scalar(percent_decode(part).trim()))
                    .collect(),
            )
        } else {
            coerce_scalar(&percent_decode(raw_value))
        };

        if let Some(slot) = params.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            params.push((key, value));
        }
    }
    params
}

/// Query parameters as a JSON object, for callers that want map access.
pub fn query_object(url: &str) -> Map<String, Value> {
    parse_query(url).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_path_variants() {
        assert_eq!(url_path("/api/records?app=1"), "/api/records");
        assert_eq!(url_path("https://example.com/api/record?id=1#top"), "/api/record");
        assert_eq!(url_path("https://example.com"), "/");
        assert_eq!(url_path("/records"), "/records");
        assert_eq!(url_path("//cdn.example.com/api/records"), "/api/records");
        assert_eq!(url_path("/redirect?to=https://x.example/y"), "/redirect");
    }

    #[test]
    fn test_url_origin() {
        assert_eq!(url_origin("https://example.com/api?x=1"), Some("https://example.com"));
        assert_eq!(url_origin("http://localhost:8080"), Some("http://localhost:8080"));
        assert_eq!(url_origin("//cdn.example.com/a"), Some("//cdn.example.com"));
        assert_eq!(url_origin("/api/records"), None);
        assert_eq!(url_origin("/redirect?to=https://x.example/y"), None);
        assert_eq!(url_origin("api/x://y"), None);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(
            percent_decode("created_time%20%3E%20%222023-01-01%22"),
            "created_time > \"2023-01-01\""
        );
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn test_parse_query_coerces_types() {
        let params = query_object(
            "https://example.com/api/records?app=1&query=created_time%20%3E%20%222023-01-01%22&fields=title,description&totalCount=true",
        );
        assert_eq!(params["app"], json!(1));
        assert_eq!(params["query"], json!("created_time > \"2023-01-01\""));
        assert_eq!(params["fields"], json!(["title", "description"]));
        assert_eq!(params["totalCount"], json!(true));
    }

    #[test]
    fn test_parse_query_integer_lists() {
        let params = query_object("/api/record?app=1&ids=123,124,125");
        assert_eq!(params["ids"], json!([123, 124, 125]));
    }

    #[test]
    fn test_leading_zero_stays_string() {
        assert_eq!(coerce_scalar("007"), json!("007"));
        assert_eq!(coerce_scalar("0"), json!(0));
        assert_eq!(coerce_scalar("-5"), json!(-5));
    }

    #[test]
    fn test_parse_query_preserves_order_and_last_wins() {
        let params = parse_query("/x?b=1&a=2&b=3");
        assert_eq!(
            params,
            vec![("b".to_string(), json!(3)), ("a".to_string(), json!(2))]
        );
    }

    #[test]
    fn test_no_query() {
        assert!(parse_query("/api/records").is_empty());
        assert!(parse_query("/api/records?").is_empty());
    }
}
