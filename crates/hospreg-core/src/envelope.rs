//! Response-shape normalization.
//!
//! The backend answers either with an envelope `{code, message, data}` or
//! with a bare payload, sometimes nesting the envelope twice (`data.data`)
//! and sometimes using `msg` instead of `message`. Lists arrive as bare
//! arrays or as `{page, pageSize, total, items}` objects, directly or under
//! `data`. Everything in this module is total: an unexpected shape falls back
//! to the raw body instead of failing.
//!
//! Priority orders:
//! - payload: `data` of an envelope (at most two levels deep), else the body.
//! - message: `message`, `msg`, `error`, then the same keys inside `data`.
//! - list: bare array, else `items`, `list`, `records`, `rows`, `content`,
//!   else the same lookup inside `data`.
//! - page fields: `page`/`pageNum`/`current`, `pageSize`/`size`,
//!   `total`/`totalCount`/`count`; absent values fall back to the request.

use serde_json::{Map, Value};

use crate::error::{ApiError, RawResponse};

const MAX_ENVELOPE_DEPTH: usize = 2;
const MESSAGE_KEYS: [&str; 3] = ["message", "msg", "error"];
const LIST_KEYS: [&str; 5] = ["items", "list", "records", "rows", "content"];
const PAGE_KEYS: [&str; 3] = ["page", "pageNum", "current"];
const PAGE_SIZE_KEYS: [&str; 2] = ["pageSize", "size"];
const TOTAL_KEYS: [&str; 3] = ["total", "totalCount", "count"];

fn is_envelope(map: &Map<String, Value>) -> bool {
    map.contains_key("data")
        && (map.contains_key("code")
            || map.contains_key("message")
            || map.contains_key("msg")
            || map.contains_key("success"))
}

/// Strip envelope layers and return the payload.
pub fn unwrap_data(body: Value) -> Value {
    let mut current = body;
    for _ in 0..MAX_ENVELOPE_DEPTH {
        match current {
            Value::Object(mut map) if is_envelope(&map) => {
                current = map.remove("data").unwrap_or(Value::Null);
            }
            other => return other,
        }
    }
    current
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn message_in(map: &Map<String, Value>) -> Option<String> {
    MESSAGE_KEYS
        .iter()
        .find_map(|key| non_empty_str(map.get(*key)))
}

/// Human-readable message carried by a body, if any.
pub fn extract_message(body: &Value) -> Option<String> {
    let map = body.as_object()?;
    message_in(map).or_else(|| map.get("data").and_then(Value::as_object).and_then(message_in))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Business code of an envelope body.
pub fn envelope_code(body: &Value) -> Option<i64> {
    body.as_object()?.get("code").and_then(as_i64)
}

fn code_is_success(code: i64) -> bool {
    code == 0 || (200..300).contains(&code)
}

/// Classify a reply: 2xx with a successful (or absent) envelope code yields
/// the unwrapped payload; anything else becomes a business error whose
/// message comes from the body or `fallback`.
pub fn settle(raw: RawResponse, fallback: &str) -> Result<Value, ApiError> {
    let envelope_failed = envelope_code(&raw.body).is_some_and(|code| !code_is_success(code));
    if !raw.is_success() || envelope_failed {
        let message = extract_message(&raw.body).unwrap_or_else(|| fallback.to_string());
        return Err(ApiError::business(message, raw));
    }
    Ok(unwrap_data(raw.body))
}

/// Requested page coordinates, used as defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

/// Untyped page, ready to be decoded item by item.
#[derive(Debug, Clone, PartialEq)]
pub struct PageParts {
    pub list: Vec<Value>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

fn first_u64(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(as_i64))
        .and_then(|value| u64::try_from(value).ok())
}

fn list_in(map: &Map<String, Value>) -> Option<Vec<Value>> {
    LIST_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_array).cloned())
}

/// Extract a list from any of the tolerated shapes.
pub fn unwrap_list(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(map) => list_in(&map)
            .or_else(|| match map.get("data") {
                Some(Value::Array(items)) => Some(items.clone()),
                Some(Value::Object(inner)) => list_in(inner),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Normalize a paged payload. Missing `page`/`pageSize` fall back to the
/// request, a missing `total` to the list length.
pub fn normalize_page(payload: Value, requested: PageRequest) -> PageParts {
    let meta = match &payload {
        Value::Object(map) if list_in(map).is_none() => match map.get("data") {
            Some(Value::Object(inner)) => Some(inner.clone()),
            _ => Some(map.clone()),
        },
        Value::Object(map) => Some(map.clone()),
        _ => None,
    };
    let list = unwrap_list(payload);

    let (page, page_size, total) = match meta {
        Some(map) => (
            first_u64(&map, &PAGE_KEYS).and_then(|v| u32::try_from(v).ok()),
            first_u64(&map, &PAGE_SIZE_KEYS).and_then(|v| u32::try_from(v).ok()),
            first_u64(&map, &TOTAL_KEYS),
        ),
        None => (None, None, None),
    };

    PageParts {
        page: page.unwrap_or(requested.page),
        page_size: page_size.unwrap_or(requested.page_size),
        total: total.unwrap_or(list.len() as u64),
        list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(status: u16, body: Value) -> RawResponse {
        RawResponse { status, body }
    }

    #[test]
    fn unwrap_standard_envelope() {
        let body = json!({"code": 200, "message": "登录成功", "data": "mock-token-testuser"});
        assert_eq!(unwrap_data(body), json!("mock-token-testuser"));
    }

    #[test]
    fn unwrap_double_envelope() {
        let body = json!({"code": 200, "data": {"code": 200, "msg": "ok", "data": {"id": 1}}});
        assert_eq!(unwrap_data(body), json!({"id": 1}));
    }

    #[test]
    fn bare_payload_is_returned_as_is() {
        let body = json!({"page": 1, "pageSize": 10, "total": 0, "items": []});
        assert_eq!(unwrap_data(body.clone()), body);
        assert_eq!(unwrap_data(json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_data(json!("plain text")), json!("plain text"));
    }

    #[test]
    fn object_with_data_but_no_envelope_markers_is_kept() {
        let body = json!({"data": [1], "name": "report"});
        assert_eq!(unwrap_data(body.clone()), body);
    }

    #[test]
    fn message_priority() {
        assert_eq!(
            extract_message(&json!({"message": "m", "msg": "x"})).as_deref(),
            Some("m")
        );
        assert_eq!(
            extract_message(&json!({"message": "  ", "msg": "x"})).as_deref(),
            Some("x")
        );
        assert_eq!(
            extract_message(&json!({"code": 500, "data": {"msg": "nested"}})).as_deref(),
            Some("nested")
        );
        assert_eq!(extract_message(&json!("oops")), None);
        assert_eq!(extract_message(&json!({"code": 500})), None);
    }

    #[test]
    fn settle_success_unwraps() {
        let value = settle(raw(200, json!({"code": 200, "data": {"a": 1}})), "fallback").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn settle_http_failure_uses_backend_message() {
        let err = settle(
            raw(404, json!({"code": 404, "message": "未找到候补记录"})),
            "fallback",
        )
        .unwrap_err();
        assert_eq!(err.message(), "未找到候补记录");
        assert_eq!(err.response().map(|r| r.status), Some(404));
    }

    #[test]
    fn settle_http_failure_without_message_uses_fallback() {
        let err = settle(raw(500, Value::Null), "Request failed").unwrap_err();
        assert_eq!(err.message(), "Request failed");
    }

    #[test]
    fn settle_envelope_code_failure_on_http_200() {
        let err = settle(raw(200, json!({"code": 409, "msg": "已存在挂号", "data": null})), "x")
            .unwrap_err();
        assert_eq!(err.message(), "已存在挂号");
    }

    #[test]
    fn settle_accepts_zero_and_created_codes() {
        assert!(settle(raw(200, json!({"code": 0, "data": 1})), "x").is_ok());
        assert!(settle(raw(201, json!({"code": 201, "message": "created"})), "x").is_ok());
    }

    #[test]
    fn page_from_bare_page_object() {
        let parts = normalize_page(
            json!({"page": 1, "pageSize": 10, "total": 1, "items": [{"id": "R1"}]}),
            PageRequest { page: 3, page_size: 20 },
        );
        assert_eq!(parts.list, vec![json!({"id": "R1"})]);
        assert_eq!((parts.page, parts.page_size, parts.total), (1, 10, 1));
    }

    #[test]
    fn page_nested_under_data_with_string_numbers() {
        let parts = normalize_page(
            json!({"data": {"pageNum": "2", "size": "5", "totalCount": 12, "records": [1, 2]}}),
            PageRequest::default(),
        );
        assert_eq!(parts.list.len(), 2);
        assert_eq!((parts.page, parts.page_size, parts.total), (2, 5, 12));
    }

    #[test]
    fn page_from_bare_array_uses_request_and_length() {
        let parts = normalize_page(json!([1, 2, 3]), PageRequest { page: 2, page_size: 3 });
        assert_eq!((parts.page, parts.page_size, parts.total), (2, 3, 3));
    }

    #[test]
    fn page_from_unexpected_shape_is_empty() {
        let parts = normalize_page(json!("nothing"), PageRequest::default());
        assert!(parts.list.is_empty());
        assert_eq!(parts.total, 0);
    }

    #[test]
    fn unwrap_list_shapes() {
        assert_eq!(unwrap_list(json!({"list": [1]})), vec![json!(1)]);
        assert_eq!(unwrap_list(json!({"data": [1, 2]})).len(), 2);
        assert_eq!(unwrap_list(json!({"data": {"rows": [1]}})).len(), 1);
        assert!(unwrap_list(json!({"other": 1})).is_empty());
    }
}
