//! HTTP plumbing shared by every domain operation.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::EnvironmentResolver;
use crate::envelope::extract_message;
use crate::error::{ApiError, ApiErrorKind, NETWORK_ERROR_MESSAGE, RawResponse, UNAUTHORIZED_MESSAGE};
use crate::events::{ClientEvent, EventBus, NoticeStyle};
use crate::session::SessionStore;

const USER_AGENT: &str = concat!("hospreg/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Where a DELETE payload goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteEncoding {
    /// Object payloads become the query string; other payloads still go in the body.
    #[default]
    Query,
    Body,
}

/// One outgoing call. Built per request and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: HttpMethod,
    pub payload: Value,
    pub headers: Vec<(String, String)>,
    pub delete_encoding: DeleteEncoding,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            payload: Value::Null,
            headers: Vec::new(),
            delete_encoding: DeleteEncoding::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send a DELETE payload as the request body.
    pub fn as_body(mut self) -> Self {
        self.delete_encoding = DeleteEncoding::Body;
        self
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Percent-encode an object as a query string. Arrays expand to repeated
/// keys, `null` and `""` are dropped, nested structures are JSON-serialized.
pub fn encode_query(params: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    let mut push = |key: &str, value: &Value| {
        if let Some(text) = query_value(value) {
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&text)
            ));
        }
    };
    for (key, value) in params {
        match value {
            Value::Array(items) => items.iter().for_each(|item| push(key, item)),
            other => push(key, other),
        }
    }
    pairs.join("&")
}

fn append_query(mut url: String, params: &Map<String, Value>) -> String {
    let query = encode_query(params);
    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    url
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Request client. Holds the session and environment explicitly so several
/// independent clients can coexist in one process.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    environment: Arc<EnvironmentResolver>,
    session: Arc<SessionStore>,
    events: EventBus,
}

impl ApiClient {
    pub fn new(
        environment: Arc<EnvironmentResolver>,
        session: Arc<SessionStore>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ApiErrorKind::Client(err.to_string()))?;
        Ok(Self::with_http_client(http, environment, session))
    }

    pub fn with_http_client(
        http: Client,
        environment: Arc<EnvironmentResolver>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            http,
            environment,
            session,
            events: EventBus::new(),
        }
    }

    pub fn environment(&self) -> &EnvironmentResolver {
        &self.environment
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Absolute URLs pass through; paths are joined to the current base URL.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.environment.base_url();
        let base = base.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Send one request. Fails with `Network` on transport errors (after a
    /// notification) and with `Unauthorized` on HTTP 401 (after dropping the
    /// token and announcing the expired session). Every other status is
    /// returned for the caller to classify.
    pub async fn request(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let ApiRequest {
            path,
            method,
            payload,
            headers,
            delete_encoding,
        } = request;

        let url = self.resolve_url(&path);
        let (url, body) = match (method, payload) {
            (HttpMethod::Get, Value::Object(params)) => (append_query(url, &params), None),
            (HttpMethod::Get, _) => (url, None),
            (HttpMethod::Post | HttpMethod::Put, Value::Null) => {
                (url, Some(Value::Object(Map::new())))
            }
            (HttpMethod::Post | HttpMethod::Put, payload) => (url, Some(payload)),
            (HttpMethod::Delete, Value::Object(params))
                if delete_encoding == DeleteEncoding::Query =>
            {
                (append_query(url, &params), None)
            }
            (HttpMethod::Delete, Value::Null) => (url, None),
            (HttpMethod::Delete, payload) => (url, Some(payload)),
        };

        let mut builder = self.http.request(method.as_reqwest(), &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        debug!(method = ?method, url = %url, "Sending request");
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return Err(self.transport_failure(&url, err)),
        };
        let status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.transport_failure(&url, err)),
        };
        let raw = RawResponse {
            status,
            body: decode_body(&bytes),
        };
        debug!(method = ?method, url = %url, status, "Received response");

        if status == 401 {
            self.session.invalidate_token();
            self.events.emit(ClientEvent::SessionExpired {
                login_route: self.environment.settings().login_route.clone(),
            });
            let message =
                extract_message(&raw.body).unwrap_or_else(|| UNAUTHORIZED_MESSAGE.to_string());
            warn!(url = %url, "Session rejected by backend");
            return Err(ApiError::unauthorized(message, raw));
        }

        Ok(raw)
    }

    fn transport_failure(&self, url: &str, err: reqwest::Error) -> ApiError {
        warn!(url = %url, error = %err, "Request failed before a response arrived");
        self.events.notify(NETWORK_ERROR_MESSAGE, NoticeStyle::Neutral);
        ApiError::network(err).silenced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn query_skips_empty_values_and_expands_arrays() {
        let query = encode_query(&object(json!({
            "waitingId": "WAIT123",
            "patientId": "PAT 0001",
            "empty": "",
            "missing": null,
            "ids": ["a", "", "b&c"],
            "page": 2,
            "flag": true
        })));
        assert_eq!(
            query,
            "waitingId=WAIT123&patientId=PAT%200001&ids=a&ids=b%26c&page=2&flag=true"
        );
    }

    #[test]
    fn query_serializes_nested_structures() {
        let query = encode_query(&object(json!({"filter": {"status": "已预约"}})));
        assert_eq!(
            query,
            format!(
                "filter={}",
                urlencoding::encode(r#"{"status":"已预约"}"#)
            )
        );
    }

    #[test]
    fn query_percent_encodes_keys_and_unicode() {
        let query = encode_query(&object(json!({"状 态": "已取消"})));
        assert_eq!(query, "%E7%8A%B6%20%E6%80%81=%E5%B7%B2%E5%8F%96%E6%B6%88");
    }

    #[test]
    fn append_query_respects_existing_query() {
        let params = object(json!({"b": "2"}));
        assert_eq!(append_query("http://h/p?a=1".to_string(), &params), "http://h/p?a=1&b=2");
        assert_eq!(append_query("http://h/p".to_string(), &params), "http://h/p?b=2");
        assert_eq!(
            append_query("http://h/p".to_string(), &Map::new()),
            "http://h/p"
        );
    }

    #[test]
    fn decode_body_falls_back_to_text() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(b"  \n"), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn request_builder_defaults() {
        let request = ApiRequest::delete("/api/registrations/waiting");
        assert_eq!(request.delete_encoding, DeleteEncoding::Query);
        assert_eq!(request.as_body().delete_encoding, DeleteEncoding::Body);
    }
}
