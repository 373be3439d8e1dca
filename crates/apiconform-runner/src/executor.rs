//! Request execution: one blocking HTTP call per generated case

use std::collections::{BTreeMap, HashMap};
use std::error::Error as _;
use std::time::{Duration, Instant};

use apiconform_core::{RequestSnapshot, ResponseSnapshot};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::cases::GeneratedCase;
use crate::datagen::value_to_param_string;
use crate::model::{CollectionFormat, ParamLocation};

/// Response bodies kept in reports are cut at this size.
const MAX_BODY_BYTES: usize = 4096;

/// Network-level failure of a single case. Never a conformance failure.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ExecutionError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(e: reqwest::Error) -> Self {
        let message = error_chain(&e);
        if e.is_timeout() {
            Self::Timeout(message)
        } else if e.is_connect() {
            Self::Connection(message)
        } else if e.is_builder() {
            Self::InvalidRequest(message)
        } else {
            Self::Transport(message)
        }
    }
}

/// "outer: inner: root" with adjacent duplicates removed.
fn error_chain(e: &reqwest::Error) -> String {
    let mut parts = vec![e.to_string()];
    let mut source = e.source();
    while let Some(s) = source {
        let text = s.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = s.source();
    }
    parts.join(": ")
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A fully built request, ready to send.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: reqwest::Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl PreparedRequest {
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        let body = match &self.body {
            RequestBody::None => None,
            RequestBody::Json(v) => Some(v.to_string()),
            RequestBody::Form(pairs) => {
                let mut encoded = self.url.clone();
                encoded.set_query(None);
                encoded.query_pairs_mut().extend_pairs(pairs);
                encoded.query().map(String::from)
            }
        };
        RequestSnapshot {
            method: self.method.to_string(),
            url: self.url.to_string(),
            headers: header_strings(&self.headers),
            body,
        }
    }
}

/// A response with its case. Borrows the case; does not own it.
#[derive(Debug)]
pub struct CapturedResponse<'c> {
    pub case: &'c GeneratedCase,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub elapsed: Duration,
}

impl CapturedResponse<'_> {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    #[must_use]
    pub fn snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            status_code: self.status,
            headers: header_strings(&self.headers),
            body: truncate_body(&self.body),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Sends generated cases to one base URL.
#[derive(Debug, Clone)]
pub struct Executor {
    client: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl Executor {
    /// Build a client for `base_url` with static headers sent on every
    /// request. Headers that are not valid HTTP are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidRequest`] for an unparseable base URL
    /// and [`ExecutionError`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ExecutionError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ExecutionError::InvalidRequest(format!("base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ExecutionError::InvalidRequest(format!(
                "base URL '{base_url}' cannot have a path"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;

        let mut static_headers = HeaderMap::new();
        let mut names: Vec<_> = headers.iter().collect();
        names.sort();
        for (k, v) in names {
            insert_header(&mut static_headers, k, v);
        }

        Ok(Self {
            client,
            base_url,
            headers: static_headers,
        })
    }

    /// Build the request for a case without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidRequest`] if the method is not a
    /// valid HTTP method.
    pub fn prepare(&self, case: &GeneratedCase) -> Result<PreparedRequest, ExecutionError> {
        let op = case.operation();
        let method = reqwest::Method::from_bytes(op.method.as_bytes())
            .map_err(|_| ExecutionError::InvalidRequest(format!("invalid HTTP method '{}'", op.method)))?;

        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ExecutionError::InvalidRequest(format!("base URL '{}' cannot have a path", self.base_url))
            })?;
            segments.pop_if_empty();
            for segment in op.path.split('/').filter(|s| !s.is_empty()) {
                segments.push(&substitute(segment, case));
            }
        }

        let mut query: Vec<(String, String)> = Vec::new();
        let mut form: Vec<(String, String)> = Vec::new();
        let mut json = None;
        let mut headers = self.headers.clone();

        for param in &op.parameters {
            let Some(value) = case.value(&param.name, param.location) else {
                continue;
            };
            match param.location {
                ParamLocation::Path => {}
                ParamLocation::Query => push_pairs(&mut query, &param.name, value, param.style),
                ParamLocation::FormData => push_pairs(&mut form, &param.name, value, param.style),
                ParamLocation::Header => {
                    insert_header(&mut headers, &param.name, &render(value, param.style));
                }
                ParamLocation::Body => json = Some(value.clone()),
            }
        }

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(&query);
        }

        let body = match (json, form.is_empty()) {
            (Some(v), _) => RequestBody::Json(v),
            (None, false) => RequestBody::Form(form),
            (None, true) => RequestBody::None,
        };

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Send a prepared request and capture the response.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] on timeout, connection failure or any
    /// other transport failure, including failure to read the body.
    pub fn send<'c>(
        &self,
        case: &'c GeneratedCase,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> Result<CapturedResponse<'c>, ExecutionError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(timeout);
        builder = match &request.body {
            RequestBody::None => builder,
            RequestBody::Json(v) => builder.json(v),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        let start = Instant::now();
        let resp = builder.send()?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text()?;
        let elapsed = start.elapsed();

        debug!(
            case = case.id(),
            method = %request.method,
            url = %request.url,
            status,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "response received"
        );

        Ok(CapturedResponse {
            case,
            status,
            headers,
            body,
            elapsed,
        })
    }

    /// Prepare and send in one step.
    ///
    /// # Errors
    ///
    /// See [`Executor::prepare`] and [`Executor::send`].
    pub fn execute<'c>(
        &self,
        case: &'c GeneratedCase,
        timeout: Duration,
    ) -> Result<CapturedResponse<'c>, ExecutionError> {
        let request = self.prepare(case)?;
        self.send(case, &request, timeout)
    }
}

/// Replace `{name}` placeholders in one path segment.
fn substitute(segment: &str, case: &GeneratedCase) -> String {
    let mut out = segment.to_string();
    for param in case.operation().parameters_in(ParamLocation::Path) {
        let placeholder = format!("{{{}}}", param.name);
        if out.contains(&placeholder) {
            let text = case
                .value(&param.name, ParamLocation::Path)
                .map(|v| render(v, param.style))
                .unwrap_or_default();
            out = out.replace(&placeholder, &text);
        }
    }
    out
}

/// Scalar text for a value; arrays joined by the collection separator.
fn render(value: &Value, style: CollectionFormat) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_to_param_string)
            .collect::<Vec<_>>()
            .join(style.separator()),
        other => value_to_param_string(other),
    }
}

fn push_pairs(out: &mut Vec<(String, String)>, name: &str, value: &Value, style: CollectionFormat) {
    match (value, style) {
        (Value::Array(items), CollectionFormat::Multi) => {
            out.extend(items.iter().map(|v| (name.to_string(), value_to_param_string(v))));
        }
        _ => out.push((name.to_string(), render(value, style))),
    }
}

/// Insert a header, skipping names or values that are not valid HTTP.
fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(n), Ok(v)) => {
            headers.insert(n, v);
        }
        _ => debug!(header = name, "skipping header that is not valid HTTP"),
    }
}

fn header_strings(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&text);
            })
            .or_insert(text);
    }
    out
}

fn truncate_body(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if body.len() <= MAX_BODY_BYTES {
        return Some(body.to_string());
    }
    let mut end = MAX_BODY_BYTES;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    Some(format!("{}…({} bytes total)", &body[..end], body.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use httpmock::prelude::*;
    use serde_json::json;

    use crate::cases::ParamValue;
    use crate::loader::build_schema;
    use crate::model::Operation;

    fn operation(doc: &Value, method: &str, path: &str) -> Arc<Operation> {
        let schema = build_schema(doc).unwrap();
        Arc::clone(schema.get(method, path).unwrap())
    }

    fn doc() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "grid", "version": "1"},
            "paths": {
                "/farms/{farm_id}/nodes": {
                    "get": {
                        "parameters": [
                            {"name": "farm_id", "in": "path", "required": true, "type": "string"},
                            {"name": "status", "in": "query", "type": "array", "items": {"type": "string"}, "collectionFormat": "multi"},
                            {"name": "ids", "in": "query", "type": "array", "items": {"type": "integer"}},
                            {"name": "X-Trace", "in": "header", "type": "string"}
                        ],
                        "responses": {"200": {"description": "ok"}}
                    }
                },
                "/farms": {
                    "post": {
                        "parameters": [{"name": "farm", "in": "body", "schema": {"type": "object"}}],
                        "responses": {"201": {"description": "created"}}
                    }
                }
            }
        })
    }

    fn value(name: &str, location: ParamLocation, value: Value) -> ParamValue {
        ParamValue {
            name: name.into(),
            location,
            value,
        }
    }

    fn executor(base: &str, headers: &[(&str, &str)]) -> Executor {
        let headers = headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Executor::new(base, &headers, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn prepare_substitutes_and_encodes_path() {
        let case = GeneratedCase::fixture(
            operation(&doc(), "GET", "/farms/{farm_id}/nodes"),
            vec![value("farm_id", ParamLocation::Path, json!("a b/c"))],
        );
        let req = executor("http://localhost:8080/api/", &[]).prepare(&case).unwrap();
        assert_eq!(req.url.as_str(), "http://localhost:8080/api/farms/a%20b%2Fc/nodes");
        assert_eq!(req.body, RequestBody::None);
    }

    #[test]
    fn prepare_serializes_query_styles() {
        let case = GeneratedCase::fixture(
            operation(&doc(), "GET", "/farms/{farm_id}/nodes"),
            vec![
                value("farm_id", ParamLocation::Path, json!("1")),
                value("status", ParamLocation::Query, json!(["up", "down"])),
                value("ids", ParamLocation::Query, json!([1, 2])),
            ],
        );
        let req = executor("http://localhost:8080", &[]).prepare(&case).unwrap();
        assert_eq!(req.url.query(), Some("status=up&status=down&ids=1%2C2"));
    }

    #[test]
    fn prepare_merges_headers_and_skips_invalid() {
        let case = GeneratedCase::fixture(
            operation(&doc(), "GET", "/farms/{farm_id}/nodes"),
            vec![
                value("farm_id", ParamLocation::Path, json!("1")),
                value("X-Trace", ParamLocation::Header, json!("bad\r\nvalue")),
            ],
        );
        let req = executor("http://localhost:8080", &[("X-API-Key", "k-1"), ("bad header", "x")])
            .prepare(&case)
            .unwrap();
        assert_eq!(req.headers.get("x-api-key").unwrap(), "k-1");
        assert!(req.headers.get("x-trace").is_none());
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn body_snapshot_is_json() {
        let case = GeneratedCase::fixture(
            operation(&doc(), "POST", "/farms"),
            vec![value("farm", ParamLocation::Body, json!({"name": "f1"}))],
        );
        let req = executor("http://localhost:8080", &[]).prepare(&case).unwrap();
        let snap = req.snapshot();
        assert_eq!(snap.method, "POST");
        assert_eq!(snap.url, "http://localhost:8080/farms");
        assert_eq!(snap.body.as_deref(), Some(r#"{"name":"f1"}"#));
    }

    #[test]
    fn invalid_base_url_rejected() {
        let err = Executor::new("not a url", &HashMap::new(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidRequest(_)));
    }

    #[test]
    fn send_captures_status_headers_and_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/farms")
                .header("x-api-key", "k-1")
                .json_body(json!({"name": "f1"}));
            then.status(201)
                .header("content-type", "application/json")
                .header("x-request-id", "r-9")
                .body(r#"{"id":7}"#);
        });

        let case = GeneratedCase::fixture(
            operation(&doc(), "POST", "/farms"),
            vec![value("farm", ParamLocation::Body, json!({"name": "f1"}))],
        );
        let exec = executor(&server.url(""), &[("X-API-Key", "k-1")]);
        let resp = exec.execute(&case, Duration::from_secs(5)).unwrap();

        mock.assert();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.content_type(), Some("application/json"));
        assert_eq!(resp.header("X-Request-Id"), Some("r-9"));
        assert_eq!(resp.body, r#"{"id":7}"#);
        assert_eq!(resp.case.id(), case.id());

        let snap = resp.snapshot();
        assert_eq!(snap.status_code, 201);
        assert_eq!(snap.headers.get("x-request-id").map(String::as_str), Some("r-9"));
    }

    #[test]
    fn refused_connection_is_execution_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let case = GeneratedCase::fixture(operation(&doc(), "POST", "/farms"), vec![]);
        let exec = executor(&format!("http://127.0.0.1:{port}"), &[]);
        let err = exec.execute(&case, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Connection(_) | ExecutionError::Transport(_)
        ));
    }

    #[test]
    fn long_bodies_truncated_on_char_boundary() {
        let body = "é".repeat(MAX_BODY_BYTES);
        let cut = truncate_body(&body).unwrap();
        assert!(cut.ends_with(&format!("({} bytes total)", body.len())));
        assert!(truncate_body("").is_none());
        assert_eq!(truncate_body("ok").as_deref(), Some("ok"));
    }
}
