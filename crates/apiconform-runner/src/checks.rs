//! Conformance checks
//!
//! No I/O. Each check is a pure function of the case and its captured
//! response; checks do not see each other's results.

use apiconform_core::{CheckName, CheckResult};
use serde_json::Value;

use crate::datagen::coerce;
use crate::executor::CapturedResponse;
use crate::loader::is_json_media;

/// Validation errors kept per diagnostic.
const MAX_SCHEMA_ERRORS: usize = 5;

/// Body text quoted in "not JSON" diagnostics.
const BODY_EXCERPT_CHARS: usize = 200;

/// Run the given checks in order, one result per check.
#[must_use]
pub fn run_checks(checks: &[CheckName], resp: &CapturedResponse<'_>) -> Vec<CheckResult> {
    checks.iter().map(|c| run_check(*c, resp)).collect()
}

#[must_use]
pub fn run_check(check: CheckName, resp: &CapturedResponse<'_>) -> CheckResult {
    let outcome = match check {
        CheckName::NotAServerError => not_a_server_error(resp),
        CheckName::StatusCodeConformance => status_code_conformance(resp),
        CheckName::ContentTypeConformance => content_type_conformance(resp),
        CheckName::ResponseSchemaConformance => response_schema_conformance(resp),
        CheckName::ResponseHeadersConformance => response_headers_conformance(resp),
    };
    match outcome {
        Ok(()) => CheckResult::pass(check),
        Err(message) => CheckResult::fail(check, message),
    }
}

type Outcome = Result<(), String>;

/// Fails on any 5xx status.
pub fn not_a_server_error(resp: &CapturedResponse<'_>) -> Outcome {
    if resp.status >= 500 {
        return Err(format!(
            "{} on {} {}",
            resp.status,
            resp.case.operation().method,
            resp.case.operation().path
        ));
    }
    Ok(())
}

/// Fails when the status matches no declared code, range or `default`.
pub fn status_code_conformance(resp: &CapturedResponse<'_>) -> Outcome {
    let op = resp.case.operation();
    if op.documents_status(resp.status) {
        return Ok(());
    }
    let declared: Vec<String> = op.declared_statuses().iter().map(ToString::to_string).collect();
    Err(format!(
        "{} not documented (declared: {})",
        resp.status,
        if declared.is_empty() {
            "none".to_string()
        } else {
            declared.join(", ")
        }
    ))
}

/// Fails when the media type is not among those declared for the status.
///
/// - nothing declared → pass
/// - header missing, body empty → pass
/// - header missing, body present → fail
pub fn content_type_conformance(resp: &CapturedResponse<'_>) -> Outcome {
    let Some(spec) = resp.case.operation().response_for(resp.status) else {
        return Ok(());
    };
    if spec.content_types.is_empty() {
        return Ok(());
    }
    let Some(actual) = resp.content_type() else {
        if resp.body.is_empty() {
            return Ok(());
        }
        return Err(format!(
            "missing Content-Type header, expected one of: {}",
            spec.content_types.join(", ")
        ));
    };
    let actual = essence(actual);
    if spec.content_types.iter().any(|t| media_matches(&essence(t), &actual)) {
        Ok(())
    } else {
        Err(format!(
            "got \"{actual}\", expected one of: {}",
            spec.content_types.join(", ")
        ))
    }
}

/// Fails when a JSON body does not validate against the declared schema.
pub fn response_schema_conformance(resp: &CapturedResponse<'_>) -> Outcome {
    let op = resp.case.operation();
    let Some(schema) = op.response_for(resp.status).and_then(|s| s.schema.as_ref()) else {
        return Ok(());
    };
    if op.method.eq_ignore_ascii_case("HEAD") {
        return Ok(());
    }

    let content_type = resp.content_type();
    if content_type.is_some_and(|ct| !is_json_media(ct)) {
        return Ok(());
    }
    if resp.body.trim().is_empty() {
        return Err("empty body, expected a body matching the documented schema".into());
    }

    let body: Value = match serde_json::from_str(&resp.body) {
        Ok(v) => v,
        Err(_) if content_type.is_none() => return Ok(()),
        Err(e) => {
            let excerpt: String = resp.body.chars().take(BODY_EXCERPT_CHARS).collect();
            return Err(format!("body is not valid JSON ({e}): {excerpt}"));
        }
    };

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| format!("documented schema cannot be compiled: {e}"))?;
    let errors: Vec<String> = validator
        .iter_errors(&body)
        .take(MAX_SCHEMA_ERRORS)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Fails when a required header is absent, or a present declared header
/// does not match its schema.
pub fn response_headers_conformance(resp: &CapturedResponse<'_>) -> Outcome {
    let Some(spec) = resp.case.operation().response_for(resp.status) else {
        return Ok(());
    };
    let mut problems = Vec::new();
    for header in &spec.headers {
        match resp.header(&header.name) {
            None if header.required => {
                problems.push(format!("missing required header '{}'", header.name));
            }
            None => {}
            Some(text) => {
                let Some(schema) = &header.schema else {
                    continue;
                };
                let value = coerce(&header.ty, text);
                let valid = jsonschema::validator_for(schema).is_ok_and(|v| v.is_valid(&value));
                if !valid {
                    problems.push(format!(
                        "header '{}' value \"{text}\" does not match its {} schema",
                        header.name,
                        header.ty.name()
                    ));
                }
            }
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

/// Lowercased `type/subtype` without parameters.
fn essence(media: &str) -> String {
    media
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// `declared` may use `type/*` or `*/*`.
fn media_matches(declared: &str, actual: &str) -> bool {
    if declared == actual || declared == "*/*" {
        return true;
    }
    match declared.strip_suffix("/*") {
        Some(kind) => actual.split('/').next() == Some(kind),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use serde_json::json;

    use crate::cases::GeneratedCase;
    use crate::loader::build_schema;

    fn case(method: &str, path: &str) -> GeneratedCase {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "grid", "version": "1"},
            "paths": {
                "/nodes": {
                    "get": {"responses": {
                        "200": {
                            "description": "ok",
                            "headers": {
                                "X-Required": {"required": true, "schema": {"type": "string"}},
                                "X-Count": {"schema": {"type": "integer", "minimum": 0}}
                            },
                            "content": {"application/json": {"schema": {
                                "type": "array",
                                "items": {"type": "object", "properties": {"id": {"type": "integer"}}, "required": ["id"]}
                            }}}
                        },
                        "4XX": {"description": "client", "content": {"text/*": {}}}
                    }},
                    "head": {"responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {"type": "object"}}}}}}
                },
                "/ping": {"get": {"responses": {"default": {"description": "any"}}}}
            }
        });
        let schema = build_schema(&doc).unwrap();
        GeneratedCase::fixture(Arc::clone(schema.get(method, path).unwrap()), vec![])
    }

    fn response<'c>(
        case: &'c GeneratedCase,
        status: u16,
        headers: &[(&str, &str)],
        body: &str,
    ) -> CapturedResponse<'c> {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        CapturedResponse {
            case,
            status,
            headers: map,
            body: body.to_string(),
            elapsed: Duration::from_millis(4),
        }
    }

    const GOOD: &[(&str, &str)] = &[("content-type", "application/json"), ("x-required", "yes")];

    #[test]
    fn conforming_response_passes_everything() {
        let c = case("GET", "/nodes");
        let resp = response(&c, 200, GOOD, r#"[{"id": 1}]"#);
        let results = run_checks(&CheckName::ALL, &resp);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.passed), "{results:?}");
    }

    #[test]
    fn server_error_detected() {
        let c = case("GET", "/nodes");
        assert!(not_a_server_error(&response(&c, 503, &[], "")).is_err());
        assert!(not_a_server_error(&response(&c, 499, &[], "")).is_ok());
    }

    #[test]
    fn undocumented_status_fails() {
        let c = case("GET", "/nodes");
        let err = status_code_conformance(&response(&c, 500, &[], "")).unwrap_err();
        assert_eq!(err, "500 not documented (declared: 200, 4XX)");
        assert!(status_code_conformance(&response(&c, 404, &[], "")).is_ok());
    }

    #[test]
    fn default_documents_every_status() {
        let c = case("GET", "/ping");
        assert!(status_code_conformance(&response(&c, 418, &[], "")).is_ok());
    }

    #[test]
    fn content_type_ignores_parameters_and_case() {
        let c = case("GET", "/nodes");
        let resp = response(&c, 200, &[("content-type", "Application/JSON; charset=utf-8")], "[]");
        assert!(content_type_conformance(&resp).is_ok());
    }

    #[test]
    fn content_type_mismatch_and_wildcards() {
        let c = case("GET", "/nodes");
        let err = content_type_conformance(&response(&c, 200, &[("content-type", "text/html")], "<p>"))
            .unwrap_err();
        assert!(err.contains("text/html"));
        assert!(content_type_conformance(&response(&c, 404, &[("content-type", "text/plain")], "no")).is_ok());
    }

    #[test]
    fn missing_content_type_fails_only_with_body() {
        let c = case("GET", "/nodes");
        assert!(content_type_conformance(&response(&c, 200, &[], "[]")).is_err());
        assert!(content_type_conformance(&response(&c, 200, &[], "")).is_ok());
    }

    #[test]
    fn schema_violation_reported() {
        let c = case("GET", "/nodes");
        let err = response_schema_conformance(&response(&c, 200, GOOD, r#"[{"id": "x"}]"#))
            .unwrap_err();
        assert!(err.contains(r#""x" is not of type "integer""#), "{err}");
    }

    #[test]
    fn schema_invalid_json_with_json_content_type() {
        let c = case("GET", "/nodes");
        let err = response_schema_conformance(&response(&c, 200, GOOD, "<html>")).unwrap_err();
        assert!(err.starts_with("body is not valid JSON"));
    }

    #[test]
    fn schema_empty_body_fails() {
        let c = case("GET", "/nodes");
        assert!(response_schema_conformance(&response(&c, 200, GOOD, "")).is_err());
    }

    #[test]
    fn schema_skipped_for_non_json_and_head() {
        let c = case("GET", "/nodes");
        let text = response(&c, 200, &[("content-type", "text/plain")], "hello");
        assert!(response_schema_conformance(&text).is_ok());

        let head = case("HEAD", "/nodes");
        assert!(response_schema_conformance(&response(&head, 200, GOOD, "")).is_ok());
    }

    #[test]
    fn schema_without_content_type_and_non_json_body_passes() {
        let c = case("GET", "/nodes");
        assert!(response_schema_conformance(&response(&c, 200, &[], "plain")).is_ok());
        assert!(response_schema_conformance(&response(&c, 200, &[], r#"{"id": 1}"#)).is_err());
    }

    #[test]
    fn missing_required_header_fails_alone() {
        let c = case("GET", "/nodes");
        let resp = response(&c, 200, &[("content-type", "application/json")], r#"[{"id": 1}]"#);
        let results = run_checks(&CheckName::ALL, &resp);
        let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].check, CheckName::ResponseHeadersConformance);
        assert_eq!(
            failed[0].message.as_deref(),
            Some("missing required header 'X-Required'")
        );
    }

    #[test]
    fn present_header_validated_against_schema() {
        let c = case("GET", "/nodes");
        let bad = response(&c, 200, &[("x-required", "y"), ("x-count", "-3")], "");
        let err = response_headers_conformance(&bad).unwrap_err();
        assert!(err.contains("X-Count"));
        let good = response(&c, 200, &[("x-required", "y"), ("x-count", "3")], "");
        assert!(response_headers_conformance(&good).is_ok());
    }

    #[test]
    fn media_wildcards() {
        assert!(media_matches("*/*", "image/png"));
        assert!(media_matches("text/*", "text/csv"));
        assert!(!media_matches("text/*", "application/json"));
        assert_eq!(essence(" Text/Plain ; q=1"), "text/plain");
    }
}
