//! Schema loading: fetch, parse, validate and build the [`Schema`] model
//!
//! Accepts OpenAPI 3.x and Swagger 2.0 documents in JSON or YAML. Local
//! `$ref`s are inlined; anything the model cannot represent is rejected
//! with [`SchemaParseError`] before a single request is sent.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use apiconform_core::SchemaSource;
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{
    CollectionFormat, Dialect, Operation, ParamLocation, Parameter, ResponseHeader, ResponseSpec,
    Schema, StatusKey,
};
use crate::types::{ParamType, TypeKind};

/// Depth at which circular `$ref` chains are cut.
const MAX_REF_DEPTH: u32 = 20;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Keywords copied from a Swagger 2.0 non-body parameter or header into a
/// standalone JSON Schema.
const INLINE_SCHEMA_KEYS: [&str; 17] = [
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "multipleOf",
    "x-nullable",
];

/// The schema document could not be obtained.
#[derive(Debug, thiserror::Error)]
#[error("cannot fetch schema from {location}: {reason}")]
pub struct SchemaFetchError {
    pub location: String,
    pub reason: String,
}

/// The schema document is malformed or outside the supported grammar.
#[derive(Debug, thiserror::Error)]
#[error("invalid schema {location}: {reason}")]
pub struct SchemaParseError {
    pub location: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] SchemaFetchError),
    #[error(transparent)]
    Parse(#[from] SchemaParseError),
}

/// Fetch and parse a schema. No retries.
///
/// # Errors
///
/// [`LoadError::Fetch`] when the file or URL cannot be read,
/// [`LoadError::Parse`] when the document is invalid.
pub fn load(source: &SchemaSource, timeout: Duration) -> Result<Schema, LoadError> {
    let content = fetch(source, timeout)?;
    let schema = parse(&content, source)?;
    debug!(
        location = %source,
        dialect = %schema.dialect,
        operations = schema.len(),
        "schema loaded"
    );
    Ok(schema)
}

/// Read the raw document text.
///
/// # Errors
///
/// Returns [`SchemaFetchError`] on I/O failure, network failure or a
/// non-success HTTP status.
pub fn fetch(source: &SchemaSource, timeout: Duration) -> Result<String, SchemaFetchError> {
    let fail = |reason: String| SchemaFetchError {
        location: source.to_string(),
        reason,
    };
    match source {
        SchemaSource::File(path) => std::fs::read_to_string(path).map_err(|e| fail(e.to_string())),
        SchemaSource::Url(url) => {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| fail(e.to_string()))?;
            let resp = client.get(url).send().map_err(|e| fail(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(fail(format!("HTTP {status}")));
            }
            resp.text().map_err(|e| fail(e.to_string()))
        }
    }
}

/// Parse document text into the model.
///
/// # Errors
///
/// Returns [`SchemaParseError`] if the text is neither JSON nor YAML or the
/// document violates the grammar.
pub fn parse(content: &str, source: &SchemaSource) -> Result<Schema, SchemaParseError> {
    let fail = |reason: String| SchemaParseError {
        location: source.to_string(),
        reason,
    };
    let doc = parse_document(content, source.extension().as_deref()).map_err(fail)?;
    build_schema(&doc).map_err(fail)
}

/// Parse JSON or YAML.
///
/// Detection strategy: extension first (`.yaml`/`.yml`/`.json`), then
/// content sniffing (leading `{` → JSON, otherwise YAML).
///
/// # Errors
///
/// Returns a message naming the format that failed.
pub fn parse_document(content: &str, extension: Option<&str>) -> Result<Value, String> {
    let as_json = |c: &str| serde_json::from_str::<Value>(c).map_err(|e| format!("Invalid JSON: {e}"));
    let as_yaml = |c: &str| serde_yml::from_str::<Value>(c).map_err(|e| format!("Invalid YAML: {e}"));
    match extension {
        Some("yaml" | "yml") => as_yaml(content),
        Some("json") => as_json(content),
        _ if content.trim_start().starts_with('{') => as_json(content),
        _ => as_yaml(content),
    }
}

/// Validate a parsed document and build the model.
///
/// # Errors
///
/// Returns a message locating the first grammar violation.
pub fn build_schema(doc: &Value) -> Result<Schema, String> {
    let root = doc
        .as_object()
        .ok_or("document root must be an object")?;

    let dialect = if let Some(v) = root.get("swagger") {
        match v.as_str() {
            Some("2.0") => Dialect::Swagger2,
            _ => return Err(format!("unsupported swagger version {v}")),
        }
    } else if let Some(v) = root.get("openapi") {
        match v.as_str() {
            Some(s) if s.starts_with("3.") => Dialect::OpenApi3,
            _ => return Err(format!("unsupported openapi version {v}")),
        }
    } else {
        return Err("missing 'openapi' or 'swagger' version field".into());
    };

    let paths = root
        .get("paths")
        .ok_or("missing 'paths'")?
        .as_object()
        .ok_or("'paths' must be an object")?;

    let info = root.get("info");
    let text = |key: &str| {
        info.and_then(|i| i.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let reader = Reader { doc, dialect };
    let mut operations = Vec::new();
    for (path, item) in paths {
        if !path.starts_with('/') {
            return Err(format!("path '{path}' must start with '/'"));
        }
        let item = reader.deref(item, &format!("path {path}"))?;
        let item = item
            .as_object()
            .ok_or_else(|| format!("path item {path} must be an object"))?;

        let shared = reader.parameters(item.get("parameters"), path)?;
        for method in METHODS {
            let Some(op) = item.get(method) else {
                continue;
            };
            let label = format!("{} {path}", method.to_uppercase());
            let op = op
                .as_object()
                .ok_or_else(|| format!("{label} must be an object"))?;
            operations.push(Arc::new(reader.operation(path, method, op, &shared, &label)?));
        }
    }

    Ok(Schema {
        title: text("title"),
        version: text("version"),
        dialect,
        base_path: root
            .get("basePath")
            .and_then(Value::as_str)
            .map(String::from),
        operations,
    })
}

struct Reader<'d> {
    doc: &'d Value,
    dialect: Dialect,
}

impl Reader<'_> {
    /// Follow a local `$ref` chain on a component object (parameter,
    /// response, header, path item).
    fn deref(&self, value: &Value, context: &str) -> Result<Value, String> {
        let mut current = value.clone();
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            current = self.lookup(reference, context)?.clone();
        }
        Err(format!("{context}: reference chain too deep"))
    }

    fn lookup(&self, reference: &str, context: &str) -> Result<&Value, String> {
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| format!("{context}: external reference '{reference}' is not supported"))?;
        self.doc
            .pointer(pointer)
            .ok_or_else(|| format!("{context}: unresolvable reference '{reference}'"))
    }

    /// Inline every `$ref` in a schema and normalize it for JSON Schema
    /// validation.
    fn schema(&self, schema: &Value, context: &str) -> Result<Value, String> {
        let inlined = self.inline(schema, context, &mut Vec::new())?;
        Ok(normalize(inlined))
    }

    /// `expanding` holds the references being inlined above this point.
    /// Nesting depth is unbounded; only a repeated reference or a chain of
    /// more than [`MAX_REF_DEPTH`] references is cut.
    fn inline(
        &self,
        schema: &Value,
        context: &str,
        expanding: &mut Vec<String>,
    ) -> Result<Value, String> {
        match schema {
            Value::Object(obj) => {
                if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                    if expanding.iter().any(|r| r == reference)
                        || expanding.len() >= MAX_REF_DEPTH as usize
                    {
                        // Circular: unconstrained from here on
                        return Ok(Value::Object(Map::new()));
                    }
                    let target = self.lookup(reference, context)?;
                    expanding.push(reference.to_string());
                    let inlined = self.inline(target, context, expanding);
                    expanding.pop();
                    return inlined;
                }
                let mut out = Map::with_capacity(obj.len());
                for (k, v) in obj {
                    out.insert(k.clone(), self.inline(v, context, expanding)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.inline(v, context, expanding))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Parse a `parameters` list, dereferencing each entry.
    fn parameters(&self, list: Option<&Value>, context: &str) -> Result<Vec<Parameter>, String> {
        let Some(list) = list else {
            return Ok(Vec::new());
        };
        let entries = list
            .as_array()
            .ok_or_else(|| format!("{context}: 'parameters' must be an array"))?;
        let mut out = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let ctx = format!("{context} parameter #{i}");
            let entry = self.deref(entry, &ctx)?;
            if let Some(p) = self.parameter(&entry, &ctx)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// `Ok(None)` for parameters that are ignored (cookies, optional file
    /// uploads).
    fn parameter(&self, param: &Value, context: &str) -> Result<Option<Parameter>, String> {
        let name = param
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{context}: 'name' must be a string"))?;
        let context = format!("{context} '{name}'");
        let location = match param.get("in").and_then(Value::as_str) {
            Some("path") => ParamLocation::Path,
            Some("query") => ParamLocation::Query,
            Some("header") => ParamLocation::Header,
            Some("body") => ParamLocation::Body,
            Some("formData") => ParamLocation::FormData,
            Some("cookie") => return Ok(None),
            Some(other) => return Err(format!("{context}: unknown location '{other}'")),
            None => return Err(format!("{context}: 'in' must be a string")),
        };
        let required = location == ParamLocation::Path
            || param.get("required").and_then(Value::as_bool).unwrap_or(false);

        let raw_schema = match (self.dialect, location) {
            (_, ParamLocation::Body) => param
                .get("schema")
                .cloned()
                .ok_or_else(|| format!("{context}: body parameter without 'schema'"))?,
            (Dialect::Swagger2, _) => inline_schema(param),
            (Dialect::OpenApi3, _) => param
                .get("schema")
                .or_else(|| {
                    param
                        .get("content")
                        .and_then(Value::as_object)
                        .and_then(|c| c.values().next())
                        .and_then(|media| media.get("schema"))
                })
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "string"})),
        };

        if raw_schema.get("type").and_then(Value::as_str) == Some("file") {
            if required {
                return Err(format!("{context}: required file parameters are not supported"));
            }
            return Ok(None);
        }

        let schema = self.schema(&raw_schema, &context)?;
        let ty = ParamType::from_schema(&schema).map_err(|e| format!("{context}: {e}"))?;

        Ok(Some(Parameter {
            name: name.to_string(),
            location,
            required,
            ty,
            schema,
            style: collection_format(param),
        }))
    }

    fn operation(
        &self,
        path: &str,
        method: &str,
        op: &Map<String, Value>,
        shared: &[Parameter],
        label: &str,
    ) -> Result<Operation, String> {
        let own = self.parameters(op.get("parameters"), label)?;

        // Operation-level definitions win on (name, location) collisions
        let mut parameters: Vec<Parameter> = shared
            .iter()
            .filter(|s| !own.iter().any(|p| p.name == s.name && p.location == s.location))
            .cloned()
            .collect();
        parameters.extend(own);

        let mut unsupported = None;
        if let Some(body) = op.get("requestBody") {
            let body = self.deref(body, &format!("{label} requestBody"))?;
            match self.request_body(&body, label)? {
                RequestBody::Params(params) => parameters.extend(params),
                RequestBody::Unsupported(media) => {
                    unsupported = Some(format!("request body media type '{media}' is not supported"));
                }
                RequestBody::None => {}
            }
        }

        for name in template_names(path) {
            if !parameters
                .iter()
                .any(|p| p.location == ParamLocation::Path && p.name == name)
            {
                return Err(format!("{label}: path parameter '{name}' is not defined"));
            }
        }

        let mut responses = BTreeMap::new();
        if let Some(resp) = op.get("responses") {
            let resp = resp
                .as_object()
                .ok_or_else(|| format!("{label}: 'responses' must be an object"))?;
            let produces = self.produces(op);
            for (key, definition) in resp {
                let status = StatusKey::parse(key)
                    .ok_or_else(|| format!("{label}: invalid response key '{key}'"))?;
                let ctx = format!("{label} response {key}");
                let definition = self.deref(definition, &ctx)?;
                responses.insert(status, self.response(&definition, &produces, &ctx)?);
            }
        }

        Ok(Operation {
            method: method.to_uppercase(),
            path: path.to_string(),
            operation_id: op
                .get("operationId")
                .and_then(Value::as_str)
                .map(String::from),
            parameters,
            responses,
            unsupported,
        })
    }

    /// OpenAPI 3 `requestBody`: JSON becomes a single body parameter,
    /// url-encoded forms become formData parameters.
    fn request_body(&self, body: &Value, label: &str) -> Result<RequestBody, String> {
        let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);
        let Some(content) = body.get("content").and_then(Value::as_object) else {
            return Ok(RequestBody::None);
        };
        let context = format!("{label} requestBody");

        if let Some((_, media)) = content.iter().find(|(k, _)| is_json_media(k)) {
            let raw = media
                .get("schema")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            let schema = self.schema(&raw, &context)?;
            let ty = ParamType::from_schema(&schema).map_err(|e| format!("{context}: {e}"))?;
            return Ok(RequestBody::Params(vec![Parameter {
                name: "body".into(),
                location: ParamLocation::Body,
                required,
                ty,
                schema,
                style: CollectionFormat::default(),
            }]));
        }

        if let Some(media) = content.get("application/x-www-form-urlencoded") {
            let raw = media
                .get("schema")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            let schema = self.schema(&raw, &context)?;
            let ty = ParamType::from_schema(&schema).map_err(|e| format!("{context}: {e}"))?;
            let TypeKind::Object(obj) = ty.kind else {
                return Err(format!("{context}: form body schema must be an object"));
            };
            let fields = obj
                .properties
                .into_iter()
                .map(|prop| Parameter {
                    schema: schema
                        .get("properties")
                        .and_then(|p| p.get(&prop.name))
                        .cloned()
                        .unwrap_or_default(),
                    name: prop.name,
                    location: ParamLocation::FormData,
                    required: prop.required,
                    ty: prop.ty,
                    style: CollectionFormat::default(),
                })
                .collect();
            return Ok(RequestBody::Params(fields));
        }

        match content.keys().next() {
            Some(media) if required => Ok(RequestBody::Unsupported(media.clone())),
            _ => Ok(RequestBody::None),
        }
    }

    /// Swagger 2.0 media types: operation `produces`, else global.
    fn produces(&self, op: &Map<String, Value>) -> Vec<String> {
        if self.dialect != Dialect::Swagger2 {
            return Vec::new();
        }
        op.get("produces")
            .or_else(|| self.doc.get("produces"))
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .filter(|types: &Vec<String>| !types.is_empty())
            .unwrap_or_else(|| vec!["application/json".to_string()])
    }

    fn response(
        &self,
        definition: &Value,
        produces: &[String],
        context: &str,
    ) -> Result<ResponseSpec, String> {
        let mut spec = ResponseSpec::default();

        match self.dialect {
            Dialect::Swagger2 => {
                if let Some(raw) = definition.get("schema") {
                    spec.schema = Some(self.schema(raw, context)?);
                    spec.content_types = produces.to_vec();
                }
            }
            Dialect::OpenApi3 => {
                if let Some(content) = definition.get("content").and_then(Value::as_object) {
                    spec.content_types = content.keys().cloned().collect();
                    let media = content
                        .iter()
                        .find(|(k, m)| is_json_media(k) && m.get("schema").is_some())
                        .or_else(|| content.iter().find(|(_, m)| m.get("schema").is_some()));
                    if let Some((_, media)) = media {
                        if let Some(raw) = media.get("schema") {
                            spec.schema = Some(self.schema(raw, context)?);
                        }
                    }
                }
            }
        }

        if let Some(schema) = &spec.schema {
            jsonschema::validator_for(schema)
                .map_err(|e| format!("{context}: schema is not valid JSON Schema: {e}"))?;
        }

        if let Some(headers) = definition.get("headers").and_then(Value::as_object) {
            for (name, header) in headers {
                let ctx = format!("{context} header '{name}'");
                let header = self.deref(header, &ctx)?;
                spec.headers.push(self.header(name, &header, &ctx)?);
            }
        }

        Ok(spec)
    }

    fn header(&self, name: &str, header: &Value, context: &str) -> Result<ResponseHeader, String> {
        let (required, raw) = match self.dialect {
            Dialect::Swagger2 => (
                header.get("x-required").and_then(Value::as_bool).unwrap_or(false),
                Some(inline_schema(header)).filter(|s| s.get("type").is_some()),
            ),
            Dialect::OpenApi3 => (
                header.get("required").and_then(Value::as_bool).unwrap_or(false),
                header.get("schema").cloned(),
            ),
        };
        let schema = raw.map(|s| self.schema(&s, context)).transpose()?;
        let ty = match &schema {
            Some(s) => ParamType::from_schema(s).map_err(|e| format!("{context}: {e}"))?,
            None => ParamType::string(),
        };
        if let Some(s) = &schema {
            jsonschema::validator_for(s)
                .map_err(|e| format!("{context}: schema is not valid JSON Schema: {e}"))?;
        }
        Ok(ResponseHeader {
            name: name.to_string(),
            required,
            schema,
            ty,
        })
    }
}

enum RequestBody {
    None,
    Params(Vec<Parameter>),
    Unsupported(String),
}

fn inline_schema(param: &Value) -> Value {
    let mut schema = Map::new();
    for key in INLINE_SCHEMA_KEYS {
        if let Some(v) = param.get(key) {
            schema.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(schema)
}

fn collection_format(param: &Value) -> CollectionFormat {
    if let Some(format) = param.get("collectionFormat").and_then(Value::as_str) {
        return match format {
            "ssv" => CollectionFormat::Ssv,
            "tsv" => CollectionFormat::Tsv,
            "pipes" => CollectionFormat::Pipes,
            "multi" => CollectionFormat::Multi,
            _ => CollectionFormat::Csv,
        };
    }
    let style = param.get("style").and_then(Value::as_str);
    let explode = param.get("explode").and_then(Value::as_bool);
    match (style, explode) {
        (Some("spaceDelimited"), _) => CollectionFormat::Ssv,
        (Some("pipeDelimited"), _) => CollectionFormat::Pipes,
        (_, Some(false)) => CollectionFormat::Csv,
        // OpenAPI 3 query default: form, explode
        (None | Some("form"), _) if param.get("schema").is_some() => CollectionFormat::Multi,
        _ => CollectionFormat::Csv,
    }
}

pub(crate) fn is_json_media(media: &str) -> bool {
    let essence = media
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// `{name}` placeholders in a path template.
fn template_names(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }
    names
}

/// Rewrite OpenAPI-isms into plain JSON Schema: `nullable` / `x-nullable`
/// become a null alternative, boolean exclusive bounds become numeric,
/// Swagger `type: file` becomes unconstrained.
fn normalize(schema: Value) -> Value {
    let Value::Object(mut obj) = schema else {
        return schema;
    };

    for key in ["properties", "patternProperties", "definitions", "$defs"] {
        if let Some(Value::Object(props)) = obj.remove(key) {
            let props = props.into_iter().map(|(k, v)| (k, normalize(v))).collect();
            obj.insert(key.to_string(), Value::Object(props));
        }
    }
    for key in ["items", "additionalProperties", "not"] {
        if let Some(v) = obj.remove(key) {
            let v = match v {
                Value::Array(list) => Value::Array(list.into_iter().map(normalize).collect()),
                other => normalize(other),
            };
            obj.insert(key.to_string(), v);
        }
    }
    for key in ["allOf", "anyOf", "oneOf"] {
        if let Some(Value::Array(list)) = obj.remove(key) {
            obj.insert(
                key.to_string(),
                Value::Array(list.into_iter().map(normalize).collect()),
            );
        }
    }

    for (exclusive, inclusive) in [
        ("exclusiveMinimum", "minimum"),
        ("exclusiveMaximum", "maximum"),
    ] {
        if let Some(Value::Bool(flag)) = obj.get(exclusive).cloned() {
            obj.remove(exclusive);
            if flag {
                if let Some(bound) = obj.remove(inclusive) {
                    obj.insert(exclusive.to_string(), bound);
                }
            }
        }
    }

    if obj.get("type").and_then(Value::as_str) == Some("file") {
        obj.remove("type");
    }

    // A bare discriminator has no JSON Schema meaning
    obj.remove("discriminator");

    let nullable = [obj.remove("nullable"), obj.remove("x-nullable")]
        .into_iter()
        .flatten()
        .any(|v| v == Value::Bool(true));
    if !nullable {
        return Value::Object(obj);
    }

    if let Some(Value::Array(values)) = obj.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }
    match obj.get("type").cloned() {
        Some(Value::String(t)) => {
            obj.insert("type".into(), serde_json::json!([t, "null"]));
            Value::Object(obj)
        }
        Some(Value::Array(mut types)) => {
            if !types.contains(&Value::from("null")) {
                types.push(Value::from("null"));
            }
            obj.insert("type".into(), Value::Array(types));
            Value::Object(obj)
        }
        _ => serde_json::json!({"anyOf": [Value::Object(obj), {"type": "null"}]}),
    }
}
