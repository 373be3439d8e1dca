//! In-memory API model built by the loader
//!
//! Read-only after loading. Operations are shared with generated cases
//! through `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::types::ParamType;

/// Document dialect the model was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Swagger2,
    OpenApi3,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swagger2 => f.write_str("Swagger 2.0"),
            Self::OpenApi3 => f.write_str("OpenAPI 3"),
        }
    }
}

/// A loaded API schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub title: String,
    pub version: String,
    pub dialect: Dialect,
    /// Swagger `basePath`; informational, requests use the configured base URL
    pub base_path: Option<String>,
    pub(crate) operations: Vec<Arc<Operation>>,
}

impl Schema {
    /// Operations in document order.
    #[must_use]
    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    #[must_use]
    pub fn get(&self, method: &str, path: &str) -> Option<&Arc<Operation>> {
        self.operations
            .iter()
            .find(|op| op.method.eq_ignore_ascii_case(method) && op.path == path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// One (path, method) pair.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Uppercase HTTP method
    pub method: String,
    /// Path template, e.g. `/nodes/{node_id}`
    pub path: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<Parameter>,
    pub responses: BTreeMap<StatusKey, ResponseSpec>,
    /// Set when requests for this operation cannot be built
    pub unsupported: Option<String>,
}

impl Operation {
    /// "GET /nodes/{node_id}"
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Response definition for a status: exact code, then range, then default.
    #[must_use]
    pub fn response_for(&self, status: u16) -> Option<&ResponseSpec> {
        let class = u8::try_from(status / 100).ok();
        self.responses
            .get(&StatusKey::Code(status))
            .or_else(|| class.and_then(|c| self.responses.get(&StatusKey::Range(c))))
            .or_else(|| self.responses.get(&StatusKey::Default))
    }

    #[must_use]
    pub fn documents_status(&self, status: u16) -> bool {
        self.response_for(status).is_some()
    }

    /// Declared response keys in order: codes, ranges, default.
    #[must_use]
    pub fn declared_statuses(&self) -> Vec<StatusKey> {
        self.responses.keys().copied().collect()
    }

    pub fn parameters_in(&self, location: ParamLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
}

impl ParamLocation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::FormData => "formData",
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How array values are serialized into a query string or header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionFormat {
    /// Comma separated
    #[default]
    Csv,
    /// Space separated
    Ssv,
    /// Tab separated
    Tsv,
    /// Pipe separated
    Pipes,
    /// Repeated `name=value` pairs
    Multi,
}

impl CollectionFormat {
    #[must_use]
    pub const fn separator(self) -> &'static str {
        match self {
            Self::Csv | Self::Multi => ",",
            Self::Ssv => " ",
            Self::Tsv => "\t",
            Self::Pipes => "|",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub ty: ParamType,
    /// Resolved, normalized JSON Schema of the parameter
    pub schema: Value,
    pub style: CollectionFormat,
}

/// Key of the `responses` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusKey {
    /// Exact code, 100..=599
    Code(u16),
    /// Status class, `2XX` is `Range(2)`
    Range(u8),
    Default,
}

impl StatusKey {
    /// Parse a `responses` key. `None` for anything outside the grammar.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        if key == "default" {
            return Some(Self::Default);
        }
        let bytes = key.as_bytes();
        if bytes.len() != 3 {
            return None;
        }
        if bytes[1..].eq_ignore_ascii_case(b"XX") {
            return match bytes[0] {
                c @ b'1'..=b'5' => Some(Self::Range(c - b'0')),
                _ => None,
            };
        }
        key.parse::<u16>()
            .ok()
            .filter(|c| (100..=599).contains(c))
            .map(Self::Code)
    }

    /// Whether this key documents `status`.
    #[must_use]
    pub fn matches(self, status: u16) -> bool {
        match self {
            Self::Code(code) => code == status,
            Self::Range(class) => status / 100 == u16::from(class),
            Self::Default => true,
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Range(class) => write!(f, "{class}XX"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Expected response for one status key.
#[derive(Debug, Clone, Default)]
pub struct ResponseSpec {
    /// Declared media types
    pub content_types: Vec<String>,
    /// Body schema, refs inlined and normalized for JSON Schema validation
    pub schema: Option<Value>,
    pub headers: Vec<ResponseHeader>,
}

#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub name: String,
    pub required: bool,
    pub schema: Option<Value>,
    /// Scalar type used to coerce the header text before validation
    pub ty: ParamType,
}
