//! apiconform-runner: schema-driven conformance testing of a live HTTP API
//!
//! Pipeline:
//! 1. [`loader`] fetches and parses an OpenAPI 3 / Swagger 2 document into a [`Schema`]
//! 2. [`cases`] derives concrete requests from each [`Operation`]
//! 3. [`executor`] sends them over blocking HTTP
//! 4. [`checks`] judges each response against the schema
//!
//! [`Runner`] ties the stages together with bounded concurrency and an
//! optional whole-run deadline.

pub mod cases;
pub mod checks;
pub mod datagen;
pub mod executor;
pub mod loader;
pub mod model;
pub mod runner;
pub mod types;

pub use cases::{CaseGenerator, CaseKind, GeneratedCase, GenerationSettings, ParamValue};
pub use executor::{CapturedResponse, ExecutionError, Executor};
pub use loader::{LoadError, SchemaFetchError, SchemaParseError};
pub use model::{Operation, ParamLocation, Schema};
pub use runner::{RunError, RunSettings, Runner};
pub use types::ParamType;
