//! Case generation: a finite, restartable sequence of requests per operation
//!
//! The plan for one operation is fixed up front:
//!
//! 1. `Minimal`: required parameters only
//! 2. `Full`: every parameter and body property (only when something is optional)
//! 3. `Pin`: one case per further representative value of each parameter
//!    (and of each top-level body property), all other values minimal
//! 4. `Random`: seeded random fill, also used to pad the plan up to the
//!    number of documented statuses
//!
//! A case's randomness comes from `(seed, operation label, index)` alone, so
//! iterating [`CaseGenerator::cases`] twice yields identical cases.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::warn;

use crate::datagen::{self, Fill};
use crate::model::{Operation, ParamLocation, Parameter, StatusKey};
use crate::types::TypeKind;

/// Generation knobs shared by every operation of a run.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub seed: u64,
    /// Cap on cases per operation; never below the number of documented statuses
    pub max_cases: Option<u32>,
    /// Random cases appended after the deterministic ones
    pub random_cases: u32,
    /// Fixed path parameter values, by name
    pub path_params: HashMap<String, String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            max_cases: None,
            random_cases: 2,
            path_params: HashMap::new(),
        }
    }
}

/// A concrete value for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamValue {
    pub name: String,
    pub location: ParamLocation,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Minimal,
    Full,
    Pin,
    Random,
}

impl fmt::Display for CaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimal => "minimal",
            Self::Full => "full",
            Self::Pin => "pin",
            Self::Random => "random",
        })
    }
}

/// One concrete instantiation of an operation. Immutable once created.
#[derive(Debug, Clone)]
pub struct GeneratedCase {
    id: String,
    index: u32,
    operation: Arc<Operation>,
    target_status: Option<StatusKey>,
    kind: CaseKind,
    values: Vec<ParamValue>,
}

impl GeneratedCase {
    /// Stable 16-hex-digit id, reproduced by the same seed
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Documented status this case is aimed at
    #[must_use]
    pub const fn target_status(&self) -> Option<StatusKey> {
        self.target_status
    }

    #[must_use]
    pub const fn kind(&self) -> CaseKind {
        self.kind
    }

    /// Values in parameter declaration order; omitted optionals are absent.
    #[must_use]
    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, name: &str, location: ParamLocation) -> Option<&Value> {
        self.values
            .iter()
            .find(|v| v.name == name && v.location == location)
            .map(|v| &v.value)
    }
}

#[cfg(test)]
impl GeneratedCase {
    pub(crate) fn fixture(operation: Arc<Operation>, values: Vec<ParamValue>) -> Self {
        Self {
            id: "00000000000000aa".into(),
            index: 0,
            target_status: operation.declared_statuses().first().copied(),
            operation,
            kind: CaseKind::Minimal,
            values,
        }
    }
}

/// One planned case.
#[derive(Debug, Clone)]
enum Slot {
    Minimal,
    Full,
    /// Parameter `param` (or its top-level `property`) set to `value`
    Pin {
        param: usize,
        property: Option<String>,
        value: Value,
    },
    Random,
}

impl Slot {
    const fn kind(&self) -> CaseKind {
        match self {
            Self::Minimal => CaseKind::Minimal,
            Self::Full => CaseKind::Full,
            Self::Pin { .. } => CaseKind::Pin,
            Self::Random => CaseKind::Random,
        }
    }
}

/// Plans and materializes the cases of one operation.
#[derive(Debug)]
pub struct CaseGenerator {
    operation: Arc<Operation>,
    statuses: Vec<StatusKey>,
    /// Per parameter: configured override, if any
    fixed: Vec<Option<Value>>,
    slots: Vec<Slot>,
    base_seed: u64,
    unsatisfiable: Option<String>,
}

impl CaseGenerator {
    #[must_use]
    pub fn new(operation: Arc<Operation>, settings: &GenerationSettings) -> Self {
        let label = operation.label();
        let fixed = fixed_values(&operation, &settings.path_params, &label);
        let statuses = operation.declared_statuses();
        let base_seed = fnv1a(label.as_bytes()) ^ settings.seed;

        let unsatisfiable = operation
            .parameters
            .iter()
            .zip(&fixed)
            .find(|(p, f)| {
                p.required
                    && f.is_none()
                    && datagen::generate(&p.ty, Fill::Minimal, &mut SmallRng::seed_from_u64(0))
                        .is_none()
            })
            .map(|(p, _)| {
                format!(
                    "required {} parameter '{}' cannot be generated",
                    p.location, p.name
                )
            });

        let slots = if unsatisfiable.is_some() {
            Vec::new()
        } else {
            plan(&operation, &fixed, &statuses, settings)
        };

        Self {
            operation,
            statuses,
            fixed,
            slots,
            base_seed,
            unsatisfiable,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Why the operation yields no cases, if so.
    #[must_use]
    pub fn unsatisfiable(&self) -> Option<&str> {
        self.unsatisfiable.as_deref()
    }

    #[must_use]
    pub fn operation(&self) -> &Arc<Operation> {
        &self.operation
    }

    /// The case sequence. Each call starts over and yields the same cases.
    #[must_use]
    pub fn cases(&self) -> Cases<'_> {
        Cases {
            generator: self,
            next: 0,
        }
    }

    fn materialize(&self, index: usize) -> GeneratedCase {
        let slot = &self.slots[index];
        let mut rng = SmallRng::seed_from_u64(splitmix64(self.base_seed ^ splitmix64(index as u64)));
        let id = format!("{:016x}", rng.r#gen::<u64>());

        let mut values = Vec::with_capacity(self.operation.parameters.len());
        for (i, param) in self.operation.parameters.iter().enumerate() {
            if let Some(v) = &self.fixed[i] {
                values.push(param_value(param, v.clone()));
                continue;
            }
            let value = match slot {
                Slot::Minimal => minimal(param),
                Slot::Full => datagen::generate(&param.ty, Fill::Full, &mut rng),
                Slot::Pin {
                    param: pinned,
                    property,
                    value,
                } if *pinned == i => match property {
                    None => Some(value.clone()),
                    Some(name) => datagen::generate(&param.ty, Fill::Minimal, &mut rng).map(
                        |mut obj| {
                            if let Value::Object(map) = &mut obj {
                                map.insert(name.clone(), value.clone());
                            }
                            obj
                        },
                    ),
                },
                Slot::Pin { .. } => minimal(param),
                Slot::Random => {
                    if param.required || rng.gen_bool(0.5) {
                        datagen::generate(&param.ty, Fill::Random, &mut rng)
                            .or_else(|| minimal(param))
                    } else {
                        None
                    }
                }
            };
            if let Some(v) = value {
                values.push(param_value(param, v));
            }
        }

        let target_status = if self.statuses.is_empty() {
            None
        } else {
            Some(self.statuses[index % self.statuses.len()])
        };

        GeneratedCase {
            id,
            index: u32::try_from(index).unwrap_or(u32::MAX),
            operation: Arc::clone(&self.operation),
            target_status,
            kind: slot.kind(),
            values,
        }
    }
}

/// Iterator over an operation's cases; see [`CaseGenerator::cases`].
#[derive(Debug, Clone)]
pub struct Cases<'g> {
    generator: &'g CaseGenerator,
    next: usize,
}

impl Iterator for Cases<'_> {
    type Item = GeneratedCase;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.generator.slots.len() {
            return None;
        }
        let case = self.generator.materialize(self.next);
        self.next += 1;
        Some(case)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.generator.slots.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Cases<'_> {}

fn param_value(param: &Parameter, value: Value) -> ParamValue {
    ParamValue {
        name: param.name.clone(),
        location: param.location,
        value,
    }
}

/// Value used by minimal cases: required parameters get their first
/// representative, optional ones are omitted.
fn minimal(param: &Parameter) -> Option<Value> {
    if !param.required {
        return None;
    }
    datagen::generate(&param.ty, Fill::Minimal, &mut SmallRng::seed_from_u64(0))
}

/// Configured `path_params` that satisfy the declared type.
fn fixed_values(
    operation: &Operation,
    overrides: &HashMap<String, String>,
    label: &str,
) -> Vec<Option<Value>> {
    operation
        .parameters
        .iter()
        .map(|p| {
            if p.location != ParamLocation::Path {
                return None;
            }
            let text = overrides.get(&p.name)?;
            let value = datagen::coerce(&p.ty, text);
            if p.ty.accepts(&value) {
                Some(value)
            } else {
                warn!(
                    operation = label,
                    param = %p.name,
                    value = %text,
                    "configured path parameter does not match its {} schema, generating instead",
                    p.ty.name()
                );
                None
            }
        })
        .collect()
}

fn plan(
    operation: &Operation,
    fixed: &[Option<Value>],
    statuses: &[StatusKey],
    settings: &GenerationSettings,
) -> Vec<Slot> {
    let mut slots = vec![Slot::Minimal];

    let has_optional = operation
        .parameters
        .iter()
        .zip(fixed)
        .any(|(p, f)| f.is_none() && (!p.required || p.ty.has_optional_properties()));
    if has_optional {
        slots.push(Slot::Full);
    }

    for (i, param) in operation.parameters.iter().enumerate() {
        if fixed[i].is_some() {
            continue;
        }
        if let TypeKind::Object(obj) = &param.ty.kind {
            for prop in &obj.properties {
                for value in datagen::representatives(&prop.ty).into_iter().skip(1) {
                    slots.push(Slot::Pin {
                        param: i,
                        property: Some(prop.name.clone()),
                        value,
                    });
                }
            }
        } else {
            for value in datagen::representatives(&param.ty).into_iter().skip(1) {
                slots.push(Slot::Pin {
                    param: i,
                    property: None,
                    value,
                });
            }
        }
    }

    slots.extend((0..settings.random_cases).map(|_| Slot::Random));
    while slots.len() < statuses.len() {
        slots.push(Slot::Random);
    }

    if let Some(cap) = settings.max_cases {
        let limit = (cap as usize).max(statuses.len()).max(1);
        slots.truncate(limit);
    }
    slots
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::build_schema;
    use proptest::prelude::*;
    use serde_json::json;

    fn operation(doc: Value, method: &str, path: &str) -> Arc<Operation> {
        let schema = build_schema(&doc).unwrap();
        Arc::clone(schema.get(method, path).unwrap())
    }

    fn nodes_doc() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "grid", "version": "1"},
            "paths": {
                "/nodes/{node_id}": {
                    "get": {
                        "parameters": [
                            {"name": "node_id", "in": "path", "required": true, "type": "integer", "minimum": 1},
                            {"name": "status", "in": "query", "type": "string", "enum": ["up", "down", "standby"]},
                            {"name": "healthy", "in": "query", "type": "boolean"},
                            {"name": "size", "in": "query", "type": "integer", "minimum": 1, "maximum": 100}
                        ],
                        "responses": {
                            "200": {"description": "ok"},
                            "400": {"description": "bad"},
                            "404": {"description": "missing"},
                            "default": {"description": "other"}
                        }
                    }
                }
            }
        })
    }

    fn generator(settings: &GenerationSettings) -> CaseGenerator {
        CaseGenerator::new(operation(nodes_doc(), "GET", "/nodes/{node_id}"), settings)
    }

    #[test]
    fn plan_starts_minimal_then_full() {
        let cases: Vec<_> = generator(&GenerationSettings::default()).cases().collect();
        assert_eq!(cases[0].kind(), CaseKind::Minimal);
        assert_eq!(cases[0].values().len(), 1);
        assert_eq!(cases[0].value("node_id", ParamLocation::Path), Some(&json!(1)));

        assert_eq!(cases[1].kind(), CaseKind::Full);
        assert_eq!(cases[1].values().len(), 4);
    }

    #[test]
    fn every_enum_member_is_covered() {
        let cases: Vec<_> = generator(&GenerationSettings::default()).cases().collect();
        for member in ["up", "down", "standby"] {
            assert!(
                cases
                    .iter()
                    .any(|c| c.value("status", ParamLocation::Query) == Some(&json!(member))),
                "{member} not covered"
            );
        }
        for flag in [true, false] {
            assert!(
                cases
                    .iter()
                    .any(|c| c.value("healthy", ParamLocation::Query) == Some(&json!(flag)))
            );
        }
    }

    #[test]
    fn integer_bounds_are_covered() {
        let cases: Vec<_> = generator(&GenerationSettings::default()).cases().collect();
        let sizes: Vec<_> = cases
            .iter()
            .filter_map(|c| c.value("size", ParamLocation::Query))
            .collect();
        assert!(sizes.contains(&&json!(1)));
        assert!(sizes.contains(&&json!(100)));
    }

    #[test]
    fn optional_params_present_and_absent() {
        let cases: Vec<_> = generator(&GenerationSettings::default()).cases().collect();
        for name in ["status", "healthy", "size"] {
            assert!(cases.iter().any(|c| c.value(name, ParamLocation::Query).is_some()));
            assert!(cases.iter().any(|c| c.value(name, ParamLocation::Query).is_none()));
        }
    }

    #[test]
    fn cap_never_drops_below_declared_statuses() {
        let settings = GenerationSettings {
            max_cases: Some(1),
            ..GenerationSettings::default()
        };
        let generator = generator(&settings);
        assert_eq!(generator.len(), 4);
        let targets: Vec<_> = generator.cases().map(|c| c.target_status()).collect();
        assert_eq!(
            targets,
            vec![
                Some(StatusKey::Code(200)),
                Some(StatusKey::Code(400)),
                Some(StatusKey::Code(404)),
                Some(StatusKey::Default),
            ]
        );
    }

    #[test]
    fn padded_up_to_declared_statuses() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {"/ping": {"get": {"responses": {
                "200": {"description": "ok"},
                "204": {"description": "empty"},
                "4XX": {"description": "client"},
                "5XX": {"description": "server"}
            }}}}
        });
        let settings = GenerationSettings {
            random_cases: 0,
            ..GenerationSettings::default()
        };
        let generator = CaseGenerator::new(operation(doc, "GET", "/ping"), &settings);
        assert_eq!(generator.len(), 4);
        assert_eq!(generator.cases().len(), 4);
    }

    #[test]
    fn sequence_is_restartable() {
        let generator = generator(&GenerationSettings {
            seed: 99,
            ..GenerationSettings::default()
        });
        let first: Vec<_> = generator
            .cases()
            .map(|c| (c.id().to_string(), c.values().to_vec()))
            .collect();
        let second: Vec<_> = generator
            .cases()
            .map(|c| (c.id().to_string(), c.values().to_vec()))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn seed_changes_case_ids() {
        let a = generator(&GenerationSettings { seed: 1, ..GenerationSettings::default() });
        let b = generator(&GenerationSettings { seed: 2, ..GenerationSettings::default() });
        let ids_a: Vec<_> = a.cases().map(|c| c.id().to_string()).collect();
        let ids_b: Vec<_> = b.cases().map(|c| c.id().to_string()).collect();
        assert_ne!(ids_a, ids_b);
        assert!(ids_a.iter().all(|id| id.len() == 16));
    }

    #[test]
    fn configured_path_param_replaces_generated() {
        let mut settings = GenerationSettings::default();
        settings.path_params.insert("node_id".into(), "42".into());
        let generator = generator(&settings);
        assert!(
            generator
                .cases()
                .all(|c| c.value("node_id", ParamLocation::Path) == Some(&json!(42)))
        );
    }

    #[test]
    fn invalid_path_param_override_ignored() {
        let mut settings = GenerationSettings::default();
        settings.path_params.insert("node_id".into(), "abc".into());
        let generator = generator(&settings);
        assert!(
            generator
                .cases()
                .all(|c| c.value("node_id", ParamLocation::Path) != Some(&json!("abc")))
        );
    }

    #[test]
    fn unsatisfiable_required_param_yields_no_cases() {
        let doc = json!({
            "swagger": "2.0",
            "info": {"title": "t", "version": "1"},
            "paths": {"/twins": {"get": {
                "parameters": [{"name": "key", "in": "query", "required": true, "type": "string", "pattern": "^zz[0-9]{6}$"}],
                "responses": {"200": {"description": "ok"}}
            }}}
        });
        let generator = CaseGenerator::new(operation(doc, "GET", "/twins"), &GenerationSettings::default());
        assert!(generator.is_empty());
        assert_eq!(
            generator.unsatisfiable(),
            Some("required query parameter 'key' cannot be generated")
        );
    }

    #[test]
    fn body_properties_are_pinned() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {"/farms": {"post": {
                "requestBody": {"required": true, "content": {"application/json": {"schema": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "minLength": 1},
                        "kind": {"type": "string", "enum": ["public", "dedicated"]}
                    },
                    "required": ["name"]
                }}}},
                "responses": {"201": {"description": "created"}}
            }}}
        });
        let generator = CaseGenerator::new(operation(doc, "POST", "/farms"), &GenerationSettings::default());
        let bodies: Vec<Value> = generator
            .cases()
            .filter_map(|c| c.value("body", ParamLocation::Body).cloned())
            .collect();
        assert!(bodies.iter().any(|b| b.get("kind").is_none()));
        assert!(bodies.iter().any(|b| b["kind"] == "public"));
        assert!(bodies.iter().any(|b| b["kind"] == "dedicated"));
        assert!(bodies.iter().all(|b| b.get("name").is_some()));
    }

    proptest! {
        #[test]
        fn generated_values_satisfy_declared_schemas(
            seed in any::<u64>(),
            minimum in -50i64..50,
            span in 0i64..100,
            min_len in 0usize..5,
            extra_len in 0usize..10,
        ) {
            let doc = json!({
                "openapi": "3.0.0",
                "info": {"title": "t", "version": "1"},
                "paths": {"/items/{id}": {"put": {
                    "parameters": [
                        {"name": "id", "in": "path", "required": true, "schema": {"type": "integer", "minimum": minimum, "maximum": minimum + span}},
                        {"name": "tag", "in": "query", "schema": {"type": "string", "minLength": min_len, "maxLength": min_len + extra_len}},
                        {"name": "ids", "in": "query", "schema": {"type": "array", "items": {"type": "integer", "minimum": 0}, "maxItems": 3}},
                        {"name": "mode", "in": "header", "schema": {"type": "string", "enum": ["fast", "safe"]}}
                    ],
                    "requestBody": {"content": {"application/json": {"schema": {
                        "type": "object",
                        "properties": {
                            "when": {"type": "string", "format": "date"},
                            "ratio": {"type": "number", "minimum": 0, "maximum": 1, "exclusiveMaximum": true},
                            "labels": {"type": "array", "items": {"type": "string", "maxLength": 3}, "minItems": 1, "maxItems": 2}
                        },
                        "required": ["when"]
                    }}}},
                    "responses": {"200": {"description": "ok"}, "404": {"description": "missing"}}
                }}}
            });
            let op = operation(doc, "PUT", "/items/{id}");
            let settings = GenerationSettings { seed, random_cases: 4, ..GenerationSettings::default() };
            let generator = CaseGenerator::new(Arc::clone(&op), &settings);
            prop_assert!(generator.len() >= 2);

            for case in generator.cases() {
                for param in &op.parameters {
                    match case.value(&param.name, param.location) {
                        Some(value) => {
                            prop_assert!(param.ty.accepts(value), "{} = {}", param.name, value);
                            let validator = jsonschema::validator_for(&param.schema).unwrap();
                            prop_assert!(validator.is_valid(value), "{} = {} vs {}", param.name, value, param.schema);
                        }
                        None => prop_assert!(!param.required, "{} missing", param.name),
                    }
                }
            }
        }

        #[test]
        fn composed_schemas_generate_valid_values(
            seed in any::<u64>(),
            low in -20i64..20,
            span in 0i64..20,
            halves in 1u32..4,
        ) {
            let doc = json!({
                "openapi": "3.0.0",
                "info": {"title": "t", "version": "1"},
                "paths": {"/pets": {"post": {
                    "parameters": [
                        {"name": "count", "in": "query", "required": true, "schema": {"allOf": [{"type": "integer", "minimum": low}, {"maximum": low + span}]}},
                        {"name": "weight", "in": "query", "required": true, "schema": {"type": "number", "minimum": 0, "maximum": 10, "multipleOf": f64::from(halves) * 0.5}}
                    ],
                    "requestBody": {"required": true, "content": {"application/json": {"schema": {
                        "allOf": [{"$ref": "#/components/schemas/Base"}],
                        "properties": {"name": {"type": "string", "minLength": 1}},
                        "required": ["name"]
                    }}}},
                    "responses": {"201": {"description": "created"}}
                }}},
                "components": {"schemas": {"Base": {
                    "type": "object",
                    "properties": {"id": {"type": "integer", "minimum": 1, "maximum": 9}},
                    "required": ["id"]
                }}}
            });
            let op = operation(doc, "POST", "/pets");
            let settings = GenerationSettings { seed, random_cases: 4, ..GenerationSettings::default() };
            let generator = CaseGenerator::new(Arc::clone(&op), &settings);
            prop_assert!(!generator.is_empty(), "{:?}", generator.unsatisfiable());

            for case in generator.cases() {
                for param in &op.parameters {
                    let value = case.value(&param.name, param.location);
                    prop_assert!(value.is_some(), "{} missing", param.name);
                    let value = value.unwrap();
                    let validator = jsonschema::validator_for(&param.schema).unwrap();
                    prop_assert!(validator.is_valid(value), "{} = {} vs {}", param.name, value, param.schema);
                }
            }
        }
    }
}
