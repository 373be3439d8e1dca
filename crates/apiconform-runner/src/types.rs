//! Typed parameter constraints
//!
//! [`ParamType`] is built once from a resolved JSON Schema fragment. Value
//! generation (see [`crate::datagen`]) produces candidates per variant and
//! [`ParamType::accepts`] is the final filter, so a generated value never
//! violates the declared constraints.

use regex::Regex;
use serde_json::{Map, Value, json};

/// Parameter type with its constraints. Nullability wraps every variant.
#[derive(Debug, Clone)]
pub struct ParamType {
    pub kind: TypeKind,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    String(StringConstraints),
    Integer(IntegerConstraints),
    Number(NumberConstraints),
    Boolean,
    Array(Box<ArrayConstraints>),
    Object(ObjectConstraints),
    Any,
}

#[derive(Debug, Clone, Default)]
pub struct StringConstraints {
    pub format: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Every pattern must match (more than one after an `allOf` merge)
    pub patterns: Vec<Pattern>,
    pub enumeration: Option<Vec<String>>,
    /// `default` / `example` / `x-example` values, tried first
    pub examples: Vec<String>,
}

/// Integer bounds are inclusive; exclusive bounds are normalized on parse.
#[derive(Debug, Clone, Default)]
pub struct IntegerConstraints {
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub multiple_of: Option<i64>,
    pub enumeration: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default)]
pub struct NumberConstraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub multiple_of: Option<f64>,
    pub enumeration: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct ArrayConstraints {
    pub items: ParamType,
    pub min_items: usize,
    pub max_items: Option<usize>,
    pub unique_items: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectConstraints {
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
}

/// A `pattern` keyword. Patterns the `regex` crate cannot compile
/// (lookaround, backreferences) accept nothing.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    regex: Option<Regex>,
}

impl Pattern {
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            regex: Regex::new(source).ok(),
        }
    }

    #[must_use]
    pub fn is_match(&self, s: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(s))
    }
}

impl ParamType {
    #[must_use]
    pub const fn any() -> Self {
        Self {
            kind: TypeKind::Any,
            nullable: false,
        }
    }

    #[must_use]
    pub fn string() -> Self {
        Self {
            kind: TypeKind::String(StringConstraints::default()),
            nullable: false,
        }
    }

    /// Build from a JSON Schema fragment whose `$ref`s are already inlined.
    ///
    /// # Errors
    ///
    /// Returns a message for unknown `type` strings, enums that share no
    /// value with the declared type, and non-object schemas.
    pub fn from_schema(schema: &Value) -> Result<Self, String> {
        let obj = match schema {
            Value::Object(obj) => obj,
            Value::Bool(true) => return Ok(Self::any()),
            other => return Err(format!("schema must be an object, got {other}")),
        };

        let mut nullable = flag(schema, "nullable") || flag(schema, "x-nullable");

        if obj.contains_key("allOf") {
            let (merged, extra_patterns) = merge_all_of(schema)?;
            let mut ty = Self::from_schema(&merged)?;
            if let TypeKind::String(c) = &mut ty.kind {
                c.patterns.extend(extra_patterns.iter().map(|p| Pattern::new(p)));
            }
            ty.nullable |= nullable;
            return Ok(ty);
        }

        for key in ["anyOf", "oneOf"] {
            if let Some(variants) = obj.get(key).and_then(Value::as_array) {
                let mut chosen = None;
                for variant in variants {
                    if variant.get("type").and_then(Value::as_str) == Some("null") {
                        nullable = true;
                    } else if chosen.is_none() {
                        chosen = Some(variant);
                    }
                }
                let mut ty = match chosen {
                    Some(variant) => Self::from_schema(variant)?,
                    None => Self::any(),
                };
                ty.nullable |= nullable;
                return Ok(ty);
            }
        }

        let type_name = match obj.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => {
                let mut first = None;
                for t in types.iter().filter_map(Value::as_str) {
                    if t == "null" {
                        nullable = true;
                    } else if first.is_none() {
                        first = Some(t);
                    }
                }
                first.or(Some("null"))
            }
            Some(other) => return Err(format!("'type' must be a string, got {other}")),
            None => None,
        };

        let enumeration: Option<Vec<&Value>> = obj
            .get("enum")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter(|v| !v.is_null()).collect());

        let type_name = type_name.or_else(|| infer_type(obj, enumeration.as_deref()));

        let kind = match type_name {
            Some("string") => TypeKind::String(string_constraints(schema, enumeration)?),
            Some("integer") => TypeKind::Integer(integer_constraints(schema, enumeration)?),
            Some("number") => TypeKind::Number(number_constraints(schema, enumeration)?),
            Some("boolean") => TypeKind::Boolean,
            Some("array") => {
                let items = match obj.get("items") {
                    Some(items) => Self::from_schema(items).map_err(|e| format!("items: {e}"))?,
                    None => Self::any(),
                };
                TypeKind::Array(Box::new(ArrayConstraints {
                    items,
                    min_items: usize_key(schema, "minItems").unwrap_or(0),
                    max_items: usize_key(schema, "maxItems"),
                    unique_items: flag(schema, "uniqueItems"),
                }))
            }
            Some("object") => TypeKind::Object(object_constraints(schema)?),
            Some("null") => {
                nullable = true;
                TypeKind::Any
            }
            None => TypeKind::Any,
            Some(other) => return Err(format!("unknown type '{other}'")),
        };

        Ok(Self { kind, nullable })
    }

    /// Whether `value` satisfies every declared constraint.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullable || matches!(self.kind, TypeKind::Any);
        }
        match &self.kind {
            TypeKind::String(c) => value.as_str().is_some_and(|s| c.accepts(s)),
            TypeKind::Integer(c) => value.as_i64().is_some_and(|i| c.accepts(i)),
            TypeKind::Number(c) => value.as_f64().is_some_and(|f| c.accepts(f)),
            TypeKind::Boolean => value.is_boolean(),
            TypeKind::Array(c) => value.as_array().is_some_and(|items| {
                items.len() >= c.min_items
                    && c.max_items.is_none_or(|max| items.len() <= max)
                    && items.iter().all(|item| c.items.accepts(item))
                    && (!c.unique_items
                        || items.iter().enumerate().all(|(i, item)| !items[..i].contains(item)))
            }),
            TypeKind::Object(c) => value.as_object().is_some_and(|obj| {
                c.properties.iter().all(|p| match obj.get(&p.name) {
                    Some(v) => p.ty.accepts(v),
                    None => !p.required,
                })
            }),
            TypeKind::Any => true,
        }
    }

    /// Short type name for plans and diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self.kind {
            TypeKind::String(_) => "string",
            TypeKind::Integer(_) => "integer",
            TypeKind::Number(_) => "number",
            TypeKind::Boolean => "boolean",
            TypeKind::Array(_) => "array",
            TypeKind::Object(_) => "object",
            TypeKind::Any => "any",
        }
    }

    /// True for objects with at least one optional property.
    #[must_use]
    pub fn has_optional_properties(&self) -> bool {
        matches!(&self.kind, TypeKind::Object(c) if c.properties.iter().any(|p| !p.required))
    }
}

impl StringConstraints {
    #[must_use]
    pub fn accepts(&self, s: &str) -> bool {
        if let Some(values) = &self.enumeration {
            return values.iter().any(|v| v == s);
        }
        let len = s.chars().count();
        self.min_length.is_none_or(|min| len >= min)
            && self.max_length.is_none_or(|max| len <= max)
            && self.patterns.iter().all(|p| p.is_match(s))
            && self.format.as_deref().is_none_or(|f| format_matches(f, s))
    }
}

impl IntegerConstraints {
    #[must_use]
    pub fn accepts(&self, i: i64) -> bool {
        if let Some(values) = &self.enumeration {
            return values.contains(&i);
        }
        self.minimum.is_none_or(|min| i >= min)
            && self.maximum.is_none_or(|max| i <= max)
            && self.multiple_of.is_none_or(|m| i % m == 0)
    }
}

impl NumberConstraints {
    #[must_use]
    pub fn accepts(&self, f: f64) -> bool {
        if !f.is_finite() {
            return false;
        }
        if let Some(values) = &self.enumeration {
            return values.iter().any(|v| (v - f).abs() < f64::EPSILON);
        }
        let above = match self.minimum {
            Some(min) if self.exclusive_minimum => f > min,
            Some(min) => f >= min,
            None => true,
        };
        let below = match self.maximum {
            Some(max) if self.exclusive_maximum => f < max,
            Some(max) => f <= max,
            None => true,
        };
        above && below && self.multiple_of.is_none_or(|m| is_multiple_of(f, m))
    }
}

/// `multipleOf` for numbers, decided the way the response validator
/// decides it. Integral divisors use the remainder. Fractional divisors
/// need an exact integer quotient of the two binary values, and reject
/// non-zero values below the divisor.
#[must_use]
pub fn is_multiple_of(value: f64, multiple: f64) -> bool {
    if multiple.fract() == 0.0 {
        return value.fract() == 0.0 && value % multiple == 0.0;
    }
    if value == 0.0 {
        return true;
    }
    if value < multiple {
        return false;
    }
    let (a, a_exp) = odd_mantissa(value);
    let (b, b_exp) = odd_mantissa(multiple);
    a_exp >= b_exp && a % b == 0
}

/// `f == odd * 2^exp` for a positive finite `f`.
fn odd_mantissa(f: f64) -> (u64, i32) {
    let bits = f.to_bits();
    let exp = i32::try_from((bits >> 52) & 0x7ff).unwrap_or(0);
    let frac = bits & ((1 << 52) - 1);
    let (mantissa, exp) = if exp == 0 {
        (frac, -1074)
    } else {
        (frac | (1 << 52), exp - 1075)
    };
    if mantissa == 0 {
        return (0, 0);
    }
    let shift = mantissa.trailing_zeros();
    (mantissa >> shift, exp + i32::try_from(shift).unwrap_or(0))
}

/// Light checks for the formats generation knows samples for. Unknown
/// formats accept anything.
#[must_use]
pub fn format_matches(format: &str, s: &str) -> bool {
    match format {
        "date" => is_date(s),
        "date-time" => s.get(..10).is_some_and(is_date) && s.as_bytes().get(10) == Some(&b'T'),
        "uuid" => is_uuid(s),
        "email" => s.split_once('@').is_some_and(|(l, d)| !l.is_empty() && d.contains('.')),
        "uri" | "url" => s.contains("://"),
        "ipv4" => s.parse::<std::net::Ipv4Addr>().is_ok(),
        "ipv6" => s.parse::<std::net::Ipv6Addr>().is_ok(),
        _ => true,
    }
}

fn is_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

fn is_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

fn flag(schema: &Value, key: &str) -> bool {
    schema.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn usize_key(schema: &Value, key: &str) -> Option<usize> {
    schema
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
}

fn infer_type(
    obj: &serde_json::Map<String, Value>,
    enumeration: Option<&[&Value]>,
) -> Option<&'static str> {
    if obj.contains_key("properties") {
        return Some("object");
    }
    if obj.contains_key("items") {
        return Some("array");
    }
    let values = enumeration.filter(|v| !v.is_empty())?;
    if values.iter().all(|v| v.is_string()) {
        Some("string")
    } else if values.iter().all(|v| v.is_i64()) {
        Some("integer")
    } else if values.iter().all(|v| v.is_number()) {
        Some("number")
    } else if values.iter().all(|v| v.is_boolean()) {
        Some("boolean")
    } else {
        None
    }
}

fn string_constraints(
    schema: &Value,
    enumeration: Option<Vec<&Value>>,
) -> Result<StringConstraints, String> {
    let enumeration = match enumeration {
        Some(values) => {
            let strings: Vec<String> = values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
            if strings.is_empty() && !values.is_empty() {
                return Err("enum has no string values for type 'string'".into());
            }
            Some(strings).filter(|s| !s.is_empty())
        }
        None => None,
    };
    let examples = ["default", "example", "x-example"]
        .iter()
        .filter_map(|k| schema.get(*k).and_then(Value::as_str))
        .map(String::from)
        .collect();
    Ok(StringConstraints {
        format: schema.get("format").and_then(Value::as_str).map(String::from),
        min_length: usize_key(schema, "minLength"),
        max_length: usize_key(schema, "maxLength"),
        patterns: schema
            .get("pattern")
            .and_then(Value::as_str)
            .map(Pattern::new)
            .into_iter()
            .collect(),
        enumeration,
        examples,
    })
}

/// Lower / upper bound with JSON Schema draft 4 (boolean) and draft 6+
/// (numeric) `exclusive*` forms.
fn bound(schema: &Value, inclusive_key: &str, exclusive_key: &str) -> (Option<f64>, bool) {
    match schema.get(exclusive_key) {
        Some(Value::Number(n)) => (n.as_f64(), true),
        Some(Value::Bool(exclusive)) => (
            schema.get(inclusive_key).and_then(Value::as_f64),
            *exclusive,
        ),
        _ => (schema.get(inclusive_key).and_then(Value::as_f64), false),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integer_constraints(
    schema: &Value,
    enumeration: Option<Vec<&Value>>,
) -> Result<IntegerConstraints, String> {
    let to_i64 = |f: f64| f.clamp(i64::MIN as f64, i64::MAX as f64) as i64;

    let (min, min_exclusive) = bound(schema, "minimum", "exclusiveMinimum");
    let (max, max_exclusive) = bound(schema, "maximum", "exclusiveMaximum");
    let mut minimum = min.map(|m| {
        let lo = m.ceil();
        to_i64(if min_exclusive && lo == m { lo + 1.0 } else { lo })
    });
    let maximum = max.map(|m| {
        let hi = m.floor();
        to_i64(if max_exclusive && hi == m { hi - 1.0 } else { hi })
    });

    // A fractional divisor m = odd * 2^-k admits the integers divisible by
    // `odd`, and never a negative one.
    let mut minimum = minimum;
    let multiple_of = match schema.get("multipleOf").and_then(Value::as_f64) {
        Some(m) if m > 0.0 && m.fract() == 0.0 => Some(to_i64(m)),
        Some(m) if m > 0.0 && m.is_finite() => {
            minimum = Some(minimum.map_or(0, |lo| lo.max(0)));
            i64::try_from(odd_mantissa(m).0).ok()
        }
        _ => None,
    };

    let enumeration = match enumeration {
        Some(values) => {
            let ints: Vec<i64> = values.iter().filter_map(|v| v.as_i64()).collect();
            if ints.is_empty() && !values.is_empty() {
                return Err("enum has no integer values for type 'integer'".into());
            }
            Some(ints).filter(|i| !i.is_empty())
        }
        None => None,
    };

    Ok(IntegerConstraints {
        minimum,
        maximum,
        multiple_of,
        enumeration,
    })
}

fn number_constraints(
    schema: &Value,
    enumeration: Option<Vec<&Value>>,
) -> Result<NumberConstraints, String> {
    let (minimum, exclusive_minimum) = bound(schema, "minimum", "exclusiveMinimum");
    let (maximum, exclusive_maximum) = bound(schema, "maximum", "exclusiveMaximum");
    let multiple_of = schema
        .get("multipleOf")
        .and_then(Value::as_f64)
        .filter(|m| *m > 0.0 && m.is_finite());
    let enumeration = match enumeration {
        Some(values) => {
            let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() && !values.is_empty() {
                return Err("enum has no numeric values for type 'number'".into());
            }
            Some(nums).filter(|n| !n.is_empty())
        }
        None => None,
    };
    Ok(NumberConstraints {
        minimum,
        maximum,
        exclusive_minimum,
        exclusive_maximum,
        multiple_of,
        enumeration,
    })
}

/// Flatten `allOf` (with the enclosing schema's own keywords) into one
/// schema. Returns the merged schema and any `pattern`s beyond the first.
///
/// Bounds tighten, enums intersect, properties and `required` union, and a
/// property declared by several parts becomes an `allOf` of its schemas.
/// `anyOf` / `oneOf` inside a part narrow to their first non-null variant.
fn merge_all_of(schema: &Value) -> Result<(Value, Vec<String>), String> {
    let mut parts = Vec::new();
    collect_all_of_parts(schema, &mut parts)?;

    let mut merged = Map::new();
    let mut type_name: Option<&str> = None;
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();
    let mut enumeration: Option<Vec<Value>> = None;
    let mut lower: Option<(f64, bool)> = None;
    let mut upper: Option<(f64, bool)> = None;
    let mut multiple_of: Option<f64> = None;
    let mut items: Vec<Value> = Vec::new();
    let mut patterns: Vec<String> = Vec::new();
    let mut unique_items = false;
    let mut sizes: Map<String, Value> = Map::new();

    for part in &parts {
        if let Some(t) = declared_type(part) {
            type_name = Some(match type_name {
                None => t,
                Some(prev) if prev == t => prev,
                Some("integer" | "number") if matches!(t, "integer" | "number") => "integer",
                Some(prev) => return Err(format!("allOf combines types '{prev}' and '{t}'")),
            });
        }
        if let Some(props) = part.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                match properties.get_mut(name) {
                    Some(existing) => {
                        *existing = json!({"allOf": [existing.take(), prop.clone()]});
                    }
                    None => {
                        properties.insert(name.clone(), prop.clone());
                    }
                }
            }
        }
        for name in part.get("required").and_then(Value::as_array).into_iter().flatten() {
            if !required.contains(name) {
                required.push(name.clone());
            }
        }
        if let Some(values) = part.get("enum").and_then(Value::as_array) {
            enumeration = Some(match enumeration {
                None => values.clone(),
                Some(current) => current.into_iter().filter(|v| values.contains(v)).collect(),
            });
        }
        if let (Some(v), exclusive) = bound(part, "minimum", "exclusiveMinimum") {
            lower = Some(match lower {
                Some((cur, cur_exclusive)) if cur > v || (cur == v && cur_exclusive) => {
                    (cur, cur_exclusive)
                }
                _ => (v, exclusive),
            });
        }
        if let (Some(v), exclusive) = bound(part, "maximum", "exclusiveMaximum") {
            upper = Some(match upper {
                Some((cur, cur_exclusive)) if cur < v || (cur == v && cur_exclusive) => {
                    (cur, cur_exclusive)
                }
                _ => (v, exclusive),
            });
        }
        if let Some(m) = part.get("multipleOf").and_then(Value::as_f64).filter(|m| *m > 0.0) {
            multiple_of = Some(match multiple_of {
                None => m,
                Some(cur) => common_multiple(cur, m)?,
            });
        }
        if let Some(item) = part.get("items") {
            items.push(item.clone());
        }
        if let Some(p) = part.get("pattern").and_then(Value::as_str) {
            if !patterns.iter().any(|seen| seen == p) {
                patterns.push(p.to_string());
            }
        }
        unique_items |= flag(part, "uniqueItems");
        for (key, is_lower) in [
            ("minLength", true),
            ("maxLength", false),
            ("minItems", true),
            ("maxItems", false),
        ] {
            if let Some(n) = usize_key(part, key) {
                let current = sizes
                    .get(key)
                    .and_then(Value::as_u64)
                    .and_then(|v| usize::try_from(v).ok());
                let n = match current {
                    Some(cur) if is_lower => cur.max(n),
                    Some(cur) => cur.min(n),
                    None => n,
                };
                sizes.insert(key.to_string(), json!(n));
            }
        }
        if let Value::Object(obj) = part {
            for (key, value) in obj {
                if !MERGED_KEYS.contains(&key.as_str()) {
                    merged.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
    }

    if let Some(t) = type_name {
        merged.insert("type".into(), json!(t));
    }
    if !properties.is_empty() {
        merged.insert("properties".into(), Value::Object(properties));
    }
    if !required.is_empty() {
        merged.insert("required".into(), Value::Array(required));
    }
    if let Some(values) = enumeration {
        if values.is_empty() {
            return Err("allOf enums share no value".into());
        }
        merged.insert("enum".into(), Value::Array(values));
    }
    if let Some((v, exclusive)) = lower {
        merged.insert("minimum".into(), json!(v));
        merged.insert("exclusiveMinimum".into(), json!(exclusive));
    }
    if let Some((v, exclusive)) = upper {
        merged.insert("maximum".into(), json!(v));
        merged.insert("exclusiveMaximum".into(), json!(exclusive));
    }
    if let Some(m) = multiple_of {
        merged.insert("multipleOf".into(), json!(m));
    }
    match items.len() {
        0 => {}
        1 => {
            merged.insert("items".into(), items.remove(0));
        }
        _ => {
            merged.insert("items".into(), json!({"allOf": items}));
        }
    }
    let mut patterns = patterns.into_iter();
    if let Some(first) = patterns.next() {
        merged.insert("pattern".into(), json!(first));
    }
    if unique_items {
        merged.insert("uniqueItems".into(), json!(true));
    }
    merged.extend(sizes);
    Ok((Value::Object(merged), patterns.collect()))
}

/// Keywords [`merge_all_of`] combines itself; the rest keep their first value.
const MERGED_KEYS: &[&str] = &[
    "allOf",
    "anyOf",
    "oneOf",
    "type",
    "properties",
    "required",
    "enum",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "items",
    "pattern",
    "uniqueItems",
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "nullable",
    "x-nullable",
];

fn collect_all_of_parts(schema: &Value, out: &mut Vec<Value>) -> Result<(), String> {
    let obj = match schema {
        Value::Object(obj) => obj,
        Value::Bool(true) => return Ok(()),
        other => return Err(format!("allOf part must be an object, got {other}")),
    };
    let mut own = obj.clone();
    let all_of = own.remove("allOf");
    let mut variant = None;
    for key in ["anyOf", "oneOf"] {
        if let Some(Value::Array(variants)) = own.remove(key) {
            if variant.is_none() {
                variant = variants
                    .into_iter()
                    .find(|v| v.get("type").and_then(Value::as_str) != Some("null"));
            }
        }
    }
    out.push(Value::Object(own));
    if let Some(variant) = variant {
        collect_all_of_parts(&variant, out)?;
    }
    match all_of {
        Some(Value::Array(parts)) => {
            for part in &parts {
                collect_all_of_parts(part, out)?;
            }
            Ok(())
        }
        Some(other) => Err(format!("'allOf' must be an array, got {other}")),
        None => Ok(()),
    }
}

/// First non-null `type` of a schema.
fn declared_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()).filter(|t| *t != "null"),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

/// Smallest step satisfying both `multipleOf` values.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn common_multiple(a: f64, b: f64) -> Result<f64, String> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if a.fract() == 0.0 && b.fract() == 0.0 && a < EXACT && b < EXACT {
        let (x, y) = (a as u64, b as u64);
        let (mut p, mut q) = (x, y);
        while q != 0 {
            (p, q) = (q, p % q);
        }
        return (x / p)
            .checked_mul(y)
            .map(|lcm| lcm as f64)
            .ok_or_else(|| format!("allOf multipleOf {a} and {b} overflow"));
    }
    if is_multiple_of(a, b) {
        Ok(a)
    } else if is_multiple_of(b, a) {
        Ok(b)
    } else {
        Err(format!("allOf multipleOf {a} and {b} have no common step"))
    }
}

fn object_constraints(schema: &Value) -> Result<ObjectConstraints, String> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut properties = Vec::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in props {
            let ty = ParamType::from_schema(prop_schema)
                .map_err(|e| format!("property '{name}': {e}"))?;
            properties.push(Property {
                name: name.clone(),
                ty,
                required: required.contains(&name.as_str()),
            });
        }
    }
    Ok(ObjectConstraints { properties })
}
