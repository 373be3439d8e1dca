//! [`ParamType`] → `serde_json::Value` generation
//!
//! Two sources of values:
//! - [`representatives`]: deterministic boundary and representative values
//!   (every enum member, format samples, min/max bounds, both booleans)
//! - [`generate`] with [`Fill::Random`]: seeded random values
//!
//! Every candidate passes [`ParamType::accepts`] or is discarded.

use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};

use crate::types::{
    ArrayConstraints, IntegerConstraints, NumberConstraints, ObjectConstraints, ParamType,
    StringConstraints, TypeKind,
};

/// Maximum recursion depth for nested arrays and objects.
const MAX_DEPTH: u32 = 20;

/// Upper bound on generated string length (absurd `maxLength` values).
const MAX_STRING_LEN: usize = 256;

/// Upper bound on generated array length.
const MAX_ARRAY_LEN: usize = 8;

/// Attempts at a random value before falling back to a representative.
const RANDOM_ATTEMPTS: usize = 16;

/// Strings tried against a `pattern` when nothing else matches.
const PATTERN_GUESSES: [&str; 12] = [
    "1", "0", "42", "a", "abc", "A", "ABC", "a1", "test", "sample", "1.0", "a-b",
];

/// How optional object properties are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Required properties only, first representative values
    Minimal,
    /// Every property, first representative values
    Full,
    /// Seeded random values, optional properties with probability 1/2
    Random,
}

/// Deterministic representative values, first one is the "typical" value.
///
/// Empty when no value satisfies the constraints.
#[must_use]
pub fn representatives(ty: &ParamType) -> Vec<Value> {
    representatives_inner(ty, 0)
}

fn representatives_inner(ty: &ParamType, depth: u32) -> Vec<Value> {
    if depth > MAX_DEPTH {
        return vec![];
    }
    let candidates = match &ty.kind {
        TypeKind::String(c) => string_candidates(c),
        TypeKind::Integer(c) => integer_candidates(c),
        TypeKind::Number(c) => number_candidates(c),
        TypeKind::Boolean => vec![Value::Bool(true), Value::Bool(false)],
        TypeKind::Array(c) => array_candidates(c, depth),
        TypeKind::Object(c) => [Fill::Minimal, Fill::Full]
            .into_iter()
            .filter_map(|fill| fixed_object(c, fill, depth))
            .collect(),
        TypeKind::Any => vec![json!("sample")],
    };
    let mut out: Vec<Value> = Vec::with_capacity(candidates.len());
    for v in candidates {
        if ty.accepts(&v) && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Generate one value. `None` when the constraints cannot be satisfied.
pub fn generate(ty: &ParamType, fill: Fill, rng: &mut impl Rng) -> Option<Value> {
    generate_inner(ty, fill, rng, 0)
}

fn generate_inner(ty: &ParamType, fill: Fill, rng: &mut impl Rng, depth: u32) -> Option<Value> {
    if depth > MAX_DEPTH {
        return None;
    }
    match fill {
        Fill::Minimal | Fill::Full => match &ty.kind {
            TypeKind::Object(c) => fixed_object(c, fill, depth),
            _ => representatives_inner(ty, depth).into_iter().next(),
        },
        Fill::Random => {
            for _ in 0..RANDOM_ATTEMPTS {
                if let Some(v) = random_value(ty, rng, depth) {
                    if ty.accepts(&v) {
                        return Some(v);
                    }
                }
            }
            representatives_inner(ty, depth).choose(rng).cloned()
        }
    }
}

/// Convert parameter or header text into a value of the declared type.
/// Text that does not parse stays a string and fails `accepts`.
#[must_use]
pub fn coerce(ty: &ParamType, text: &str) -> Value {
    match &ty.kind {
        TypeKind::Integer(_) => text
            .trim()
            .parse::<i64>()
            .map_or_else(|_| Value::String(text.to_string()), Value::from),
        TypeKind::Number(_) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(text.to_string()), Value::Number),
        TypeKind::Boolean => match text.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        TypeKind::Array(c) => Value::Array(
            text.split(',')
                .filter(|s| !s.is_empty())
                .map(|s| coerce(&c.items, s.trim()))
                .collect(),
        ),
        _ => Value::String(text.to_string()),
    }
}

/// Render a value for a path segment, query string or header.
#[must_use]
pub fn value_to_param_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Canonical sample for well-known string formats.
#[must_use]
pub fn format_sample(format: &str) -> Option<&'static str> {
    Some(match format {
        "date" => "2024-01-15",
        "date-time" => "2024-01-15T12:00:00Z",
        "email" => "user@example.com",
        "uri" | "url" => "https://example.com",
        "uuid" => "123e4567-e89b-42d3-a456-426614174000",
        "ipv4" => "192.0.2.1",
        "ipv6" => "2001:db8::1",
        "hostname" => "example.com",
        "byte" => "c2FtcGxl",
        "password" => "sample-password",
        _ => return None,
    })
}

fn sized_string(len: usize) -> String {
    "sample".chars().cycle().take(len).collect()
}

pub(crate) fn random_alnum(rng: &mut impl Rng, len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn string_candidates(c: &StringConstraints) -> Vec<Value> {
    if let Some(values) = &c.enumeration {
        return values.iter().map(|s| json!(s)).collect();
    }
    let min = c.min_length.unwrap_or(0).min(MAX_STRING_LEN);
    let max = c.max_length.unwrap_or(MAX_STRING_LEN).min(MAX_STRING_LEN).max(min);

    let mut out: Vec<Value> = c.examples.iter().map(|s| json!(s)).collect();
    if let Some(sample) = c.format.as_deref().and_then(format_sample) {
        out.push(json!(sample));
    }
    out.push(json!(sized_string(6.clamp(min.max(1), max.max(1)))));
    if c.min_length.is_some() {
        out.push(json!(sized_string(min)));
    }
    if c.max_length.is_some() {
        out.push(json!(sized_string(max)));
    }
    if !c.patterns.is_empty() {
        out.extend(PATTERN_GUESSES.iter().map(|s| json!(s)));
    }
    out
}

fn integer_candidates(c: &IntegerConstraints) -> Vec<Value> {
    if let Some(values) = &c.enumeration {
        return values.iter().map(|i| json!(i)).collect();
    }
    let mut raw = vec![1, 0];
    raw.extend(c.minimum);
    raw.extend(c.maximum);
    if let (Some(lo), Some(hi)) = (c.minimum, c.maximum) {
        raw.push(lo.saturating_add(hi.saturating_sub(lo) / 2));
    }
    if let Some(m) = c.multiple_of {
        raw.push(m);
        if let Some(lo) = c.minimum {
            raw.push(lo.div_euclid(m).saturating_add(1).saturating_mul(m));
        }
        if let Some(hi) = c.maximum {
            raw.push(hi.div_euclid(m).saturating_mul(m));
        }
    }
    raw.into_iter().map(|i| json!(i)).collect()
}

fn number_candidates(c: &NumberConstraints) -> Vec<Value> {
    if let Some(values) = &c.enumeration {
        return values.iter().map(|f| json!(f)).collect();
    }
    let mut raw = vec![1.0, 0.0];
    raw.extend(c.minimum);
    raw.extend(c.maximum);
    if let Some(lo) = c.minimum {
        raw.push(lo + 0.5);
    }
    if let Some(hi) = c.maximum {
        raw.push(hi - 0.5);
    }
    if let (Some(lo), Some(hi)) = (c.minimum, c.maximum) {
        raw.push(lo + (hi - lo) / 2.0);
    }
    if let Some(m) = c.multiple_of {
        // Snap every candidate onto the step, then add small powers of two
        // times the step, which stay exact in binary.
        let snapped: Vec<f64> = raw
            .iter()
            .flat_map(|f| [(f / m).ceil() * m, (f / m).floor() * m])
            .collect();
        raw.extend(snapped);
        raw.extend([m, 2.0 * m, 4.0 * m]);
    }
    raw.into_iter()
        .filter(|f| f.is_finite())
        .map(|f| json!(f))
        .collect()
}

fn array_candidates(c: &ArrayConstraints, depth: u32) -> Vec<Value> {
    let items = representatives_inner(&c.items, depth + 1);
    if items.is_empty() {
        return if c.min_items == 0 { vec![json!([])] } else { vec![] };
    }
    let max = c.max_items.unwrap_or(MAX_ARRAY_LEN).min(MAX_ARRAY_LEN.max(c.min_items));
    let fill = |len: usize, start: usize| -> Value {
        Value::Array(items.iter().cycle().skip(start).take(len).cloned().collect())
    };

    // One array per item representative, then the length bounds
    let len = c.min_items.max(1);
    let mut out: Vec<Value> = (0..items.len()).map(|i| fill(len, i)).collect();
    out.push(fill(c.min_items, 0));
    out.push(fill(max, 0));
    out
}

fn fixed_object(c: &ObjectConstraints, fill: Fill, depth: u32) -> Option<Value> {
    let mut obj = Map::new();
    for prop in &c.properties {
        if !prop.required && fill == Fill::Minimal {
            continue;
        }
        let value = match &prop.ty.kind {
            TypeKind::Object(nested) => fixed_object(nested, fill, depth + 1),
            _ => representatives_inner(&prop.ty, depth + 1).into_iter().next(),
        };
        match value {
            Some(v) => {
                obj.insert(prop.name.clone(), v);
            }
            None if prop.required => return None,
            None => {}
        }
    }
    Some(Value::Object(obj))
}

fn random_value(ty: &ParamType, rng: &mut impl Rng, depth: u32) -> Option<Value> {
    match &ty.kind {
        TypeKind::String(c) => random_string(c, rng),
        TypeKind::Integer(c) => random_integer(c, rng),
        TypeKind::Number(c) => random_number(c, rng),
        TypeKind::Boolean => Some(Value::Bool(rng.gen_bool(0.5))),
        TypeKind::Array(c) => {
            let max = c
                .max_items
                .unwrap_or(c.min_items + 3)
                .min(c.min_items + 3)
                .max(c.min_items);
            let len = rng.gen_range(c.min_items..=max);
            (0..len)
                .map(|_| generate_inner(&c.items, Fill::Random, rng, depth + 1))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array)
        }
        TypeKind::Object(c) => {
            let mut obj = Map::new();
            for prop in &c.properties {
                if prop.required || rng.gen_bool(0.5) {
                    match generate_inner(&prop.ty, Fill::Random, rng, depth + 1) {
                        Some(v) => {
                            obj.insert(prop.name.clone(), v);
                        }
                        None if prop.required => return None,
                        None => {}
                    }
                }
            }
            Some(Value::Object(obj))
        }
        TypeKind::Any => Some(Value::String(random_alnum(rng, 8))),
    }
}

fn random_string(c: &StringConstraints, rng: &mut impl Rng) -> Option<Value> {
    if let Some(values) = &c.enumeration {
        return values.choose(rng).map(|s| json!(s));
    }
    if let Some(format) = c.format.as_deref() {
        if let Some(v) = random_format(format, rng) {
            return Some(json!(v));
        }
    }
    let min = c.min_length.unwrap_or(1).min(MAX_STRING_LEN);
    let max = c
        .max_length
        .unwrap_or(min + 20)
        .min(min + 20)
        .min(MAX_STRING_LEN)
        .max(min);
    let len = rng.gen_range(min..=max);
    Some(json!(random_alnum(rng, len)))
}

fn random_format(format: &str, rng: &mut impl Rng) -> Option<String> {
    Some(match format {
        "email" => format!("user{}@example.com", rng.gen_range(1..9999_u32)),
        "uuid" => format!(
            "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
            rng.r#gen::<u32>(),
            rng.r#gen::<u16>(),
            rng.r#gen::<u16>() & 0x0FFF,
            (rng.r#gen::<u16>() & 0x3FFF) | 0x8000,
            rng.r#gen::<u64>() & 0xFFFF_FFFF_FFFF,
        ),
        "date" => format!(
            "20{:02}-{:02}-{:02}",
            rng.gen_range(0..30),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28)
        ),
        "date-time" => format!(
            "20{:02}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            rng.gen_range(0..30),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28),
            rng.gen_range(0..24),
            rng.gen_range(0..60),
            rng.gen_range(0..60)
        ),
        "ipv4" => format!(
            "10.{}.{}.{}",
            rng.gen_range(0..=255),
            rng.gen_range(0..=255),
            rng.gen_range(1..=254)
        ),
        other => return format_sample(other).map(String::from),
    })
}

fn random_integer(c: &IntegerConstraints, rng: &mut impl Rng) -> Option<Value> {
    if let Some(values) = &c.enumeration {
        return values.choose(rng).map(|i| json!(i));
    }
    let lo = c
        .minimum
        .unwrap_or_else(|| c.maximum.map_or(0, |hi| hi.saturating_sub(1000)));
    let hi = c.maximum.unwrap_or_else(|| lo.saturating_add(1000));
    if lo > hi {
        return None;
    }
    let mut v = rng.gen_range(lo..=hi);
    if let Some(m) = c.multiple_of {
        v = v.div_euclid(m).saturating_mul(m);
        if v < lo {
            v = v.saturating_add(m);
        }
    }
    Some(json!(v))
}

fn random_number(c: &NumberConstraints, rng: &mut impl Rng) -> Option<Value> {
    if let Some(values) = &c.enumeration {
        return values.choose(rng).map(|f| json!(f));
    }
    let lo = c
        .minimum
        .unwrap_or_else(|| c.maximum.map_or(0.0, |hi| hi - 1000.0));
    let hi = c.maximum.unwrap_or(lo + 1000.0);
    if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
        return c.minimum.map(|v| json!(v));
    }
    let v = rng.gen_range(lo..=hi);
    match c.multiple_of {
        Some(m) => {
            let snapped = (v / m).round() * m;
            Some(json!(if snapped < lo { snapped + m } else { snapped }))
        }
        None => Some(json!(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn ty(schema: Value) -> ParamType {
        ParamType::from_schema(&schema).unwrap()
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn enum_representatives_cover_every_member() {
        let reps = representatives(&ty(json!({"type": "string", "enum": ["up", "down", "standby"]})));
        assert_eq!(reps, vec![json!("up"), json!("down"), json!("standby")]);
    }

    #[test]
    fn integer_bounds_are_representatives() {
        let reps = representatives(&ty(json!({"type": "integer", "minimum": 5, "maximum": 9})));
        assert_eq!(reps[0], json!(5));
        assert!(reps.contains(&json!(9)));
        assert!(reps.contains(&json!(7)));
        assert!(!reps.contains(&json!(0)));
    }

    #[test]
    fn integer_multiple_of_snaps_into_range() {
        let reps = representatives(&ty(json!({"type": "integer", "minimum": 11, "maximum": 29, "multipleOf": 10})));
        assert_eq!(reps, vec![json!(20)]);
    }

    #[test]
    fn number_exclusive_bounds_excluded() {
        let reps = representatives(&ty(json!({"type": "number", "minimum": 0, "maximum": 1, "exclusiveMinimum": true, "exclusiveMaximum": true})));
        assert!(!reps.is_empty());
        assert!(reps.iter().all(|v| {
            let f = v.as_f64().unwrap();
            f > 0.0 && f < 1.0
        }));
    }

    #[test]
    fn number_multiple_of_stays_on_the_step() {
        let t = ty(json!({"type": "number", "minimum": 0, "maximum": 10, "multipleOf": 0.5}));
        let reps = representatives(&t);
        assert!(reps.contains(&json!(0.0)));
        assert!(reps.contains(&json!(10.0)));
        assert!(reps.contains(&json!(5.0)));
        for v in &reps {
            let f = v.as_f64().unwrap();
            assert_eq!((f * 2.0).fract(), 0.0, "{v}");
        }
        for seed in 0..50 {
            let v = generate(&t, Fill::Random, &mut SmallRng::seed_from_u64(seed)).unwrap();
            assert!(t.accepts(&v), "{v}");
            assert_eq!((v.as_f64().unwrap() * 2.0).fract(), 0.0, "{v}");
        }
    }

    #[test]
    fn string_length_bounds_are_representatives() {
        let reps = representatives(&ty(json!({"type": "string", "minLength": 3, "maxLength": 10})));
        let lengths: Vec<usize> = reps
            .iter()
            .map(|v| v.as_str().unwrap().chars().count())
            .collect();
        assert!(lengths.contains(&3));
        assert!(lengths.contains(&10));
        assert!(lengths.iter().all(|l| (3..=10).contains(l)));
    }

    #[test]
    fn format_sample_comes_first() {
        let reps = representatives(&ty(json!({"type": "string", "format": "uuid"})));
        assert_eq!(reps, vec![json!("123e4567-e89b-42d3-a456-426614174000")]);
    }

    #[test]
    fn pattern_filters_candidates() {
        let reps = representatives(&ty(json!({"type": "string", "pattern": "^[0-9]+$"})));
        assert!(!reps.is_empty());
        assert!(reps.iter().all(|v| v.as_str().unwrap().chars().all(|c| c.is_ascii_digit())));
    }

    #[test]
    fn unmatched_pattern_has_no_representatives() {
        let t = ty(json!({"type": "string", "pattern": "^zz[0-9]{5}zz$"}));
        assert!(representatives(&t).is_empty());
        assert!(generate(&t, Fill::Minimal, &mut rng()).is_none());
        assert!(generate(&t, Fill::Random, &mut rng()).is_none());
    }

    #[test]
    fn array_of_enum_has_singletons() {
        let reps = representatives(&ty(json!({"type": "array", "items": {"type": "string", "enum": ["a", "b"]}})));
        assert!(reps.contains(&json!(["a"])));
        assert!(reps.contains(&json!(["b"])));
        assert!(reps.contains(&json!([])));
    }

    #[test]
    fn object_minimal_and_full() {
        let t = ty(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "integer", "minimum": 18}},
            "required": ["name"]
        }));
        let minimal = generate(&t, Fill::Minimal, &mut rng()).unwrap();
        assert_eq!(minimal, json!({"name": "sample"}));
        let full = generate(&t, Fill::Full, &mut rng()).unwrap();
        assert_eq!(full, json!({"name": "sample", "age": 18}));
    }

    #[test]
    fn random_values_are_accepted_and_seeded() {
        let t = ty(json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "minimum": 1, "maximum": 100},
                "tags": {"type": "array", "items": {"type": "string", "maxLength": 4}, "maxItems": 3},
                "ratio": {"type": "number", "minimum": 0, "maximum": 1},
                "created": {"type": "string", "format": "date-time"}
            },
            "required": ["id", "created"]
        }));
        for seed in 0..50 {
            let a = generate(&t, Fill::Random, &mut SmallRng::seed_from_u64(seed)).unwrap();
            let b = generate(&t, Fill::Random, &mut SmallRng::seed_from_u64(seed)).unwrap();
            assert!(t.accepts(&a), "{a}");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn coerce_by_type() {
        assert_eq!(coerce(&ty(json!({"type": "integer"})), "42"), json!(42));
        assert_eq!(coerce(&ty(json!({"type": "integer"})), "x"), json!("x"));
        assert_eq!(coerce(&ty(json!({"type": "number"})), "1.5"), json!(1.5));
        assert_eq!(coerce(&ty(json!({"type": "boolean"})), "true"), json!(true));
        assert_eq!(
            coerce(&ty(json!({"type": "array", "items": {"type": "integer"}})), "1,2"),
            json!([1, 2])
        );
        assert_eq!(coerce(&ParamType::string(), "abc"), json!("abc"));
    }

    #[test]
    fn param_string_rendering() {
        assert_eq!(value_to_param_string(&json!("up")), "up");
        assert_eq!(value_to_param_string(&json!(12)), "12");
        assert_eq!(value_to_param_string(&json!(true)), "true");
    }
}
