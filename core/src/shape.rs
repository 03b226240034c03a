//! Declarative response shapes and the structural validator that checks
//! decoded bodies against them.
//!
//! # Design
//! A [`Shape`] is plain data: it can be built in code with the constructor
//! helpers or deserialized from a config file (`{"type": "object", ...}`).
//! Validation is a pure walk over the `serde_json::Value` that collects every
//! mismatch instead of stopping at the first one, so a single error carries
//! the full diff.
//!
//! Objects strip keys the shape does not mention from the *returned* value by
//! default. The input is only borrowed and never modified.
//!
//! The client depends on the [`SchemaValidator`] trait rather than on this
//! walker directly, so a different validation mechanism (JSON Schema, a
//! generated checker) can be injected without touching the retry loop.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How an object shape treats keys it does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeys {
    /// Accept them but leave them out of the validated value.
    #[default]
    Strip,
    /// Accept them and keep them.
    Passthrough,
    /// Report each one as an issue.
    Reject,
}

/// Expected structure of a decoded JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Any,
    Null,
    Bool,
    Number,
    Integer,
    String,
    Literal {
        value: Value,
    },
    Array {
        items: Box<Shape>,
    },
    /// String-keyed map whose values all share one shape.
    Record {
        values: Box<Shape>,
    },
    Object {
        fields: BTreeMap<String, Shape>,
        #[serde(default)]
        unknown_keys: UnknownKeys,
    },
    /// Absent or `null` is accepted; anything else must match `inner`.
    Optional {
        inner: Box<Shape>,
    },
    /// The first variant that matches wins.
    OneOf {
        variants: Vec<Shape>,
    },
}

impl Shape {
    pub fn literal(value: impl Into<Value>) -> Self {
        Shape::Literal {
            value: value.into(),
        }
    }

    pub fn array(items: Shape) -> Self {
        Shape::Array {
            items: Box::new(items),
        }
    }

    pub fn record(values: Shape) -> Self {
        Shape::Record {
            values: Box::new(values),
        }
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Shape)>,
    {
        Shape::Object {
            fields: fields.into_iter().map(|(k, s)| (k.into(), s)).collect(),
            unknown_keys: UnknownKeys::Strip,
        }
    }

    pub fn one_of(variants: impl IntoIterator<Item = Shape>) -> Self {
        Shape::OneOf {
            variants: variants.into_iter().collect(),
        }
    }

    pub fn optional(self) -> Self {
        Shape::Optional {
            inner: Box::new(self),
        }
    }

    /// Rejects undeclared keys. No effect on non-object shapes.
    pub fn strict(self) -> Self {
        self.with_unknown_keys(UnknownKeys::Reject)
    }

    /// Keeps undeclared keys in the validated value. No effect on non-object
    /// shapes.
    pub fn passthrough(self) -> Self {
        self.with_unknown_keys(UnknownKeys::Passthrough)
    }

    fn with_unknown_keys(self, policy: UnknownKeys) -> Self {
        match self {
            Shape::Object { fields, .. } => Shape::Object {
                fields,
                unknown_keys: policy,
            },
            other => other,
        }
    }

    /// Whether an object field with this shape may be missing entirely.
    fn accepts_missing(&self) -> bool {
        matches!(self, Shape::Optional { .. } | Shape::Any)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => f.write_str("any"),
            Shape::Null => f.write_str("null"),
            Shape::Bool => f.write_str("boolean"),
            Shape::Number => f.write_str("number"),
            Shape::Integer => f.write_str("integer"),
            Shape::String => f.write_str("string"),
            Shape::Literal { value } => write!(f, "literal {value}"),
            Shape::Array { .. } => f.write_str("array"),
            Shape::Record { .. } => f.write_str("record"),
            Shape::Object { .. } => f.write_str("object"),
            Shape::Optional { inner } => write!(f, "optional {inner}"),
            Shape::OneOf { variants } => {
                f.write_str("one of (")?;
                for (i, variant) in variants.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{variant}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One structural mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location in the body, e.g. `$.items[2].id`.
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, found {}", self.path, self.expected, self.found)
    }
}

/// Outcome of validating a body against an optional shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid(Value),
    Invalid(Vec<ValidationIssue>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    /// Human-readable summary of every issue, `None` when valid.
    pub fn reason(&self) -> Option<String> {
        match self {
            ValidationResult::Valid(_) => None,
            ValidationResult::Invalid(issues) => Some(
                issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
        }
    }

    pub fn into_result(self) -> Result<Value, Vec<ValidationIssue>> {
        match self {
            ValidationResult::Valid(value) => Ok(value),
            ValidationResult::Invalid(issues) => Err(issues),
        }
    }
}

/// Capability the client uses to check decoded bodies.
pub trait SchemaValidator: Send + Sync {
    /// Must not panic. `None` means any decoded body is valid.
    fn validate(&self, body: &Value, shape: Option<&Shape>) -> ValidationResult;
}

/// Default validator: a recursive structural walk over [`Shape`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl SchemaValidator for StructuralValidator {
    fn validate(&self, body: &Value, shape: Option<&Shape>) -> ValidationResult {
        validate(body, shape)
    }
}

/// Validates `body` against `shape` with the structural walker.
pub fn validate(body: &Value, shape: Option<&Shape>) -> ValidationResult {
    let Some(shape) = shape else {
        return ValidationResult::Valid(body.clone());
    };
    let mut issues = Vec::new();
    let value = check(shape, body, "$", &mut issues);
    if issues.is_empty() {
        ValidationResult::Valid(value)
    } else {
        ValidationResult::Invalid(issues)
    }
}

/// Returns the projected value. Only meaningful when no issues were pushed.
fn check(shape: &Shape, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Value {
    match shape {
        Shape::Any => value.clone(),
        Shape::Null => expect(value.is_null(), shape, value, path, issues),
        Shape::Bool => expect(value.is_boolean(), shape, value, path, issues),
        Shape::Number => expect(value.is_number(), shape, value, path, issues),
        Shape::Integer => expect(is_integer(value), shape, value, path, issues),
        Shape::String => expect(value.is_string(), shape, value, path, issues),
        Shape::Literal { value: expected } => {
            if value == expected {
                return value.clone();
            }
            let found = if kind_of(value) == kind_of(expected) {
                value.to_string()
            } else {
                kind_of(value).to_string()
            };
            issues.push(issue(path, shape, found));
            Value::Null
        }
        Shape::Array { items } => {
            let Some(elements) = value.as_array() else {
                return mismatch(shape, value, path, issues);
            };
            elements
                .iter()
                .enumerate()
                .map(|(i, element)| check(items, element, &format!("{path}[{i}]"), issues))
                .collect()
        }
        Shape::Record { values } => {
            let Some(entries) = value.as_object() else {
                return mismatch(shape, value, path, issues);
            };
            let projected: Map<String, Value> = entries
                .iter()
                .map(|(key, entry)| (key.clone(), check(values, entry, &child_path(path, key), issues)))
                .collect();
            Value::Object(projected)
        }
        Shape::Object {
            fields,
            unknown_keys,
        } => {
            let Some(entries) = value.as_object() else {
                return mismatch(shape, value, path, issues);
            };
            let mut projected = Map::new();
            for (name, field_shape) in fields {
                let field_path = child_path(path, name);
                match entries.get(name) {
                    Some(field) => {
                        projected.insert(name.clone(), check(field_shape, field, &field_path, issues));
                    }
                    None if field_shape.accepts_missing() => {}
                    None => issues.push(issue(&field_path, field_shape, "missing".to_string())),
                }
            }
            for (key, extra) in entries.iter().filter(|(key, _)| !fields.contains_key(*key)) {
                match unknown_keys {
                    UnknownKeys::Strip => {}
                    UnknownKeys::Passthrough => {
                        projected.insert(key.clone(), extra.clone());
                    }
                    UnknownKeys::Reject => issues.push(ValidationIssue {
                        path: child_path(path, key),
                        expected: "no such field".to_string(),
                        found: kind_of(extra).to_string(),
                    }),
                }
            }
            Value::Object(projected)
        }
        Shape::Optional { inner } => {
            if value.is_null() {
                Value::Null
            } else {
                check(inner, value, path, issues)
            }
        }
        Shape::OneOf { variants } => {
            for variant in variants {
                let mut scratch = Vec::new();
                let projected = check(variant, value, path, &mut scratch);
                if scratch.is_empty() {
                    return projected;
                }
            }
            mismatch(shape, value, path, issues)
        }
    }
}

fn expect(
    ok: bool,
    shape: &Shape,
    value: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Value {
    if ok {
        value.clone()
    } else {
        mismatch(shape, value, path, issues)
    }
}

fn mismatch(shape: &Shape, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Value {
    issues.push(issue(path, shape, kind_of(value).to_string()));
    Value::Null
}

fn issue(path: &str, shape: &Shape, found: String) -> ValidationIssue {
    ValidationIssue {
        path: path.to_string(),
        expected: shape.to_string(),
        found,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => false,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child_path(parent: &str, key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("{parent}.{key}")
    } else {
        format!("{parent}[{}]", Value::String(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_shape() -> Shape {
        Shape::object([
            ("id", Shape::Integer),
            ("name", Shape::String),
            ("email", Shape::String.optional()),
        ])
    }

    fn issues_of(result: ValidationResult) -> Vec<ValidationIssue> {
        match result {
            ValidationResult::Invalid(issues) => issues,
            ValidationResult::Valid(value) => panic!("expected invalid, got {value}"),
        }
    }

    #[test]
    fn no_shape_accepts_anything() {
        let body = json!({"anything": [1, "two", null]});
        assert_eq!(validate(&body, None), ValidationResult::Valid(body.clone()));
    }

    #[test]
    fn matching_object_is_valid() {
        let body = json!({"id": 7, "name": "Ada", "email": null});
        let result = validate(&body, Some(&user_shape()));
        assert_eq!(result, ValidationResult::Valid(body));
    }

    #[test]
    fn optional_field_may_be_missing() {
        let body = json!({"id": 7, "name": "Ada"});
        assert!(validate(&body, Some(&user_shape())).is_valid());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let issues = issues_of(validate(&json!({"id": 7}), Some(&user_shape())));
        assert_eq!(
            issues,
            vec![ValidationIssue {
                path: "$.name".to_string(),
                expected: "string".to_string(),
                found: "missing".to_string(),
            }]
        );
    }

    #[test]
    fn every_mismatch_is_collected() {
        let body = json!({"id": "7", "name": 3, "email": false});
        let issues = issues_of(validate(&body, Some(&user_shape())));
        let rendered: Vec<String> = issues.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "$.email: expected string, found boolean",
                "$.id: expected integer, found string",
                "$.name: expected string, found number",
            ]
        );
    }

    #[test]
    fn unknown_keys_are_stripped_from_output_only() {
        let body = json!({"id": 1, "name": "Ada", "role": "admin"});
        let result = validate(&body, Some(&user_shape()));
        assert_eq!(result, ValidationResult::Valid(json!({"id": 1, "name": "Ada"})));
        assert_eq!(body["role"], "admin");
    }

    #[test]
    fn passthrough_keeps_unknown_keys() {
        let body = json!({"id": 1, "name": "Ada", "role": "admin"});
        let result = validate(&body, Some(&user_shape().passthrough()));
        assert_eq!(result, ValidationResult::Valid(body));
    }

    #[test]
    fn strict_rejects_unknown_keys() {
        let body = json!({"id": 1, "name": "Ada", "role": "admin"});
        let issues = issues_of(validate(&body, Some(&user_shape().strict())));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].to_string(), "$.role: expected no such field, found string");
    }

    #[test]
    fn array_paths_include_index() {
        let shape = Shape::object([("items", Shape::array(Shape::object([("id", Shape::Integer)])))]);
        let body = json!({"items": [{"id": 1}, {"id": 2}, {"id": "three"}]});
        let issues = issues_of(validate(&body, Some(&shape)));
        assert_eq!(issues[0].path, "$.items[2].id");
    }

    #[test]
    fn odd_keys_are_quoted_in_paths() {
        let shape = Shape::record(Shape::Bool);
        let issues = issues_of(validate(&json!({"feature flag": "yes"}), Some(&shape)));
        assert_eq!(issues[0].path, "$[\"feature flag\"]");
    }

    #[test]
    fn literal_mismatch_shows_value_when_kinds_match() {
        let shape = Shape::object([("status", Shape::literal("ok"))]);
        let issues = issues_of(validate(&json!({"status": "degraded"}), Some(&shape)));
        assert_eq!(issues[0].to_string(), "$.status: expected literal \"ok\", found \"degraded\"");
    }

    #[test]
    fn integer_accepts_whole_floats() {
        assert!(validate(&json!(3.0), Some(&Shape::Integer)).is_valid());
        assert!(!validate(&json!(3.5), Some(&Shape::Integer)).is_valid());
    }

    #[test]
    fn one_of_takes_first_matching_variant() {
        let shape = Shape::one_of([Shape::String, Shape::Integer]);
        assert!(validate(&json!(4), Some(&shape)).is_valid());
        let issues = issues_of(validate(&json!(true), Some(&shape)));
        assert_eq!(issues[0].expected, "one of (string | integer)");
    }

    #[test]
    fn top_level_kind_mismatch() {
        let issues = issues_of(validate(&json!("not an object"), Some(&user_shape())));
        assert_eq!(issues[0].to_string(), "$: expected object, found string");
    }

    #[test]
    fn reason_joins_issues() {
        let result = validate(&json!({}), Some(&user_shape()));
        assert_eq!(
            result.reason().as_deref(),
            Some("$.id: expected integer, found missing; $.name: expected string, found missing")
        );
    }

    #[test]
    fn shape_deserializes_from_tagged_json() {
        let shape: Shape = serde_json::from_value(json!({
            "type": "object",
            "fields": {
                "status": {"type": "literal", "value": "ok"},
                "uptime": {"type": "optional", "inner": {"type": "number"}}
            },
            "unknown_keys": "reject"
        }))
        .unwrap();
        assert_eq!(
            shape,
            Shape::object([
                ("status", Shape::literal("ok")),
                ("uptime", Shape::Number.optional()),
            ])
            .strict()
        );
    }
}
