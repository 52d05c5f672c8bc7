//! Structural schema tree built once from a JSON Schema document.
//!
//! A [`Schema`] keeps three views of the same document: the raw JSON (handed
//! to the model), a compiled [`jsonschema::Validator`] (keyword constraints),
//! and a [`SchemaNode`] tree the response validator walks to report precise
//! `path / expected / found` violations without re-parsing the document.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while loading a schema document.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// The document is not syntactically valid JSON.
    #[error("Schema is not valid JSON: {0}")]
    InvalidJson(String),

    /// The document root is not a JSON object.
    #[error("Schema root must be a JSON object, found {0}")]
    UnsupportedRoot(JsonKind),

    /// The document is JSON but not a usable JSON Schema.
    #[error("Schema failed to compile: {0}")]
    Compile(String),

    /// A `type` keyword names something other than a JSON type.
    #[error("Unsupported type declaration at '{path}': {found}")]
    UnknownType {
        /// Location of the declaration inside the schema tree.
        path: String,
        /// The offending declaration.
        found: String,
    },
}

/// The kind of a JSON value, as named by JSON Schema `type` keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonKind {
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
    /// A JSON string.
    String,
    /// A number without a fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// `null`.
    Null,
}

impl JsonKind {
    /// Classifies a value. Integral numbers report [`JsonKind::Integer`].
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::String(_) => Self::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Null,
        }
    }

    /// Parses a JSON Schema `type` name.
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// Returns `true` when `value` satisfies this type.
    ///
    /// `number` accepts integers, and `integer` accepts floats with a zero
    /// fractional part (`1.0`), matching JSON Schema semantics.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Object, Value::Object(_))
            | (Self::Array, Value::Array(_))
            | (Self::String, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Null, Value::Null) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }

    /// The JSON Schema name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged structural view of a schema document.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// No structural constraint (missing `type`, `$ref`, boolean schemas).
    Any {
        /// Allowed values from `enum` / `const`, if declared.
        allowed: Option<Vec<Value>>,
    },
    /// An object with declared properties.
    Object {
        /// Declared properties by name.
        properties: BTreeMap<String, SchemaNode>,
        /// Names listed under `required`.
        required: Vec<String>,
        /// `false` only when `additionalProperties: false` is declared.
        additional_properties: bool,
    },
    /// An array, optionally with a uniform item schema.
    Array {
        /// Schema every element must satisfy.
        items: Option<Box<SchemaNode>>,
    },
    /// A scalar type with an optional value set.
    Scalar {
        /// The required JSON kind.
        kind: JsonKind,
        /// Allowed values from `enum` / `const`, if declared.
        allowed: Option<Vec<Value>>,
    },
    /// Any of several alternatives (`anyOf`, `oneOf`, `type: [..]`).
    Union(Vec<SchemaNode>),
}

impl SchemaNode {
    /// Builds the tree for a schema (sub-)document located at `path`.
    pub fn from_value(value: &Value, path: &str) -> Result<Self, SchemaError> {
        match value {
            Value::Bool(_) => Ok(Self::Any { allowed: None }),
            Value::Object(map) => Self::from_map(map, path),
            other => Err(SchemaError::UnknownType {
                path: display_path(path).to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn from_map(map: &Map<String, Value>, path: &str) -> Result<Self, SchemaError> {
        if let Some(alternatives) = map
            .get("anyOf")
            .or_else(|| map.get("oneOf"))
            .and_then(Value::as_array)
        {
            let members = alternatives
                .iter()
                .map(|alt| Self::from_value(alt, path))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Union(members));
        }

        let allowed = map
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .or_else(|| map.get("const").map(|c| vec![c.clone()]));

        match map.get("type") {
            Some(Value::String(name)) => Self::for_type(name, map, allowed, path),
            Some(Value::Array(names)) => {
                let mut members = names
                    .iter()
                    .map(|name| match name {
                        Value::String(name) => Self::for_type(name, map, allowed.clone(), path),
                        other => Err(SchemaError::UnknownType {
                            path: display_path(path).to_string(),
                            found: other.to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if members.len() == 1 {
                    Ok(members.remove(0))
                } else {
                    Ok(Self::Union(members))
                }
            }
            Some(other) => Err(SchemaError::UnknownType {
                path: display_path(path).to_string(),
                found: other.to_string(),
            }),
            None if map.contains_key("properties") => Self::for_type("object", map, allowed, path),
            None if map.contains_key("items") => Self::for_type("array", map, allowed, path),
            None => Ok(Self::Any { allowed }),
        }
    }

    fn for_type(
        name: &str,
        map: &Map<String, Value>,
        allowed: Option<Vec<Value>>,
        path: &str,
    ) -> Result<Self, SchemaError> {
        let kind = JsonKind::from_type_name(name).ok_or_else(|| SchemaError::UnknownType {
            path: display_path(path).to_string(),
            found: name.to_string(),
        })?;

        match kind {
            JsonKind::Object => {
                let mut properties = BTreeMap::new();
                if let Some(declared) = map.get("properties").and_then(Value::as_object) {
                    for (key, sub) in declared {
                        let node = Self::from_value(sub, &child_key(path, key))?;
                        properties.insert(key.clone(), node);
                    }
                }
                let required = map
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let additional_properties =
                    map.get("additionalProperties") != Some(&Value::Bool(false));
                Ok(Self::Object {
                    properties,
                    required,
                    additional_properties,
                })
            }
            JsonKind::Array => {
                // Tuple-form `items` (an array of schemas) is left to the keyword pass.
                let items = match map.get("items") {
                    Some(sub @ (Value::Object(_) | Value::Bool(_))) => {
                        Some(Box::new(Self::from_value(sub, &format!("{path}[]"))?))
                    }
                    _ => None,
                };
                Ok(Self::Array { items })
            }
            scalar => Ok(Self::Scalar {
                kind: scalar,
                allowed,
            }),
        }
    }

    /// Short human description of what this node accepts.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any { .. } => "any value".to_string(),
            Self::Object { .. } => "object".to_string(),
            Self::Array { .. } => "array".to_string(),
            Self::Scalar { kind, .. } => kind.to_string(),
            Self::Union(members) => members
                .iter()
                .map(Self::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// Walks `value` against this node, appending every violation found.
    pub fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        match self {
            Self::Any { allowed } => check_allowed(allowed.as_deref(), value, path, out),
            Self::Scalar { kind, allowed } => {
                if kind.accepts(value) {
                    check_allowed(allowed.as_deref(), value, path, out);
                } else {
                    out.push(Violation::mismatch(
                        path,
                        kind.as_str(),
                        JsonKind::of(value).as_str(),
                    ));
                }
            }
            Self::Object {
                properties,
                required,
                additional_properties,
            } => {
                let Value::Object(fields) = value else {
                    out.push(Violation::mismatch(path, "object", JsonKind::of(value).as_str()));
                    return;
                };
                for name in required {
                    if !fields.contains_key(name) {
                        out.push(Violation::mismatch(
                            &child_key(path, name),
                            "required property",
                            "nothing",
                        ));
                    }
                }
                for (key, field) in fields {
                    let child = child_key(path, key);
                    match properties.get(key) {
                        Some(node) => node.check(field, &child, out),
                        None if !additional_properties => out.push(Violation::mismatch(
                            &child,
                            "no undeclared properties",
                            "undeclared property",
                        )),
                        None => {}
                    }
                }
            }
            Self::Array { items } => {
                let Value::Array(elements) = value else {
                    out.push(Violation::mismatch(path, "array", JsonKind::of(value).as_str()));
                    return;
                };
                if let Some(item) = items {
                    for (index, element) in elements.iter().enumerate() {
                        item.check(element, &format!("{path}[{index}]"), out);
                    }
                }
            }
            Self::Union(members) => {
                let matched = members.iter().any(|member| {
                    let mut scratch = Vec::new();
                    member.check(value, path, &mut scratch);
                    scratch.is_empty()
                });
                if !matched {
                    out.push(Violation::mismatch(
                        path,
                        &self.describe(),
                        JsonKind::of(value).as_str(),
                    ));
                }
            }
        }
    }
}

fn check_allowed(allowed: Option<&[Value]>, value: &Value, path: &str, out: &mut Vec<Violation>) {
    if let Some(allowed) = allowed {
        if !allowed.contains(value) {
            let options = allowed
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            out.push(Violation::mismatch(
                path,
                &format!("one of [{options}]"),
                &value.to_string(),
            ));
        }
    }
}

/// A single reason why a value does not conform to a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Structural mismatch: wrong type, missing field, value outside `enum`.
    Mismatch {
        /// Dotted path of the offending value (`""` is the root).
        path: String,
        /// What the schema expects there.
        expected: String,
        /// What the value actually is.
        found: String,
    },
    /// A keyword constraint reported by the full JSON Schema validator.
    Constraint {
        /// Dotted path of the offending value (`""` is the root).
        path: String,
        /// Validator message.
        message: String,
    },
}

impl Violation {
    fn mismatch(path: &str, expected: &str, found: &str) -> Self {
        Self::Mismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Dotted path of the offending value.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Mismatch { path, .. } | Self::Constraint { path, .. } => path,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "at '{}': expected {expected}, got {found}",
                display_path(path)
            ),
            Self::Constraint { path, message } => {
                write!(f, "at '{}': {message}", display_path(path))
            }
        }
    }
}

/// A loaded, compiled schema. Cheap to clone and shareable across runs.
#[derive(Clone)]
pub struct Schema {
    document: Arc<Value>,
    root: Arc<SchemaNode>,
    validator: Arc<jsonschema::Validator>,
}

impl Schema {
    /// Loads a schema from a parsed JSON document.
    pub fn from_value(document: Value) -> Result<Self, SchemaError> {
        if !document.is_object() {
            return Err(SchemaError::UnsupportedRoot(JsonKind::of(&document)));
        }
        let validator =
            jsonschema::Validator::new(&document).map_err(|e| SchemaError::Compile(e.to_string()))?;
        let root = SchemaNode::from_value(&document, "")?;
        Ok(Self {
            document: Arc::new(document),
            root: Arc::new(root),
            validator: Arc::new(validator),
        })
    }

    /// Loads a schema from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
        Self::from_value(document)
    }

    /// Derives the schema of a Rust type.
    pub fn for_type<T: JsonSchema>() -> Result<Self, SchemaError> {
        let document = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
        Self::from_value(document)
    }

    /// The original document.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// The structural tree.
    #[must_use]
    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Pretty-printed document, as embedded in instructions.
    #[must_use]
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&*self.document).unwrap_or_else(|_| self.document.to_string())
    }

    /// Validates an instance, returning every violation found.
    ///
    /// The structural walk runs first; the keyword pass only runs on values
    /// that are structurally sound, so a single defect is not reported twice.
    #[must_use]
    pub fn validate(&self, instance: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.root.check(instance, "", &mut violations);
        if violations.is_empty() {
            violations.extend(self.validator.iter_errors(instance).map(|error| {
                let pointer = error.instance_path.to_string();
                Violation::Constraint {
                    path: pointer_to_path(instance, &pointer),
                    message: error.to_string(),
                }
            }));
        }
        violations
    }

    /// Returns `true` when `instance` has no violations.
    #[must_use]
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validate(instance).is_empty()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("document", &self.document)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Renders the root path (`""`) readably.
#[must_use]
pub fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

fn child_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Converts a JSON pointer (`/items/0/sku`) into dotted notation (`items[0].sku`).
fn pointer_to_path(instance: &Value, pointer: &str) -> String {
    let mut path = String::new();
    let mut current = Some(instance);
    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        match (current, token.parse::<usize>()) {
            (Some(Value::Array(items)), Ok(index)) => {
                let _ = write!(path, "[{index}]");
                current = items.get(index);
            }
            (node, _) => {
                path = child_key(&path, &token);
                current = node.and_then(|n| n.get(token.as_str()));
            }
        }
    }
    path
}
