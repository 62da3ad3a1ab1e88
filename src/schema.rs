//! Validation against a JSON-schema subset
//!
//! Supported keywords: `type`, `items` (single schema or tuple), `properties`,
//! `required`, `enum`, `minimum`, `maximum`, `minLength`, `maxLength`.
//! Unknown keywords are ignored.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One schema violation, located by a JSON pointer into the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Validate a document, returning every violation found
pub fn validate(schema: &Value, doc: &Value) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    validate_at(schema, doc, "", &mut errs);
    errs
}

fn type_matches(kind: &str, value: &Value) -> bool {
    match kind {
        "array" => value.is_array(),
        "object" => value.is_object(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn push(errs: &mut Vec<ValidationError>, path: &str, message: String) {
    errs.push(ValidationError {
        path: path.to_string(),
        message,
    });
}

fn validate_at(schema: &Value, doc: &Value, path: &str, errs: &mut Vec<ValidationError>) {
    let schema = match schema.as_object() {
        Some(s) => s,
        None => return,
    };

    if let Some(kind) = schema.get("type") {
        let ok = match kind {
            Value::String(k) => type_matches(k, doc),
            Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).any(|k| type_matches(k, doc)),
            _ => true,
        };
        if !ok {
            push(errs, path, format!("type should be {}, got {}", kind_label(kind), type_name(doc)));
            // the remaining keywords assume the declared type
            return;
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(doc) {
            push(errs, path, format!("should be one of {}", Value::Array(options.clone())));
        }
    }

    if let Some(n) = doc.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                push(errs, path, format!("must be greater than or equal to {}", min));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                push(errs, path, format!("must be less than or equal to {}", max));
            }
        }
    }

    if let Some(s) = doc.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if len < min {
                push(errs, path, format!("min length of {} characters required", min));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                push(errs, path, format!("max length of {} characters exceeded", max));
            }
        }
    }

    match doc {
        Value::Array(items) => match schema.get("items") {
            Some(Value::Array(tuple)) => {
                for (i, (item_schema, item)) in tuple.iter().zip(items.iter()).enumerate() {
                    validate_at(item_schema, item, &format!("{}/{}", path, i), errs);
                }
            }
            Some(item_schema) => {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{}/{}", path, i), errs);
                }
            }
            None => {}
        },
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(key) {
                        push(errs, path, format!("\"{}\" value is required", key));
                    }
                }
            }
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (key, prop_schema) in props {
                    if let Some(value) = map.get(key) {
                        validate_at(prop_schema, value, &format!("{}/{}", path, key), errs);
                    }
                }
            }
        }
        _ => {}
    }
}

fn kind_label(kind: &Value) -> String {
    match kind {
        Value::String(s) => s.clone(),
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        other => other.to_string(),
    }
}
