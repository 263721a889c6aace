//! Validation of data source configuration against a [`Schema`].
//!
//! Every user-settable attribute is optional. Type mismatches and values
//! outside an allowed set are errors. Setting a deprecated attribute is a warning.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_opennebula::schema::{Attribute, AttributeType, Schema};
//! use hemmer_provider_opennebula::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::optional_computed(AttributeType::String))
//!     .with_attribute("primary_group", Attribute::optional_computed(AttributeType::Int64));
//!
//! let diagnostics = validate(&schema, &json!({"name": "alice", "primary_group": 0}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"primary_group": "zero"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics.iter().next().unwrap().attribute.as_deref(), Some("primary_group"));
//! ```

use serde_json::Value;

use crate::config::is_allowed;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{Attribute, AttributeType, Schema};
use crate::template::value_type_name;

/// Validate a JSON configuration against a schema.
///
/// # Validation Rules
///
/// - Attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - String attributes with allowed values must use one of them
/// - Deprecated attributes that are set produce a warning
pub fn validate(schema: &Schema, value: &Value) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return diagnostics,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }
    diagnostics
}

/// Check if a JSON configuration is free of validation errors.
///
/// Warnings do not make a configuration invalid.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    !validate(schema, value).has_errors()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Diagnostics,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    let v = match value {
        None | Some(Value::Null) => return,
        Some(v) => v,
    };

    if let Some(notice) = &attr.deprecated {
        diagnostics.push(
            Diagnostic::warning(format!("Attribute '{}' is deprecated", path))
                .with_detail(notice.clone())
                .with_attribute(path),
        );
    }

    let errors_before = diagnostics.errors().count();
    validate_attribute_type(&attr.attr_type, v, path, diagnostics);
    if diagnostics.errors().count() > errors_before {
        return;
    }

    if let (Some(allowed), Some(s)) = (&attr.allowed_values, v.as_str()) {
        if !is_allowed(s, allowed.as_slice()) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(format!(
                        "Got {:?}, expected one of: {}",
                        s,
                        allowed.join(", ")
                    ))
                    .with_attribute(path),
            );
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Diagnostics,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
    }
}

/// Ids decode into `i64`, so whole floats such as `1.0` are not integers here.
fn is_int64(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.is_i64())
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
