//! The free-form attribute template attached to OpenNebula objects.
//!
//! A [`Template`] is an ordered list of key/value pairs. Keys may repeat and a
//! value is either a plain string or a nested template (OpenNebula calls these
//! vector attributes). Order is kept so a template survives a round-trip, but
//! lookups do not depend on it.
//!
//! # Wire forms
//!
//! Transports may hand templates over in either of two JSON shapes:
//!
//! - a list of pairs: `[{"key": "A", "value": "1"}, {"key": "A", "value": "2"}]`
//! - an object: `{"A": ["1", "2"], "NIC": {"IP": "10.0.0.1"}}`, where an array
//!   value stands for a repeated key and an object value for a nested template
//!
//! Templates always serialize back to the list-of-pairs form.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::DecodeError;

/// A single template attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pair {
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: PairValue,
}

/// The value side of a template attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PairValue {
    /// A plain string.
    Scalar(String),
    /// A nested template.
    Vector(Template),
}

impl PairValue {
    /// The string value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Vector(_) => None,
        }
    }

    /// The nested template, if this is a vector attribute.
    pub fn as_vector(&self) -> Option<&Template> {
        match self {
            Self::Scalar(_) => None,
            Self::Vector(t) => Some(t),
        }
    }
}

impl From<&str> for PairValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for PairValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Template> for PairValue {
    fn from(value: Template) -> Self {
        Self::Vector(value)
    }
}

/// An ordered, possibly repeating set of template attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pairs: Vec<Pair>,
}

impl Template {
    /// Create an empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<PairValue>) {
        self.pairs.push(Pair {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Append an attribute, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PairValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Number of attributes, counting repeats.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the template has no attributes.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over attributes in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.pairs.iter()
    }

    /// First scalar value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .filter(|p| p.key == key)
            .find_map(|p| p.value.as_scalar())
    }

    /// Every scalar value stored under `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |p| p.key == key)
            .filter_map(|p| p.value.as_scalar())
    }

    /// First nested template stored under `key`.
    pub fn get_vector(&self, key: &str) -> Option<&Template> {
        self.pairs
            .iter()
            .filter(|p| p.key == key)
            .find_map(|p| p.value.as_vector())
    }

    /// Decode a template from its JSON representation.
    ///
    /// `null` decodes to an empty template.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        decode_template(value, "template")
    }
}

impl<'a> IntoIterator for &'a Template {
    type Item = &'a Pair;
    type IntoIter = std::slice::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Template {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut template = Template::new();
        for (key, value) in iter {
            let value: String = value.into();
            template.push(key, value);
        }
        template
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.pairs)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Template::from_value(&value).map_err(D::Error::custom)
    }
}

/// Renders OpenNebula template syntax.
///
/// ```
/// use hemmer_provider_opennebula::template::Template;
///
/// let nic = Template::new().with("IP", "10.0.0.1").with("MAC", "02:00");
/// let tpl = Template::new().with("EMAIL", "a@b.c").with("NIC", nic);
/// assert_eq!(tpl.to_string(), "EMAIL=\"a@b.c\"\nNIC=[IP=\"10.0.0.1\",MAC=\"02:00\"]\n");
/// ```
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pair in &self.pairs {
            write_pair(f, pair)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_pair(f: &mut fmt::Formatter<'_>, pair: &Pair) -> fmt::Result {
    write!(f, "{}=", pair.key)?;
    match &pair.value {
        PairValue::Scalar(s) => write!(f, "\"{}\"", escape(s)),
        PairValue::Vector(nested) => {
            write!(f, "[")?;
            for (i, inner) in nested.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write_pair(f, inner)?;
            }
            write!(f, "]")
        },
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Collapse a template into a flat key/value map.
///
/// Only scalar attributes take part; nested templates are skipped. When a key
/// repeats, the last value seen wins. This conversion is lossy for repeated
/// keys and has no inverse.
///
/// # Examples
///
/// ```
/// use hemmer_provider_opennebula::template::{pairs_to_map, Template};
///
/// let tpl = Template::new().with("SSH_KEY", "a").with("SSH_KEY", "b");
/// assert_eq!(pairs_to_map(&tpl)["SSH_KEY"], "b");
/// ```
pub fn pairs_to_map(template: &Template) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for pair in template {
        if let PairValue::Scalar(value) = &pair.value {
            map.insert(pair.key.clone(), value.clone());
        }
    }
    map
}

fn decode_template(value: &Value, path: &str) -> Result<Template, DecodeError> {
    match value {
        Value::Null => Ok(Template::new()),
        Value::Array(items) => decode_pair_list(items, path),
        Value::Object(map) => {
            let mut template = Template::new();
            for (key, item) in map {
                let item_path = format!("{}.{}", path, key);
                match item {
                    Value::Array(repeats) => {
                        for (i, repeat) in repeats.iter().enumerate() {
                            let repeat_path = format!("{}.{}", item_path, i);
                            template.push(key.clone(), decode_object_value(repeat, &repeat_path)?);
                        }
                    },
                    other => template.push(key.clone(), decode_object_value(other, &item_path)?),
                }
            }
            Ok(template)
        },
        other => Err(unexpected(path, "template", other)),
    }
}

fn decode_pair_list(items: &[Value], path: &str) -> Result<Template, DecodeError> {
    let mut template = Template::new();
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, i);
        let obj = item
            .as_object()
            .ok_or_else(|| unexpected(&item_path, "key/value pair", item))?;
        let key = match obj.get("key") {
            Some(Value::String(key)) => key.clone(),
            Some(other) => return Err(unexpected(&format!("{}.key", item_path), "string", other)),
            None => return Err(unexpected(&format!("{}.key", item_path), "string", &Value::Null)),
        };
        let value_path = format!("{}.value", item_path);
        let value = match obj.get("value").unwrap_or(&Value::Null) {
            Value::Array(nested) => PairValue::Vector(decode_pair_list(nested, &value_path)?),
            other => decode_object_value(other, &value_path)?,
        };
        template.push(key, value);
    }
    Ok(template)
}

fn decode_object_value(value: &Value, path: &str) -> Result<PairValue, DecodeError> {
    match value {
        Value::String(s) => Ok(PairValue::Scalar(s.clone())),
        Value::Number(n) => Ok(PairValue::Scalar(n.to_string())),
        Value::Object(_) => Ok(PairValue::Vector(decode_template(value, path)?)),
        other => Err(unexpected(path, "string or nested template", other)),
    }
}

fn unexpected(path: &str, expected: &'static str, got: &Value) -> DecodeError {
    DecodeError::UnexpectedType {
        path: path.to_string(),
        expected,
        got: value_type_name(got),
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
