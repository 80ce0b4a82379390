//! Runtime values for FHIRPath evaluation
//!
//! Every expression evaluates to an ordered collection. Complex FHIR
//! elements stay as raw JSON objects; primitives are lifted into typed
//! variants so arithmetic and comparison work without re-parsing.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde_json::Value as Json;
use smallvec::SmallVec;

/// An ordered collection of values, the result of every evaluation step
pub type Collection = SmallVec<[Value; 1]>;

/// A single FHIRPath runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    /// Date literal as its ISO-8601 text (partial precision allowed)
    Date(String),
    DateTime(String),
    Time(String),
    Quantity {
        value: Decimal,
        unit: Option<String>,
    },
    /// A complex element or resource, kept as JSON
    Object(Json),
}

impl Value {
    /// Lift a JSON value into runtime values, flattening arrays
    pub fn from_json(json: &Json) -> Collection {
        let mut out = Collection::new();
        push_json(&mut out, json);
        out
    }

    /// Lower back to JSON (used for variable hand-off and debugging output)
    pub fn to_json(&self) -> Json {
        match self {
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Decimal(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) | Value::Date(s) | Value::DateTime(s) | Value::Time(s) => {
                Json::String(s.clone())
            }
            Value::Quantity { value, unit } => {
                let mut map = serde_json::Map::new();
                if let Some(n) = value.to_f64().and_then(serde_json::Number::from_f64) {
                    map.insert("value".to_string(), Json::Number(n));
                }
                if let Some(unit) = unit {
                    map.insert("unit".to_string(), Json::String(unit.clone()));
                }
                Json::Object(map)
            }
            Value::Object(json) => json.clone(),
        }
    }

    /// Numeric view, promoting integers to decimals
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::Quantity { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// String view for string functions
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Date(s) | Value::DateTime(s) | Value::Time(s) => Some(s),
            _ => None,
        }
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Time(_) => "Time",
            Value::Quantity { .. } => "Quantity",
            Value::Object(_) => "Object",
        }
    }

    /// Navigate a member of this value.
    ///
    /// Only objects navigate; a missing key falls back to the FHIR
    /// choice-type spelling (`value` resolves `valueDecimal` and friends)
    /// so wire JSON can be walked with model-style paths.
    pub fn navigate(&self, name: &str, out: &mut Collection) {
        let Value::Object(json) = self else {
            return;
        };
        let Some(map) = json.as_object() else {
            return;
        };
        if let Some(child) = map.get(name) {
            push_json(out, child);
            return;
        }
        // Choice-type fallback: value -> value[X]
        if name
            .chars()
            .next()
            .map(char::is_lowercase)
            .unwrap_or(false)
        {
            for (key, child) in map {
                if key.len() > name.len()
                    && key.starts_with(name)
                    && key[name.len()..]
                        .chars()
                        .next()
                        .map(char::is_uppercase)
                        .unwrap_or(false)
                {
                    push_json(out, child);
                    return;
                }
            }
        }
    }
}

fn push_json(out: &mut Collection, json: &Json) {
    match json {
        Json::Null => {}
        Json::Bool(b) => out.push(Value::Boolean(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push(Value::Integer(i));
            } else if let Some(d) = n.as_f64().and_then(Decimal::from_f64) {
                out.push(Value::Decimal(d));
            }
        }
        Json::String(s) => out.push(Value::String(s.clone())),
        Json::Array(items) => {
            for item in items {
                push_json(out, item);
            }
        }
        Json::Object(_) => out.push(Value::Object(json.clone())),
    }
}

/// FHIRPath equality (`=`).
///
/// Numbers compare across Integer/Decimal; temporal values compare as
/// ISO text against plain strings too, because wire JSON carries them as
/// strings. Returns `None` when the types are incomparable.
pub fn values_equal(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => Some(a == b),
        (Value::Quantity { value: a, unit: ua }, Value::Quantity { value: b, unit: ub }) => {
            Some(a == b && ua == ub)
        }
        (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
        _ => {
            if let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) {
                return Some(a == b);
            }
            if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
                return Some(a == b);
            }
            None
        }
    }
}

/// FHIRPath ordering for `<` `<=` `>` `>=`
pub fn values_compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

/// Whether `needle` occurs in `haystack` by FHIRPath equality
pub fn collection_contains(haystack: &Collection, needle: &Value) -> bool {
    haystack
        .iter()
        .any(|v| values_equal(v, needle).unwrap_or(false))
}

/// Singleton boolean conversion: a lone boolean keeps its value, any other
/// lone item converts to true (per the FHIRPath singleton rules)
pub fn to_boolean(collection: &Collection) -> Option<bool> {
    match collection.len() {
        0 => None,
        1 => match &collection[0] {
            Value::Boolean(b) => Some(*b),
            _ => Some(true),
        },
        _ => Some(true),
    }
}
