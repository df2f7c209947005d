//! Tagged values used for column validation and filter matching.
//!
//! Query inputs arrive as `serde_json::Value`. Before they reach a token they
//! are narrowed to a `FilterValue`, so executors match against a closed set of
//! variants instead of inspecting raw JSON.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Declared semantic type of a model column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "boolean")]
    Bool,
    String,
    Number,
    Object,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Object => "object",
        }
    }

    /// Narrow a raw value to a filter constraint of this type.
    ///
    /// Returns `None` when the value's runtime type does not match.
    pub fn accept(&self, value: &Value) -> Option<FilterValue> {
        match (self, value) {
            (ColumnType::Bool, Value::Bool(b)) => Some(FilterValue::Bool(*b)),
            (ColumnType::String, Value::String(s)) => Some(FilterValue::String(s.clone())),
            (ColumnType::Number, Value::Number(n)) => Some(FilterValue::Number(n.clone())),
            (ColumnType::Object, Value::Object(o)) => Some(FilterValue::Object(o.clone())),
            _ => None,
        }
    }

    /// Element-wise variant of [`accept`](Self::accept) for "any of" filters.
    pub fn accept_any_of(&self, values: &[Value]) -> Option<FilterValue> {
        values
            .iter()
            .map(|v| self.accept(v))
            .collect::<Option<Vec<_>>>()
            .map(FilterValue::AnyOf)
    }
}

/// A single filter constraint on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(Number),
    String(String),
    Object(Map<String, Value>),
    AnyOf(Vec<FilterValue>),
}

impl FilterValue {
    /// Convert a cached join key into a constraint. `null` keys match nothing.
    pub fn from_key(value: &Value) -> Option<FilterValue> {
        match value {
            Value::Bool(b) => Some(FilterValue::Bool(*b)),
            Value::Number(n) => Some(FilterValue::Number(n.clone())),
            Value::String(s) => Some(FilterValue::String(s.clone())),
            Value::Object(o) => Some(FilterValue::Object(o.clone())),
            Value::Array(items) => Some(FilterValue::AnyOf(
                items.iter().filter_map(FilterValue::from_key).collect(),
            )),
            Value::Null => None,
        }
    }

    /// Build an "any of" constraint from a list of cached keys.
    pub fn any_of_keys<'a>(keys: impl IntoIterator<Item = &'a Value>) -> FilterValue {
        FilterValue::AnyOf(keys.into_iter().filter_map(FilterValue::from_key).collect())
    }

    /// Check whether a record's column value satisfies this constraint.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FilterValue::Bool(a), Value::Bool(b)) => a == b,
            (FilterValue::Number(a), Value::Number(b)) => compare_numbers(a, b) == Ordering::Equal,
            (FilterValue::String(a), Value::String(b)) => a == b,
            (FilterValue::Object(a), Value::Object(b)) => a == b,
            (FilterValue::AnyOf(options), _) => options.iter().any(|o| o.matches(value)),
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Number(n) => Value::Number(n.clone()),
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Object(o) => Value::Object(o.clone()),
            FilterValue::AnyOf(items) => Value::Array(items.iter().map(|i| i.to_value()).collect()),
        }
    }
}

/// Stable lookup key for a JSON value, used to index cached records.
///
/// Integers keep their exact text; an integral float such as `1.0` is folded
/// into the integer form so it collides with `1`.
pub fn key_of(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return format!("n:{}", i);
            }
            if let Some(u) = n.as_u64() {
                return format!("n:{}", u);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    format!("n:{}", f as i64)
                }
                Some(f) if f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64 => {
                    format!("n:{}", f as u64)
                }
                Some(f) => format!("n:{}", f),
                None => format!("n:{}", n),
            }
        }
        other => other.to_string(),
    }
}

/// Order two numbers, exactly when both are integers.
///
/// Only a float on either side falls back to f64.
pub fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    if a.is_f64() || b.is_f64() {
        let a_f64 = a.as_f64().unwrap_or(0.0);
        let b_f64 = b.as_f64().unwrap_or(0.0);
        return a_f64.partial_cmp(&b_f64).unwrap_or(Ordering::Equal);
    }
    // a negative integer against one above i64::MAX
    if a.as_u64().is_none() {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Compare two JSON values for ordering.
///
/// Null < Bool < Number < String; arrays and objects compare equal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accept_matches_declared_type() {
        assert_eq!(
            ColumnType::Number.accept(&json!(11)),
            Some(FilterValue::Number(11.into()))
        );
        assert_eq!(ColumnType::Number.accept(&json!("11")), None);
        assert_eq!(ColumnType::Bool.accept(&json!(1)), None);
        assert!(ColumnType::Object.accept(&json!({"a": 1})).is_some());
    }

    #[test]
    fn test_accept_any_of_rejects_mixed_elements() {
        assert!(ColumnType::Number.accept_any_of(&[json!(1), json!(2)]).is_some());
        assert!(ColumnType::Number.accept_any_of(&[json!(1), json!("2")]).is_none());
        assert_eq!(
            ColumnType::String.accept_any_of(&[]),
            Some(FilterValue::AnyOf(vec![]))
        );
    }

    #[test]
    fn test_matches() {
        let any = FilterValue::any_of_keys(&[json!(1), json!(3), Value::Null]);
        assert!(any.matches(&json!(3)));
        assert!(any.matches(&json!(1.0)));
        assert!(!any.matches(&json!(2)));
        assert!(!any.matches(&Value::Null));

        assert!(FilterValue::String("a".into()).matches(&json!("a")));
        assert!(!FilterValue::String("1".into()).matches(&json!(1)));
    }

    #[test]
    fn test_column_type_names_deserialize() {
        let ty: ColumnType = serde_json::from_value(json!("boolean")).unwrap();
        assert_eq!(ty, ColumnType::Bool);
        let ty: ColumnType = serde_json::from_value(json!("number")).unwrap();
        assert_eq!(ty.name(), "number");
    }

    #[test]
    fn test_key_of_normalizes_numbers() {
        assert_eq!(key_of(&json!(1)), key_of(&json!(1.0)));
        assert_ne!(key_of(&json!(1)), key_of(&json!("1")));
    }

    #[test]
    fn test_large_integers_stay_distinct() {
        let a = json!(9007199254740992u64);
        let b = json!(9007199254740993u64);
        assert_ne!(key_of(&a), key_of(&b));
        assert_eq!(key_of(&b), "n:9007199254740993");

        let filter = FilterValue::from_key(&b).unwrap();
        assert!(filter.matches(&b));
        assert!(!filter.matches(&a));
        assert!(!FilterValue::any_of_keys(&[a.clone()]).matches(&b));

        assert_eq!(compare_values(&a, &b), Ordering::Less);
        assert_eq!(compare_values(&json!(-1), &json!(u64::MAX)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(key_of(&json!(-3.0)), key_of(&json!(-3)));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&Value::Null, &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
