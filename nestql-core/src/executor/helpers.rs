//! Record and output-tree helpers shared by the engine and executors.

use serde_json::{Map, Value};

use crate::token::TokenField;

/// Write `value` at a dotted path, creating intermediate objects.
///
/// A non-object root is left untouched.
pub fn set_path(root: &mut Value, path: &[String], value: Value) {
    if let Value::Object(map) = root {
        set_in_record(map, path, value);
    }
}

/// [`set_path`] for a record that is already known to be an object.
pub fn set_in_record(record: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut nested = record;
    for key in parents {
        let slot = nested
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        nested = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    nested.insert(last.clone(), value);
}

/// Keep only the requested source fields. Missing fields are left out.
pub fn project(record: &Map<String, Value>, fields: Option<&[TokenField]>) -> Map<String, Value> {
    match fields {
        None => record.clone(),
        Some(fields) => fields
            .iter()
            .filter_map(|f| {
                record
                    .get(&f.source_field)
                    .map(|v| (f.source_field.clone(), v.clone()))
            })
            .collect(),
    }
}

/// Rename `field` to `alias`; the alias is appended at the end of the record.
pub fn rename_field(record: &mut Map<String, Value>, field: &str, alias: &str) {
    let value = record.shift_remove(field).unwrap_or(Value::Null);
    record.insert(alias.to_string(), value);
}
