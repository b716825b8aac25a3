//! Dot-path access into state objects and canonical JSON comparison.

use serde_json::{Map, Value};

/// Read the value at a dot-delimited path. Missing segments yield `None`.
pub fn get_path<'a>(state: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = state.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Read the value at `path` inside an arbitrary (possibly non-object) value.
pub fn get_value_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    value.as_object().and_then(|map| get_path(map, path))
}

/// Whether `path` resolves to any value (including `null`).
pub fn has_path(state: &Map<String, Value>, path: &str) -> bool {
    get_path(state, path).is_some()
}

/// Write `value` at a dot-delimited path, creating intermediate objects.
///
/// A non-object found midway is replaced by an object.
pub fn set_path(state: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            state.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = state
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Serialize with object keys sorted at every level, so structurally equal
/// values always produce the same text.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Number(n) => out.push_str(&canonical_number(n)),
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Integral floats print as integers so `500.0` and `500` compare equal.
fn canonical_number(n: &serde_json::Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 2f64.powi(53)) {
            return format!("{}", f as i64);
        }
    }
    n.to_string()
}

/// Deep structural equality by canonical serialization.
pub fn same_value(a: &Value, b: &Value) -> bool {
    canonical_json(a) == canonical_json(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn get_nested_and_missing() {
        let state = obj(json!({"trip": {"destination": "Tokyo"}, "budget": null}));
        assert_eq!(get_path(&state, "trip.destination"), Some(&json!("Tokyo")));
        assert_eq!(get_path(&state, "budget"), Some(&Value::Null));
        assert_eq!(get_path(&state, "trip.dates"), None);
        assert_eq!(get_path(&state, "budget.amount"), None);
    }

    #[test]
    fn set_creates_and_replaces_intermediates() {
        let mut state = obj(json!({"trip": "not an object"}));
        set_path(&mut state, "trip.destination", json!("Lisbon"));
        set_path(&mut state, "a.b.c", json!(1));
        assert_eq!(Value::Object(state), json!({"trip": {"destination": "Lisbon"}, "a": {"b": {"c": 1}}}));
    }

    #[test]
    fn canonical_json_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, {"k": 2, "j": 3}], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, {"j": 3, "k": 2}]}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"x":null,"y":[1,{"j":3,"k":2}]},"b":1}"#);
    }

    #[test]
    fn array_order_matters() {
        assert!(!same_value(&json!([1, 2]), &json!([2, 1])));
        assert!(same_value(&json!("x"), &json!("x")));
    }

    #[test]
    fn integral_floats_equal_integers() {
        let stored: Value = serde_json::from_str(r#"{"budget": 500}"#).unwrap();
        let echoed: Value = serde_json::from_str(r#"{"budget": 500.0}"#).unwrap();
        assert!(same_value(&stored["budget"], &echoed["budget"]));
        assert_eq!(canonical_json(&json!(-3.0)), "-3");
        assert!(!same_value(&json!(500.5), &json!(500)));
    }

    #[test]
    fn canonical_json_escapes_keys() {
        assert_eq!(canonical_json(&json!({"a\"b": 1})), r#"{"a\"b":1}"#);
    }
}
