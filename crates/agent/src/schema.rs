//! The state model: which fields exist and what each one means.
//!
//! A model is a JSON object mapping field names to natural-language
//! descriptions. Nested objects group fields; their leaves are addressed by
//! dot-joined paths (`trip.destination`). Arrays and other non-object values
//! are leaves whose description is their JSON text.

use serde_json::{Map, Value};
use statewright_core::error::{Error, Result};

use crate::path::{get_path, set_path};

/// One addressable leaf of the state model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub path: String,
    pub description: String,
}

/// A parsed, immutable state model.
#[derive(Debug, Clone)]
pub struct StateModel {
    fields: Vec<FieldSpec>,
}

impl StateModel {
    /// Parse a state model from JSON text.
    pub fn parse(source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(source)
            .map_err(|e| Error::config(format!("state model is not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Build a state model from an already-parsed JSON object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| Error::config("state model must be a JSON object"))?;
        let mut fields = Vec::new();
        flatten(root, "", &mut fields);
        Ok(Self { fields })
    }

    /// Fields in declaration order, depth-first.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.path.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.iter().any(|f| f.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// An object mirroring the model's nesting with every leaf set to null.
    pub fn skeleton(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for field in &self.fields {
            set_path(&mut out, &field.path, Value::Null);
        }
        out
    }

    /// Copy of `state` holding exactly the model's fields (missing → null).
    pub fn restrict(&self, state: &Map<String, Value>) -> Map<String, Value> {
        let mut out = self.skeleton();
        for field in &self.fields {
            if let Some(value) = get_path(state, &field.path) {
                set_path(&mut out, &field.path, value.clone());
            }
        }
        out
    }

    /// Whether `state` holds none of the model's fields at all.
    pub fn is_absent_from(&self, state: &Map<String, Value>) -> bool {
        !self.paths().any(|p| get_path(state, p).is_some())
    }

    /// `- path: description` lines for prompts.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("- {}: {}", f.path, f.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `describe` limited to the given paths (unknown paths are ignored).
    pub fn describe_only(&self, paths: &[String]) -> String {
        self.fields
            .iter()
            .filter(|f| paths.contains(&f.path))
            .map(|f| format!("- {}: {}", f.path, f.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn flatten(node: &Map<String, Value>, prefix: &str, out: &mut Vec<FieldSpec>) {
    for (key, value) in node {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) => flatten(child, &path, out),
            Value::String(text) => out.push(FieldSpec {
                path,
                description: text.clone(),
            }),
            other => out.push(FieldSpec {
                path,
                description: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_model_keeps_declaration_order() {
        let model = StateModel::parse(
            r#"{"location": "Where the user is", "weather_info": "Current weather", "budget": "Trip budget"}"#,
        )
        .unwrap();
        let paths: Vec<&str> = model.paths().collect();
        assert_eq!(paths, vec!["location", "weather_info", "budget"]);
        assert_eq!(model.fields()[0].description, "Where the user is");
    }

    #[test]
    fn nested_model_flattens_depth_first() {
        let model = StateModel::parse(
            r#"{"trip": {"destination": "City", "dates": {"start": "Start", "end": "End"}}, "party_size": 2}"#,
        )
        .unwrap();
        let paths: Vec<&str> = model.paths().collect();
        assert_eq!(
            paths,
            vec!["trip.destination", "trip.dates.start", "trip.dates.end", "party_size"]
        );
        assert_eq!(model.fields()[3].description, "2");
    }

    #[test]
    fn arrays_are_leaves() {
        let model = StateModel::parse(r#"{"task_steps": ["ordered", "steps"]}"#).unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.fields()[0].description, r#"["ordered","steps"]"#);
    }

    #[test]
    fn invalid_json_is_configuration_error() {
        let err = StateModel::parse("{ nope").unwrap_err();
        assert!(err.is_configuration());
        let err = StateModel::parse("[1, 2]").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn skeleton_mirrors_nesting() {
        let model = StateModel::parse(r#"{"trip": {"destination": "City"}, "budget": "Budget"}"#).unwrap();
        assert_eq!(
            Value::Object(model.skeleton()),
            json!({"trip": {"destination": null}, "budget": null})
        );
    }

    #[test]
    fn restrict_drops_extras_and_fills_nulls() {
        let model = StateModel::parse(r#"{"destination": "City", "budget": "Budget"}"#).unwrap();
        let state = json!({"destination": "Tokyo", "hallucinated": true});
        let restricted = model.restrict(state.as_object().unwrap());
        assert_eq!(Value::Object(restricted), json!({"destination": "Tokyo", "budget": null}));
    }

    #[test]
    fn absence_detection() {
        let model = StateModel::parse(r#"{"destination": "City"}"#).unwrap();
        assert!(model.is_absent_from(&Map::new()));
        let stored = json!({"conversation_history": []});
        assert!(model.is_absent_from(stored.as_object().unwrap()));
        let stored = json!({"destination": null});
        assert!(!model.is_absent_from(stored.as_object().unwrap()));
    }

    #[test]
    fn describe_lines() {
        let model = StateModel::parse(r#"{"a": "First", "b": "Second"}"#).unwrap();
        assert_eq!(model.describe(), "- a: First\n- b: Second");
        assert_eq!(model.describe_only(&["b".into(), "zzz".into()]), "- b: Second");
    }
}
