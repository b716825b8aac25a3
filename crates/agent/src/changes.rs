//! Change detection between the loaded and the reconciled state.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::path::{get_path, same_value};
use crate::schema::StateModel;

/// An ordered, duplicate-free list of changed field paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(Vec<String>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a path unless it is already present.
    pub fn push(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.0.contains(&path) {
            self.0.push(path);
        }
    }

    pub fn extend<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            self.push(path);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|p| p == path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Paths among `paths` whose values differ between `prev` and `next`.
///
/// A missing field compares equal to null.
pub fn changed_paths<'a>(
    prev: &Map<String, Value>,
    next: &Map<String, Value>,
    paths: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    paths
        .into_iter()
        .filter(|path| {
            let before = get_path(prev, path).unwrap_or(&Value::Null);
            let after = get_path(next, path).unwrap_or(&Value::Null);
            !same_value(before, after)
        })
        .map(str::to_string)
        .collect()
}

/// Detect which model fields changed in the first reconciliation round.
///
/// When nothing differs but the store held none of the model's fields
/// (`first_run`), every field is reported so the initial state is persisted.
pub fn detect_changes(
    prev: &Map<String, Value>,
    next: &Map<String, Value>,
    model: &StateModel,
    first_run: bool,
) -> ChangeSet {
    let mut changes = ChangeSet::new();
    changes.extend(changed_paths(prev, next, model.paths()));
    if changes.is_empty() && first_run {
        changes.extend(model.paths());
    }
    changes
}
