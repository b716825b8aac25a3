//! Reconcile a model-proposed state with the current one.

use serde_json::{Map, Value};

use crate::parse::Untrusted;
use crate::path::{get_path, get_value_path, set_path};
use crate::schema::StateModel;

/// Build the next state from a candidate proposed by the model.
///
/// The result has exactly the model's fields. For each field the
/// candidate's non-null value wins, otherwise the current value is kept,
/// otherwise the field is null. Keys the model invented are dropped.
pub fn merge_state(
    candidate: &Untrusted,
    model: &StateModel,
    current: &Map<String, Value>,
) -> Map<String, Value> {
    let mut next = model.skeleton();
    for field in model.fields() {
        let proposed = get_value_path(candidate.as_value(), &field.path).filter(|v| !v.is_null());
        let chosen = proposed.or_else(|| get_path(current, &field.path));
        if let Some(value) = chosen {
            set_path(&mut next, &field.path, value.clone());
        }
    }
    next
}
