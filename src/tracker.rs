use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::path::{self, FieldPath};

#[derive(Clone, Debug)]
pub struct DirtyTouchedTracker {
    baseline: Value,
    touched: BTreeSet<FieldPath>,
}

impl DirtyTouchedTracker {
    pub fn new(baseline: Value) -> Self {
        Self {
            baseline,
            touched: BTreeSet::new(),
        }
    }

    pub fn baseline(&self) -> &Value {
        &self.baseline
    }

    pub fn default_at(&self, path: &FieldPath) -> Option<&Value> {
        path::get(&self.baseline, path)
    }

    /// Returns true when the path was not touched before.
    pub fn mark_touched(&mut self, path: FieldPath) -> bool {
        self.touched.insert(path)
    }

    pub fn is_touched(&self, path: &FieldPath) -> bool {
        self.touched.contains(path)
    }

    pub fn touched(&self) -> impl Iterator<Item = &FieldPath> {
        self.touched.iter()
    }

    pub fn touched_tree(&self) -> Value {
        let mut tree = Value::Object(Map::new());
        for touched in &self.touched {
            path::set(&mut tree, touched, Value::Bool(true));
        }
        tree
    }

    pub fn compute_dirty(current: &Value, baseline: &Value) -> bool {
        !values_equal(Some(current), Some(baseline))
    }

    pub fn is_dirty(&self, current: &Value) -> bool {
        Self::compute_dirty(current, &self.baseline)
    }

    pub fn is_field_dirty(&self, current: &Value, path: &FieldPath) -> bool {
        !values_equal(path::get(current, path), path::get(&self.baseline, path))
    }

    pub fn reset_baseline(&mut self, new_defaults: Value) {
        self.baseline = new_defaults;
        self.touched.clear();
    }

    pub(crate) fn forget(&mut self, path: &FieldPath) {
        self.touched.retain(|touched| !path.is_prefix_of(touched));
    }

    pub(crate) fn reindex(&mut self, prefix: &FieldPath, remap: impl Fn(usize) -> Option<usize>) {
        self.touched = std::mem::take(&mut self.touched)
            .into_iter()
            .filter_map(|touched| touched.reindexed(prefix, &remap))
            .collect();
    }
}

/// Structural equality where a missing entry and `null` compare equal.
pub fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left.unwrap_or(&Value::Null), right.unwrap_or(&Value::Null)) {
        (Value::Object(left), Value::Object(right)) => left
            .keys()
            .chain(right.keys())
            .all(|key| values_equal(left.get(key), right.get(key))),
        (Value::Array(left), Value::Array(right)) => (0..left.len().max(right.len()))
            .all(|index| values_equal(left.get(index), right.get(index))),
        (Value::Number(left), Value::Number(right)) => {
            left == right || left.as_f64().zip(right.as_f64()).is_some_and(|(l, r)| l == r)
        }
        (left, right) => left == right,
    }
}
