use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde_json::Value;
use tracing::debug;

use crate::controller::{FormController, FormError, FormResult, release_fields, write_lock};
use crate::form_state::FormStateFlag;
use crate::path::{self, FieldPath, IntoFieldPath};
use crate::watch::ChangeSet;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowId(u64);

impl RowId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for RowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "row-{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldArrayState {
    path: FieldPath,
    row_ids: Vec<RowId>,
}

impl FieldArrayState {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn row_ids(&self) -> &[RowId] {
        &self.row_ids
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }
}

/// How row indices under an array path move after a reshape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reindex {
    Insert { at: usize },
    Remove(Vec<usize>),
    Swap(usize, usize),
    Move { from: usize, to: usize },
    Clear,
}

impl Reindex {
    pub fn apply(&self, index: usize) -> Option<usize> {
        match self {
            Reindex::Insert { at } => Some(if index >= *at { index + 1 } else { index }),
            Reindex::Remove(removed) => {
                if removed.binary_search(&index).is_ok() {
                    None
                } else {
                    Some(index - removed.partition_point(|candidate| *candidate < index))
                }
            }
            Reindex::Swap(a, b) => Some(if index == *a {
                *b
            } else if index == *b {
                *a
            } else {
                index
            }),
            Reindex::Move { from, to } => Some(if index == *from {
                *to
            } else if from < to && index > *from && index <= *to {
                index - 1
            } else if from > to && index >= *to && index < *from {
                index + 1
            } else {
                index
            }),
            Reindex::Clear => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FieldArrayManager {
    arrays: BTreeMap<FieldPath, FieldArrayState>,
    next_row: u64,
}

impl FieldArrayManager {
    pub fn state(&self, path: &FieldPath) -> Option<&FieldArrayState> {
        self.arrays.get(path)
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.arrays.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.arrays.keys()
    }

    fn next_id(&mut self) -> RowId {
        self.next_row += 1;
        RowId(self.next_row)
    }

    /// Returns the state for `path`, creating it on first use and keeping the
    /// number of ids in step with the data array.
    pub(crate) fn ensure(&mut self, path: &FieldPath, data_len: usize) -> &mut FieldArrayState {
        let mut fresh = Vec::new();
        let current = self.arrays.get(path).map_or(0, FieldArrayState::len);
        for _ in current..data_len {
            fresh.push(self.next_id());
        }
        let state = self
            .arrays
            .entry(path.clone())
            .or_insert_with(|| FieldArrayState {
                path: path.clone(),
                row_ids: Vec::new(),
            });
        state.row_ids.truncate(data_len);
        state.row_ids.extend(fresh);
        state
    }

    /// Inserts a fresh id, clamping `index` to the current length.
    pub fn insert(&mut self, path: &FieldPath, index: usize, data_len: usize) -> (usize, RowId) {
        let id = self.next_id();
        let state = self.ensure(path, data_len);
        let at = index.min(state.row_ids.len());
        state.row_ids.insert(at, id);
        (at, id)
    }

    /// Removes the given rows; returns the sorted, deduplicated indices.
    pub fn remove(
        &mut self,
        path: &FieldPath,
        indices: &[usize],
        data_len: usize,
    ) -> FormResult<Vec<usize>> {
        let state = self.ensure(path, data_len);
        let mut removed = indices.to_vec();
        removed.sort_unstable();
        removed.dedup();
        for index in &removed {
            check_bounds(path, *index, state.row_ids.len())?;
        }
        for index in removed.iter().rev() {
            state.row_ids.remove(*index);
        }
        Ok(removed)
    }

    pub fn swap(&mut self, path: &FieldPath, a: usize, b: usize, data_len: usize) -> FormResult<()> {
        let state = self.ensure(path, data_len);
        check_bounds(path, a, state.row_ids.len())?;
        check_bounds(path, b, state.row_ids.len())?;
        state.row_ids.swap(a, b);
        Ok(())
    }

    pub fn move_row(
        &mut self,
        path: &FieldPath,
        from: usize,
        to: usize,
        data_len: usize,
    ) -> FormResult<()> {
        let state = self.ensure(path, data_len);
        check_bounds(path, from, state.row_ids.len())?;
        check_bounds(path, to, state.row_ids.len())?;
        let id = state.row_ids.remove(from);
        state.row_ids.insert(to, id);
        Ok(())
    }

    /// Drops every id for `path` and issues `len` fresh ones.
    pub fn replace(&mut self, path: &FieldPath, len: usize) -> Vec<RowId> {
        let fresh = (0..len).map(|_| self.next_id()).collect::<Vec<_>>();
        self.arrays.insert(
            path.clone(),
            FieldArrayState {
                path: path.clone(),
                row_ids: fresh.clone(),
            },
        );
        fresh
    }

    /// Re-keys arrays nested inside rows of `prefix`; arrays inside dropped
    /// rows are forgotten.
    pub(crate) fn reindex_nested(&mut self, prefix: &FieldPath, reindex: &Reindex) {
        self.arrays = std::mem::take(&mut self.arrays)
            .into_iter()
            .filter_map(|(key, mut state)| {
                let key = key.reindexed(prefix, |index| reindex.apply(index))?;
                state.path = key.clone();
                Some((key, state))
            })
            .collect();
    }

    /// Issues fresh ids for every tracked array, sized to the current data.
    pub(crate) fn regenerate(&mut self, values: &Value) {
        let paths = self.arrays.keys().cloned().collect::<Vec<_>>();
        for path in paths {
            let len = data_len(values, &path);
            self.replace(&path, len);
        }
    }
}

pub(crate) fn check_bounds(path: &FieldPath, index: usize, len: usize) -> FormResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(FormError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        })
    }
}

pub(crate) fn data_len(values: &Value, path: &FieldPath) -> usize {
    path::get(values, path)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// The data array at `path`, created empty when missing or not a sequence.
pub(crate) fn array_mut<'a>(values: &'a mut Value, path: &FieldPath) -> &'a mut Vec<Value> {
    let slot = path::slot_mut(values, path);
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    let Value::Array(items) = slot else {
        unreachable!("slot was normalized to an array")
    };
    items
}

impl FormController {
    /// Splices `value` in at `index` (clamped to the current length).
    pub fn insert<N>(&self, name: N, index: usize, value: Value) -> FormResult<RowId>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let (id, dropped) = {
            let mut state = write_lock(&self.state, "inserting field array row")?;
            let len = data_len(&state.values, &path);
            let (at, id) = state.arrays.insert(&path, index, len);
            array_mut(&mut state.values, &path).insert(at, value);
            let dropped = state.reindex(&path, &Reindex::Insert { at });
            state.changed(&[FormStateFlag::Dirty, FormStateFlag::Touched]);
            debug!(form = state.id.0, field = %path, index = at, row = %id, "inserted row");
            (id, dropped)
        };
        release_fields(dropped);
        self.notify(ChangeSet::single(path))?;
        Ok(id)
    }

    pub fn append<N>(&self, name: N, value: Value) -> FormResult<RowId>
    where
        N: IntoFieldPath,
    {
        self.insert(name, usize::MAX, value)
    }

    pub fn prepend<N>(&self, name: N, value: Value) -> FormResult<RowId>
    where
        N: IntoFieldPath,
    {
        self.insert(name, 0, value)
    }

    pub fn remove<N>(&self, name: N, index: usize) -> FormResult<Value>
    where
        N: IntoFieldPath,
    {
        Ok(self
            .remove_many(name, &[index])?
            .into_iter()
            .next()
            .unwrap_or(Value::Null))
    }

    /// Removes several rows at once; returns their values in index order.
    pub fn remove_many<N>(&self, name: N, indices: &[usize]) -> FormResult<Vec<Value>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let (taken, dropped) = {
            let mut state = write_lock(&self.state, "removing field array rows")?;
            let len = data_len(&state.values, &path);
            let removed = state.arrays.remove(&path, indices, len)?;
            let items = array_mut(&mut state.values, &path);
            let mut taken = removed
                .iter()
                .rev()
                .map(|index| items.remove(*index))
                .collect::<Vec<_>>();
            taken.reverse();
            debug!(form = state.id.0, field = %path, rows = ?removed, "removed rows");
            let dropped = state.reindex(&path, &Reindex::Remove(removed));
            state.changed(&[FormStateFlag::Dirty, FormStateFlag::Touched]);
            (taken, dropped)
        };
        release_fields(dropped);
        self.notify(ChangeSet::single(path))?;
        Ok(taken)
    }

    pub fn swap<N>(&self, name: N, a: usize, b: usize) -> FormResult<()>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        {
            let mut state = write_lock(&self.state, "swapping field array rows")?;
            let len = data_len(&state.values, &path);
            state.arrays.swap(&path, a, b, len)?;
            array_mut(&mut state.values, &path).swap(a, b);
            state.reindex(&path, &Reindex::Swap(a, b));
            state.changed(&[FormStateFlag::Dirty, FormStateFlag::Touched]);
            debug!(form = state.id.0, field = %path, a, b, "swapped rows");
        }
        self.notify(ChangeSet::single(path))
    }

    pub fn move_row<N>(&self, name: N, from: usize, to: usize) -> FormResult<()>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        {
            let mut state = write_lock(&self.state, "moving field array row")?;
            let len = data_len(&state.values, &path);
            state.arrays.move_row(&path, from, to, len)?;
            let items = array_mut(&mut state.values, &path);
            let row = items.remove(from);
            items.insert(to, row);
            state.reindex(&path, &Reindex::Move { from, to });
            state.changed(&[FormStateFlag::Dirty, FormStateFlag::Touched]);
            debug!(form = state.id.0, field = %path, from, to, "moved row");
        }
        self.notify(ChangeSet::single(path))
    }

    /// Replaces every row; row identity is not carried over.
    pub fn replace<N>(&self, name: N, rows: Vec<Value>) -> FormResult<Vec<RowId>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let (ids, dropped) = {
            let mut state = write_lock(&self.state, "replacing field array rows")?;
            let len = rows.len();
            path::set(&mut state.values, &path, Value::Array(rows));
            let replaced = state.replace_rows(&path, len);
            state.changed(&[FormStateFlag::Dirty, FormStateFlag::Touched]);
            debug!(form = state.id.0, field = %path, rows = len, "replaced rows");
            replaced
        };
        release_fields(dropped);
        self.notify(ChangeSet::single(path))?;
        Ok(ids)
    }

    pub fn row_ids<N>(&self, name: N) -> FormResult<Vec<RowId>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let mut state = write_lock(&self.state, "reading field array rows")?;
        let len = data_len(&state.values, &path);
        Ok(state.arrays.ensure(&path, len).row_ids().to_vec())
    }

    /// Row ids paired with the current row values.
    pub fn rows<N>(&self, name: N) -> FormResult<Vec<(RowId, Value)>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let mut state = write_lock(&self.state, "reading field array rows")?;
        let len = data_len(&state.values, &path);
        let ids = state.arrays.ensure(&path, len).row_ids().to_vec();
        let values = path::get(&state.values, &path)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(ids.into_iter().zip(values).collect())
    }
}
