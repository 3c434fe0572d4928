use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::controller::{FormController, FormResult, SubmitState, write_lock};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FormStateFlag {
    Dirty,
    IsSubmitted,
    SubmitCount,
    Touched,
    IsSubmitting,
    IsValid,
}

impl FormStateFlag {
    pub const ALL: [FormStateFlag; 6] = [
        FormStateFlag::Dirty,
        FormStateFlag::IsSubmitted,
        FormStateFlag::SubmitCount,
        FormStateFlag::Touched,
        FormStateFlag::IsSubmitting,
        FormStateFlag::IsValid,
    ];
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStateSnapshot {
    pub dirty: bool,
    pub is_submitted: bool,
    pub submit_count: u32,
    pub touched: Value,
    pub is_submitting: bool,
    pub is_valid: bool,
}

/// Caches the flags that need a walk over the value or touched trees. A flag
/// enters the observed set on first read; only observed flags are recomputed
/// eagerly when a mutation could change them, the rest are dropped and
/// rebuilt on their next read.
#[derive(Debug, Default)]
pub struct FormStateProjector {
    observed: BTreeSet<FormStateFlag>,
    dirty: Option<bool>,
    touched: Option<Value>,
    recomputations: u64,
}

impl FormStateProjector {
    pub fn observed(&self) -> impl Iterator<Item = FormStateFlag> + '_ {
        self.observed.iter().copied()
    }

    pub fn is_observed(&self, flag: FormStateFlag) -> bool {
        self.observed.contains(&flag)
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Returns true when the caller should recompute `flag` right away.
    pub(crate) fn invalidate(&mut self, flag: FormStateFlag) -> bool {
        if self.observed.contains(&flag) {
            return true;
        }
        match flag {
            FormStateFlag::Dirty => self.dirty = None,
            FormStateFlag::Touched => self.touched = None,
            _ => {}
        }
        false
    }

    pub(crate) fn observe(&mut self, flag: FormStateFlag) {
        self.observed.insert(flag);
    }

    pub(crate) fn reset_observed(&mut self) {
        self.observed.clear();
    }

    pub(crate) fn cached_dirty(&self) -> Option<bool> {
        self.dirty
    }

    pub(crate) fn cached_touched(&self) -> Option<&Value> {
        self.touched.as_ref()
    }

    pub(crate) fn store_dirty(&mut self, dirty: bool) {
        self.recomputations += 1;
        self.dirty = Some(dirty);
    }

    pub(crate) fn store_touched(&mut self, touched: Value) {
        self.recomputations += 1;
        self.touched = Some(touched);
    }
}

/// Per-flag read access to the form state. Every getter adds its flag to the
/// observed set.
pub struct FormStateProxy<'a> {
    controller: &'a FormController,
}

impl FormController {
    pub fn form_state(&self) -> FormStateProxy<'_> {
        FormStateProxy { controller: self }
    }
}

impl FormStateProxy<'_> {
    pub fn dirty(&self) -> FormResult<bool> {
        let mut state = write_lock(&self.controller.state, "reading dirty flag")?;
        state.projector.observe(FormStateFlag::Dirty);
        if state.projector.cached_dirty().is_none() {
            state.recompute(FormStateFlag::Dirty);
        }
        Ok(state.projector.cached_dirty().unwrap_or_default())
    }

    pub fn touched(&self) -> FormResult<Value> {
        let mut state = write_lock(&self.controller.state, "reading touched tree")?;
        state.projector.observe(FormStateFlag::Touched);
        if state.projector.cached_touched().is_none() {
            state.recompute(FormStateFlag::Touched);
        }
        Ok(state.projector.cached_touched().cloned().unwrap_or_default())
    }

    pub fn is_submitted(&self) -> FormResult<bool> {
        let mut state = write_lock(&self.controller.state, "reading submitted flag")?;
        state.projector.observe(FormStateFlag::IsSubmitted);
        Ok(state.submit_count > 0)
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        let mut state = write_lock(&self.controller.state, "reading submit count")?;
        state.projector.observe(FormStateFlag::SubmitCount);
        Ok(state.submit_count)
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        let mut state = write_lock(&self.controller.state, "reading submitting flag")?;
        state.projector.observe(FormStateFlag::IsSubmitting);
        Ok(matches!(
            state.submit_state,
            SubmitState::Validating | SubmitState::Submitting
        ))
    }

    /// Whether the error tree is empty right now. Under `OnSubmit` mode this
    /// only reflects the last validation round and goes stale between edits.
    pub fn is_valid(&self) -> FormResult<bool> {
        let mut state = write_lock(&self.controller.state, "reading valid flag")?;
        state.projector.observe(FormStateFlag::IsValid);
        Ok(state.errors.is_empty())
    }

    pub fn snapshot(&self) -> FormResult<FormStateSnapshot> {
        Ok(FormStateSnapshot {
            dirty: self.dirty()?,
            is_submitted: self.is_submitted()?,
            submit_count: self.submit_count()?,
            touched: self.touched()?,
            is_submitting: self.is_submitting()?,
            is_valid: self.is_valid()?,
        })
    }

    pub fn observed(&self) -> FormResult<Vec<FormStateFlag>> {
        Ok(
            write_lock(&self.controller.state, "listing observed flags")?
                .projector
                .observed()
                .collect(),
        )
    }

    pub fn recomputations(&self) -> FormResult<u64> {
        Ok(write_lock(&self.controller.state, "reading recomputation count")?
            .projector
            .recomputations())
    }

    /// Forgets which flags were read; cached values stay valid.
    pub fn reset_observed(&self) -> FormResult<()> {
        write_lock(&self.controller.state, "resetting observed flags")?
            .projector
            .reset_observed();
        Ok(())
    }
}
