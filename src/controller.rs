use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::binding::BindingSetter;
use crate::error_tree::{ErrorTree, FieldError};
use crate::field_array::{FieldArrayManager, Reindex, RowId};
use crate::form_state::{FormStateFlag, FormStateProjector};
use crate::path::{self, FieldPath, IntoFieldPath};
use crate::registry::{Field, FieldRegistry};
use crate::rules::ValidationOptions;
use crate::schema::{SchemaOptions, SchemaValidator};
use crate::tracker::DirtyTouchedTracker;
use crate::watch::{ChangeSet, WatchEvent, WatchSubscription, WatchTarget, Watcher};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationEvent {
    Change,
    Blur,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

impl ValidationMode {
    pub fn allows(self, event: ValidationEvent) -> bool {
        match self {
            ValidationMode::OnChange => true,
            ValidationMode::OnBlur => event == ValidationEvent::Blur,
            ValidationMode::OnSubmit => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevalidateMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

impl RevalidateMode {
    pub fn allows(self, event: ValidationEvent) -> bool {
        match self {
            RevalidateMode::OnChange => true,
            RevalidateMode::OnBlur => event == ValidationEvent::Blur,
            RevalidateMode::OnSubmit => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CriteriaMode {
    FirstError,
    All,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub revalidate_mode: RevalidateMode,
    pub criteria_mode: CriteriaMode,
    pub submit_focus_error: bool,
    pub async_debounce: Duration,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnSubmit,
            revalidate_mode: RevalidateMode::OnChange,
            criteria_mode: CriteriaMode::FirstError,
            submit_focus_error: true,
            async_debounce: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldMeta {
    pub dirty: bool,
    pub touched: bool,
    pub validating: bool,
    pub error: Option<FieldError>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitOutcome {
    pub valid: bool,
    pub values: Value,
    pub errors: Value,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    InvalidPath { path: String, reason: &'static str },
    IndexOutOfRange { path: String, index: usize, len: usize },
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    AlreadySubmitting,
    SubmitFailed(String),
    Serialization(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::InvalidPath { path, reason } => {
                write!(f, "invalid field path {path:?}: {reason}")
            }
            FormError::IndexOutOfRange { path, index, len } => {
                write!(f, "index {index} is out of range for {path} (length {len})")
            }
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit state transition: {from:?} -> {to:?}")
            }
            FormError::AlreadySubmitting => f.write_str("form submit is already in progress"),
            FormError::SubmitFailed(error) => write!(f, "submit handler failed: {error}"),
            FormError::Serialization(error) => write!(f, "failed to convert form values: {error}"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub(crate) struct FormStore {
    pub(crate) id: FormId,
    pub(crate) values: Value,
    pub(crate) registry: FieldRegistry,
    pub(crate) errors: ErrorTree,
    pub(crate) tracker: DirtyTouchedTracker,
    pub(crate) arrays: FieldArrayManager,
    pub(crate) projector: FormStateProjector,
    pub(crate) tickets: BTreeMap<FieldPath, ValidationTicket>,
    pub(crate) validating: BTreeSet<FieldPath>,
    pub(crate) next_round: u64,
    pub(crate) form_round: u64,
    pub(crate) submit_state: SubmitState,
    pub(crate) submit_count: u32,
}

impl FormStore {
    fn new(defaults: Value) -> Self {
        Self {
            id: FormId::next(),
            values: defaults.clone(),
            registry: FieldRegistry::default(),
            errors: ErrorTree::default(),
            tracker: DirtyTouchedTracker::new(defaults),
            arrays: FieldArrayManager::default(),
            projector: FormStateProjector::default(),
            tickets: BTreeMap::new(),
            validating: BTreeSet::new(),
            next_round: 0,
            form_round: 0,
            submit_state: SubmitState::Idle,
            submit_count: 0,
        }
    }

    /// Issues the next validation round for `path`; rounds are unique across
    /// the whole form so a dropped entry can never be matched again.
    pub(crate) fn next_ticket(&mut self, path: &FieldPath) -> ValidationTicket {
        self.next_round += 1;
        let ticket = ValidationTicket(self.next_round);
        self.tickets.insert(path.clone(), ticket);
        ticket
    }

    /// Where the round identified by `ticket` lives now. Array reshapes move
    /// tickets with their rows; `None` means the round was superseded or its
    /// row is gone.
    pub(crate) fn round_path(&self, ticket: ValidationTicket) -> Option<FieldPath> {
        self.tickets
            .iter()
            .find(|(_, current)| **current == ticket)
            .map(|(path, _)| path.clone())
    }

    pub(crate) fn invalidate_rounds_under(&mut self, prefix: &FieldPath) {
        let affected = self
            .tickets
            .keys()
            .filter(|key| prefix.is_prefix_of(key))
            .cloned()
            .collect::<Vec<_>>();
        for path in affected {
            self.next_ticket(&path);
        }
        self.validating.retain(|key| !prefix.is_prefix_of(key));
    }

    fn invalidate_all_rounds(&mut self) {
        let paths = self.tickets.keys().cloned().collect::<Vec<_>>();
        for path in paths {
            self.next_ticket(&path);
        }
        self.validating.clear();
        self.next_round += 1;
        self.form_round = self.next_round;
    }

    pub(crate) fn changed(&mut self, flags: &[FormStateFlag]) {
        for flag in flags {
            if self.projector.invalidate(*flag) {
                self.recompute(*flag);
            }
        }
    }

    pub(crate) fn recompute(&mut self, flag: FormStateFlag) {
        match flag {
            FormStateFlag::Dirty => {
                let dirty = self.tracker.is_dirty(&self.values);
                self.projector.store_dirty(dirty);
            }
            FormStateFlag::Touched => {
                let touched = self.tracker.touched_tree();
                self.projector.store_touched(touched);
            }
            FormStateFlag::IsSubmitted
            | FormStateFlag::SubmitCount
            | FormStateFlag::IsSubmitting
            | FormStateFlag::IsValid => {}
        }
    }

    /// Moves every piece of per-row state under `prefix` to its new index and
    /// hands back the fields whose rows disappeared. Pending rounds follow
    /// their rows; rounds of dropped rows lose their ticket.
    pub(crate) fn reindex(&mut self, prefix: &FieldPath, reindex: &Reindex) -> Vec<Field> {
        let remap = |index: usize| reindex.apply(index);
        let dropped = self.registry.reindex(prefix, remap);
        self.errors.reindex(prefix, remap);
        self.tracker.reindex(prefix, remap);
        self.arrays.reindex_nested(prefix, reindex);

        self.tickets = std::mem::take(&mut self.tickets)
            .into_iter()
            .filter_map(|(key, ticket)| key.reindexed(prefix, remap).map(|key| (key, ticket)))
            .collect();
        self.validating = std::mem::take(&mut self.validating)
            .into_iter()
            .filter_map(|key| key.reindexed(prefix, remap))
            .collect();
        dropped
    }

    pub(crate) fn watched_value(&self, target: &WatchTarget) -> Option<Value> {
        match target {
            WatchTarget::All => Some(self.values.clone()),
            WatchTarget::Path(path) => path::get(&self.values, path)
                .or_else(|| self.tracker.default_at(path))
                .cloned(),
        }
    }

    pub(crate) fn write_value(&mut self, path: &FieldPath, value: Value) -> Vec<Field> {
        let dropped = if self.arrays.contains(path) {
            let len = value.as_array().map_or(0, Vec::len);
            path::set(&mut self.values, path, value);
            self.replace_rows(path, len).1
        } else {
            path::set(&mut self.values, path, value);
            Vec::new()
        };
        self.changed(&[FormStateFlag::Dirty]);
        dropped
    }

    pub(crate) fn replace_rows(&mut self, path: &FieldPath, len: usize) -> (Vec<RowId>, Vec<Field>) {
        let dropped = self.reindex(path, &Reindex::Clear);
        (self.arrays.replace(path, len), dropped)
    }

    pub(crate) fn first_error_field(&self) -> Option<&Field> {
        self.registry
            .in_order()
            .into_iter()
            .find(|field| self.errors.has_errors_under(field.name()))
    }
}

#[derive(Clone)]
pub struct FormController {
    pub(crate) options: FormOptions,
    pub(crate) state: Arc<RwLock<FormStore>>,
    pub(crate) watcher: Watcher,
    pub(crate) schema: Option<Arc<dyn SchemaValidator>>,
    pub(crate) schema_options: SchemaOptions,
}

impl FormController {
    pub fn new(defaults: Value, options: FormOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(FormStore::new(normalize_root(defaults)))),
            watcher: Watcher::default(),
            schema: None,
            schema_options: SchemaOptions::default(),
        }
    }

    /// Validation for every field is delegated to `validator` instead of the
    /// per-field rules.
    pub fn with_schema(
        defaults: Value,
        options: FormOptions,
        validator: impl SchemaValidator,
        schema_options: SchemaOptions,
    ) -> Self {
        Self {
            schema: Some(Arc::new(validator)),
            schema_options,
            ..Self::new(defaults, options)
        }
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn register<N>(&self, name: N, options: ValidationOptions) -> FormResult<BindingSetter>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        {
            let mut state = write_lock(&self.state, "registering field")?;
            let id = state.id;
            let field = state.registry.register(path.clone(), options);
            debug!(form = id.0, field = %path, order = field.order(), "registered field");
        }
        Ok(BindingSetter::new(self.clone(), path))
    }

    pub fn register_many<N, I>(&self, fields: I) -> FormResult<Vec<BindingSetter>>
    where
        N: IntoFieldPath,
        I: IntoIterator<Item = (N, ValidationOptions)>,
    {
        fields
            .into_iter()
            .map(|(name, options)| self.register(name, options))
            .collect()
    }

    pub fn unregister<N>(&self, name: N) -> FormResult<bool>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let removed = {
            let mut state = write_lock(&self.state, "unregistering field")?;
            let Some(field) = state.registry.unregister(&path) else {
                return Ok(false);
            };
            state.errors.remove(&path);
            state.tracker.forget(&path);
            state.invalidate_rounds_under(&path);
            state.changed(&[FormStateFlag::Touched]);
            debug!(form = state.id.0, field = %path, "unregistered field");
            field
        };
        self.watcher.detach(&path)?;
        removed.release_bindings();
        Ok(true)
    }

    pub fn unregister_many<N, I>(&self, names: I) -> FormResult<usize>
    where
        N: IntoFieldPath,
        I: IntoIterator<Item = N>,
    {
        let mut removed = 0;
        for name in names {
            if self.unregister(name)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn field<N>(&self, name: N) -> FormResult<Option<Field>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        Ok(read_lock(&self.state, "reading field")?
            .registry
            .get(&path)
            .cloned())
    }

    pub fn values(&self) -> FormResult<Value> {
        Ok(read_lock(&self.state, "reading values")?.values.clone())
    }

    /// `name -> value` pairs; registered fields stay whole even when their
    /// value is a container.
    pub fn flat_values(&self) -> FormResult<BTreeMap<String, Value>> {
        let state = read_lock(&self.state, "flattening values")?;
        Ok(path::flatten(&state.values, |candidate| {
            state.registry.contains(candidate)
        }))
    }

    pub fn value<N>(&self, name: N) -> FormResult<Option<Value>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        Ok(path::get(&read_lock(&self.state, "reading value")?.values, &path).cloned())
    }

    pub fn set_value<N>(&self, name: N, value: Value) -> FormResult<()>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        self.commit_value(&path, value)
    }

    pub async fn set_value_and_validate<N>(&self, name: N, value: Value) -> FormResult<bool>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        self.commit_value(&path, value)?;
        self.validate_field(path).await
    }

    pub fn unset_value<N>(&self, name: N) -> FormResult<Option<Value>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let removed = {
            let mut state = write_lock(&self.state, "removing value")?;
            let removed = path::unset(&mut state.values, &path);
            state.changed(&[FormStateFlag::Dirty]);
            removed
        };
        self.notify(ChangeSet::single(path))?;
        Ok(removed)
    }

    pub(crate) fn commit_value(&self, path: &FieldPath, value: Value) -> FormResult<()> {
        let dropped = {
            let mut state = write_lock(&self.state, "writing value")?;
            trace!(form = state.id.0, field = %path, "committing value");
            state.write_value(path, value)
        };
        release_fields(dropped);
        self.notify(ChangeSet::single(path.clone()))
    }

    /// Entry point for a value change coming from a bound input. Returns the
    /// validation result when the configured mode ran validation.
    pub async fn handle_change<N>(&self, name: N, value: Value) -> FormResult<Option<bool>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        self.commit_value(&path, value)?;
        if self.should_validate(&path, ValidationEvent::Change)? {
            Ok(Some(self.validate_field(path).await?))
        } else {
            Ok(None)
        }
    }

    pub async fn handle_blur<N>(&self, name: N) -> FormResult<Option<bool>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        self.mark_touched(&path)?;
        if self.should_validate(&path, ValidationEvent::Blur)? {
            Ok(Some(self.validate_field(path).await?))
        } else {
            Ok(None)
        }
    }

    pub fn mark_touched<N>(&self, name: N) -> FormResult<bool>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let mut state = write_lock(&self.state, "marking field touched")?;
        let newly = state.tracker.mark_touched(path);
        if newly {
            state.changed(&[FormStateFlag::Touched]);
        }
        Ok(newly)
    }

    pub(crate) fn should_validate(
        &self,
        path: &FieldPath,
        event: ValidationEvent,
    ) -> FormResult<bool> {
        let state = read_lock(&self.state, "deciding validation mode")?;
        let revalidating = state.submit_count > 0 || state.errors.get(path).is_some();
        Ok(if revalidating {
            self.options.revalidate_mode.allows(event)
        } else {
            self.options.validate_mode.allows(event)
        })
    }

    pub fn subscribe(
        &self,
        target: &str,
        callback: impl Fn(&WatchEvent) + Send + Sync + 'static,
    ) -> FormResult<WatchSubscription> {
        self.watcher.subscribe(WatchTarget::parse(target)?, callback)
    }

    /// The live value at `name`, falling back to its default when the value
    /// tree has nothing there yet.
    pub fn watch<N>(&self, name: N) -> FormResult<Option<Value>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        Ok(read_lock(&self.state, "watching value")?.watched_value(&WatchTarget::Path(path)))
    }

    pub fn watch_all(&self) -> FormResult<Value> {
        self.values()
    }

    pub(crate) fn notify(&self, changes: ChangeSet) -> FormResult<()> {
        let plan = self.watcher.plan(&changes)?;
        if plan.is_empty() {
            return Ok(());
        }
        let events = {
            let state = read_lock(&self.state, "collecting watch values")?;
            plan.into_iter()
                .map(|(target, callback)| {
                    let value = state.watched_value(&target);
                    (callback, WatchEvent { target, value })
                })
                .collect::<Vec<_>>()
        };
        for (callback, event) in events {
            callback(&event);
        }
        Ok(())
    }

    /// Restores the baseline (or installs `new_defaults` as the new one) and
    /// clears touched marks, errors and submit counters.
    pub fn reset(&self, new_defaults: Option<Value>) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting form")?;
            let baseline = match new_defaults {
                Some(defaults) => normalize_root(defaults),
                None => state.tracker.baseline().clone(),
            };
            state.values = baseline.clone();
            state.tracker.reset_baseline(baseline);
            state.errors.clear_all();
            state.invalidate_all_rounds();
            let values = state.values.clone();
            state.arrays.regenerate(&values);
            state.submit_state = SubmitState::Idle;
            state.submit_count = 0;
            state.changed(&[FormStateFlag::Dirty, FormStateFlag::Touched]);
            debug!(form = state.id.0, "reset form");
        }
        self.notify(ChangeSet::Everything)
    }

    pub fn set_error<N>(
        &self,
        name: N,
        error_type: impl Into<String>,
        message: Option<String>,
    ) -> FormResult<()>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let mut state = write_lock(&self.state, "setting manual error")?;
        state
            .errors
            .set_error(path, FieldError::manual(error_type, message));
        Ok(())
    }

    pub fn clear_errors<N, I>(&self, names: I) -> FormResult<usize>
    where
        N: IntoFieldPath,
        I: IntoIterator<Item = N>,
    {
        let paths = names
            .into_iter()
            .map(IntoFieldPath::into_field_path)
            .collect::<FormResult<Vec<_>>>()?;
        let mut state = write_lock(&self.state, "clearing field errors")?;
        Ok(paths.iter().map(|path| state.errors.clear_error(path)).sum())
    }

    pub fn clear_all_errors(&self) -> FormResult<()> {
        write_lock(&self.state, "clearing all errors")?
            .errors
            .clear_all();
        Ok(())
    }

    pub fn error<N>(&self, name: N) -> FormResult<Option<FieldError>>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        Ok(read_lock(&self.state, "reading field error")?
            .errors
            .get(&path)
            .cloned())
    }

    pub fn form_error(&self) -> FormResult<Option<FieldError>> {
        Ok(read_lock(&self.state, "reading form error")?
            .errors
            .form_error()
            .cloned())
    }

    pub fn errors(&self) -> FormResult<Value> {
        Ok(read_lock(&self.state, "projecting errors")?.errors.to_value())
    }

    pub fn field_meta<N>(&self, name: N) -> FormResult<FieldMeta>
    where
        N: IntoFieldPath,
    {
        let path = name.into_field_path()?;
        let state = read_lock(&self.state, "reading field meta")?;
        Ok(FieldMeta {
            dirty: state.tracker.is_field_dirty(&state.values, &path),
            touched: state.tracker.is_touched(&path),
            validating: state.validating.contains(&path),
            error: state.errors.get(&path).cloned(),
        })
    }

    pub fn dirty_fields(&self) -> FormResult<Vec<FieldPath>> {
        let state = read_lock(&self.state, "listing dirty fields")?;
        Ok(state
            .registry
            .in_order()
            .into_iter()
            .map(Field::name)
            .filter(|path| state.tracker.is_field_dirty(&state.values, path))
            .cloned()
            .collect())
    }

    /// Runs a full validation round and hands the values to `on_valid` when
    /// no errors remain. The submit counter advances whether or not the
    /// callback ran.
    pub async fn handle_submit<F, Fut>(&self, on_valid: F) -> FormResult<SubmitOutcome>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = FormResult<()>>,
    {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if matches!(
                state.submit_state,
                SubmitState::Validating | SubmitState::Submitting
            ) {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            debug!(form = state.id.0, "submit started");
        }

        let valid = match self.validate_form().await {
            Ok(valid) => valid,
            Err(error) => {
                self.finish_submit(SubmitState::Failed)?;
                return Err(error);
            }
        };

        if !valid {
            self.finish_submit(SubmitState::Failed)?;
            if self.options.submit_focus_error {
                self.focus_first_error()?;
            }
            let state = read_lock(&self.state, "reading failed submit outcome")?;
            debug!(form = state.id.0, errors = state.errors.len(), "submit blocked by validation");
            return Ok(SubmitOutcome {
                valid: false,
                values: state.values.clone(),
                errors: state.errors.to_value(),
            });
        }

        let values = {
            let mut state = write_lock(&self.state, "moving submit state to submitting")?;
            transition_submit_state(&mut state, SubmitState::Submitting)?;
            state.values.clone()
        };
        let submit_result = on_valid(values.clone()).await;
        self.finish_submit(if submit_result.is_ok() {
            SubmitState::Succeeded
        } else {
            SubmitState::Failed
        })?;
        submit_result?;

        Ok(SubmitOutcome {
            valid: true,
            values,
            errors: Value::Object(Map::new()),
        })
    }

    fn finish_submit(&self, next: SubmitState) -> FormResult<()> {
        let mut state = write_lock(&self.state, "completing submit")?;
        state.submit_count = state.submit_count.saturating_add(1);
        state.changed(&[FormStateFlag::IsSubmitted, FormStateFlag::SubmitCount]);
        if matches!(
            state.submit_state,
            SubmitState::Validating | SubmitState::Submitting
        ) {
            transition_submit_state(&mut state, next)?;
        }
        debug!(form = state.id.0, count = state.submit_count, state = ?state.submit_state, "submit finished");
        Ok(())
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state)
    }

    /// Focuses the binding of the first erroring field in registration order.
    pub fn focus_first_error(&self) -> FormResult<bool> {
        let binding = {
            let state = read_lock(&self.state, "reading first error field")?;
            state.first_error_field().and_then(Field::focus_target)
        };
        Ok(binding.is_some_and(|binding| binding.focus()))
    }
}

pub(crate) fn normalize_root(defaults: Value) -> Value {
    match defaults {
        Value::Object(_) => defaults,
        Value::Null => Value::Object(Map::new()),
        other => {
            tracing::warn!(value = %other, "default values must be a mapping; starting empty");
            Value::Object(Map::new())
        }
    }
}

pub(crate) fn transition_submit_state(state: &mut FormStore, next: SubmitState) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    state.changed(&[FormStateFlag::IsSubmitting]);
    Ok(())
}

pub(crate) fn release_fields(fields: Vec<Field>) {
    for field in fields {
        field.release_bindings();
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
