use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use futures_timer::Delay;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::controller::{
    CriteriaMode, FormController, FormResult, ValidationTicket, read_lock, write_lock,
};
use crate::error_tree::{ErrorKind, FieldError};
use crate::form_state::FormStateFlag;
use crate::path::{self, FieldPath, IntoFieldPath};
use crate::rules::{Bound, Validate, ValidateOutcome, ValidateRule, ValidationOptions, decimal_from_f64, parse_date};
use crate::schema::{SchemaErrors, SchemaValidator};

struct Failures {
    criteria: CriteriaMode,
    first: Option<FieldError>,
    types: BTreeMap<String, Option<String>>,
}

impl Failures {
    fn new(criteria: CriteriaMode) -> Self {
        Self {
            criteria,
            first: None,
            types: BTreeMap::new(),
        }
    }

    /// Records a failure; true means evaluation should stop.
    fn push(&mut self, kind: ErrorKind, message: Option<String>) -> bool {
        self.types.insert(kind.as_str().to_string(), message.clone());
        if self.first.is_none() {
            self.first = Some(FieldError {
                kind,
                message,
                types: BTreeMap::new(),
                manual: false,
            });
        }
        self.criteria == CriteriaMode::FirstError
    }

    fn finish(self) -> Option<FieldError> {
        let mut error = self.first?;
        if self.types.len() > 1 {
            error.types = self.types;
        }
        Some(error)
    }
}

/// Runs the rule pipeline for one value. `None` means the value passed.
pub async fn validate_value(
    rules: &ValidationOptions,
    value: Option<&Value>,
    criteria: CriteriaMode,
) -> Option<FieldError> {
    let mut failures = Failures::new(criteria);
    let blank = is_blank(value);

    if let Some(required) = &rules.required {
        if required.value && blank && failures.push(ErrorKind::Required, required.message.clone()) {
            return failures.finish();
        }
    }

    if !blank {
        if let Some(stop) = check_static_rules(rules, value, &mut failures) {
            if stop {
                return failures.finish();
            }
        }
    }

    if let Some(validate) = &rules.validate {
        let input = value.cloned().unwrap_or(Value::Null);
        match validate {
            Validate::Single(rule) => {
                if let Some(message) = run_rule(rule, &input).await {
                    failures.push(ErrorKind::Validate("validate".to_string()), message);
                }
            }
            Validate::Named(named) => {
                for (name, rule) in named {
                    if let Some(message) = run_rule(rule, &input).await {
                        if failures.push(ErrorKind::Validate(name.clone()), message) {
                            break;
                        }
                    }
                }
            }
        }
    }

    failures.finish()
}

/// min/max, length and pattern checks; `Some(true)` when a failure asked to
/// stop.
fn check_static_rules(
    rules: &ValidationOptions,
    value: Option<&Value>,
    failures: &mut Failures,
) -> Option<bool> {
    let value = value?;
    if let Some(min) = &rules.min {
        if compare_to_bound(value, &min.value) == Some(Ordering::Less)
            && failures.push(ErrorKind::Min, min.message.clone())
        {
            return Some(true);
        }
    }
    if let Some(max) = &rules.max {
        if compare_to_bound(value, &max.value) == Some(Ordering::Greater)
            && failures.push(ErrorKind::Max, max.message.clone())
        {
            return Some(true);
        }
    }

    let length = value_length(value);
    if let (Some(min_length), Some(length)) = (&rules.min_length, length) {
        if length < min_length.value && failures.push(ErrorKind::MinLength, min_length.message.clone()) {
            return Some(true);
        }
    }
    if let (Some(max_length), Some(length)) = (&rules.max_length, length) {
        if length > max_length.value && failures.push(ErrorKind::MaxLength, max_length.message.clone()) {
            return Some(true);
        }
    }

    if let (Some(pattern), Some(text)) = (&rules.pattern, value.as_str()) {
        if !pattern.value.is_match(text) && failures.push(ErrorKind::Pattern, pattern.message.clone()) {
            return Some(true);
        }
    }
    Some(false)
}

async fn run_rule(rule: &ValidateRule, input: &Value) -> Option<Option<String>> {
    let outcome = match rule {
        ValidateRule::Sync(rule) => rule(input),
        ValidateRule::Async(rule) => match rule(input.clone()).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "async validate rule rejected; recording as failure");
                ValidateOutcome::Message(error)
            }
        },
    };
    outcome.failure()
}

pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(checked)) => !checked,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(entries)) => entries.is_empty(),
        Some(Value::Number(_)) => false,
    }
}

fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Values that cannot be read as the bound's kind are not compared.
fn compare_to_bound(value: &Value, bound: &Bound) -> Option<Ordering> {
    match bound {
        Bound::Number(bound) => {
            let number = match value {
                Value::Number(number) => Decimal::from_str(&number.to_string())
                    .ok()
                    .or_else(|| number.as_f64().and_then(decimal_from_f64)),
                Value::String(text) => Decimal::from_str(text.trim()).ok(),
                _ => None,
            }?;
            Some(number.cmp(bound))
        }
        Bound::Date(bound) => {
            let date = parse_date(value.as_str()?.trim())?;
            Some(date.cmp(bound))
        }
    }
}

impl FormController {
    /// Validates the listed fields, or the whole form when `names` is empty.
    pub async fn trigger_validation<N, I>(&self, names: I) -> FormResult<bool>
    where
        N: IntoFieldPath,
        I: IntoIterator<Item = N>,
    {
        let paths = names
            .into_iter()
            .map(IntoFieldPath::into_field_path)
            .collect::<FormResult<Vec<_>>>()?;
        match paths.len() {
            0 => self.validate_form().await,
            1 => self.validate_path(paths[0].clone()).await,
            _ => self.validate_paths(paths).await,
        }
    }

    pub async fn validate_field<N>(&self, name: N) -> FormResult<bool>
    where
        N: IntoFieldPath,
    {
        self.validate_path(name.into_field_path()?).await
    }

    pub async fn validate_fields<N, I>(&self, names: I) -> FormResult<bool>
    where
        N: IntoFieldPath,
        I: IntoIterator<Item = N>,
    {
        let paths = names
            .into_iter()
            .map(IntoFieldPath::into_field_path)
            .collect::<FormResult<Vec<_>>>()?;
        self.validate_paths(paths).await
    }

    /// Runs a full round. Errors left on paths that no registered field owns
    /// are dropped so the tree reflects this round only.
    pub async fn validate_form(&self) -> FormResult<bool> {
        if let Some(schema) = self.schema.clone() {
            return self.schema_round(schema, None).await;
        }

        let paths = {
            let mut state = write_lock(&self.state, "starting form validation")?;
            let paths = state
                .registry
                .in_order()
                .into_iter()
                .map(|field| field.name().clone())
                .collect::<Vec<_>>();
            let owned = state
                .errors
                .iter()
                .filter(|(key, _)| state.registry.contains(key))
                .map(|(key, error)| (key.clone(), error.clone()))
                .collect::<BTreeMap<_, _>>();
            state.errors.replace_fields(owned);
            state.errors.clear_form_error();
            debug!(form = state.id.0, fields = paths.len(), "form validation started");
            paths
        };

        let results = join_all(paths.into_iter().map(|path| self.validate_path(path))).await;
        for result in results {
            result?;
        }
        Ok(read_lock(&self.state, "reading form validation result")?
            .errors
            .is_empty())
    }

    async fn validate_paths(&self, paths: Vec<FieldPath>) -> FormResult<bool> {
        if let Some(schema) = self.schema.clone() {
            return self.schema_round(schema, Some(paths)).await;
        }
        let results = join_all(paths.into_iter().map(|path| self.validate_path(path))).await;
        let mut valid = true;
        for result in results {
            valid &= result?;
        }
        Ok(valid)
    }

    pub(crate) async fn validate_path(&self, path: FieldPath) -> FormResult<bool> {
        if let Some(schema) = self.schema.clone() {
            return self.schema_round(schema, Some(vec![path])).await;
        }

        let (ticket, rules, value) = {
            let mut state = write_lock(&self.state, "starting field validation")?;
            let Some(rules) = state.registry.get(&path).map(|field| field.rules().clone()) else {
                return Ok(state.errors.get(&path).is_none());
            };
            let ticket = state.next_ticket(&path);
            let value = path::get(&state.values, &path).cloned();
            state.validating.insert(path.clone());
            trace!(form = state.id.0, field = %path, round = ticket.0, "field validation started");
            (ticket, rules, value)
        };

        if rules.has_async() && !self.options.async_debounce.is_zero() {
            Delay::new(self.options.async_debounce).await;
            if self.current_round_path(ticket)?.is_none() {
                trace!(field = %path, round = ticket.0, "debounced round superseded");
                return self.field_is_valid(&path);
            }
        }

        let result = validate_value(&rules, value.as_ref(), self.options.criteria_mode).await;
        self.apply_field_result(&path, ticket, result)
    }

    fn apply_field_result(
        &self,
        path: &FieldPath,
        ticket: ValidationTicket,
        result: Option<FieldError>,
    ) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "applying field validation")?;
        let Some(current) = state.round_path(ticket) else {
            trace!(form = state.id.0, field = %path, round = ticket.0, "discarding stale validation result");
            return Ok(state.errors.get(path).is_none());
        };
        state.validating.remove(&current);
        let valid = result.is_none();
        match result {
            Some(error) => state.errors.set_error(current.clone(), error),
            None => {
                state.errors.remove(&current);
            }
        }
        state.changed(&[FormStateFlag::IsValid]);
        trace!(form = state.id.0, field = %current, round = ticket.0, valid, "applied validation result");
        Ok(valid)
    }

    fn current_round_path(&self, ticket: ValidationTicket) -> FormResult<Option<FieldPath>> {
        Ok(read_lock(&self.state, "checking latest validation round")?.round_path(ticket))
    }

    fn field_is_valid(&self, path: &FieldPath) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading field validity")?
            .errors
            .get(path)
            .is_none())
    }

    /// Delegates to the external validator. `scope` limits which paths take
    /// the result; `None` replaces the whole tree.
    async fn schema_round(
        &self,
        schema: Arc<dyn SchemaValidator>,
        scope: Option<Vec<FieldPath>>,
    ) -> FormResult<bool> {
        let (rounds, form_round, values) = {
            let mut state = write_lock(&self.state, "starting schema validation")?;
            let (rounds, form_round) = match &scope {
                None => {
                    state.next_round += 1;
                    state.form_round = state.next_round;
                    (Vec::new(), Some(state.form_round))
                }
                Some(paths) => {
                    let rounds = paths
                        .iter()
                        .map(|path| {
                            state.validating.insert(path.clone());
                            (path.clone(), state.next_ticket(path))
                        })
                        .collect::<Vec<_>>();
                    (rounds, None)
                }
            };
            debug!(form = state.id.0, scoped = scope.is_some(), "schema validation started");
            (rounds, form_round, state.values.clone())
        };

        let result = schema.validate(values, self.schema_options.clone()).await;

        let mut state = write_lock(&self.state, "applying schema validation")?;
        if let Some(round) = form_round {
            if state.form_round != round {
                trace!(form = state.id.0, round, "discarding stale schema round");
                return Ok(state.errors.is_empty());
            }
        }
        let errors = match result {
            Ok(errors) => {
                state.errors.clear_form_error();
                errors
            }
            Err(error) => {
                warn!(form = state.id.0, %error, "schema validator failed");
                for (_, ticket) in &rounds {
                    if let Some(current) = state.round_path(*ticket) {
                        state.validating.remove(&current);
                    }
                }
                state
                    .errors
                    .set_form_error(FieldError::external("schema", error));
                state.changed(&[FormStateFlag::IsValid]);
                return Ok(false);
            }
        };

        let valid = match form_round {
            Some(round) => {
                let fresher = state
                    .tickets
                    .iter()
                    .filter(|(_, ticket)| ticket.0 > round)
                    .map(|(path, _)| path.clone())
                    .collect::<BTreeSet<_>>();
                let covered = |key: &FieldPath| fresher.iter().any(|path| path.is_prefix_of(key));
                let mut next = errors
                    .into_iter()
                    .filter(|(key, _)| !covered(key))
                    .collect::<SchemaErrors>();
                for (key, error) in state.errors.iter() {
                    if covered(key) {
                        next.insert(key.clone(), error.clone());
                    }
                }
                state.errors.replace_fields(next);
                state.errors.is_empty()
            }
            None => {
                let mut settled = Vec::with_capacity(rounds.len());
                for (path, ticket) in &rounds {
                    let Some(current) = state.round_path(*ticket) else {
                        trace!(form = state.id.0, field = %path, round = ticket.0, "discarding stale schema result");
                        settled.push(path.clone());
                        continue;
                    };
                    state.validating.remove(&current);
                    state.errors.clear_error(&current);
                    for (key, error) in errors.iter().filter(|(key, _)| path.is_prefix_of(key)) {
                        state.errors.set_error(key.rebased(path, &current), error.clone());
                    }
                    settled.push(current);
                }
                settled
                    .iter()
                    .all(|path| !state.errors.has_errors_under(path))
            }
        };
        state.changed(&[FormStateFlag::IsValid]);
        Ok(valid)
    }
}
