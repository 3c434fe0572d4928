use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use futures::future::BoxFuture;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct RuleValue<T> {
    pub value: T,
    pub message: Option<String>,
}

impl<T> RuleValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            message: None,
        }
    }

    pub fn with_message(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: Some(message.into()),
        }
    }
}

impl<T> From<T> for RuleValue<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bound {
    Number(Decimal),
    Date(NaiveDateTime),
}

impl Bound {
    /// Parses a numeric literal first, then an ISO date or date-time.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(number) = Decimal::from_str(input) {
            return Some(Bound::Number(number));
        }
        parse_date(input).map(Bound::Date)
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        decimal_from_f64(value).map(Bound::Number)
    }
}

impl From<i32> for Bound {
    fn from(value: i32) -> Self {
        Bound::Number(Decimal::from(value))
    }
}

impl From<i64> for Bound {
    fn from(value: i64) -> Self {
        Bound::Number(Decimal::from(value))
    }
}

impl From<u32> for Bound {
    fn from(value: u32) -> Self {
        Bound::Number(Decimal::from(value))
    }
}

impl From<u64> for Bound {
    fn from(value: u64) -> Self {
        Bound::Number(Decimal::from(value))
    }
}

impl From<Decimal> for Bound {
    fn from(value: Decimal) -> Self {
        Bound::Number(value)
    }
}

impl From<NaiveDate> for Bound {
    fn from(value: NaiveDate) -> Self {
        Bound::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<NaiveDateTime> for Bound {
    fn from(value: NaiveDateTime) -> Self {
        Bound::Date(value)
    }
}

pub(crate) fn parse_date(input: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(date.and_time(chrono::NaiveTime::MIN));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|date_time| date_time.naive_utc())
        })
}

pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidateOutcome {
    Valid,
    Invalid,
    Message(String),
}

impl ValidateOutcome {
    pub(crate) fn failure(self) -> Option<Option<String>> {
        match self {
            ValidateOutcome::Valid => None,
            ValidateOutcome::Invalid => Some(None),
            ValidateOutcome::Message(message) => Some(Some(message)),
        }
    }
}

impl From<bool> for ValidateOutcome {
    fn from(valid: bool) -> Self {
        if valid {
            ValidateOutcome::Valid
        } else {
            ValidateOutcome::Invalid
        }
    }
}

impl From<&str> for ValidateOutcome {
    fn from(message: &str) -> Self {
        ValidateOutcome::Message(message.to_string())
    }
}

impl From<String> for ValidateOutcome {
    fn from(message: String) -> Self {
        ValidateOutcome::Message(message)
    }
}

impl From<Option<String>> for ValidateOutcome {
    fn from(message: Option<String>) -> Self {
        message.map_or(ValidateOutcome::Valid, ValidateOutcome::Message)
    }
}

pub type BoxedValidateFuture = BoxFuture<'static, Result<ValidateOutcome, String>>;

pub(crate) type SyncValidateFn = Arc<dyn Fn(&Value) -> ValidateOutcome + Send + Sync>;
pub(crate) type AsyncValidateFn = Arc<dyn Fn(Value) -> BoxedValidateFuture + Send + Sync>;

#[derive(Clone)]
pub enum ValidateRule {
    Sync(SyncValidateFn),
    Async(AsyncValidateFn),
}

impl ValidateRule {
    pub fn sync<F, R>(rule: F) -> Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: Into<ValidateOutcome>,
    {
        ValidateRule::Sync(Arc::new(move |value: &Value| rule(value).into()))
    }

    /// An asynchronous rule; a rejected future counts as a failure of this
    /// rule carrying the rejection text as its message.
    pub fn future<F, Fut, R, E>(rule: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Into<ValidateOutcome>,
        E: Display,
    {
        ValidateRule::Async(Arc::new(move |value: Value| {
            let pending = rule(value);
            Box::pin(async move {
                pending
                    .await
                    .map(Into::into)
                    .map_err(|error| error.to_string())
            })
        }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, ValidateRule::Async(_))
    }
}

impl Debug for ValidateRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidateRule::Sync(_) => f.write_str("ValidateRule::Sync(..)"),
            ValidateRule::Async(_) => f.write_str("ValidateRule::Async(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Validate {
    Single(ValidateRule),
    Named(Vec<(String, ValidateRule)>),
}

impl Validate {
    fn has_async(&self) -> bool {
        match self {
            Validate::Single(rule) => rule.is_async(),
            Validate::Named(rules) => rules.iter().any(|(_, rule)| rule.is_async()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationOptions {
    pub required: Option<RuleValue<bool>>,
    pub min: Option<RuleValue<Bound>>,
    pub max: Option<RuleValue<Bound>>,
    pub min_length: Option<RuleValue<usize>>,
    pub max_length: Option<RuleValue<usize>>,
    pub pattern: Option<RuleValue<Regex>>,
    pub validate: Option<Validate>,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = Some(RuleValue::new(true));
        self
    }

    pub fn required_message(mut self, message: impl Into<String>) -> Self {
        self.required = Some(RuleValue::with_message(true, message));
        self
    }

    pub fn min(mut self, bound: impl Into<Bound>) -> Self {
        self.min = Some(RuleValue::new(bound.into()));
        self
    }

    pub fn min_message(mut self, bound: impl Into<Bound>, message: impl Into<String>) -> Self {
        self.min = Some(RuleValue::with_message(bound.into(), message));
        self
    }

    pub fn max(mut self, bound: impl Into<Bound>) -> Self {
        self.max = Some(RuleValue::new(bound.into()));
        self
    }

    pub fn max_message(mut self, bound: impl Into<Bound>, message: impl Into<String>) -> Self {
        self.max = Some(RuleValue::with_message(bound.into(), message));
        self
    }

    pub fn min_length(mut self, length: usize) -> Self {
        self.min_length = Some(RuleValue::new(length));
        self
    }

    pub fn min_length_message(mut self, length: usize, message: impl Into<String>) -> Self {
        self.min_length = Some(RuleValue::with_message(length, message));
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(RuleValue::new(length));
        self
    }

    pub fn max_length_message(mut self, length: usize, message: impl Into<String>) -> Self {
        self.max_length = Some(RuleValue::with_message(length, message));
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(RuleValue::new(pattern));
        self
    }

    pub fn pattern_message(mut self, pattern: Regex, message: impl Into<String>) -> Self {
        self.pattern = Some(RuleValue::with_message(pattern, message));
        self
    }

    pub fn validate(mut self, rule: ValidateRule) -> Self {
        self.validate = Some(Validate::Single(rule));
        self
    }

    /// Adds a named rule. A previously attached single rule is replaced.
    pub fn validate_named(mut self, name: impl Into<String>, rule: ValidateRule) -> Self {
        let name = name.into();
        match &mut self.validate {
            Some(Validate::Named(rules)) => {
                if let Some(existing) = rules.iter_mut().find(|(existing, _)| *existing == name) {
                    existing.1 = rule;
                } else {
                    rules.push((name, rule));
                }
            }
            _ => self.validate = Some(Validate::Named(vec![(name, rule)])),
        }
        self
    }

    /// Rules set on `newer` win; rules it leaves unset keep their current value.
    pub fn merge(self, newer: ValidationOptions) -> Self {
        Self {
            required: newer.required.or(self.required),
            min: newer.min.or(self.min),
            max: newer.max.or(self.max),
            min_length: newer.min_length.or(self.min_length),
            max_length: newer.max_length.or(self.max_length),
            pattern: newer.pattern.or(self.pattern),
            validate: newer.validate.or(self.validate),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_none()
            && self.min.is_none()
            && self.max.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
            && self.validate.is_none()
    }

    pub fn has_async(&self) -> bool {
        self.validate.as_ref().is_some_and(Validate::has_async)
    }
}
