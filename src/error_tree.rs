use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::path::{self, FieldPath};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Required,
    Min,
    Max,
    MinLength,
    MaxLength,
    Pattern,
    /// A `validate` rule failed; carries `"validate"` for a single rule or the
    /// rule name for a named set.
    Validate(String),
    Manual(String),
    External(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Required => "required",
            ErrorKind::Min => "min",
            ErrorKind::Max => "max",
            ErrorKind::MinLength => "minLength",
            ErrorKind::MaxLength => "maxLength",
            ErrorKind::Pattern => "pattern",
            ErrorKind::Validate(name) | ErrorKind::Manual(name) | ErrorKind::External(name) => {
                name
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub types: BTreeMap<String, Option<String>>,
    pub manual: bool,
}

impl FieldError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            types: BTreeMap::new(),
            manual: false,
        }
    }

    pub fn manual(error_type: impl Into<String>, message: Option<String>) -> Self {
        Self {
            kind: ErrorKind::Manual(error_type.into()),
            message,
            types: BTreeMap::new(),
            manual: true,
        }
    }

    pub fn external(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External(error_type.into())).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_types(mut self, types: BTreeMap<String, Option<String>>) -> Self {
        self.types = types;
        self
    }

    pub fn error_type(&self) -> &str {
        self.kind.as_str()
    }
}

#[derive(Serialize)]
struct FieldErrorRepr<'a> {
    #[serde(rename = "type")]
    error_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "no_types")]
    types: &'a BTreeMap<String, Option<String>>,
    #[serde(rename = "isManual", skip_serializing_if = "std::ops::Not::not")]
    manual: bool,
}

fn no_types(types: &&BTreeMap<String, Option<String>>) -> bool {
    types.is_empty()
}

impl Serialize for FieldError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FieldErrorRepr {
            error_type: self.error_type(),
            message: self.message.as_deref(),
            types: &self.types,
            manual: self.manual,
        }
        .serialize(serializer)
    }
}

/// Field errors indexed by path, plus an optional form-level error raised when
/// the external validator itself fails.
#[derive(Clone, Debug, Default)]
pub struct ErrorTree {
    fields: BTreeMap<FieldPath, FieldError>,
    form: Option<FieldError>,
}

impl ErrorTree {
    pub fn set_error(&mut self, path: FieldPath, error: FieldError) {
        self.fields.insert(path, error);
    }

    /// Clears the error at `path` and every error nested below it.
    pub fn clear_error(&mut self, path: &FieldPath) -> usize {
        let before = self.fields.len();
        self.fields.retain(|key, _| !path.is_prefix_of(key));
        before - self.fields.len()
    }

    pub fn clear_all(&mut self) {
        self.fields.clear();
        self.form = None;
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_none()
    }

    pub fn len(&self) -> usize {
        self.fields.len() + usize::from(self.form.is_some())
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldError> {
        self.fields.get(path)
    }

    pub fn has_errors_under(&self, path: &FieldPath) -> bool {
        self.fields.keys().any(|key| path.is_prefix_of(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldError)> {
        self.fields.iter()
    }

    pub fn form_error(&self) -> Option<&FieldError> {
        self.form.as_ref()
    }

    pub(crate) fn remove(&mut self, path: &FieldPath) -> Option<FieldError> {
        self.fields.remove(path)
    }

    pub(crate) fn set_form_error(&mut self, error: FieldError) {
        self.form = Some(error);
    }

    pub(crate) fn clear_form_error(&mut self) {
        self.form = None;
    }

    pub(crate) fn replace_fields(&mut self, fields: BTreeMap<FieldPath, FieldError>) {
        self.fields = fields;
    }

    pub(crate) fn reindex(&mut self, prefix: &FieldPath, remap: impl Fn(usize) -> Option<usize>) {
        self.fields = std::mem::take(&mut self.fields)
            .into_iter()
            .filter_map(|(key, error)| key.reindexed(prefix, &remap).map(|key| (key, error)))
            .collect();
    }

    /// Nested projection shaped like the form values. An error on a path
    /// shadows errors nested below it; those stay reachable through `get`.
    pub fn to_value(&self) -> Value {
        let mut tree = Value::Object(Map::new());
        let mut written: Vec<&FieldPath> = Vec::new();
        for (key, error) in &self.fields {
            if written.iter().any(|ancestor| ancestor.is_prefix_of(key)) {
                continue;
            }
            path::set(
                &mut tree,
                key,
                serde_json::to_value(error).unwrap_or_default(),
            );
            written.push(key);
        }
        tree
    }
}
