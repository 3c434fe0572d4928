use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::error_tree::FieldError;
use crate::path::FieldPath;

/// Passed through to the external validator untouched.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaOptions {
    pub strict: bool,
    pub abort_early: bool,
    pub strip_unknown: bool,
    pub recursive: bool,
    pub context: Value,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            strict: false,
            abort_early: false,
            strip_unknown: false,
            recursive: true,
            context: Value::Null,
        }
    }
}

pub type SchemaErrors = BTreeMap<FieldPath, FieldError>;

/// Whole-form validation delegate. When attached it replaces the per-field
/// rule pipeline; the returned errors are keyed by field path.
pub trait SchemaValidator: Send + Sync + 'static {
    fn validate(
        &self,
        values: Value,
        options: SchemaOptions,
    ) -> BoxFuture<'static, Result<SchemaErrors, String>>;
}

impl<F, Fut, E> SchemaValidator for F
where
    F: Fn(Value, SchemaOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SchemaErrors, E>> + Send + 'static,
    E: Display,
{
    fn validate(
        &self,
        values: Value,
        options: SchemaOptions,
    ) -> BoxFuture<'static, Result<SchemaErrors, String>> {
        self(values, options)
            .map(|result| result.map_err(|error| error.to_string()))
            .boxed()
    }
}
