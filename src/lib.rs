pub mod binding;
pub mod controller;
pub mod error_tree;
pub mod field_array;
pub mod form_state;
pub mod lens;
pub mod path;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod tracker;
pub mod validation;
pub mod watch;

#[cfg(test)]
mod tests;

pub use binding::{BindingHandle, BindingSetter, FieldBinding};
pub use calmform_derive::FormModel;
pub use controller::{
    CriteriaMode, FieldMeta, FormController, FormError, FormId, FormOptions, FormResult,
    RevalidateMode, SubmitOutcome, SubmitState, ValidationEvent, ValidationMode,
    ValidationTicket,
};
pub use error_tree::{ErrorKind, ErrorTree, FieldError};
pub use field_array::{FieldArrayManager, FieldArrayState, Reindex, RowId};
pub use form_state::{FormStateFlag, FormStateProjector, FormStateProxy, FormStateSnapshot};
pub use lens::{FieldLens, FormModel};
pub use path::{FieldPath, IntoFieldPath, PathSegment};
pub use registry::{Field, FieldRegistry};
pub use rules::{
    Bound, BoxedValidateFuture, RuleValue, Validate, ValidateOutcome, ValidateRule,
    ValidationOptions,
};
pub use schema::{SchemaErrors, SchemaOptions, SchemaValidator};
pub use tracker::{DirtyTouchedTracker, values_equal};
pub use validation::{is_blank, validate_value};
pub use watch::{ChangeSet, WatchCallback, WatchEvent, WatchSubscription, WatchTarget, Watcher};
