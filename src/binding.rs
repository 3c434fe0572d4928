use std::sync::Arc;

use tracing::trace;

use crate::controller::{FormController, FormResult, write_lock};
use crate::path::FieldPath;

/// A concrete input attached to a registered field.
pub trait FieldBinding: Send + Sync {
    /// Returns whether the input accepted focus.
    fn focus(&self) -> bool;

    fn detach(&self) {}
}

pub type BindingHandle = Arc<dyn FieldBinding>;

/// Returned by `register`; associates input handles with the field later on.
#[derive(Clone)]
pub struct BindingSetter {
    controller: FormController,
    name: FieldPath,
}

impl BindingSetter {
    pub(crate) fn new(controller: FormController, name: FieldPath) -> Self {
        Self { controller, name }
    }

    pub fn name(&self) -> &FieldPath {
        &self.name
    }

    /// Attaching the same handle again is a no-op and returns false.
    pub fn attach(&self, binding: BindingHandle) -> FormResult<bool> {
        let mut state = write_lock(&self.controller.state, "attaching field binding")?;
        let attached = state.registry.attach(&self.name, binding);
        trace!(field = %self.name, attached, "attach binding");
        Ok(attached)
    }

    /// Adds one input of a radio or checkbox group.
    pub fn attach_option(&self, binding: BindingHandle) -> FormResult<bool> {
        let mut state = write_lock(&self.controller.state, "attaching option binding")?;
        let attached = state.registry.attach_option(&self.name, binding);
        trace!(field = %self.name, attached, "attach option binding");
        Ok(attached)
    }

    /// Detaches every handle while keeping the field registered.
    pub fn release(&self) -> FormResult<usize> {
        let released = write_lock(&self.controller.state, "releasing field bindings")?
            .registry
            .take_bindings(&self.name);
        for binding in &released {
            binding.detach();
        }
        Ok(released.len())
    }
}
