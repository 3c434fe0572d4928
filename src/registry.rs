use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::binding::BindingHandle;
use crate::path::FieldPath;
use crate::rules::ValidationOptions;

#[derive(Clone)]
pub struct Field {
    name: FieldPath,
    rules: ValidationOptions,
    binding: Option<BindingHandle>,
    option_bindings: Vec<BindingHandle>,
    order: u64,
}

impl Field {
    pub fn name(&self) -> &FieldPath {
        &self.name
    }

    pub fn rules(&self) -> &ValidationOptions {
        &self.rules
    }

    pub fn binding(&self) -> Option<&BindingHandle> {
        self.binding.as_ref()
    }

    pub fn option_bindings(&self) -> &[BindingHandle] {
        &self.option_bindings
    }

    /// Registration sequence; used to find the first field with an error.
    pub fn order(&self) -> u64 {
        self.order
    }

    pub(crate) fn focus_target(&self) -> Option<BindingHandle> {
        self.binding
            .clone()
            .or_else(|| self.option_bindings.first().cloned())
    }

    pub(crate) fn release_bindings(self) {
        for binding in self.binding.iter().chain(self.option_bindings.iter()) {
            binding.detach();
        }
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .field("bound", &self.binding.is_some())
            .field("option_bindings", &self.option_bindings.len())
            .field("order", &self.order)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct FieldRegistry {
    fields: BTreeMap<FieldPath, Field>,
    next_order: u64,
}

impl FieldRegistry {
    /// Creates the field, or merges `rules` over the existing ones. Bindings
    /// and registration order survive re-registration.
    pub fn register(&mut self, name: FieldPath, rules: ValidationOptions) -> &Field {
        let order = self.next_order;
        let field = self
            .fields
            .entry(name.clone())
            .and_modify(|field| {
                let current = std::mem::take(&mut field.rules);
                field.rules = current.merge(rules.clone());
            })
            .or_insert_with(|| Field {
                name,
                rules,
                binding: None,
                option_bindings: Vec::new(),
                order,
            });
        if field.order == order {
            self.next_order += 1;
        }
        field
    }

    pub fn unregister(&mut self, name: &FieldPath) -> Option<Field> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &FieldPath) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &FieldPath) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn in_order(&self) -> Vec<&Field> {
        let mut fields = self.fields.values().collect::<Vec<_>>();
        fields.sort_by_key(|field| field.order);
        fields
    }

    /// Fields at or below `prefix`.
    pub fn under<'a>(&'a self, prefix: &'a FieldPath) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields
            .values()
            .filter(move |field| prefix.is_prefix_of(&field.name))
    }

    /// Replaces the main binding; returns false when `binding` is already the
    /// one attached.
    pub(crate) fn attach(&mut self, name: &FieldPath, binding: BindingHandle) -> bool {
        let Some(field) = self.fields.get_mut(name) else {
            return false;
        };
        if field
            .binding
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &binding))
        {
            return false;
        }
        field.binding = Some(binding);
        true
    }

    pub(crate) fn attach_option(&mut self, name: &FieldPath, binding: BindingHandle) -> bool {
        let Some(field) = self.fields.get_mut(name) else {
            return false;
        };
        if field
            .option_bindings
            .iter()
            .any(|current| Arc::ptr_eq(current, &binding))
        {
            return false;
        }
        field.option_bindings.push(binding);
        true
    }

    pub(crate) fn take_bindings(&mut self, name: &FieldPath) -> Vec<BindingHandle> {
        let Some(field) = self.fields.get_mut(name) else {
            return Vec::new();
        };
        field
            .binding
            .take()
            .into_iter()
            .chain(field.option_bindings.drain(..))
            .collect()
    }

    /// Returns the fields whose rows were dropped.
    pub(crate) fn reindex(
        &mut self,
        prefix: &FieldPath,
        remap: impl Fn(usize) -> Option<usize>,
    ) -> Vec<Field> {
        let mut dropped = Vec::new();
        self.fields = std::mem::take(&mut self.fields)
            .into_iter()
            .filter_map(|(key, mut field)| {
                let Some(key) = key.reindexed(prefix, &remap) else {
                    dropped.push(field);
                    return None;
                };
                field.name = key.clone();
                Some((key, field))
            })
            .collect();
        dropped
    }
}
