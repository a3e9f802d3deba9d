//! Ordered component-type sets and their transforms.
//!
//! A [`ComponentSet`] fixes which types a codec handles and in which order:
//! declaration order is the on-wire block order of the binary format and
//! the key order of the text format. All transforms are pure and resolved
//! before a codec is constructed.

use std::any::TypeId;

use crate::component::{Saveable, TypeDescriptor};
use crate::error::SaveError;

/// An ordered list of registered component types.
///
/// Gameplay modules conventionally expose their own persisted set through
/// a `pub fn components() -> ComponentSet` built with
/// [`component_set!`](crate::component_set); an application merges those
/// per-module sets into the full list:
///
/// ```ignore
/// let all = ComponentSet::merge([&physics::components(), &combat::components()]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ComponentSet {
    types: Vec<TypeDescriptor>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self { types: Vec::new() }
    }

    /// Appends a type. Registering the same type twice keeps the first
    /// registration and logs a warning.
    pub fn with<T: Saveable>(mut self) -> Self {
        if self.types.iter().any(|d| d.type_id() == TypeId::of::<T>()) {
            log::warn!("component type '{}' registered twice; keeping the first", T::NAME);
            return self;
        }
        if let Some(existing) = self.types.iter().find(|d| d.name() == T::NAME) {
            log::warn!(
                "component name '{}' already registered by another type; keeping {:?}",
                T::NAME,
                existing
            );
            return self;
        }
        self.types.push(TypeDescriptor::of::<T>());
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    pub fn contains<T: Saveable>(&self) -> bool {
        self.types.iter().any(|d| d.type_id() == TypeId::of::<T>())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.types.iter().any(|d| d.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.iter().find(|d| d.name() == name)
    }

    /// Set difference preserving this set's order: every type of `self`
    /// that is not in `removed`. This is how transient components are
    /// excluded from a persisted set.
    pub fn exclude(&self, removed: &ComponentSet) -> ComponentSet {
        ComponentSet {
            types: self
                .types
                .iter()
                .filter(|d| !removed.types.iter().any(|r| r.type_id() == d.type_id()))
                .cloned()
                .collect(),
        }
    }

    /// Concatenation preserving order; a type appearing in several inputs
    /// keeps its first position and later occurrences log a warning.
    pub fn merge<'a>(sets: impl IntoIterator<Item = &'a ComponentSet>) -> ComponentSet {
        let mut out = ComponentSet::new();
        for set in sets {
            for descriptor in &set.types {
                if out.types.iter().any(|d| d.type_id() == descriptor.type_id()) {
                    log::warn!(
                        "component type '{}' appears in multiple merged sets; keeping the first",
                        descriptor.name()
                    );
                    continue;
                }
                out.types.push(descriptor.clone());
            }
        }
        out
    }

    /// Whether every type of this set also appears in `all`.
    pub fn is_subset_of(&self, all: &ComponentSet) -> bool {
        self.types
            .iter()
            .all(|d| all.types.iter().any(|a| a.type_id() == d.type_id()))
    }

    /// First type of this set missing from `all`, if any.
    pub(crate) fn first_not_in(&self, all: &ComponentSet) -> Option<&TypeDescriptor> {
        self.types
            .iter()
            .find(|d| !all.types.iter().any(|a| a.type_id() == d.type_id()))
    }

    /// Schema validation: every shape must have an unambiguous wire form,
    /// and a type overriding emit must also override parse to stay
    /// loadable. Codec constructors run the relevant halves so schema
    /// mistakes never reach a shipped save.
    pub fn validate_serializable(&self) -> Result<(), SaveError> {
        self.check_shapes()?;
        self.check_parseable()
    }

    /// Every shape has an unambiguous wire form. Needed by both codec
    /// directions.
    pub(crate) fn check_shapes(&self) -> Result<(), SaveError> {
        for descriptor in &self.types {
            descriptor.shape().check_wire_form(descriptor.name())?;
        }
        Ok(())
    }

    /// Every type can go through the generic decode path: a custom emit
    /// without a matching custom parse is write-only.
    pub(crate) fn check_parseable(&self) -> Result<(), SaveError> {
        for descriptor in &self.types {
            if descriptor.has_custom_emit() && !descriptor.has_custom_parse() {
                return Err(SaveError::NotDeserializable {
                    type_name: descriptor.name(),
                });
            }
        }
        Ok(())
    }
}

/// Builds a [`ComponentSet`] from a list of types:
///
/// ```ignore
/// let all = component_set![Position, Health, Player];
/// ```
#[macro_export]
macro_rules! component_set {
    ($($ty:ty),* $(,)?) => {{
        let set = $crate::ComponentSet::new();
        $(let set = set.with::<$ty>();)*
        set
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Saveable;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Saveable)]
    struct Alpha {
        value: u32,
    }

    #[derive(Serialize, Deserialize, Saveable)]
    struct Beta {
        value: u32,
    }

    #[derive(Serialize, Deserialize, Saveable)]
    struct Gamma;

    #[test]
    fn order_follows_registration() {
        let set = component_set![Beta, Alpha, Gamma];
        let names: Vec<_> = set.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Beta", "Alpha", "Gamma"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let set = component_set![Alpha, Alpha, Beta];
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().name(), "Alpha");
    }

    #[test]
    fn exclude_preserves_order() {
        let all = component_set![Alpha, Beta, Gamma];
        let transient = component_set![Beta];
        let kept = all.exclude(&transient);
        let names: Vec<_> = kept.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn merge_concatenates_and_dedups() {
        let first = component_set![Alpha, Beta];
        let second = component_set![Beta, Gamma];
        let merged = ComponentSet::merge([&first, &second]);
        let names: Vec<_> = merged.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn subset_checks() {
        let all = component_set![Alpha, Beta, Gamma];
        let subset = component_set![Gamma, Alpha];
        let foreign = component_set![Beta, Gamma].with::<Alpha>();

        assert!(subset.is_subset_of(&all));
        assert!(foreign.is_subset_of(&all));
        assert!(!all.is_subset_of(&subset));
        assert_eq!(
            all.first_not_in(&subset).map(|d| d.name()),
            Some("Beta")
        );
    }

    #[test]
    fn contains_by_type_and_name() {
        let set = component_set![Alpha];
        assert!(set.contains::<Alpha>());
        assert!(!set.contains::<Beta>());
        assert!(set.contains_name("Alpha"));
        assert!(set.get("Alpha").is_some());
        assert!(set.get("Delta").is_none());
    }

    #[test]
    fn derived_shapes_validate() {
        let set = component_set![Alpha, Beta, Gamma];
        assert!(set.validate_serializable().is_ok());
    }
}
