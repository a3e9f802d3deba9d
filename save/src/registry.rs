//! The ECS registry collaborator.
//!
//! The save engine needs four operations from a registry: create an entity,
//! attach a component, query a component, and iterate the entities carrying
//! a component type. This module provides a self-contained single-threaded
//! registry with exactly that surface, so the codec is usable and testable
//! without a host engine. The codec only ever mutates a registry during
//! deserialization; the caller must not touch it concurrently.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::entity::{Entity, EntityAllocator};
use crate::sparse_set::SparseSet;

/// Type-erased access to a component column, enough for structural
/// operations that do not know the component type.
trait AnyColumn: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_entity(&mut self, entity_id: u32);
    fn len(&self) -> usize;
}

impl<T: 'static> AnyColumn for SparseSet<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_entity(&mut self, entity_id: u32) {
        self.remove(entity_id);
    }

    fn len(&self) -> usize {
        SparseSet::len(self)
    }
}

/// A container of entities and per-type component columns.
pub struct Registry {
    entities: EntityAllocator,
    columns: HashMap<TypeId, Box<dyn AnyColumn>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            columns: HashMap::new(),
        }
    }

    /// Allocates a fresh entity.
    pub fn create(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Destroys an entity and removes all its components.
    ///
    /// Returns `false` if the entity was already dead.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.entities.deallocate(entity) {
            return false;
        }
        for column in self.columns.values_mut() {
            column.remove_entity(entity.id());
        }
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> u32 {
        self.entities.count()
    }

    /// Attaches a component, replacing any existing value of the same type.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not alive.
    pub fn add<T: 'static>(&mut self, entity: Entity, component: T) {
        assert!(
            self.entities.is_alive(entity),
            "cannot add a component to dead entity {entity}"
        );
        self.columns
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SparseSet::<T>::new()))
            .as_any_mut()
            .downcast_mut::<SparseSet<T>>()
            .expect("column type matches its TypeId")
            .insert(entity.id(), component);
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.column::<T>()?.get(entity.id())
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        self.column_mut::<T>()?.get_mut(entity.id())
    }

    pub fn has<T: 'static>(&self, entity: Entity) -> bool {
        self.column::<T>()
            .is_some_and(|column| column.contains(entity.id()))
    }

    /// Detaches and returns the entity's component, if present.
    pub fn remove<T: 'static>(&mut self, entity: Entity) -> Option<T> {
        self.column_mut::<T>()?.remove(entity.id())
    }

    /// Iterates `(entity, &component)` for every entity carrying `T`,
    /// in insertion order.
    pub fn view<T: 'static>(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.column::<T>()
            .into_iter()
            .flat_map(|column| column.iter())
            .map(|(id, value)| (Entity::from_raw(id), value))
    }

    /// Number of entities carrying `T`.
    pub fn count<T: 'static>(&self) -> usize {
        self.column::<T>().map_or(0, SparseSet::len)
    }

    fn column<T: 'static>(&self) -> Option<&SparseSet<T>> {
        self.columns
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref()
    }

    fn column_mut<T: 'static>(&mut self) -> Option<&mut SparseSet<T>> {
        self.columns
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position {
        x: f32,
        y: f32,
    }

    struct Velocity {
        dx: f32,
    }

    #[test]
    fn add_and_get() {
        let mut registry = Registry::new();
        let entity = registry.create();
        registry.add(entity, Position { x: 1.0, y: 2.0 });

        let position = registry.get::<Position>(entity).unwrap();
        assert_eq!(position.x, 1.0);
        assert_eq!(position.y, 2.0);
        assert!(registry.has::<Position>(entity));
        assert!(!registry.has::<Velocity>(entity));
    }

    #[test]
    fn view_iterates_only_carriers() {
        let mut registry = Registry::new();
        let a = registry.create();
        let b = registry.create();
        let c = registry.create();
        registry.add(a, Position { x: 0.0, y: 0.0 });
        registry.add(c, Position { x: 5.0, y: 5.0 });
        registry.add(b, Velocity { dx: 1.0 });

        let entities: Vec<Entity> = registry.view::<Position>().map(|(e, _)| e).collect();
        assert_eq!(entities, vec![a, c]);
        assert_eq!(registry.count::<Position>(), 2);
        assert_eq!(registry.count::<Velocity>(), 1);
    }

    #[test]
    fn destroy_removes_components() {
        let mut registry = Registry::new();
        let entity = registry.create();
        registry.add(entity, Position { x: 0.0, y: 0.0 });

        assert!(registry.destroy(entity));
        assert!(!registry.is_alive(entity));
        assert_eq!(registry.count::<Position>(), 0);
        assert!(!registry.destroy(entity));
    }

    #[test]
    fn view_of_unknown_type_is_empty() {
        let registry = Registry::new();
        assert_eq!(registry.view::<Position>().count(), 0);
    }

    #[test]
    #[should_panic(expected = "dead entity")]
    fn add_to_dead_entity_panics() {
        let mut registry = Registry::new();
        let entity = registry.create();
        registry.destroy(entity);
        registry.add(entity, Velocity { dx: 0.0 });
    }
}
