//! Sparse-set component storage.

use fixedbitset::FixedBitSet;

/// Typed sparse set storing components of type `T`.
///
/// A sparse array maps entity ids to dense indices; the dense arrays keep
/// component values contiguous so that per-type iteration, the access
/// pattern the save encoder lives on, walks memory linearly.
pub struct SparseSet<T> {
    /// `entity_id -> dense index`; `None` means the entity lacks this component.
    sparse: Vec<Option<u32>>,
    /// Component values, contiguous for iteration.
    dense: Vec<T>,
    /// Entity ids parallel to `dense`.
    entities: Vec<u32>,
    /// Bit N set iff entity id N has this component.
    membership: FixedBitSet,
}

impl<T> SparseSet<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            entities: Vec::new(),
            membership: FixedBitSet::new(),
        }
    }

    /// Inserts a component for the entity, replacing any existing value.
    pub fn insert(&mut self, entity_id: u32, value: T) {
        let idx = entity_id as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }

        if let Some(dense_idx) = self.sparse[idx] {
            self.dense[dense_idx as usize] = value;
        } else {
            self.sparse[idx] = Some(self.dense.len() as u32);
            self.dense.push(value);
            self.entities.push(entity_id);
            if idx >= self.membership.len() {
                self.membership.grow(idx + 1);
            }
            self.membership.insert(idx);
        }
    }

    /// Removes and returns the entity's component, if present.
    pub fn remove(&mut self, entity_id: u32) -> Option<T> {
        let idx = entity_id as usize;
        if idx >= self.sparse.len() {
            return None;
        }
        let dense_idx = self.sparse[idx].take()? as usize;
        self.membership.set(idx, false);

        let last = self.dense.len() - 1;
        if dense_idx != last {
            // Swap-remove: the last element slides into the vacated slot.
            let moved_entity = self.entities[last];
            self.sparse[moved_entity as usize] = Some(dense_idx as u32);
            self.entities[dense_idx] = moved_entity;
        }
        self.entities.pop();
        Some(self.dense.swap_remove(dense_idx))
    }

    pub fn get(&self, entity_id: u32) -> Option<&T> {
        let dense_idx = *self.sparse.get(entity_id as usize)?.as_ref()? as usize;
        Some(&self.dense[dense_idx])
    }

    pub fn get_mut(&mut self, entity_id: u32) -> Option<&mut T> {
        let dense_idx = *self.sparse.get(entity_id as usize)?.as_ref()? as usize;
        Some(&mut self.dense[dense_idx])
    }

    pub fn contains(&self, entity_id: u32) -> bool {
        let idx = entity_id as usize;
        idx < self.sparse.len() && self.sparse[idx].is_some()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Iterates over `(entity_id, &component)` in dense (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entities.iter().copied().zip(self.dense.iter())
    }

    /// Entity ids in dense order.
    pub fn entities(&self) -> &[u32] {
        &self.entities
    }

    pub fn membership(&self) -> &FixedBitSet {
        &self.membership
    }
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
