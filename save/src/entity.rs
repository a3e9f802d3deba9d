//! Entity identifiers and allocation.

use fixedbitset::FixedBitSet;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

/// An opaque 32-bit entity identifier.
///
/// Equality is the only meaningful operation; the value itself carries no
/// state. On the wire an entity reference is its raw id, and the
/// deserializer's remap table rewrites saved ids into freshly allocated
/// ones.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);

impl Entity {
    /// Reconstructs an entity from a raw id, e.g. one read from a save.
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// The raw 32-bit id.
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

// Entity references serialize as bare integers; the shape walker knows
// which integers are references and rewrites them during load.
impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Entity)
    }
}

/// Hands out fresh entity ids and tracks which are alive.
///
/// Ids are never recycled: a load that allocates entities for remapping
/// must be guaranteed fresh identifiers, so despawned slots stay retired.
pub(crate) struct EntityAllocator {
    next: u32,
    alive: FixedBitSet,
    count: u32,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            next: 0,
            alive: FixedBitSet::new(),
            count: 0,
        }
    }

    pub fn allocate(&mut self) -> Entity {
        let id = self.next;
        self.next = self
            .next
            .checked_add(1)
            .expect("entity id space exhausted");
        self.alive.grow(id as usize + 1);
        self.alive.insert(id as usize);
        self.count += 1;
        Entity(id)
    }

    /// Returns false if the entity was already dead.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        let idx = entity.0 as usize;
        if idx >= self.alive.len() || !self.alive.contains(idx) {
            return false;
        }
        self.alive.set(idx, false);
        self.count -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.0 as usize;
        idx < self.alive.len() && self.alive.contains(idx)
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
