//! Saveable component types and their runtime descriptors.
//!
//! A component participates in saving by implementing [`Saveable`],
//! normally through `#[derive(Saveable)]`, which generates the shape tree
//! from the field types' [`SaveField`] impls. The codec itself never sees
//! concrete types: a [`TypeDescriptor`] erases each registered type behind
//! its name, shape, and a pair of encode/decode functions.

use std::any::TypeId;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::Entity;
use crate::error::SaveError;
use crate::registry::Registry;
use crate::shape::{FloatWidth, IntWidth, Shape};
use crate::value::{self, Value};
use crate::walk;

/// A component type that can be written to and read from saves.
///
/// Use `#[derive(Saveable)]` for the shape tree; the value conversions
/// default to the serde bridge. Types that persist something other than
/// their in-memory layout (pooled handles, dynamically-sized collections)
/// implement the trait by hand, declare the shape of their on-disk form,
/// and set the custom capability flags:
///
/// - `CUSTOM_EMIT` — [`emit_value`](Saveable::emit_value) produces the wire
///   value directly; it must conform to [`shape`](Saveable::shape).
/// - `CUSTOM_PARSE` — [`parse_value`](Saveable::parse_value) consumes the
///   wire value directly (entity references inside it are already
///   remapped).
///
/// A type with a custom emit but no custom parse cannot go through the
/// generic decode path; deserializer construction reports it.
pub trait Saveable: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    /// Stable name keyed in the save blob.
    const NAME: &'static str;

    /// Zero-sized marker component: presence on an entity is the only
    /// persisted information.
    const IS_TAG: bool = false;

    const CUSTOM_EMIT: bool = false;
    const CUSTOM_PARSE: bool = false;

    /// The shape driving encode and decode of this type.
    fn shape() -> &'static Shape;

    /// Produces this component's wire value. Only consulted when
    /// `CUSTOM_EMIT` is set.
    fn emit_value(&self) -> Result<Value, SaveError> {
        value::to_value(self)
    }

    /// Reconstructs a component from its wire value. Only consulted when
    /// `CUSTOM_PARSE` is set.
    fn parse_value(value: Value) -> Result<Self, SaveError> {
        value::from_value(value)
    }
}

// ---------------------------------------------------------------------------
// SaveField — shape provider for field types
// ---------------------------------------------------------------------------

/// Provides the [`Shape`] of a type usable as a field inside a `Saveable`
/// struct. The derive macro composes struct shapes out of these; raw
/// pointers and function references have no impl and fail at compile time.
pub trait SaveField {
    fn shape() -> Shape;
}

macro_rules! int_save_field {
    ($($ty:ty => $signed:literal, $width:ident;)*) => {
        $(impl SaveField for $ty {
            fn shape() -> Shape {
                Shape::Int { signed: $signed, width: IntWidth::$width }
            }
        })*
    };
}

int_save_field! {
    u8 => false, W8;
    u16 => false, W16;
    u32 => false, W32;
    u64 => false, W64;
    i8 => true, W8;
    i16 => true, W16;
    i32 => true, W32;
    i64 => true, W64;
}

impl SaveField for bool {
    fn shape() -> Shape {
        Shape::Bool
    }
}

impl SaveField for f32 {
    fn shape() -> Shape {
        Shape::Float(FloatWidth::W32)
    }
}

impl SaveField for f64 {
    fn shape() -> Shape {
        Shape::Float(FloatWidth::W64)
    }
}

impl SaveField for String {
    fn shape() -> Shape {
        Shape::Str
    }
}

impl SaveField for Entity {
    fn shape() -> Shape {
        Shape::EntityRef
    }
}

impl<T: SaveField> SaveField for Option<T> {
    fn shape() -> Shape {
        Shape::optional(T::shape())
    }
}

impl<T: SaveField> SaveField for Vec<T> {
    fn shape() -> Shape {
        Shape::DynArray(Box::new(T::shape()))
    }
}

impl<T: SaveField, const N: usize> SaveField for [T; N] {
    fn shape() -> Shape {
        Shape::FixedArray {
            len: N,
            elem: Box::new(T::shape()),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeDescriptor — erased registration record
// ---------------------------------------------------------------------------

/// A registered component type, erased to what the codec needs: its name,
/// shape, kind, and monomorphized encode/decode entry points.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: &'static str,
    is_tag: bool,
    custom_emit: bool,
    custom_parse: bool,
    type_id: TypeId,
    shape: fn() -> &'static Shape,
    collect: fn(&Registry) -> Result<Vec<(u32, Option<Value>)>, SaveError>,
    insert: fn(&mut Registry, Entity, Option<Value>) -> Result<(), SaveError>,
}

impl TypeDescriptor {
    pub fn of<T: Saveable>() -> Self {
        Self {
            name: T::NAME,
            is_tag: T::IS_TAG,
            custom_emit: T::CUSTOM_EMIT,
            custom_parse: T::CUSTOM_PARSE,
            type_id: TypeId::of::<T>(),
            shape: T::shape,
            collect: collect_erased::<T>,
            insert: insert_erased::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_tag(&self) -> bool {
        self.is_tag
    }

    pub fn has_custom_emit(&self) -> bool {
        self.custom_emit
    }

    pub fn has_custom_parse(&self) -> bool {
        self.custom_parse
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn shape(&self) -> &'static Shape {
        (self.shape)()
    }

    /// Emits every instance in the registry as `(entity id, wire value)`;
    /// tag instances carry no value.
    pub(crate) fn collect(
        &self,
        registry: &Registry,
    ) -> Result<Vec<(u32, Option<Value>)>, SaveError> {
        (self.collect)(registry)
    }

    /// Decodes one record and attaches the component to `entity`.
    pub(crate) fn insert(
        &self,
        registry: &mut Registry,
        entity: Entity,
        data: Option<Value>,
    ) -> Result<(), SaveError> {
        (self.insert)(registry, entity, data)
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("is_tag", &self.is_tag)
            .finish()
    }
}

fn collect_erased<T: Saveable>(registry: &Registry) -> Result<Vec<(u32, Option<Value>)>, SaveError> {
    let mut records = Vec::with_capacity(registry.count::<T>());
    for (entity, component) in registry.view::<T>() {
        let data = if T::IS_TAG {
            None
        } else if T::CUSTOM_EMIT {
            Some(component.emit_value()?)
        } else {
            let raw = value::to_value(component)?;
            Some(walk::emit(T::shape(), raw, T::NAME)?)
        };
        records.push((entity.id(), data));
    }
    Ok(records)
}

fn insert_erased<T: Saveable>(
    registry: &mut Registry,
    entity: Entity,
    data: Option<Value>,
) -> Result<(), SaveError> {
    let component = match data {
        // Tag record: the entity id is the whole payload.
        None => value::from_value::<T>(Value::Null)?,
        Some(wire) if T::CUSTOM_PARSE => T::parse_value(wire)?,
        Some(wire) => {
            let raw = walk::parse(T::shape(), wire, T::NAME)?;
            value::from_value::<T>(raw)?
        }
    };
    registry.add(entity, component);
    Ok(())
}
