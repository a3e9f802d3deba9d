//! Type shapes.
//!
//! A [`Shape`] is a recursive description of a component type that drives
//! both codecs: the emit walk validates and normalizes values against it,
//! the parse walk reconstructs values from it, and the remap pass uses it
//! to find entity references nested anywhere inside a value.

use crate::error::SaveError;
use crate::value::Value;

/// Bit width of an integer field or enum tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    /// Encoded size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    pub const fn bits(self) -> u32 {
        (self.bytes() as u32) * 8
    }
}

/// Bit width of a float field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    W32,
    W64,
}

/// One named field of a struct shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub shape: Shape,
    /// Fallback used by the text reader when the field is absent.
    pub default: Option<Value>,
}

/// One variant of a payload-free enum shape.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariantDef {
    pub name: &'static str,
    /// Discriminant encoded by the binary format.
    pub value: i64,
}

/// One variant of a tagged-variant shape.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDef {
    pub name: &'static str,
    pub payload: Option<Shape>,
}

/// Recursive description of a serializable type.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Bool,
    Int { signed: bool, width: IntWidth },
    Float(FloatWidth),
    Str,
    Struct { fields: Vec<FieldDef> },
    FixedArray { len: usize, elem: Box<Shape> },
    DynArray(Box<Shape>),
    Optional(Box<Shape>),
    /// Payload-free named variants; string-named in text, integer-tagged
    /// in binary.
    Enum {
        tag: IntWidth,
        variants: Vec<EnumVariantDef>,
    },
    /// Payload-carrying variants; `{"tag": …, "value": …}` in text, a u16
    /// tag index in binary.
    Variant { variants: Vec<VariantDef> },
    EntityRef,
    OptionalEntityRef,
}

impl Shape {
    /// Wraps a shape in an optional, collapsing `Optional(EntityRef)` into
    /// the dedicated leaf so the remap pass sees it.
    pub fn optional(inner: Shape) -> Shape {
        match inner {
            Shape::EntityRef => Shape::OptionalEntityRef,
            other => Shape::Optional(Box::new(other)),
        }
    }

    /// Whether any leaf of this shape is an entity reference.
    pub fn contains_entity_refs(&self) -> bool {
        match self {
            Shape::EntityRef | Shape::OptionalEntityRef => true,
            Shape::Struct { fields } => fields.iter().any(|f| f.shape.contains_entity_refs()),
            Shape::FixedArray { elem, .. } => elem.contains_entity_refs(),
            Shape::DynArray(elem) => elem.contains_entity_refs(),
            Shape::Optional(inner) => inner.contains_entity_refs(),
            Shape::Variant { variants } => variants
                .iter()
                .any(|v| v.payload.as_ref().is_some_and(Shape::contains_entity_refs)),
            _ => false,
        }
    }

    /// Structural validity check, run when a component set is built.
    ///
    /// Rejects shapes with no unambiguous wire form: a doubly-optional
    /// value cannot distinguish `None` from `Some(None)`, and an enum or
    /// variant with no variants cannot be decoded at all.
    pub(crate) fn check_wire_form(&self, type_name: &str) -> Result<(), SaveError> {
        match self {
            Shape::Optional(inner) => {
                if matches!(**inner, Shape::Optional(_) | Shape::OptionalEntityRef) {
                    return Err(SaveError::InvalidSaveFormat(format!(
                        "type '{type_name}' nests an optional inside an optional, which has no \
                         unambiguous encoding"
                    )));
                }
                inner.check_wire_form(type_name)
            }
            Shape::Struct { fields } => {
                for field in fields {
                    field.shape.check_wire_form(type_name)?;
                }
                Ok(())
            }
            Shape::FixedArray { elem, .. } => elem.check_wire_form(type_name),
            Shape::DynArray(elem) => elem.check_wire_form(type_name),
            Shape::Enum { variants, .. } => {
                if variants.is_empty() {
                    return Err(SaveError::InvalidSaveFormat(format!(
                        "type '{type_name}' declares an enum with no variants"
                    )));
                }
                Ok(())
            }
            Shape::Variant { variants } => {
                if variants.is_empty() {
                    return Err(SaveError::InvalidSaveFormat(format!(
                        "type '{type_name}' declares a variant with no variants"
                    )));
                }
                for variant in variants {
                    if let Some(payload) = &variant.payload {
                        payload.check_wire_form(type_name)?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_entity_ref_collapses() {
        assert_eq!(Shape::optional(Shape::EntityRef), Shape::OptionalEntityRef);
        assert_eq!(
            Shape::optional(Shape::Bool),
            Shape::Optional(Box::new(Shape::Bool))
        );
    }

    #[test]
    fn entity_refs_found_through_nesting() {
        let shape = Shape::Struct {
            fields: vec![FieldDef {
                name: "targets",
                shape: Shape::FixedArray {
                    len: 4,
                    elem: Box::new(Shape::EntityRef),
                },
                default: None,
            }],
        };
        assert!(shape.contains_entity_refs());

        let plain = Shape::Struct {
            fields: vec![FieldDef {
                name: "hp",
                shape: Shape::Int {
                    signed: false,
                    width: IntWidth::W8,
                },
                default: None,
            }],
        };
        assert!(!plain.contains_entity_refs());
    }

    #[test]
    fn nested_optionals_are_rejected() {
        let shape = Shape::Optional(Box::new(Shape::Optional(Box::new(Shape::Bool))));
        assert!(shape.check_wire_form("Broken").is_err());

        let ok = Shape::Optional(Box::new(Shape::Str));
        assert!(ok.check_wire_form("Fine").is_ok());
    }

    #[test]
    fn empty_enums_are_rejected() {
        let shape = Shape::Enum {
            tag: IntWidth::W32,
            variants: Vec::new(),
        };
        assert!(shape.check_wire_form("Empty").is_err());
    }

    #[test]
    fn int_width_sizes() {
        assert_eq!(IntWidth::W8.bytes(), 1);
        assert_eq!(IntWidth::W16.bytes(), 2);
        assert_eq!(IntWidth::W32.bytes(), 4);
        assert_eq!(IntWidth::W64.bytes(), 8);
        assert_eq!(IntWidth::W16.bits(), 16);
    }
}
