//! The shape walker.
//!
//! Two mirrored walks connect typed components to the wire model:
//!
//! - [`emit`] co-walks a shape and a serde-produced value, validating it
//!   and normalizing it into the wire form shared by both codecs;
//! - [`parse`] co-walks a shape and a wire value read from a save,
//!   applying the reader coercions (integer narrowing, integer literals in
//!   float fields, declared defaults for missing struct fields, strict
//!   variant names) and producing the serde-consumable form.
//!
//! [`remap_entity_refs`] is the third walk: an in-place visitor that
//! rewrites every entity-reference leaf of a wire value through the
//! per-load remap table, reaching references nested inside structs,
//! arrays, optionals and variant payloads.

use crate::error::SaveError;
use crate::shape::{FloatWidth, IntWidth, Shape, VariantDef};
use crate::value::Value;

/// Validates `raw` against `shape` and produces the wire-model value.
pub fn emit(shape: &Shape, raw: Value, type_name: &str) -> Result<Value, SaveError> {
    match shape {
        Shape::Bool => match raw {
            Value::Bool(_) => Ok(raw),
            other => Err(mismatch("bool", &other)),
        },
        Shape::Int { signed, width } => coerce_int(*signed, *width, raw),
        Shape::Float(width) => coerce_float(*width, raw),
        Shape::Str => match raw {
            Value::String(_) => Ok(raw),
            other => Err(mismatch("string", &other)),
        },
        Shape::Struct { fields } => {
            let mut raw = match raw {
                Value::Map(entries) => Value::Map(entries),
                other => return Err(mismatch("object", &other)),
            };
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                let value = raw.remove(field.name).ok_or_else(|| SaveError::MissingField {
                    component: type_name.to_owned(),
                    field: field.name.to_owned(),
                })?;
                out.push((field.name.to_owned(), emit(&field.shape, value, type_name)?));
            }
            Ok(Value::Map(out))
        }
        Shape::FixedArray { len, elem } => {
            let items = expect_list(raw)?;
            if items.len() != *len {
                return Err(SaveError::ArrayLengthMismatch {
                    expected: *len,
                    found: items.len(),
                });
            }
            emit_elements(elem, items, type_name)
        }
        Shape::DynArray(elem) => emit_elements(elem, expect_list(raw)?, type_name),
        Shape::Optional(inner) => match raw {
            Value::Null => Ok(Value::Null),
            other => emit(inner, other, type_name),
        },
        Shape::Enum { variants, .. } => match raw {
            Value::String(name) => {
                if variants.iter().any(|v| v.name == name) {
                    Ok(Value::String(name))
                } else {
                    Err(SaveError::InvalidEnumValue {
                        enum_name: type_name.to_owned(),
                        value: name,
                    })
                }
            }
            other => Err(mismatch("enum variant name", &other)),
        },
        Shape::Variant { variants } => emit_variant(variants, raw, type_name),
        Shape::EntityRef => emit_entity_ref(raw),
        Shape::OptionalEntityRef => match raw {
            Value::Null => Ok(Value::Null),
            other => emit_entity_ref(other),
        },
    }
}

fn emit_elements(elem: &Shape, items: Vec<Value>, type_name: &str) -> Result<Value, SaveError> {
    items
        .into_iter()
        .map(|item| emit(elem, item, type_name))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn emit_variant(
    variants: &[VariantDef],
    raw: Value,
    type_name: &str,
) -> Result<Value, SaveError> {
    let (name, payload) = match raw {
        Value::String(name) => (name, None),
        Value::Map(mut entries) => {
            if entries.len() != 1 {
                return Err(mismatch("variant object with one entry", &Value::Map(entries)));
            }
            let (name, payload) = entries.remove(0);
            (name, Some(payload))
        }
        other => return Err(mismatch("variant", &other)),
    };

    let variant = variants
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| SaveError::InvalidUnionTag {
            union_name: type_name.to_owned(),
            tag: name.clone(),
        })?;

    let value = match (&variant.payload, payload) {
        (None, None) => Value::Null,
        (Some(shape), Some(payload)) => emit(shape, payload, type_name)?,
        (None, Some(_)) => {
            return Err(mismatch("payload-free variant", &Value::String(name)));
        }
        (Some(_), None) => {
            return Err(mismatch("variant payload", &Value::String(name)));
        }
    };

    Ok(Value::Map(vec![
        ("tag".to_owned(), Value::String(name)),
        ("value".to_owned(), value),
    ]))
}

fn emit_entity_ref(raw: Value) -> Result<Value, SaveError> {
    match raw.as_u64() {
        Some(id) if u32::try_from(id).is_ok() => Ok(Value::U64(id)),
        Some(id) => Err(SaveError::InvalidEntityReference { saved_id: id }),
        None => Err(mismatch("entity id", &raw)),
    }
}

/// Reconstructs the serde-consumable value for `shape` from a wire value.
pub fn parse(shape: &Shape, wire: Value, type_name: &str) -> Result<Value, SaveError> {
    match shape {
        Shape::Bool => match wire {
            Value::Bool(_) => Ok(wire),
            other => Err(mismatch("bool", &other)),
        },
        Shape::Int { signed, width } => coerce_int(*signed, *width, wire),
        Shape::Float(width) => coerce_float(*width, wire),
        Shape::Str => match wire {
            Value::String(_) => Ok(wire),
            other => Err(mismatch("string", &other)),
        },
        Shape::Struct { fields } => {
            let mut wire = match wire {
                Value::Map(entries) => Value::Map(entries),
                other => return Err(mismatch("object", &other)),
            };
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                // Extraneous wire fields are skipped; missing ones fall
                // back to the declared default.
                let value = match wire.remove(field.name) {
                    Some(value) => parse(&field.shape, value, type_name)?,
                    None => match &field.default {
                        Some(default) => default.clone(),
                        None => {
                            return Err(SaveError::MissingField {
                                component: type_name.to_owned(),
                                field: field.name.to_owned(),
                            })
                        }
                    },
                };
                out.push((field.name.to_owned(), value));
            }
            Ok(Value::Map(out))
        }
        Shape::FixedArray { len, elem } => {
            let items = expect_list(wire)?;
            if items.len() != *len {
                return Err(SaveError::ArrayLengthMismatch {
                    expected: *len,
                    found: items.len(),
                });
            }
            parse_elements(elem, items, type_name)
        }
        Shape::DynArray(elem) => parse_elements(elem, expect_list(wire)?, type_name),
        Shape::Optional(inner) => match wire {
            Value::Null => Ok(Value::Null),
            other => parse(inner, other, type_name),
        },
        Shape::Enum { variants, .. } => match wire {
            Value::String(name) => {
                if variants.iter().any(|v| v.name == name) {
                    Ok(Value::String(name))
                } else {
                    Err(SaveError::InvalidEnumValue {
                        enum_name: type_name.to_owned(),
                        value: name,
                    })
                }
            }
            other => Err(mismatch("enum variant name", &other)),
        },
        Shape::Variant { variants } => parse_variant(variants, wire, type_name),
        Shape::EntityRef => parse_entity_ref(wire),
        Shape::OptionalEntityRef => match wire {
            Value::Null => Ok(Value::Null),
            other => parse_entity_ref(other),
        },
    }
}

fn parse_elements(elem: &Shape, items: Vec<Value>, type_name: &str) -> Result<Value, SaveError> {
    items
        .into_iter()
        .map(|item| parse(elem, item, type_name))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn parse_variant(
    variants: &[VariantDef],
    wire: Value,
    type_name: &str,
) -> Result<Value, SaveError> {
    let mut wire = match wire {
        Value::Map(entries) => Value::Map(entries),
        other => return Err(mismatch("variant object", &other)),
    };
    let tag = match wire.remove("tag") {
        Some(Value::String(tag)) => tag,
        Some(other) => return Err(mismatch("variant tag string", &other)),
        None => {
            return Err(SaveError::InvalidSaveFormat(format!(
                "variant record of '{type_name}' carries no tag"
            )))
        }
    };
    let variant = variants
        .iter()
        .find(|v| v.name == tag)
        .ok_or_else(|| SaveError::InvalidUnionTag {
            union_name: type_name.to_owned(),
            tag: tag.clone(),
        })?;

    match &variant.payload {
        None => Ok(Value::String(tag)),
        Some(shape) => {
            let payload = match wire.remove("value") {
                Some(Value::Null) | None => {
                    return Err(mismatch("variant payload", &Value::String(tag)))
                }
                Some(payload) => parse(shape, payload, type_name)?,
            };
            Ok(Value::Map(vec![(tag, payload)]))
        }
    }
}

fn parse_entity_ref(wire: Value) -> Result<Value, SaveError> {
    match wire.as_u64() {
        Some(id) if u32::try_from(id).is_ok() => Ok(Value::U64(id)),
        Some(id) => Err(SaveError::InvalidEntityReference { saved_id: id }),
        None => Err(mismatch("entity id", &wire)),
    }
}

/// Rewrites every entity-reference leaf of `wire` in place.
///
/// References whose saved id the table does not know are left unchanged:
/// they point outside the save, and silently renumbering them would turn a
/// resolvable external reference into corruption.
pub fn remap_entity_refs(shape: &Shape, wire: &mut Value, remap: &dyn Fn(u32) -> Option<u32>) {
    if !shape.contains_entity_refs() {
        return;
    }
    match shape {
        Shape::EntityRef | Shape::OptionalEntityRef => {
            if let Some(id) = wire.as_u32() {
                if let Some(new_id) = remap(id) {
                    *wire = Value::U64(new_id as u64);
                }
            }
        }
        Shape::Struct { fields } => {
            for field in fields {
                if let Some(value) = wire.get_mut(field.name) {
                    remap_entity_refs(&field.shape, value, remap);
                }
            }
        }
        Shape::FixedArray { elem, .. } | Shape::DynArray(elem) => {
            if let Some(items) = wire.as_list_mut() {
                for item in items {
                    remap_entity_refs(elem, item, remap);
                }
            }
        }
        Shape::Optional(inner) => {
            if !matches!(wire, Value::Null) {
                remap_entity_refs(inner, wire, remap);
            }
        }
        Shape::Variant { variants } => {
            let payload_shape = wire
                .get("tag")
                .and_then(Value::as_str)
                .and_then(|tag| variants.iter().find(|v| v.name == tag))
                .and_then(|v| v.payload.clone());
            if let Some(payload_shape) = payload_shape {
                if let Some(value) = wire.get_mut("value") {
                    remap_entity_refs(&payload_shape, value, remap);
                }
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Coercions
// ---------------------------------------------------------------------------

fn coerce_int(signed: bool, width: IntWidth, value: Value) -> Result<Value, SaveError> {
    let raw: i128 = match value {
        Value::I64(v) => v as i128,
        Value::U64(v) => v as i128,
        other => return Err(mismatch("integer", &other)),
    };
    let bits = width.bits();
    let in_range = if signed {
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        raw >= min && raw <= max
    } else {
        raw >= 0 && raw < (1i128 << bits)
    };
    if !in_range {
        return Err(SaveError::TypeMismatch {
            expected: if signed {
                "integer in signed field range"
            } else {
                "integer in unsigned field range"
            },
            found: raw.to_string(),
        });
    }
    Ok(if signed {
        Value::I64(raw as i64)
    } else {
        Value::U64(raw as u64)
    })
}

fn coerce_float(width: FloatWidth, value: Value) -> Result<Value, SaveError> {
    let wide = match value {
        Value::F32(v) => return Ok(match width {
            FloatWidth::W32 => Value::F32(v),
            FloatWidth::W64 => Value::F64(f64::from(v)),
        }),
        Value::F64(v) => v,
        // Float fields accept integer literals.
        Value::I64(v) => v as f64,
        Value::U64(v) => v as f64,
        other => return Err(mismatch("float", &other)),
    };
    Ok(match width {
        FloatWidth::W32 => Value::F32(wide as f32),
        FloatWidth::W64 => Value::F64(wide),
    })
}

fn expect_list(value: Value) -> Result<Vec<Value>, SaveError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(mismatch("array", &other)),
    }
}

fn mismatch(expected: &'static str, found: &Value) -> SaveError {
    SaveError::TypeMismatch {
        expected,
        found: found.kind().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{EnumVariantDef, FieldDef};

    fn u8_shape() -> Shape {
        Shape::Int {
            signed: false,
            width: IntWidth::W8,
        }
    }

    #[test]
    fn int_narrowing_in_range() {
        let out = parse(&u8_shape(), Value::I64(200), "T").unwrap();
        assert_eq!(out, Value::U64(200));
    }

    #[test]
    fn int_narrowing_out_of_range_fails() {
        assert!(matches!(
            parse(&u8_shape(), Value::I64(300), "T"),
            Err(SaveError::TypeMismatch { .. })
        ));
        assert!(matches!(
            parse(&u8_shape(), Value::I64(-1), "T"),
            Err(SaveError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn float_fields_accept_integer_literals() {
        let shape = Shape::Float(FloatWidth::W32);
        assert_eq!(parse(&shape, Value::I64(100), "T").unwrap(), Value::F32(100.0));
    }

    #[test]
    fn missing_struct_field_uses_default() {
        let shape = Shape::Struct {
            fields: vec![
                FieldDef {
                    name: "current",
                    shape: u8_shape(),
                    default: None,
                },
                FieldDef {
                    name: "max",
                    shape: u8_shape(),
                    default: Some(Value::U64(100)),
                },
            ],
        };
        let wire = Value::Map(vec![("current".into(), Value::U64(80))]);
        let parsed = parse(&shape, wire, "Health").unwrap();
        assert_eq!(
            parsed,
            Value::Map(vec![
                ("current".into(), Value::U64(80)),
                ("max".into(), Value::U64(100)),
            ])
        );
    }

    #[test]
    fn missing_struct_field_without_default_fails() {
        let shape = Shape::Struct {
            fields: vec![FieldDef {
                name: "current",
                shape: u8_shape(),
                default: None,
            }],
        };
        let err = parse(&shape, Value::Map(vec![]), "Health").unwrap_err();
        assert!(matches!(err, SaveError::MissingField { ref field, .. } if field == "current"));
    }

    #[test]
    fn extraneous_fields_are_ignored() {
        let shape = Shape::Struct {
            fields: vec![FieldDef {
                name: "hp",
                shape: u8_shape(),
                default: None,
            }],
        };
        let wire = Value::Map(vec![
            ("hp".into(), Value::U64(5)),
            ("added_in_v9".into(), Value::Bool(true)),
        ]);
        let parsed = parse(&shape, wire, "T").unwrap();
        assert_eq!(parsed, Value::Map(vec![("hp".into(), Value::U64(5))]));
    }

    #[test]
    fn fixed_array_length_enforced() {
        let shape = Shape::FixedArray {
            len: 2,
            elem: Box::new(u8_shape()),
        };
        let err = parse(
            &shape,
            Value::List(vec![Value::U64(1), Value::U64(2), Value::U64(3)]),
            "T",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SaveError::ArrayLengthMismatch {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn enum_rejects_unknown_variant() {
        let shape = Shape::Enum {
            tag: IntWidth::W32,
            variants: vec![
                EnumVariantDef { name: "Idle", value: 0 },
                EnumVariantDef { name: "Busy", value: 1 },
            ],
        };
        assert_eq!(
            parse(&shape, Value::String("Idle".into()), "Phase").unwrap(),
            Value::String("Idle".into())
        );
        assert!(matches!(
            parse(&shape, Value::String("Gone".into()), "Phase"),
            Err(SaveError::InvalidEnumValue { .. })
        ));
    }

    #[test]
    fn variant_roundtrips_through_wire_form() {
        let shape = Shape::Variant {
            variants: vec![
                VariantDef {
                    name: "Empty",
                    payload: None,
                },
                VariantDef {
                    name: "Loaded",
                    payload: Some(u8_shape()),
                },
            ],
        };

        let wire = emit(&shape, Value::String("Empty".into()), "Slot").unwrap();
        assert_eq!(wire.get("tag"), Some(&Value::String("Empty".into())));
        assert_eq!(wire.get("value"), Some(&Value::Null));
        assert_eq!(
            parse(&shape, wire, "Slot").unwrap(),
            Value::String("Empty".into())
        );

        let raw = Value::Map(vec![("Loaded".into(), Value::U64(9))]);
        let wire = emit(&shape, raw.clone(), "Slot").unwrap();
        assert_eq!(wire.get("tag"), Some(&Value::String("Loaded".into())));
        assert_eq!(parse(&shape, wire, "Slot").unwrap(), raw);
    }

    #[test]
    fn variant_unknown_tag_fails() {
        let shape = Shape::Variant {
            variants: vec![VariantDef {
                name: "A",
                payload: None,
            }],
        };
        let wire = Value::Map(vec![
            ("tag".into(), Value::String("B".into())),
            ("value".into(), Value::Null),
        ]);
        assert!(matches!(
            parse(&shape, wire, "U"),
            Err(SaveError::InvalidUnionTag { .. })
        ));
    }

    #[test]
    fn remap_rewrites_known_refs_only() {
        let shape = Shape::Struct {
            fields: vec![
                FieldDef {
                    name: "target",
                    shape: Shape::EntityRef,
                    default: None,
                },
                FieldDef {
                    name: "external",
                    shape: Shape::EntityRef,
                    default: None,
                },
            ],
        };
        let mut wire = Value::Map(vec![
            ("target".into(), Value::U64(3)),
            ("external".into(), Value::U64(77)),
        ]);
        remap_entity_refs(&shape, &mut wire, &|id| (id == 3).then_some(10));
        assert_eq!(wire.get("target"), Some(&Value::U64(10)));
        assert_eq!(wire.get("external"), Some(&Value::U64(77)));
    }

    #[test]
    fn remap_reaches_nested_arrays() {
        let shape = Shape::FixedArray {
            len: 2,
            elem: Box::new(Shape::EntityRef),
        };
        let mut wire = Value::List(vec![Value::U64(0), Value::U64(1)]);
        remap_entity_refs(&shape, &mut wire, &|id| Some(id + 100));
        assert_eq!(wire, Value::List(vec![Value::U64(100), Value::U64(101)]));
    }

    #[test]
    fn remap_skips_null_optional_ref() {
        let mut wire = Value::Null;
        remap_entity_refs(&Shape::OptionalEntityRef, &mut wire, &|_| Some(0));
        assert_eq!(wire, Value::Null);
    }
}
