//! Binary format parsing.

use crate::config::Limits;
use crate::error::SaveError;
use crate::shape::{FloatWidth, IntWidth, Shape};
use crate::value::Value;

/// Little-endian byte source over a borrowed slice.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], SaveError> {
        if self.remaining() < n {
            return Err(SaveError::InvalidSaveFormat(format!(
                "save data truncated: wanted {n} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, SaveError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, SaveError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_u32(&mut self) -> Result<u32, SaveError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_i64(&mut self) -> Result<i64, SaveError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_f32(&mut self) -> Result<f32, SaveError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_f64(&mut self) -> Result<f64, SaveError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// u32 length prefix + UTF-8 bytes.
    pub fn get_str(&mut self, limits: &Limits) -> Result<String, SaveError> {
        let len = self.get_u32()? as usize;
        if len > limits.max_string_len {
            return Err(SaveError::StringTooLong {
                len,
                max: limits.max_string_len,
            });
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SaveError::InvalidSaveFormat("invalid UTF-8 in string payload".into()))
    }

    /// `width.bytes()` little-endian bytes, zero-extended.
    fn get_int(&mut self, width: IntWidth) -> Result<u64, SaveError> {
        let n = width.bytes();
        let bytes = self.take(n)?;
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }
}

/// Decodes one payload against its shape, producing the wire value.
pub(crate) fn decode_payload(
    r: &mut ByteReader<'_>,
    shape: &Shape,
    limits: &Limits,
    type_name: &str,
) -> Result<Value, SaveError> {
    match shape {
        Shape::Bool => match r.get_u8()? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(SaveError::TypeMismatch {
                expected: "bool byte 0 or 1",
                found: other.to_string(),
            }),
        },
        Shape::Int { signed, width } => {
            let raw = r.get_int(*width)?;
            if *signed {
                let shift = 64 - width.bits();
                Ok(Value::I64(((raw << shift) as i64) >> shift))
            } else {
                Ok(Value::U64(raw))
            }
        }
        Shape::Float(FloatWidth::W32) => r.get_f32().map(Value::F32),
        Shape::Float(FloatWidth::W64) => r.get_f64().map(Value::F64),
        Shape::Str => r.get_str(limits).map(Value::String),
        Shape::Struct { fields } => {
            let mut entries = Vec::with_capacity(fields.len());
            for field in fields {
                let value = decode_payload(r, &field.shape, limits, type_name)?;
                entries.push((field.name.to_owned(), value));
            }
            Ok(Value::Map(entries))
        }
        Shape::FixedArray { len, elem } => {
            let mut items = Vec::with_capacity(*len);
            for _ in 0..*len {
                items.push(decode_payload(r, elem, limits, type_name)?);
            }
            Ok(Value::List(items))
        }
        Shape::DynArray(elem) => {
            let len = r.get_u32()? as usize;
            if len > limits.max_array_len {
                return Err(SaveError::ArrayTooLong {
                    len,
                    max: limits.max_array_len,
                });
            }
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(decode_payload(r, elem, limits, type_name)?);
            }
            Ok(Value::List(items))
        }
        Shape::Optional(inner) => match r.get_u8()? {
            0 => Ok(Value::Null),
            1 => decode_payload(r, inner, limits, type_name),
            other => Err(SaveError::TypeMismatch {
                expected: "presence flag 0 or 1",
                found: other.to_string(),
            }),
        },
        Shape::Enum { tag, variants } => {
            let raw = r.get_int(*tag)?;
            let mask = if tag.bits() == 64 {
                u64::MAX
            } else {
                (1u64 << tag.bits()) - 1
            };
            let variant = variants
                .iter()
                .find(|v| (v.value as u64) & mask == raw)
                .ok_or_else(|| SaveError::InvalidEnumValue {
                    enum_name: type_name.to_owned(),
                    value: raw.to_string(),
                })?;
            Ok(Value::String(variant.name.to_owned()))
        }
        Shape::Variant { variants } => {
            let index = r.get_u16()? as usize;
            let variant = variants.get(index).ok_or_else(|| SaveError::InvalidUnionTag {
                union_name: type_name.to_owned(),
                tag: index.to_string(),
            })?;
            let value = match &variant.payload {
                None => Value::Null,
                Some(payload_shape) => decode_payload(r, payload_shape, limits, type_name)?,
            };
            Ok(Value::Map(vec![
                ("tag".to_owned(), Value::String(variant.name.to_owned())),
                ("value".to_owned(), value),
            ]))
        }
        Shape::EntityRef => Ok(Value::U64(r.get_u32()? as u64)),
        Shape::OptionalEntityRef => match r.get_u8()? {
            0 => Ok(Value::Null),
            1 => Ok(Value::U64(r.get_u32()? as u64)),
            other => Err(SaveError::TypeMismatch {
                expected: "presence flag 0 or 1",
                found: other.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::writer::{encode_payload, ByteWriter};
    use crate::shape::{EnumVariantDef, FieldDef, VariantDef};

    fn roundtrip(shape: &Shape, value: &Value) -> Value {
        let limits = Limits::default();
        let mut w = ByteWriter::new();
        encode_payload(&mut w, shape, value, &limits, "T").unwrap();
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let out = decode_payload(&mut r, shape, &limits, "T").unwrap();
        assert_eq!(r.remaining(), 0, "payload not fully consumed");
        out
    }

    #[test]
    fn ints_roundtrip_at_every_width() {
        for (width, value) in [
            (IntWidth::W8, Value::U64(200)),
            (IntWidth::W16, Value::U64(40_000)),
            (IntWidth::W32, Value::U64(3_000_000_000)),
            (IntWidth::W64, Value::U64(u64::MAX)),
        ] {
            let shape = Shape::Int {
                signed: false,
                width,
            };
            assert_eq!(roundtrip(&shape, &value), value);
        }
        for (width, value) in [
            (IntWidth::W8, Value::I64(-100)),
            (IntWidth::W16, Value::I64(-30_000)),
            (IntWidth::W32, Value::I64(-2_000_000_000)),
            (IntWidth::W64, Value::I64(i64::MIN)),
        ] {
            let shape = Shape::Int {
                signed: true,
                width,
            };
            assert_eq!(roundtrip(&shape, &value), value);
        }
    }

    #[test]
    fn narrow_int_encodings_are_small() {
        let limits = Limits::default();
        let mut w = ByteWriter::new();
        let shape = Shape::Int {
            signed: false,
            width: IntWidth::W8,
        };
        encode_payload(&mut w, &shape, &Value::U64(7), &limits, "T").unwrap();
        assert_eq!(w.into_bytes(), vec![7]);
    }

    #[test]
    fn floats_roundtrip() {
        assert_eq!(
            roundtrip(&Shape::Float(FloatWidth::W32), &Value::F32(1.5)),
            Value::F32(1.5)
        );
        assert_eq!(
            roundtrip(&Shape::Float(FloatWidth::W64), &Value::F64(-0.25)),
            Value::F64(-0.25)
        );
    }

    #[test]
    fn strings_and_arrays_roundtrip() {
        assert_eq!(
            roundtrip(&Shape::Str, &Value::String("héllo".into())),
            Value::String("héllo".into())
        );
        let shape = Shape::DynArray(Box::new(Shape::Bool));
        let value = Value::List(vec![Value::Bool(true), Value::Bool(false)]);
        assert_eq!(roundtrip(&shape, &value), value);
    }

    #[test]
    fn optional_roundtrips_both_ways() {
        let shape = Shape::Optional(Box::new(Shape::Str));
        assert_eq!(roundtrip(&shape, &Value::Null), Value::Null);
        assert_eq!(
            roundtrip(&shape, &Value::String("x".into())),
            Value::String("x".into())
        );
    }

    #[test]
    fn struct_fields_concatenate_in_order() {
        let shape = Shape::Struct {
            fields: vec![
                FieldDef {
                    name: "a",
                    shape: Shape::Int {
                        signed: false,
                        width: IntWidth::W8,
                    },
                    default: None,
                },
                FieldDef {
                    name: "b",
                    shape: Shape::Int {
                        signed: false,
                        width: IntWidth::W16,
                    },
                    default: None,
                },
            ],
        };
        let value = Value::Map(vec![
            ("a".into(), Value::U64(1)),
            ("b".into(), Value::U64(2)),
        ]);
        let limits = Limits::default();
        let mut w = ByteWriter::new();
        encode_payload(&mut w, &shape, &value, &limits, "T").unwrap();
        assert_eq!(w.into_bytes(), vec![1, 2, 0]);
    }

    #[test]
    fn enum_encodes_discriminant_in_tag_width() {
        let shape = Shape::Enum {
            tag: IntWidth::W8,
            variants: vec![
                EnumVariantDef { name: "Off", value: 0 },
                EnumVariantDef { name: "On", value: 5 },
            ],
        };
        let limits = Limits::default();
        let mut w = ByteWriter::new();
        encode_payload(&mut w, &shape, &Value::String("On".into()), &limits, "T").unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![5]);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            decode_payload(&mut r, &shape, &limits, "T").unwrap(),
            Value::String("On".into())
        );
    }

    #[test]
    fn unknown_enum_discriminant_fails() {
        let shape = Shape::Enum {
            tag: IntWidth::W8,
            variants: vec![EnumVariantDef { name: "Only", value: 0 }],
        };
        let limits = Limits::default();
        let mut r = ByteReader::new(&[9]);
        assert!(matches!(
            decode_payload(&mut r, &shape, &limits, "T"),
            Err(SaveError::InvalidEnumValue { .. })
        ));
    }

    #[test]
    fn variant_uses_u16_index() {
        let shape = Shape::Variant {
            variants: vec![
                VariantDef {
                    name: "None",
                    payload: None,
                },
                VariantDef {
                    name: "Some",
                    payload: Some(Shape::Int {
                        signed: false,
                        width: IntWidth::W8,
                    }),
                },
            ],
        };
        let value = Value::Map(vec![
            ("tag".into(), Value::String("Some".into())),
            ("value".into(), Value::U64(3)),
        ]);
        let limits = Limits::default();
        let mut w = ByteWriter::new();
        encode_payload(&mut w, &shape, &value, &limits, "T").unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![1, 0, 3]);
        let mut r = ByteReader::new(&bytes);
        assert_eq!(decode_payload(&mut r, &shape, &limits, "T").unwrap(), value);
    }

    #[test]
    fn bad_bool_byte_is_a_decode_error() {
        let limits = Limits::default();
        let mut r = ByteReader::new(&[2]);
        assert!(decode_payload(&mut r, &Shape::Bool, &limits, "T").is_err());
    }

    #[test]
    fn oversized_string_hits_the_limit() {
        let limits = Limits {
            max_string_len: 4,
            ..Limits::default()
        };
        let mut w = ByteWriter::new();
        w.put_u32(100);
        w.put_bytes(&[b'x'; 100]);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            decode_payload(&mut r, &Shape::Str, &limits, "T"),
            Err(SaveError::StringTooLong { len: 100, max: 4 })
        ));
    }

    #[test]
    fn truncated_payload_fails_cleanly() {
        let limits = Limits::default();
        let mut r = ByteReader::new(&[1, 2]);
        let shape = Shape::Int {
            signed: false,
            width: IntWidth::W32,
        };
        assert!(decode_payload(&mut r, &shape, &limits, "T").is_err());
    }

    #[test]
    fn entity_refs_are_u32() {
        let value = roundtrip(&Shape::EntityRef, &Value::U64(7));
        assert_eq!(value, Value::U64(7));

        let shape = Shape::OptionalEntityRef;
        assert_eq!(roundtrip(&shape, &Value::Null), Value::Null);
        assert_eq!(roundtrip(&shape, &Value::U64(9)), Value::U64(9));
    }
}
