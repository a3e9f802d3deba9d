//! Binary format emission.

use crate::config::Limits;
use crate::error::SaveError;
use crate::shape::{FloatWidth, IntWidth, Shape};
use crate::value::Value;

/// Little-endian byte sink.
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// u32 length prefix + UTF-8 bytes.
    pub fn put_str(&mut self, s: &str, limits: &Limits) -> Result<(), SaveError> {
        if s.len() > limits.max_string_len {
            return Err(SaveError::StringTooLong {
                len: s.len(),
                max: limits.max_string_len,
            });
        }
        self.put_u32(s.len() as u32);
        self.put_bytes(s.as_bytes());
        Ok(())
    }

    /// The low `width.bytes()` bytes of the two's-complement value.
    fn put_int(&mut self, raw: u64, width: IntWidth) {
        let bytes = raw.to_le_bytes();
        self.buf.extend_from_slice(&bytes[..width.bytes()]);
    }
}

/// Encodes one wire value against its shape.
pub(crate) fn encode_payload(
    w: &mut ByteWriter,
    shape: &Shape,
    value: &Value,
    limits: &Limits,
    type_name: &str,
) -> Result<(), SaveError> {
    match shape {
        Shape::Bool => match value {
            Value::Bool(b) => {
                w.put_u8(*b as u8);
                Ok(())
            }
            other => Err(mismatch("bool", other)),
        },
        Shape::Int { signed, width } => {
            let raw = match (signed, value) {
                (true, Value::I64(v)) => *v as u64,
                (false, Value::U64(v)) => *v,
                (_, Value::I64(v)) => *v as u64,
                (_, Value::U64(v)) => *v,
                (_, other) => return Err(mismatch("integer", other)),
            };
            w.put_int(raw, *width);
            Ok(())
        }
        Shape::Float(FloatWidth::W32) => match value {
            Value::F32(v) => {
                w.put_f32(*v);
                Ok(())
            }
            Value::F64(v) => {
                w.put_f32(*v as f32);
                Ok(())
            }
            other => Err(mismatch("float", other)),
        },
        Shape::Float(FloatWidth::W64) => match value.as_f64() {
            Some(v) => {
                w.put_f64(v);
                Ok(())
            }
            None => Err(mismatch("float", value)),
        },
        Shape::Str => match value {
            Value::String(s) => w.put_str(s, limits),
            other => Err(mismatch("string", other)),
        },
        Shape::Struct { fields } => {
            for field in fields {
                let field_value = value.get(field.name).ok_or_else(|| SaveError::MissingField {
                    component: type_name.to_owned(),
                    field: field.name.to_owned(),
                })?;
                encode_payload(w, &field.shape, field_value, limits, type_name)?;
            }
            Ok(())
        }
        Shape::FixedArray { len, elem } => {
            let items = value.as_list().ok_or_else(|| mismatch("array", value))?;
            if items.len() != *len {
                return Err(SaveError::ArrayLengthMismatch {
                    expected: *len,
                    found: items.len(),
                });
            }
            for item in items {
                encode_payload(w, elem, item, limits, type_name)?;
            }
            Ok(())
        }
        Shape::DynArray(elem) => {
            let items = value.as_list().ok_or_else(|| mismatch("array", value))?;
            if items.len() > limits.max_array_len {
                return Err(SaveError::ArrayTooLong {
                    len: items.len(),
                    max: limits.max_array_len,
                });
            }
            w.put_u32(items.len() as u32);
            for item in items {
                encode_payload(w, elem, item, limits, type_name)?;
            }
            Ok(())
        }
        Shape::Optional(inner) => match value {
            Value::Null => {
                w.put_u8(0);
                Ok(())
            }
            present => {
                w.put_u8(1);
                encode_payload(w, inner, present, limits, type_name)
            }
        },
        Shape::Enum { tag, variants } => {
            let name = value.as_str().ok_or_else(|| mismatch("enum variant name", value))?;
            let variant = variants
                .iter()
                .find(|v| v.name == name)
                .ok_or_else(|| SaveError::InvalidEnumValue {
                    enum_name: type_name.to_owned(),
                    value: name.to_owned(),
                })?;
            w.put_int(variant.value as u64, *tag);
            Ok(())
        }
        Shape::Variant { variants } => {
            let tag = value
                .get("tag")
                .and_then(Value::as_str)
                .ok_or_else(|| mismatch("variant record", value))?;
            let index = variants
                .iter()
                .position(|v| v.name == tag)
                .ok_or_else(|| SaveError::InvalidUnionTag {
                    union_name: type_name.to_owned(),
                    tag: tag.to_owned(),
                })?;
            w.put_u16(index as u16);
            if let Some(payload_shape) = &variants[index].payload {
                let payload = value
                    .get("value")
                    .ok_or_else(|| mismatch("variant payload", value))?;
                encode_payload(w, payload_shape, payload, limits, type_name)?;
            }
            Ok(())
        }
        Shape::EntityRef => encode_entity_ref(w, value),
        Shape::OptionalEntityRef => match value {
            Value::Null => {
                w.put_u8(0);
                Ok(())
            }
            present => {
                w.put_u8(1);
                encode_entity_ref(w, present)
            }
        },
    }
}

fn encode_entity_ref(w: &mut ByteWriter, value: &Value) -> Result<(), SaveError> {
    match value.as_u64().and_then(|id| u32::try_from(id).ok()) {
        Some(id) => {
            w.put_u32(id);
            Ok(())
        }
        None => Err(mismatch("entity id", value)),
    }
}

fn mismatch(expected: &'static str, found: &Value) -> SaveError {
    SaveError::TypeMismatch {
        expected,
        found: found.kind().to_owned(),
    }
}
