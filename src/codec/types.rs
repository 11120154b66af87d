//! Field types, values and field lists.
//!
//! A [`Field`] pairs a name with a [`FieldType`] and an optional default.
//! A [`Fields`] list is immutable once built and cheap to clone, so several
//! message types can share one payload layout.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Map};

use super::bits::{BitReader, BitWriter};
use crate::error::{PhotonsError, Result};

/// Wire type of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// One bit.
    Bool,
    /// Unsigned integer of 1 to 64 bits.
    Uint {
        /// Width in bits.
        bits: u8,
    },
    /// Two's complement signed integer of 2 to 64 bits.
    Int {
        /// Width in bits.
        bits: u8,
    },
    /// IEEE 754 single precision float.
    Float32,
    /// UTF-8 text, NUL padded to a fixed width.
    String {
        /// Width in bits.
        bits: usize,
    },
    /// Opaque bytes, zero padded to a fixed width.
    Bytes {
        /// Width in bits.
        bits: usize,
    },
    /// Region that is always zero on the wire.
    Reserved {
        /// Width in bits.
        bits: usize,
    },
    /// Nested list of fields.
    Struct(Fields),
    /// Fixed number of repetitions of one type.
    Array {
        /// Element type.
        kind: Box<FieldType>,
        /// Number of elements.
        count: usize,
    },
}

impl FieldType {
    /// Unsigned 8 bit integer.
    pub const fn uint8() -> Self {
        FieldType::Uint { bits: 8 }
    }

    /// Unsigned 16 bit integer.
    pub const fn uint16() -> Self {
        FieldType::Uint { bits: 16 }
    }

    /// Unsigned 32 bit integer.
    pub const fn uint32() -> Self {
        FieldType::Uint { bits: 32 }
    }

    /// Unsigned 64 bit integer.
    pub const fn uint64() -> Self {
        FieldType::Uint { bits: 64 }
    }

    /// Signed 8 bit integer.
    pub const fn int8() -> Self {
        FieldType::Int { bits: 8 }
    }

    /// Signed 16 bit integer.
    pub const fn int16() -> Self {
        FieldType::Int { bits: 16 }
    }

    /// Signed 32 bit integer.
    pub const fn int32() -> Self {
        FieldType::Int { bits: 32 }
    }

    /// Fixed-width string of `bits` bits.
    pub const fn string(bits: usize) -> Self {
        FieldType::String { bits }
    }

    /// Fixed-width byte blob of `bits` bits.
    pub const fn bytes(bits: usize) -> Self {
        FieldType::Bytes { bits }
    }

    /// Reserved region of `bits` bits.
    pub const fn reserved(bits: usize) -> Self {
        FieldType::Reserved { bits }
    }

    /// `count` repetitions of `kind`.
    pub fn array(kind: FieldType, count: usize) -> Self {
        FieldType::Array {
            kind: Box::new(kind),
            count,
        }
    }

    /// Width of this type on the wire, in bits.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Bool => 1,
            FieldType::Uint { bits } | FieldType::Int { bits } => usize::from(*bits),
            FieldType::Float32 => 32,
            FieldType::String { bits }
            | FieldType::Bytes { bits }
            | FieldType::Reserved { bits } => *bits,
            FieldType::Struct(fields) => fields.width(),
            FieldType::Array { kind, count } => kind.width() * count,
        }
    }

    /// Value used when nothing was assigned.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Bool => Value::Bool(false),
            FieldType::Uint { .. } => Value::Uint(0),
            FieldType::Int { .. } => Value::Int(0),
            FieldType::Float32 => Value::Float(0.0),
            FieldType::String { .. } => Value::String(String::new()),
            FieldType::Bytes { bits } | FieldType::Reserved { bits } => {
                Value::Bytes(Bytes::from(vec![0u8; bits.div_ceil(8)]))
            }
            FieldType::Struct(fields) => Value::List(fields.defaults()),
            FieldType::Array { kind, count } => Value::List(vec![kind.default_value(); *count]),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            FieldType::Uint { bits } if *bits == 0 || *bits > 64 => {
                Err(format!("unsigned width {bits} is outside 1..=64"))
            }
            FieldType::Int { bits } if *bits < 2 || *bits > 64 => {
                Err(format!("signed width {bits} is outside 2..=64"))
            }
            FieldType::String { bits: 0 }
            | FieldType::Bytes { bits: 0 }
            | FieldType::Reserved { bits: 0 } => Err("width must be positive".to_string()),
            FieldType::String { bits } if bits % 8 != 0 => {
                Err(format!("string width {bits} is not a whole number of bytes"))
            }
            FieldType::Array { count: 0, .. } => Err("array needs at least one element".to_string()),
            FieldType::Array { kind, .. } => kind.validate(),
            _ => Ok(()),
        }
    }

    /// Check that `value` fits this type and bring it into canonical form.
    ///
    /// Byte blobs are padded to the full width and short arrays are padded
    /// with element defaults, so the canonical value round-trips exactly.
    pub fn normalise(&self, value: Value) -> Result<Value> {
        let mismatch = |value: &Value| {
            PhotonsError::Encode(format!("{} cannot hold {:?}", self.describe(), value))
        };

        match (self, value) {
            (FieldType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (FieldType::Bool, Value::Uint(v @ (0 | 1))) => Ok(Value::Bool(v == 1)),

            (FieldType::Uint { bits }, Value::Uint(v)) => check_uint(v, *bits),
            (FieldType::Uint { bits }, Value::Bool(b)) => check_uint(u64::from(b), *bits),
            (FieldType::Uint { bits }, Value::Int(v)) => match u64::try_from(v) {
                Ok(v) => check_uint(v, *bits),
                Err(_) => Err(mismatch(&Value::Int(v))),
            },

            (FieldType::Int { bits }, Value::Int(v)) => check_int(v, *bits),
            (FieldType::Int { bits }, Value::Uint(v)) => match i64::try_from(v) {
                Ok(v) => check_int(v, *bits),
                Err(_) => Err(mismatch(&Value::Uint(v))),
            },

            (FieldType::Float32, Value::Float(f)) => Ok(Value::Float(f)),
            (FieldType::Float32, Value::Uint(v)) => {
                let f = v as f32;
                if f as u128 != u128::from(v) {
                    return Err(inexact_float(v));
                }
                Ok(Value::Float(f))
            }
            (FieldType::Float32, Value::Int(v)) => {
                let f = v as f32;
                if f as i128 != i128::from(v) {
                    return Err(inexact_float(v));
                }
                Ok(Value::Float(f))
            }

            (FieldType::String { bits }, Value::String(s)) => {
                if s.len() * 8 > *bits {
                    return Err(PhotonsError::Encode(format!(
                        "string of {} bytes is longer than its {} byte field",
                        s.len(),
                        bits / 8
                    )));
                }
                if s.contains('\0') {
                    return Err(PhotonsError::Encode(format!(
                        "string {s:?} contains a NUL byte"
                    )));
                }
                Ok(Value::String(s))
            }

            (FieldType::Bytes { bits }, Value::Bytes(b)) => pad_bytes(b, *bits),
            (FieldType::Bytes { bits }, Value::String(s)) => {
                let decoded = hex::decode(&s).map_err(|e| {
                    PhotonsError::Encode(format!("{s:?} is not valid hex: {e}"))
                })?;
                pad_bytes(Bytes::from(decoded), *bits)
            }

            (FieldType::Reserved { bits }, value) => {
                let zero = match &value {
                    Value::Uint(0) | Value::Int(0) | Value::Bool(false) => true,
                    Value::Bytes(b) => b.iter().all(|x| *x == 0),
                    _ => false,
                };
                if !zero {
                    return Err(PhotonsError::Encode(format!(
                        "reserved field must be zero, got {value:?}"
                    )));
                }
                Ok(Value::Bytes(Bytes::from(vec![0u8; bits.div_ceil(8)])))
            }

            (FieldType::Struct(fields), Value::List(items)) => {
                if items.len() != fields.len() {
                    return Err(PhotonsError::Encode(format!(
                        "structure has {} fields, got {} values",
                        fields.len(),
                        items.len()
                    )));
                }
                let items = fields
                    .iter()
                    .zip(items)
                    .map(|(field, item)| field.kind.normalise(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(items))
            }

            (FieldType::Array { kind, count }, Value::List(items)) => {
                if items.len() > *count {
                    return Err(PhotonsError::Encode(format!(
                        "array holds {} elements, got {}",
                        count,
                        items.len()
                    )));
                }
                let mut items = items
                    .into_iter()
                    .map(|item| kind.normalise(item))
                    .collect::<Result<Vec<_>>>()?;
                items.resize(*count, kind.default_value());
                Ok(Value::List(items))
            }

            (_, value) => Err(mismatch(&value)),
        }
    }

    /// Check `value` against this type, then write it.
    ///
    /// # Errors
    ///
    /// Returns an encode error if the value does not fit.
    pub fn encode(&self, value: &Value, writer: &mut BitWriter) -> Result<()> {
        let value = self.normalise(value.clone())?;
        self.encode_normalised(&value, writer)
    }

    /// Write a value already brought into canonical form by [`normalise`].
    ///
    /// [`normalise`]: FieldType::normalise
    pub(crate) fn encode_normalised(&self, value: &Value, writer: &mut BitWriter) -> Result<()> {
        match (self, value) {
            (FieldType::Bool, Value::Bool(b)) => writer.push_bit(*b),
            (FieldType::Uint { bits }, Value::Uint(v)) => writer.push_uint(*v, usize::from(*bits)),
            (FieldType::Int { bits }, Value::Int(v)) => {
                writer.push_uint(*v as u64, usize::from(*bits))
            }
            (FieldType::Float32, Value::Float(f)) => writer.push_uint(u64::from(f.to_bits()), 32),
            (FieldType::String { bits }, Value::String(s)) => writer.push_bytes(s.as_bytes(), *bits),
            (FieldType::Bytes { bits }, Value::Bytes(b)) => writer.push_bytes(b, *bits),
            (FieldType::Reserved { bits }, _) => writer.push_zeros(*bits),
            (FieldType::Struct(fields), Value::List(items)) => {
                for (field, item) in fields.iter().zip(items) {
                    field.kind.encode_normalised(item, writer)?;
                }
            }
            (FieldType::Array { kind, .. }, Value::List(items)) => {
                for item in items {
                    kind.encode_normalised(item, writer)?;
                }
            }
            (_, value) => {
                return Err(PhotonsError::Encode(format!(
                    "{} cannot hold {:?}",
                    self.describe(),
                    value
                )))
            }
        }
        Ok(())
    }

    /// Read one value of this type.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<Value> {
        Ok(match self {
            FieldType::Bool => Value::Bool(reader.read_bit()?),
            FieldType::Uint { bits } => Value::Uint(reader.read_uint(usize::from(*bits))?),
            FieldType::Int { bits } => {
                let bits = u32::from(*bits);
                let raw = reader.read_uint(bits as usize)?;
                let shift = 64 - bits;
                Value::Int(((raw << shift) as i64) >> shift)
            }
            FieldType::Float32 => Value::Float(f32::from_bits(reader.read_uint(32)? as u32)),
            FieldType::String { bits } => {
                let raw = reader.read_bytes(*bits)?;
                let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
                Value::String(String::from_utf8_lossy(&raw[..end]).into_owned())
            }
            FieldType::Bytes { bits } => Value::Bytes(Bytes::from(reader.read_bytes(*bits)?)),
            FieldType::Reserved { bits } => {
                let offset = reader.position();
                if reader.skip(*bits)? {
                    tracing::trace!("Reserved region at bit {} was not zero", offset);
                }
                Value::Bytes(Bytes::from(vec![0u8; bits.div_ceil(8)]))
            }
            FieldType::Struct(fields) => Value::List(
                fields
                    .iter()
                    .map(|field| field.kind.decode(reader))
                    .collect::<Result<Vec<_>>>()?,
            ),
            FieldType::Array { kind, count } => Value::List(
                (0..*count)
                    .map(|_| kind.decode(reader))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    /// Render a value of this type as JSON.
    pub fn to_json(&self, value: &Value) -> serde_json::Value {
        match (self, value) {
            (FieldType::Struct(fields), Value::List(items)) => fields.to_json(items),
            (FieldType::Array { kind, .. }, Value::List(items)) => {
                serde_json::Value::Array(items.iter().map(|item| kind.to_json(item)).collect())
            }
            (_, value) => value.to_json(),
        }
    }

    fn describe(&self) -> String {
        match self {
            FieldType::Bool => "bool".to_string(),
            FieldType::Uint { bits } => format!("uint{bits}"),
            FieldType::Int { bits } => format!("int{bits}"),
            FieldType::Float32 => "float32".to_string(),
            FieldType::String { bits } => format!("string({bits})"),
            FieldType::Bytes { bits } => format!("bytes({bits})"),
            FieldType::Reserved { bits } => format!("reserved({bits})"),
            FieldType::Struct(fields) => format!("struct({} fields)", fields.len()),
            FieldType::Array { kind, count } => format!("{}[{}]", kind.describe(), count),
        }
    }
}

fn check_uint(v: u64, bits: u8) -> Result<Value> {
    if bits < 64 && v >> bits != 0 {
        return Err(PhotonsError::Encode(format!(
            "{} does not fit in {} bits",
            v, bits
        )));
    }
    Ok(Value::Uint(v))
}

fn check_int(v: i64, bits: u8) -> Result<Value> {
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    if !(min..=max).contains(&i128::from(v)) {
        return Err(PhotonsError::Encode(format!(
            "{} does not fit in a signed {} bit field",
            v, bits
        )));
    }
    Ok(Value::Int(v))
}

fn inexact_float(v: impl fmt::Display) -> PhotonsError {
    PhotonsError::Encode(format!("{v} is not exactly representable as float32"))
}

fn pad_bytes(b: Bytes, bits: usize) -> Result<Value> {
    let len = bits.div_ceil(8);
    if b.len() > len {
        return Err(PhotonsError::Encode(format!(
            "{} bytes do not fit in a {} bit field",
            b.len(),
            bits
        )));
    }
    let spare = bits % 8;
    if spare != 0 && b.len() == len && b[len - 1] >> spare != 0 {
        return Err(PhotonsError::Encode(format!(
            "last byte {:#04x} sets bits past the {} bit field",
            b[len - 1],
            bits
        )));
    }
    if b.len() == len {
        return Ok(Value::Bytes(b));
    }
    let mut padded = b.to_vec();
    padded.resize(len, 0);
    Ok(Value::Bytes(Bytes::from(padded)))
}

/// A decoded or assigned field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Bit value.
    Bool(bool),
    /// Unsigned integer.
    Uint(u64),
    /// Signed integer.
    Int(i64),
    /// Float.
    Float(f32),
    /// Text.
    String(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// Structure members in declared order, or array elements.
    List(Vec<Value>),
}

impl Value {
    /// Boolean content, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unsigned content, if any.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Signed content, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Float content, if any.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text content, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Byte content, if any.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// List content, if any.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render as JSON. Bytes become lower-case hex.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => json!(b),
            Value::Uint(v) => json!(v),
            Value::Int(v) => json!(v),
            Value::Float(f) => json!(f),
            Value::String(s) => json!(s),
            Value::Bytes(b) => json!(hex::encode(b)),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

macro_rules! impl_from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self { Value::Uint(u64::from(v)) }
        })*
    };
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self { Value::Int(i64::from(v)) }
        })*
    };
}

impl_from_uint!(u8, u16, u32, u64);
impl_from_int!(i8, i16, i32, i64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// A named field with its type and default.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldType,
    default: Option<Value>,
}

impl Field {
    /// Create a field that defaults to its type's zero value.
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    /// Set an explicit default.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type.
    #[inline]
    pub fn kind(&self) -> &FieldType {
        &self.kind
    }

    /// Width in bits.
    #[inline]
    pub fn width(&self) -> usize {
        self.kind.width()
    }

    /// Default value, in canonical form.
    pub fn default_value(&self) -> Value {
        match &self.default {
            Some(value) => value.clone(),
            None => self.kind.default_value(),
        }
    }
}

/// An immutable ordered list of fields.
#[derive(Clone, PartialEq)]
pub struct Fields(Arc<[Field]>);

impl Fields {
    /// Validate and freeze a field list.
    ///
    /// # Errors
    ///
    /// Returns a schema error for invalid widths, duplicate names, or
    /// defaults that do not fit their type.
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Result<Self> {
        let mut checked: Vec<Field> = Vec::new();
        for mut field in fields {
            if checked.iter().any(|f| f.name == field.name) {
                return Err(PhotonsError::Schema(format!(
                    "Field {:?} is declared twice",
                    field.name
                )));
            }
            field.kind.validate().map_err(|e| {
                PhotonsError::Schema(format!("Field {:?}: {}", field.name, e))
            })?;
            if let Some(default) = field.default.take() {
                let default = field.kind.normalise(default).map_err(|e| {
                    PhotonsError::Schema(format!("Field {:?} default: {}", field.name, e))
                })?;
                field.default = Some(default);
            }
            checked.push(field);
        }
        Ok(Self(checked.into()))
    }

    /// Freeze a list known to be valid, skipping validation.
    pub(crate) fn trusted(fields: Vec<Field>) -> Self {
        Self(fields.into())
    }

    /// An empty field list.
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Total width in bits.
    pub fn width(&self) -> usize {
        self.0.iter().map(Field::width).sum()
    }

    /// Position of the field called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|f| f.name == name)
    }

    /// Default value of every field, in order.
    pub fn defaults(&self) -> Vec<Value> {
        self.0.iter().map(Field::default_value).collect()
    }

    /// Render `values` as a JSON object keyed by field name.
    ///
    /// Reserved fields are omitted.
    pub fn to_json(&self, values: &[Value]) -> serde_json::Value {
        let mut map = Map::new();
        for (field, value) in self.0.iter().zip(values) {
            if matches!(field.kind, FieldType::Reserved { .. }) {
                continue;
            }
            map.insert(field.name.clone(), field.kind.to_json(value));
        }
        serde_json::Value::Object(map)
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for Fields {
    type Target = [Field];

    fn deref(&self) -> &[Field] {
        &self.0
    }
}

impl fmt::Debug for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|field| (&field.name, &field.kind)))
            .finish()
    }
}
