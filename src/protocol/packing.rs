//! Field packing engine.
//!
//! Concatenates fields in declared order into one bit sequence and reads
//! them back in the same order. Fields carry no length prefix; the widths
//! come from the field list alone.
//!
//! # Example
//!
//! ```
//! use photons_protocol::codec::{Field, FieldType, Fields, Value};
//! use photons_protocol::protocol::packing;
//!
//! let fields = Fields::new([
//!     Field::new("on", FieldType::Bool),
//!     Field::new("level", FieldType::Uint { bits: 7 }),
//! ])
//! .unwrap();
//! let values = vec![Value::Bool(true), Value::Uint(3)];
//!
//! let bytes = packing::pack(fields.iter().zip(&values)).unwrap();
//! assert_eq!(&bytes[..], &[0b0000_0111]);
//! assert_eq!(packing::unpack(&bytes, &fields).unwrap(), values);
//! ```

use bytes::Bytes;

use crate::codec::{BitReader, BitWriter, Field, Value};
use crate::error::{PhotonsError, Result};

fn with_field(field: &Field, err: PhotonsError) -> PhotonsError {
    match err {
        PhotonsError::Encode(msg) => PhotonsError::Encode(format!("{}: {}", field.name(), msg)),
        PhotonsError::Decode(msg) => PhotonsError::Decode(format!("{}: {}", field.name(), msg)),
        other => other,
    }
}

/// Append each `(field, value)` pair to `writer`, in order.
///
/// Values are checked against their field before anything is written for
/// them, so an oversized value is an error, never a truncation.
pub fn pack_into<'a, I>(pairs: I, writer: &mut BitWriter) -> Result<()>
where
    I: IntoIterator<Item = (&'a Field, &'a Value)>,
{
    for (field, value) in pairs {
        field
            .kind()
            .encode(value, writer)
            .map_err(|e| with_field(field, e))?;
    }
    Ok(())
}

/// Pack `(field, value)` pairs into bytes.
///
/// # Errors
///
/// Returns an encode error if a value does not fit its field or the total
/// width is not a whole number of bytes.
pub fn pack<'a, I>(pairs: I) -> Result<Bytes>
where
    I: IntoIterator<Item = (&'a Field, &'a Value)>,
{
    let mut writer = BitWriter::new();
    pack_into(pairs, &mut writer)?;
    writer.finish()
}

/// Read one value per field from `reader`, in order.
pub fn unpack_from(reader: &mut BitReader<'_>, fields: &[Field]) -> Result<Vec<Value>> {
    fields
        .iter()
        .map(|field| field.kind().decode(reader).map_err(|e| with_field(field, e)))
        .collect()
}

/// Unpack `fields` from the start of `buf`.
///
/// Bytes past the declared widths are ignored.
///
/// # Errors
///
/// Returns a decode error if `buf` is shorter than the fields require.
pub fn unpack(buf: &[u8], fields: &[Field]) -> Result<Vec<Value>> {
    let mut reader = BitReader::new(buf);
    unpack_from(&mut reader, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldType, Fields};

    fn fields() -> Fields {
        Fields::new([
            Field::new("a", FieldType::uint16()),
            Field::new("b", FieldType::Uint { bits: 4 }),
            Field::new("c", FieldType::Bool),
            Field::new("d", FieldType::reserved(3)),
            Field::new("e", FieldType::string(24)),
        ])
        .unwrap()
    }

    #[test]
    fn test_pack_in_declared_order() {
        let fields = fields();
        let values = vec![
            Value::Uint(0x0102),
            Value::Uint(0xa),
            Value::Bool(true),
            Value::Uint(0),
            "hi".into(),
        ];
        let bytes = pack(fields.iter().zip(&values)).unwrap();
        assert_eq!(&bytes[..], &[0x02, 0x01, 0x1a, b'h', b'i', 0x00]);

        let decoded = unpack(&bytes, &fields).unwrap();
        assert_eq!(decoded[0], Value::Uint(0x0102));
        assert_eq!(decoded[1], Value::Uint(0xa));
        assert_eq!(decoded[2], Value::Bool(true));
        assert_eq!(decoded[4], Value::String("hi".into()));
    }

    #[test]
    fn test_pack_rejects_oversized_value() {
        let fields = fields();
        let values = vec![
            Value::Uint(0x1_0000),
            Value::Uint(0),
            Value::Bool(false),
            Value::Uint(0),
            "".into(),
        ];
        let err = pack(fields.iter().zip(&values)).unwrap_err();
        assert!(matches!(err, PhotonsError::Encode(_)));
        assert!(err.to_string().contains("a:"));
    }

    #[test]
    fn test_pack_rejects_unaligned_total() {
        let fields = Fields::new([Field::new("x", FieldType::Uint { bits: 3 })]).unwrap();
        let values = vec![Value::Uint(1)];
        assert!(pack(fields.iter().zip(&values)).is_err());
    }

    #[test]
    fn test_unpack_short_buffer_names_field() {
        let err = unpack(&[0x01, 0x02, 0x03], &fields()).unwrap_err();
        assert!(matches!(err, PhotonsError::Decode(_)));
        assert!(err.to_string().contains("e:"));
    }
}
