//! Codec module - bit-level field encoding.
//!
//! - [`BitWriter`] / [`BitReader`] - LSB-first bit streams
//! - [`FieldType`] - wire types with width, defaults and value checks
//! - [`Fields`] - immutable, shareable field lists
//!
//! # Example
//!
//! ```
//! use photons_protocol::codec::{BitReader, BitWriter, FieldType, Value};
//!
//! let mut writer = BitWriter::new();
//! FieldType::uint16().encode(&Value::Uint(3500), &mut writer).unwrap();
//! let bytes = writer.finish().unwrap();
//! assert_eq!(&bytes[..], &3500u16.to_le_bytes());
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(FieldType::uint16().decode(&mut reader).unwrap(), Value::Uint(3500));
//! ```

mod bits;
mod types;

pub use bits::{to_bit_string, BitReader, BitWriter};
pub use types::{Field, FieldType, Fields, Value};
