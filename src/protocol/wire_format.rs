//! Wire format of the 36-byte packet header.
//!
//! Implements the header layout (LSB-first bit order, see [`crate::codec::bits`]):
//! ```text
//! ┌────────┬──────────┬─────┬─────┬────────┬──────────┬──────────┐
//! │ size   │ protocol │ adr │ tag │ origin │ source   │ target   │
//! │ 16     │ 12       │ 1   │ 1   │ 2      │ 32       │ 64       │
//! ├────────┴──┬───────┴─────┼─────┴──┬─────┴──────────┴──┬───────┤
//! │ reserved  │ res │ ack   │ rsvd   │ sequence │ reserved│ type  │ rsvd │
//! │ 48        │ 1   │ 1     │ 6      │ 8        │ 64      │ 16    │ 16   │
//! └───────────┴─────┴───────┴────────┴──────────┴─────────┴───────┴──────┘
//! ```
//!
//! `size` is recomputed whenever a packet is packed. `addressable` and
//! `tagged` follow `target` whenever `target` is assigned.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::codec::{BitReader, Field, FieldType, Fields, Value};
use crate::error::{PhotonsError, Result};

use super::packing;

/// Header size in bytes (fixed, exactly 36).
pub const HEADER_SIZE: usize = 36;

/// Protocol number carried by every packet.
pub const PROTOCOL_NUMBER: u16 = 1024;

/// Packet type of the acknowledgement message.
pub const ACK_PKT_TYPE: u16 = 45;

/// Size of the `target` field in bytes.
pub const TARGET_SIZE: usize = 8;

/// Number of significant bytes in a device address.
pub const SERIAL_SIZE: usize = 6;

static HEADER_FIELDS: LazyLock<Fields> = LazyLock::new(|| {
    Fields::trusted(vec![
        Field::new("size", FieldType::uint16()),
        Field::new("protocol", FieldType::Uint { bits: 12 })
            .with_default(Value::Uint(u64::from(PROTOCOL_NUMBER))),
        Field::new("addressable", FieldType::Bool).with_default(true),
        Field::new("tagged", FieldType::Bool).with_default(false),
        Field::new("origin", FieldType::reserved(2)),
        Field::new("source", FieldType::uint32()),
        Field::new("target", FieldType::bytes(TARGET_SIZE * 8)),
        Field::new("reserved2", FieldType::reserved(48)),
        Field::new("res_required", FieldType::Bool).with_default(true),
        Field::new("ack_required", FieldType::Bool).with_default(true),
        Field::new("reserved3", FieldType::reserved(6)),
        Field::new("sequence", FieldType::uint8()),
        Field::new("reserved4", FieldType::reserved(64)),
        Field::new("pkt_type", FieldType::uint16()),
        Field::new("reserved5", FieldType::reserved(16)),
    ])
});

/// Field layout of the header, in wire order.
pub fn header_fields() -> &'static Fields {
    &HEADER_FIELDS
}

/// Check whether `name` is a header field.
///
/// Payload fields may not reuse these names.
pub fn is_header_field(name: &str) -> bool {
    HEADER_FIELDS.position(name).is_some()
}

/// An 8-byte device address.
///
/// The first six bytes are the device serial; the last two are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Target([u8; TARGET_SIZE]);

impl Target {
    /// The all-zero address, meaning "every device".
    pub const EMPTY: Target = Target([0; TARGET_SIZE]);

    /// Create from the full 8 bytes.
    pub const fn new(bytes: [u8; TARGET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; TARGET_SIZE] {
        &self.0
    }

    /// Check if every byte is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; TARGET_SIZE]
    }

    /// Lower-case hex of the first six bytes.
    pub fn serial(&self) -> String {
        hex::encode(&self.0[..SERIAL_SIZE])
    }
}

impl From<[u8; TARGET_SIZE]> for Target {
    fn from(bytes: [u8; TARGET_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<[u8; SERIAL_SIZE]> for Target {
    fn from(serial: [u8; SERIAL_SIZE]) -> Self {
        let mut bytes = [0; TARGET_SIZE];
        bytes[..SERIAL_SIZE].copy_from_slice(&serial);
        Self(bytes)
    }
}

/// The 64-bit field value, as it sits on the wire (little endian).
impl From<u64> for Target {
    fn from(value: u64) -> Self {
        Self(value.to_le_bytes())
    }
}

impl TryFrom<&[u8]> for Target {
    type Error = PhotonsError;

    fn try_from(value: &[u8]) -> Result<Self> {
        if value.len() > TARGET_SIZE {
            return Err(PhotonsError::Encode(format!(
                "target is {} bytes, at most {} allowed",
                value.len(),
                TARGET_SIZE
            )));
        }
        let mut bytes = [0; TARGET_SIZE];
        bytes[..value.len()].copy_from_slice(value);
        Ok(Self(bytes))
    }
}

impl FromStr for Target {
    type Err = PhotonsError;

    /// Parse a hex address such as `d073d5000001` or `0000000000000000`.
    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| PhotonsError::Encode(format!("invalid target {s:?}: {e}")))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial())
    }
}

/// Decoded or assembled packet header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    size: u16,
    /// Protocol number (1024 for every known message).
    pub protocol: u16,
    addressable: bool,
    tagged: bool,
    /// Caller-chosen correlation id.
    pub source: u32,
    target: Option<Target>,
    /// Ask the device for a state response.
    pub res_required: bool,
    /// Ask the device for an acknowledgement.
    pub ack_required: bool,
    /// Caller-chosen sequence number.
    pub sequence: u8,
    /// Payload schema identifier.
    pub pkt_type: u16,
}

impl Header {
    /// Create a header with protocol defaults for `pkt_type`.
    ///
    /// `target` starts unassigned, `addressable` true and `tagged` false.
    pub fn new(pkt_type: u16) -> Self {
        Self {
            size: HEADER_SIZE as u16,
            protocol: PROTOCOL_NUMBER,
            addressable: true,
            tagged: false,
            source: 0,
            target: None,
            res_required: true,
            ack_required: true,
            sequence: 0,
            pkt_type,
        }
    }

    /// Declared size in bytes.
    ///
    /// For a decoded header this is the value on the wire.
    #[inline]
    pub fn size(&self) -> u16 {
        self.size
    }

    /// The `addressable` bit.
    #[inline]
    pub fn addressable(&self) -> bool {
        self.addressable
    }

    /// Override the `addressable` bit.
    pub fn set_addressable(&mut self, addressable: bool) {
        self.addressable = addressable;
    }

    /// The `tagged` bit.
    #[inline]
    pub fn tagged(&self) -> bool {
        self.tagged
    }

    /// Override the `tagged` bit.
    pub fn set_tagged(&mut self, tagged: bool) {
        self.tagged = tagged;
    }

    /// The assigned target, or `None` if it was never assigned.
    #[inline]
    pub fn target(&self) -> Option<Target> {
        self.target
    }

    /// Assign the target and derive `addressable` and `tagged` from it.
    ///
    /// `None` is stored as [`Target::EMPTY`]. An empty target forces
    /// `addressable` and `tagged` on; a non-empty one clears `tagged`.
    pub fn set_target(&mut self, target: impl Into<Option<Target>>) {
        let target = target.into().unwrap_or(Target::EMPTY);
        let empty = target.is_empty();
        if empty {
            self.addressable = true;
        }
        self.tagged = empty;
        self.target = Some(target);
    }

    /// Hex serial of the target, or `None` if target was never assigned.
    pub fn serial(&self) -> Option<String> {
        self.target.map(|t| t.serial())
    }

    /// Check if the packet type is the acknowledgement type.
    #[inline]
    pub fn represents_ack(&self) -> bool {
        self.pkt_type == ACK_PKT_TYPE
    }

    /// Compare the stored protocol and packet type.
    #[inline]
    pub fn is(&self, protocol: u16, pkt_type: u16) -> bool {
        self.protocol == protocol && self.pkt_type == pkt_type
    }

    /// Header values in wire order, with `size` replaced.
    pub(crate) fn values(&self, size: u16) -> Vec<Value> {
        let target = self.target.unwrap_or(Target::EMPTY);
        HEADER_FIELDS
            .iter()
            .map(|field| match field.name() {
                "size" => Value::Uint(u64::from(size)),
                "protocol" => Value::Uint(u64::from(self.protocol)),
                "addressable" => Value::Bool(self.addressable),
                "tagged" => Value::Bool(self.tagged),
                "source" => Value::Uint(u64::from(self.source)),
                "target" => Value::from(target.as_bytes().as_slice()),
                "res_required" => Value::Bool(self.res_required),
                "ack_required" => Value::Bool(self.ack_required),
                "sequence" => Value::Uint(u64::from(self.sequence)),
                "pkt_type" => Value::Uint(u64::from(self.pkt_type)),
                _ => field.default_value(),
            })
            .collect()
    }

    fn from_values(values: &[Value]) -> Result<Self> {
        let get = |name: &str| {
            HEADER_FIELDS
                .position(name)
                .and_then(|i| values.get(i))
                .ok_or_else(|| PhotonsError::Decode(format!("header is missing {name}")))
        };
        let uint = |name: &str| -> Result<u64> {
            get(name)?
                .as_u64()
                .ok_or_else(|| PhotonsError::Decode(format!("header {name} is not an integer")))
        };
        let flag = |name: &str| -> Result<bool> {
            get(name)?
                .as_bool()
                .ok_or_else(|| PhotonsError::Decode(format!("header {name} is not a bit")))
        };
        let target = get("target")?
            .as_bytes()
            .ok_or_else(|| PhotonsError::Decode("header target is not bytes".to_string()))
            .and_then(|b| Target::try_from(&b[..]))?;

        Ok(Self {
            size: uint("size")? as u16,
            protocol: uint("protocol")? as u16,
            addressable: flag("addressable")?,
            tagged: flag("tagged")?,
            source: uint("source")? as u32,
            target: Some(target),
            res_required: flag("res_required")?,
            ack_required: flag("ack_required")?,
            sequence: uint("sequence")? as u8,
            pkt_type: uint("pkt_type")? as u16,
        })
    }

    /// Decode the header at the start of `buf`.
    ///
    /// Only the first 36 bytes are decoded; the payload is left alone so
    /// inbound packets can be classified cheaply.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is shorter than the header or than
    /// the declared size, or if the declared size is below 36.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(PhotonsError::Truncated {
                needed: HEADER_SIZE,
                got: buf.len(),
            });
        }

        let mut reader = BitReader::new(&buf[..HEADER_SIZE]);
        let values = packing::unpack_from(&mut reader, &HEADER_FIELDS)?;
        let header = Self::from_values(&values)?;

        let declared = usize::from(header.size);
        if declared < HEADER_SIZE {
            return Err(PhotonsError::Decode(format!(
                "declared size {declared} is smaller than the header"
            )));
        }
        if buf.len() < declared {
            return Err(PhotonsError::Truncated {
                needed: declared,
                got: buf.len(),
            });
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BitWriter;

    fn pack_header(header: &Header) -> Vec<u8> {
        let values = header.values(HEADER_SIZE as u16);
        let mut writer = BitWriter::new();
        packing::pack_into(HEADER_FIELDS.iter().zip(&values), &mut writer).unwrap();
        writer.finish().unwrap().to_vec()
    }

    #[test]
    fn test_header_layout_is_36_bytes() {
        assert_eq!(header_fields().width(), HEADER_SIZE * 8);
    }

    #[test]
    fn test_defaults() {
        let header = Header::new(0);
        assert_eq!(header.protocol, 1024);
        assert!(header.res_required);
        assert!(header.ack_required);
        assert!(header.addressable());
        assert!(!header.tagged());
        assert_eq!(header.target(), None);
        assert_eq!(header.serial(), None);
    }

    #[test]
    fn test_empty_target_forces_addressable() {
        let empties: [Option<Target>; 3] = [
            None,
            Some(Target::from([0u8; 8])),
            Some(Target::from(0u64)),
        ];
        for target in empties {
            let mut header = Header::new(0);
            header.set_addressable(false);
            header.set_target(target);
            assert!(header.addressable());
        }
    }

    #[test]
    fn test_empty_target_forces_tagged() {
        let empties = [
            None,
            Some("0000000000000000".parse::<Target>().unwrap()),
            Some(Target::from([0u8; 8])),
            Some(Target::from(0u64)),
        ];
        for target in empties {
            let mut header = Header::new(0);
            header.set_tagged(false);
            header.set_target(target);
            assert!(header.tagged());
        }
    }

    #[test]
    fn test_non_empty_target_clears_tagged() {
        let mut header = Header::new(0);
        header.set_target(None);
        assert!(header.tagged());

        header.set_target("d073d5000001".parse::<Target>().unwrap());
        assert!(!header.tagged());
    }

    #[test]
    fn test_reading_serial_does_not_derive() {
        let header = Header::new(0);
        assert_eq!(header.serial(), None);
        assert!(!header.tagged());
        assert!(header.addressable());
    }

    #[test]
    fn test_serial() {
        let mut header = Header::new(0);
        header.set_target(None);
        assert_eq!(header.target(), Some(Target::new([0; 8])));
        assert_eq!(header.serial().as_deref(), Some("000000000000"));

        let mut header = Header::new(0);
        header.set_target(Target::from([0xd0, 0x73, 0xd5, 0x00, 0x00, 0x01]));
        assert_eq!(
            header.target().unwrap().as_bytes(),
            &[0xd0, 0x73, 0xd5, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(header.serial().as_deref(), Some("d073d5000001"));
    }

    #[test]
    fn test_serial_ignores_trailing_bytes() {
        let target: Target = "d073d50000010101".parse().unwrap();
        let mut header = Header::new(0);
        header.set_target(target);
        assert_eq!(header.target(), Some(target));
        assert_eq!(header.serial().as_deref(), Some("d073d5000001"));
    }

    #[test]
    fn test_target_conversions() {
        assert!(Target::try_from(&[0u8; 9][..]).is_err());
        assert!("zz".parse::<Target>().is_err());
        assert_eq!(
            Target::from(0x0100_00d5_73d0u64).serial(),
            "d073d5000001"
        );
        assert_eq!(Target::from([1, 2, 3, 4, 5, 6]).to_string(), "010203040506");
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new(117);
        header.source = 0xdead_beef;
        header.sequence = 200;
        header.ack_required = false;
        header.set_target("d073d5001337".parse::<Target>().unwrap());

        let bytes = pack_header(&header);
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = Header::unpack(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_known_bytes() {
        let mut header = Header::new(2);
        header.source = 1;
        header.sequence = 1;
        header.set_target(None);

        let bytes = pack_header(&header);
        assert_eq!(&bytes[..8], &[0x24, 0x00, 0x00, 0x34, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(bytes[22], 0x03);
        assert_eq!(bytes[23], 0x01);
        assert_eq!(&bytes[32..34], &[0x02, 0x00]);
    }

    #[test]
    fn test_unpack_too_short() {
        let err = Header::unpack(&[0u8; 35]).unwrap_err();
        assert!(matches!(err, PhotonsError::Truncated { needed: 36, got: 35 }));
    }

    #[test]
    fn test_unpack_shorter_than_declared_size() {
        let mut bytes = pack_header(&Header::new(2));
        bytes[0] = 40;
        let err = Header::unpack(&bytes).unwrap_err();
        assert!(matches!(err, PhotonsError::Truncated { needed: 40, got: 36 }));
        assert!(err.is_decode());
    }

    #[test]
    fn test_unpack_declared_size_below_header() {
        let mut bytes = pack_header(&Header::new(2));
        bytes[0] = 10;
        assert!(matches!(
            Header::unpack(&bytes).unwrap_err(),
            PhotonsError::Decode(_)
        ));
    }

    #[test]
    fn test_unpack_ignores_reserved_bits() {
        let mut bytes = pack_header(&Header::new(2));
        bytes[3] |= 0b0100_0000; // origin
        bytes[30] = 0xff; // timestamp region
        let decoded = Header::unpack(&bytes).unwrap();
        assert_eq!(decoded.pkt_type, 2);
        assert_eq!(decoded.protocol, 1024);
    }
}
