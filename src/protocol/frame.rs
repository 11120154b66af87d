//! Packet: header plus payload values.
//!
//! A packet holds its header as plain typed fields and its payload as one
//! [`Value`] per payload field. It knows its payload layout but nothing else
//! about the registry it came from.
//!
//! # Example
//!
//! ```
//! use photons_protocol::codec::{Field, FieldType, Fields};
//! use photons_protocol::protocol::{Header, Packet};
//!
//! let fields = Fields::new([Field::new("label", FieldType::string(32 * 8))]).unwrap();
//! let mut packet = Packet::new(Header::new(24), fields);
//! packet.set("label", "kitchen").unwrap();
//!
//! let bytes = packet.pack().unwrap();
//! assert_eq!(bytes.len(), 68);
//!
//! let decoded = Packet::unpack(&bytes, packet.fields()).unwrap();
//! assert_eq!(decoded.get("label").and_then(|v| v.as_str()), Some("kitchen"));
//! ```

use bytes::Bytes;
use serde_json::{json, Map};

use super::packing;
use super::wire_format::{header_fields, Header, Target, HEADER_SIZE};
use crate::codec::{BitWriter, Fields, Value};
use crate::config::UnpackOptions;
use crate::error::{PhotonsError, Result};

/// A complete protocol packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Header fields.
    pub header: Header,
    fields: Fields,
    values: Vec<Value>,
}

impl Packet {
    /// Create a packet with every payload field at its default.
    pub fn new(header: Header, fields: Fields) -> Self {
        let values = fields.defaults();
        Self {
            header,
            fields,
            values,
        }
    }

    /// Payload layout.
    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Payload values, in field order.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get a payload value by field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.position(name).map(|i| &self.values[i])
    }

    /// Assign a payload value.
    ///
    /// # Errors
    ///
    /// Returns an encode error if there is no such field or the value does
    /// not fit it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.fields.position(name).ok_or_else(|| {
            PhotonsError::Encode(format!("packet has no payload field {name:?}"))
        })?;
        let value = self.fields[index]
            .kind()
            .normalise(value.into())
            .map_err(|e| PhotonsError::Encode(format!("{name}: {e}")))?;
        self.values[index] = value;
        Ok(())
    }

    /// Builder-style [`Packet::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Payload size in bytes.
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.fields.width() / 8
    }

    /// Total packed size in bytes (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload_size()
    }

    /// Packet type.
    #[inline]
    pub fn pkt_type(&self) -> u16 {
        self.header.pkt_type
    }

    /// Protocol number.
    #[inline]
    pub fn protocol(&self) -> u16 {
        self.header.protocol
    }

    /// Assign the target, deriving `addressable` and `tagged`.
    pub fn set_target(&mut self, target: impl Into<Option<Target>>) {
        self.header.set_target(target);
    }

    /// Hex serial of the target, or `None` if target was never assigned.
    pub fn serial(&self) -> Option<String> {
        self.header.serial()
    }

    /// Check if this is an acknowledgement.
    #[inline]
    pub fn represents_ack(&self) -> bool {
        self.header.represents_ack()
    }

    /// Pack header and payload into bytes.
    ///
    /// `size` is always recomputed from the payload layout.
    ///
    /// # Errors
    ///
    /// Returns an encode error if the packet is larger than a 16-bit size
    /// allows or a value does not fit its field.
    pub fn pack(&self) -> Result<Bytes> {
        let size = self.size();
        let declared = u16::try_from(size).map_err(|_| {
            PhotonsError::Encode(format!("packet of {size} bytes exceeds the size field"))
        })?;

        let header_values = self.header.values(declared);
        let mut writer = BitWriter::with_capacity(size * 8);
        packing::pack_into(header_fields().iter().zip(&header_values), &mut writer)?;
        packing::pack_into(self.fields.iter().zip(&self.values), &mut writer)?;
        writer.finish()
    }

    /// Decode bytes as a packet with payload layout `fields`.
    pub fn unpack(buf: &[u8], fields: &Fields) -> Result<Self> {
        Self::unpack_with(buf, fields, &UnpackOptions::default())
    }

    /// Decode bytes with explicit options.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the buffer is shorter than the header, than
    /// its declared size, or than the payload layout requires.
    pub fn unpack_with(buf: &[u8], fields: &Fields, options: &UnpackOptions) -> Result<Self> {
        let header = Header::unpack(buf)?;
        Self::from_header(header, buf, fields, options)
    }

    /// Decode the payload of `buf` given its already decoded header.
    pub(crate) fn from_header(
        header: Header,
        buf: &[u8],
        fields: &Fields,
        options: &UnpackOptions,
    ) -> Result<Self> {
        let declared = usize::from(header.size());
        if declared > options.max_packet_size {
            return Err(PhotonsError::Decode(format!(
                "declared size {} exceeds maximum {}",
                declared, options.max_packet_size
            )));
        }

        if buf.len() > declared {
            if !options.allow_trailing_bytes {
                return Err(PhotonsError::Decode(format!(
                    "{} bytes after the declared size {}",
                    buf.len() - declared,
                    declared
                )));
            }
            tracing::warn!(
                "Ignoring {} trailing bytes after packet of size {}",
                buf.len() - declared,
                declared
            );
        }

        let body = &buf[HEADER_SIZE..declared];
        let needed = fields.width() / 8;
        if body.len() < needed {
            return Err(PhotonsError::Truncated {
                needed: HEADER_SIZE + needed,
                got: declared,
            });
        }

        let values = packing::unpack(body, fields)?;
        Ok(Self {
            header,
            fields: fields.clone(),
            values,
        })
    }

    /// Render as JSON: header summary plus payload keyed by field name.
    pub fn as_json(&self) -> serde_json::Value {
        let mut map = Map::new();
        map.insert("pkt_type".to_string(), json!(self.header.pkt_type));
        map.insert("source".to_string(), json!(self.header.source));
        map.insert("sequence".to_string(), json!(self.header.sequence));
        map.insert("serial".to_string(), json!(self.serial()));
        map.insert("payload".to_string(), self.fields.to_json(&self.values));
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{to_bit_string, Field, FieldType};

    fn label_fields() -> Fields {
        Fields::new([Field::new("thing", FieldType::string(32 * 8))]).unwrap()
    }

    #[test]
    fn test_size_defaults_to_layout() {
        let header_only = Packet::new(Header::new(1), Fields::empty());
        assert_eq!(header_only.size(), 36);
        assert_eq!(header_only.pack().unwrap().len(), 36);

        let with_payload = Packet::new(Header::new(2), label_fields());
        assert_eq!(with_payload.size(), 68);
        let bytes = with_payload.pack().unwrap();
        assert_eq!(bytes.len(), 68);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 68);
    }

    #[test]
    fn test_packs_without_target() {
        let mut packet = Packet::new(Header::new(0), Fields::empty());
        packet.header.source = 1;
        packet.header.sequence = 1;
        packet.set_target(None);

        let expected = concat!(
            "001001000000000000000000001011001000000000000000000000000000000000",
            "000000000000000000000000000000000000000000000000000000000000000000",
            "000000000000000000000000000000000000000000001100000010000000000000",
            "000000000000000000000000000000000000000000000000000000000000000000",
            "000000000000000000000000",
        );
        assert_eq!(to_bit_string(&packet.pack().unwrap()), expected);
    }

    #[test]
    fn test_field_bits_for_one_byte_blob() {
        let fields = Fields::new([Field::new("one", FieldType::bytes(16))]).unwrap();
        let mut packet = Packet::new(Header::new(52), fields);
        packet.header.source = 1;
        packet.header.sequence = 1;
        packet.set_target(None);
        packet.set("one", vec![0u8]).unwrap();

        assert_eq!(packet.size(), 38);
        let bits = to_bit_string(&packet.pack().unwrap());
        assert_eq!(&bits[0..16], "0110010000000000"); // size 38
        assert_eq!(&bits[16..28], "000000000010"); // protocol
        assert_eq!(&bits[28..29], "1"); // addressable
        assert_eq!(&bits[29..30], "1"); // tagged
        assert_eq!(&bits[32..64], "10000000000000000000000000000000"); // source
        assert_eq!(&bits[64..128], "0".repeat(64)); // target
        assert_eq!(&bits[176..178], "11"); // res_required, ack_required
        assert_eq!(&bits[184..192], "10000000"); // sequence
        assert_eq!(&bits[256..272], "0010110000000000"); // pkt_type
        assert_eq!(&bits[288..304], "0000000000000000"); // one
    }

    #[test]
    fn test_set_checks_fit() {
        let mut packet = Packet::new(Header::new(2), label_fields());
        assert!(packet.set("thing", "x".repeat(33)).is_err());
        assert!(packet.set("missing", 1u8).is_err());
        assert!(packet.set("thing", 5u8).is_err());
        packet.set("thing", "x".repeat(32)).unwrap();
    }

    #[test]
    fn test_roundtrip() {
        let mut packet = Packet::new(Header::new(24), label_fields())
            .with("thing", "hello")
            .unwrap();
        packet.header.source = 77;
        packet.header.sequence = 3;
        packet.set_target("d073d5000001".parse::<Target>().unwrap());

        let bytes = packet.pack().unwrap();
        let decoded = Packet::unpack(&bytes, packet.fields()).unwrap();
        assert_eq!(decoded.header.size(), 68);
        assert_eq!(decoded.header.source, 77);
        assert!(!decoded.header.tagged());
        assert_eq!(decoded.serial().as_deref(), Some("d073d5000001"));
        assert_eq!(decoded.values(), packet.values());
    }

    #[test]
    fn test_unpack_payload_too_short_for_layout() {
        let header_only = Packet::new(Header::new(24), Fields::empty());
        let bytes = header_only.pack().unwrap();
        let err = Packet::unpack(&bytes, &label_fields()).unwrap_err();
        assert!(matches!(err, PhotonsError::Truncated { needed: 68, got: 36 }));
    }

    #[test]
    fn test_trailing_bytes() {
        let packet = Packet::new(Header::new(2), Fields::empty());
        let mut bytes = packet.pack().unwrap().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);

        assert!(Packet::unpack(&bytes, &Fields::empty()).is_ok());

        let strict = UnpackOptions::default().with_allow_trailing_bytes(false);
        assert!(Packet::unpack_with(&bytes, &Fields::empty(), &strict).is_err());
    }

    #[test]
    fn test_max_packet_size() {
        let packet = Packet::new(Header::new(2), label_fields());
        let bytes = packet.pack().unwrap();
        let options = UnpackOptions::default().with_max_packet_size(40);
        let err = Packet::unpack_with(&bytes, &label_fields(), &options).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_as_json() {
        let mut packet = Packet::new(Header::new(25), label_fields())
            .with("thing", "kitchen")
            .unwrap();
        packet.set_target("d073d5000001".parse::<Target>().unwrap());

        let json = packet.as_json();
        assert_eq!(json["pkt_type"], 25);
        assert_eq!(json["serial"], "d073d5000001");
        assert_eq!(json["payload"]["thing"], "kitchen");
    }
}
