//! Message registry for classifying packets by packet type.
//!
//! [`message`] declares a payload schema and returns a builder; the builder
//! names it to produce a [`MessageType`]. [`Messages`] maps
//! `(protocol, pkt_type)` to message types and decodes inbound bytes.
//!
//! # Example
//!
//! ```
//! use photons_protocol::codec::{Field, FieldType};
//! use photons_protocol::messages::{message, Messages};
//!
//! let set_label = message(24, [Field::new("label", FieldType::string(32 * 8))]).unwrap();
//! let state_label = set_label.using(25);
//!
//! let messages = Messages::new()
//!     .with(set_label.build("SetLabel"))
//!     .unwrap()
//!     .with(state_label.build("StateLabel"))
//!     .unwrap();
//!
//! let packet = messages.by_name("StateLabel").unwrap().create();
//! let bytes = packet.pack().unwrap();
//! let decoded = messages.unpack(&bytes).unwrap();
//! assert_eq!(decoded.pkt_type(), 25);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::{Field, Fields};
use crate::config::UnpackOptions;
use crate::error::{PhotonsError, Result};
use crate::multi::ResponsePolicy;
use crate::protocol::{is_header_field, Header, Packet, ACK_PKT_TYPE, PROTOCOL_NUMBER};

/// Declare a payload schema for `pkt_type`.
///
/// # Errors
///
/// Returns a schema error if a field is invalid, a name repeats or shadows
/// a header field, or the payload is not a whole number of bytes.
pub fn message(pkt_type: u16, fields: impl IntoIterator<Item = Field>) -> Result<MessageBuilder> {
    let fields = Fields::new(fields)?;
    if let Some(field) = fields.iter().find(|f| is_header_field(f.name())) {
        return Err(PhotonsError::Schema(format!(
            "Payload field {:?} shadows a header field",
            field.name()
        )));
    }
    if fields.width() % 8 != 0 {
        return Err(PhotonsError::Schema(format!(
            "Payload for packet type {} is {} bits, not a whole number of bytes",
            pkt_type,
            fields.width()
        )));
    }
    Ok(MessageBuilder {
        pkt_type,
        fields,
        multi: None,
    })
}

/// A declared but unnamed message schema.
#[derive(Clone)]
pub struct MessageBuilder {
    pkt_type: u16,
    fields: Fields,
    multi: Option<Arc<dyn ResponsePolicy>>,
}

impl MessageBuilder {
    /// Attach a response policy, stored unchanged on built types.
    pub fn with_multi(mut self, policy: impl ResponsePolicy + 'static) -> Self {
        self.multi = Some(Arc::new(policy));
        self
    }

    /// Same field list under another packet type.
    ///
    /// The response policy is not carried over.
    pub fn using(&self, pkt_type: u16) -> MessageBuilder {
        MessageBuilder {
            pkt_type,
            fields: self.fields.clone(),
            multi: None,
        }
    }

    /// Declared packet type.
    #[inline]
    pub fn pkt_type(&self) -> u16 {
        self.pkt_type
    }

    /// Declared payload fields.
    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Check if this declares the acknowledgement.
    #[inline]
    pub fn represents_ack(&self) -> bool {
        self.pkt_type == ACK_PKT_TYPE
    }

    /// Name the schema, producing a message type.
    ///
    /// Each call yields a distinct type sharing this field list.
    pub fn build(&self, name: &str) -> MessageType {
        MessageType(Arc::new(MessageInfo {
            name: name.to_string(),
            payload_name: format!("{name}Payload"),
            pkt_type: self.pkt_type,
            protocol: PROTOCOL_NUMBER,
            fields: self.fields.clone(),
            multi: self.multi.clone(),
        }))
    }
}

impl fmt::Debug for MessageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuilder")
            .field("pkt_type", &self.pkt_type)
            .field("fields", &self.fields)
            .field("multi", &self.multi.is_some())
            .finish()
    }
}

struct MessageInfo {
    name: String,
    payload_name: String,
    pkt_type: u16,
    protocol: u16,
    fields: Fields,
    multi: Option<Arc<dyn ResponsePolicy>>,
}

/// A named message type: header plus one payload schema.
///
/// Cheap to clone. Two message types are equal only if they came from the
/// same [`MessageBuilder::build`] call.
#[derive(Clone)]
pub struct MessageType(Arc<MessageInfo>);

impl MessageType {
    /// Message name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Name of the payload schema (`"{name}Payload"`).
    #[inline]
    pub fn payload_name(&self) -> &str {
        &self.0.payload_name
    }

    /// Packet type.
    #[inline]
    pub fn pkt_type(&self) -> u16 {
        self.0.pkt_type
    }

    /// Protocol number.
    #[inline]
    pub fn protocol(&self) -> u16 {
        self.0.protocol
    }

    /// Payload fields.
    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.0.fields
    }

    /// Check if this is the acknowledgement type.
    #[inline]
    pub fn represents_ack(&self) -> bool {
        self.0.pkt_type == ACK_PKT_TYPE
    }

    /// Response policy given at declaration, if any.
    pub fn multi(&self) -> Option<&Arc<dyn ResponsePolicy>> {
        self.0.multi.as_ref()
    }

    /// A packet of this type with default header and payload.
    pub fn create(&self) -> Packet {
        let mut header = Header::new(self.0.pkt_type);
        header.protocol = self.0.protocol;
        Packet::new(header, self.0.fields.clone())
    }

    /// Decode bytes that must be of this type.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the header names another type.
    pub fn unpack(&self, buf: &[u8]) -> Result<Packet> {
        let header = Header::unpack(buf)?;
        if !header.matches(self) {
            return Err(PhotonsError::Decode(format!(
                "expected {} ({}), got packet type {}",
                self.name(),
                self.pkt_type(),
                header.pkt_type
            )));
        }
        Packet::from_header(header, buf, self.fields(), &UnpackOptions::default())
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for MessageType {}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageType")
            .field("name", &self.0.name)
            .field("pkt_type", &self.0.pkt_type)
            .field("protocol", &self.0.protocol)
            .finish()
    }
}

impl Header {
    /// Check whether this header identifies `kind`.
    ///
    /// Compares the stored protocol and packet type only.
    #[inline]
    pub fn matches(&self, kind: &MessageType) -> bool {
        self.is(kind.protocol(), kind.pkt_type())
    }
}

impl Packet {
    /// Check whether this packet identifies `kind`.
    #[inline]
    pub fn matches(&self, kind: &MessageType) -> bool {
        self.header.matches(kind)
    }
}

/// Collection of message types keyed by `(protocol, pkt_type)`.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    by_type: HashMap<(u16, u16), MessageType>,
    by_name: HashMap<String, MessageType>,
}

impl Messages {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type.
    ///
    /// A second type with the same key and the same field list is an alias:
    /// the first stays the type used for decoding.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the key is taken by a different field list
    /// or the name by a different type.
    pub fn register(&mut self, kind: MessageType) -> Result<()> {
        if let Some(existing) = self.by_name.get(kind.name()) {
            if *existing != kind {
                return Err(PhotonsError::Schema(format!(
                    "Message name {:?} is already registered",
                    kind.name()
                )));
            }
            return Ok(());
        }

        let key = (kind.protocol(), kind.pkt_type());
        match self.by_type.get(&key) {
            Some(existing) if existing.fields() != kind.fields() => {
                return Err(PhotonsError::Schema(format!(
                    "Packet type {} is declared by both {} and {} with different fields",
                    kind.pkt_type(),
                    existing.name(),
                    kind.name()
                )));
            }
            Some(_) => {}
            None => {
                self.by_type.insert(key, kind.clone());
            }
        }
        self.by_name.insert(kind.name().to_string(), kind);
        Ok(())
    }

    /// Builder-style [`Messages::register`].
    pub fn with(mut self, kind: MessageType) -> Result<Self> {
        self.register(kind)?;
        Ok(self)
    }

    /// Register every type of `other`.
    ///
    /// The types `other` decodes with are registered before its aliases, so
    /// they stay the decoding types here too.
    pub fn extend(&mut self, other: &Messages) -> Result<()> {
        let mut canonical: Vec<&MessageType> = other.by_type.values().collect();
        canonical.sort_by_key(|kind| (kind.protocol(), kind.pkt_type()));
        for kind in canonical {
            self.register(kind.clone())?;
        }

        let mut aliases: Vec<&MessageType> = other
            .by_name
            .values()
            .filter(|kind| other.classify_kind(kind) != Some(*kind))
            .collect();
        aliases.sort_by_key(|kind| (kind.pkt_type(), kind.name().to_string()));
        for kind in aliases {
            self.register(kind.clone())?;
        }
        Ok(())
    }

    fn classify_kind(&self, kind: &MessageType) -> Option<&MessageType> {
        self.get(kind.protocol(), kind.pkt_type())
    }

    /// Look up a type of this protocol by packet type.
    pub fn by_type(&self, pkt_type: u16) -> Option<&MessageType> {
        self.get(PROTOCOL_NUMBER, pkt_type)
    }

    /// Look up by protocol and packet type.
    pub fn get(&self, protocol: u16, pkt_type: u16) -> Option<&MessageType> {
        self.by_type.get(&(protocol, pkt_type))
    }

    /// Look up by name, aliases included.
    pub fn by_name(&self, name: &str) -> Option<&MessageType> {
        self.by_name.get(name)
    }

    /// Name registered for `pkt_type`.
    pub fn name_of(&self, pkt_type: u16) -> Option<&str> {
        self.by_type(pkt_type).map(MessageType::name)
    }

    /// Message type a decoded header refers to.
    pub fn classify(&self, header: &Header) -> Option<&MessageType> {
        self.get(header.protocol, header.pkt_type)
    }

    /// Decode bytes using the registered schema for their packet type.
    pub fn unpack(&self, buf: &[u8]) -> Result<Packet> {
        self.unpack_with(buf, &UnpackOptions::default())
    }

    /// Decode bytes with explicit options.
    ///
    /// # Errors
    ///
    /// Returns a decode error for short buffers, a foreign protocol number
    /// in strict mode, or an unregistered packet type.
    pub fn unpack_with(&self, buf: &[u8], options: &UnpackOptions) -> Result<Packet> {
        let header = Header::unpack(buf)?;
        if options.strict_protocol && header.protocol != PROTOCOL_NUMBER {
            return Err(PhotonsError::Decode(format!(
                "unsupported protocol {}",
                header.protocol
            )));
        }

        let kind = match self.classify(&header) {
            Some(kind) => kind,
            None => {
                tracing::debug!(
                    "Unknown packet type {} for protocol {}",
                    header.pkt_type,
                    header.protocol
                );
                return Err(PhotonsError::UnknownMessage {
                    protocol: header.protocol,
                    pkt_type: header.pkt_type,
                });
            }
        };
        Packet::from_header(header, buf, kind.fields(), options)
    }

    /// JSON form of `packet`, with its registered name when known.
    pub fn as_json(&self, packet: &Packet) -> serde_json::Value {
        let mut json = packet.as_json();
        if let (Some(name), Some(map)) = (
            self.classify(&packet.header).map(MessageType::name),
            json.as_object_mut(),
        ) {
            map.insert("pkt_name".to_string(), serde_json::Value::from(name));
        }
        json
    }

    /// Number of distinct packet types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Registered types, one per packet type.
    pub fn iter(&self) -> impl Iterator<Item = &MessageType> {
        self.by_type.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldType;
    use crate::protocol::Target;

    fn one() -> MessageBuilder {
        message(42, [Field::new("one", FieldType::int8())]).unwrap()
    }

    #[test]
    fn test_message_builder() {
        let kind = one().build("One");
        assert_eq!(kind.name(), "One");
        assert_eq!(kind.payload_name(), "OnePayload");
        assert_eq!(kind.pkt_type(), 42);
        assert_eq!(kind.protocol(), 1024);
        assert!(!kind.represents_ack());
        assert_eq!(kind.create().size(), 37);
    }

    #[test]
    fn test_build_twice_gives_distinct_types() {
        let builder = one();
        let a = builder.build("A");
        let b = builder.build("B");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.fields(), b.fields());
    }

    #[test]
    fn test_using() {
        let builder = one();
        let two = builder.using(46).build("Two");
        assert_eq!(two.pkt_type(), 46);
        assert_eq!(two.fields(), builder.fields());
        assert!(!two.represents_ack());
        assert!(builder.using(45).represents_ack());
    }

    #[test]
    fn test_message_rejects_bad_payload() {
        let shadow = message(1, [Field::new("source", FieldType::uint32())]);
        assert!(matches!(shadow.unwrap_err(), PhotonsError::Schema(_)));

        let unaligned = message(1, [Field::new("x", FieldType::Uint { bits: 3 })]);
        assert!(matches!(unaligned.unwrap_err(), PhotonsError::Schema(_)));
    }

    #[test]
    fn test_register_alias_and_collision() {
        let builder = one();
        let mut messages = Messages::new();
        messages.register(builder.build("One")).unwrap();
        messages.register(builder.build("Uno")).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages.name_of(42), Some("One"));
        assert!(messages.by_name("Uno").is_some());

        let other = message(42, [Field::new("two", FieldType::uint16())])
            .unwrap()
            .build("Other");
        assert!(matches!(
            messages.register(other).unwrap_err(),
            PhotonsError::Schema(_)
        ));

        let renamed = message(7, []).unwrap().build("One");
        assert!(messages.register(renamed).is_err());
    }

    #[test]
    fn test_matches_reads_stored_values() {
        let one = message(32, []).unwrap().build("One");
        let two = message(33, []).unwrap().build("Two");

        let packet = one.create();
        assert!(packet.matches(&one));
        assert!(!packet.matches(&two));

        let mut header = Header::new(0);
        header.pkt_type = 33;
        assert!(header.matches(&two));
        header.protocol = 1025;
        assert!(!header.matches(&two));
    }

    #[test]
    fn test_unpack_through_registry() {
        let builder = one();
        let messages = Messages::new()
            .with(builder.build("One"))
            .unwrap()
            .with(builder.using(46).build("Two"))
            .unwrap();

        let mut packet = messages.by_type(46).unwrap().create();
        packet.set("one", -5i8).unwrap();
        packet.set_target("d073d5000001".parse::<Target>().unwrap());
        let bytes = packet.pack().unwrap();

        let decoded = messages.unpack(&bytes).unwrap();
        assert!(decoded.matches(messages.by_type(46).unwrap()));
        assert_eq!(decoded.get("one").and_then(|v| v.as_i64()), Some(-5));

        let json = messages.as_json(&decoded);
        assert_eq!(json["pkt_name"], "Two");
        assert_eq!(json["payload"]["one"], -5);
    }

    #[test]
    fn test_unpack_unknown_type() {
        let messages = Messages::new().with(one().build("One")).unwrap();
        let bytes = message(99, []).unwrap().build("X").create().pack().unwrap();
        let err = messages.unpack(&bytes).unwrap_err();
        assert!(matches!(
            err,
            PhotonsError::UnknownMessage {
                protocol: 1024,
                pkt_type: 99
            }
        ));
        assert!(err.is_decode());
    }

    #[test]
    fn test_unpack_foreign_protocol() {
        let kind = one().build("One");
        let messages = Messages::new().with(kind.clone()).unwrap();
        let mut packet = kind.create();
        packet.header.protocol = 1023;
        let bytes = packet.pack().unwrap();

        assert!(matches!(
            messages.unpack(&bytes).unwrap_err(),
            PhotonsError::Decode(_)
        ));
        let lenient = UnpackOptions::default().with_strict_protocol(false);
        assert!(matches!(
            messages.unpack_with(&bytes, &lenient).unwrap_err(),
            PhotonsError::UnknownMessage { .. }
        ));
    }

    #[test]
    fn test_message_type_unpack_checks_type() {
        let one = one().build("One");
        let other = message(43, []).unwrap().build("Other");
        let bytes = other.create().pack().unwrap();
        assert!(one.unpack(&bytes).is_err());
        assert!(other.unpack(&bytes).is_ok());
    }

    #[test]
    fn test_extend_keeps_decoding_type() {
        let builder = one();
        let source = Messages::new()
            .with(builder.build("Uno"))
            .unwrap()
            .with(builder.build("One"))
            .unwrap();
        assert_eq!(source.name_of(42), Some("Uno"));

        let mut merged = Messages::new();
        merged.extend(&source).unwrap();
        assert_eq!(merged.name_of(42), Some("Uno"));
        assert_eq!(merged.by_type(42), source.by_type(42));
        assert!(merged.by_name("One").is_some());
    }

    #[test]
    fn test_extend() {
        let mut first = Messages::new().with(one().build("One")).unwrap();
        let second = Messages::new()
            .with(message(50, []).unwrap().build("Fifty"))
            .unwrap();
        first.extend(&second).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.name_of(50), Some("Fifty"));
    }
}
