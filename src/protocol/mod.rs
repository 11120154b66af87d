//! Protocol module - header wire format, packing and packets.
//!
//! This module implements the binary packet layout:
//! - 36-byte header encoding/decoding with derived fields
//! - Field packing engine shared by header and payload
//! - Packet struct with named payload accessors

pub mod packing;

mod frame;
mod wire_format;

pub use frame::Packet;
pub use wire_format::{
    header_fields, is_header_field, Header, Target, ACK_PKT_TYPE, HEADER_SIZE, PROTOCOL_NUMBER,
    SERIAL_SIZE, TARGET_SIZE,
};
