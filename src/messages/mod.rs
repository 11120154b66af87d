//! Messages module - message types and the protocol catalogue.
//!
//! - [`message`] / [`MessageBuilder`] - declare payload schemas
//! - [`MessageType`] - a named schema bound to the header
//! - [`Messages`] - lookup by packet type, registry decode
//! - [`Catalog`] - the known protocol messages

mod catalog;
mod registry;

pub use catalog::{hsbk, Catalog, ColorZonesPolicy};
pub use registry::{message, MessageBuilder, MessageType, Messages};
