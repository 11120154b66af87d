//! # photons-protocol
//!
//! Packet codec and response correlation for the LAN smart-light protocol.
//!
//! Every packet is a fixed 36-byte header followed by a payload whose layout
//! is chosen by the header's `pkt_type`. This crate packs and unpacks those
//! packets bit-exactly, maps packet types to payload schemas, and decides
//! when a request has received all of its replies.
//!
//! ## Architecture
//!
//! - **Codec**: bit-level field types (`codec`)
//! - **Protocol**: header layout, packing engine, packets (`protocol`)
//! - **Messages**: schema declaration, registry, known messages (`messages`)
//! - **Multi**: response-counting policies and per-request tracking (`multi`)
//!
//! Sockets, retries and discovery live in the transport that uses this crate.
//!
//! ## Example
//!
//! ```
//! use photons_protocol::messages::Catalog;
//! use photons_protocol::multi::ResponseTracker;
//!
//! let catalog = Catalog::load().unwrap();
//! let messages = catalog.all();
//!
//! let get_label = messages.by_name("GetLabel").unwrap();
//! let mut request = get_label.create();
//! request.header.source = 1;
//! request.header.sequence = 1;
//! request.set_target(None);
//! let bytes = request.pack().unwrap();
//! assert_eq!(bytes.len(), 36);
//!
//! let state = messages.by_name("StateLabel").unwrap();
//! let reply = state.create().with("label", "kitchen").unwrap();
//! let decoded = messages.unpack(&reply.pack().unwrap()).unwrap();
//!
//! let mut tracker = ResponseTracker::new(request, get_label);
//! assert!(tracker.accepts(messages.classify(&decoded.header).unwrap()));
//! tracker.record(decoded);
//! assert!(tracker.is_complete());
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod messages;
pub mod multi;
pub mod protocol;

pub use config::UnpackOptions;
pub use error::{PhotonsError, Result};
pub use messages::{message, Catalog, MessageType, Messages};
pub use protocol::{Header, Packet, Target};
