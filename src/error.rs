//! Error types for photons-protocol.

use thiserror::Error;

/// Main error type for all codec, registry and correlation operations.
#[derive(Debug, Error)]
pub enum PhotonsError {
    /// Invalid schema (bad width, duplicate name, conflicting packet type).
    ///
    /// Raised while building field lists and registries at startup.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A value does not fit the field it is assigned to.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Malformed inbound bytes.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Buffer shorter than the header or than its declared size.
    #[error("Packet truncated: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },

    /// No registered message for the decoded protocol and packet type.
    #[error("Unknown message: protocol {protocol}, pkt_type {pkt_type}")]
    UnknownMessage {
        /// Protocol number from the header.
        protocol: u16,
        /// Packet type from the header.
        pkt_type: u16,
    },
}

impl PhotonsError {
    /// True for errors caused by inbound bytes.
    ///
    /// The transport drops such datagrams instead of failing.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            PhotonsError::Decode(_)
                | PhotonsError::Truncated { .. }
                | PhotonsError::UnknownMessage { .. }
        )
    }
}

/// Result type alias using PhotonsError.
pub type Result<T> = std::result::Result<T, PhotonsError>;
