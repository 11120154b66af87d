//! Decode options.
//!
//! Surrounding components load these from their own configuration; the codec
//! only reads them.
//!
//! # Example
//!
//! ```
//! use photons_protocol::config::UnpackOptions;
//!
//! let options = UnpackOptions::default()
//!     .with_max_packet_size(512)
//!     .with_allow_trailing_bytes(false);
//! assert_eq!(options.max_packet_size, 512);
//! assert!(options.strict_protocol);
//! ```

use serde::{Deserialize, Serialize};

/// Default maximum accepted packet size in bytes.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024;

/// Options applied when decoding inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackOptions {
    /// Largest declared `size` accepted (default: 1024).
    pub max_packet_size: usize,
    /// Ignore bytes past the declared `size` instead of rejecting them.
    pub allow_trailing_bytes: bool,
    /// Reject headers whose protocol number is not 1024.
    pub strict_protocol: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            allow_trailing_bytes: true,
            strict_protocol: true,
        }
    }
}

impl UnpackOptions {
    /// Set the maximum accepted packet size.
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    /// Set whether trailing bytes are ignored.
    pub fn with_allow_trailing_bytes(mut self, allow: bool) -> Self {
        self.allow_trailing_bytes = allow;
        self
    }

    /// Set whether non-1024 protocols are rejected.
    pub fn with_strict_protocol(mut self, strict: bool) -> Self {
        self.strict_protocol = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = UnpackOptions::default();
        assert_eq!(options.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
        assert!(options.allow_trailing_bytes);
        assert!(options.strict_protocol);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: UnpackOptions =
            serde_json::from_str(r#"{"allow_trailing_bytes": false}"#).unwrap();
        assert!(!options.allow_trailing_bytes);
        assert_eq!(options.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
    }
}
