//! Error types for the pylon wire format.

use thiserror::Error;

/// Decode errors. Any of these means the datagram is dropped without a
/// response; none of them carry state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    /// Datagram shorter than the fixed 20-byte header
    #[error("datagram too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Minimum size required
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Magic cookie field did not match 0x2112A442
    #[error("invalid magic cookie: 0x{0:08X}")]
    BadMagicCookie(u32),

    /// Declared body length does not equal the bytes that follow the header
    #[error("body length mismatch: header declares {declared}, {actual} bytes follow")]
    LengthMismatch {
        /// Length field from the header
        declared: usize,
        /// Bytes actually present after the header
        actual: usize,
    },

    /// An attribute header claims more bytes than remain in the buffer
    #[error("attribute 0x{attr_type:04X} overruns buffer: claims {claimed}, {remaining} remain")]
    AttributeOverrun {
        /// Attribute type code
        attr_type: u16,
        /// Length the attribute header declared
        claimed: usize,
        /// Bytes left in the datagram
        remaining: usize,
    },

    /// Unknown method bits in the message type
    #[error("unknown method: 0x{0:03X}")]
    UnknownMethod(u16),

    /// Attribute value malformed for its declared type
    #[error("malformed attribute 0x{0:04X}")]
    MalformedAttribute(u16),
}
