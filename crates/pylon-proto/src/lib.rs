//! # Pylon Proto
//!
//! Shared binary wire format for the pylon STUN responder and TURN
//! allocator (RFC 5389 / RFC 5766 framing).
//!
//! A message is a 20-byte header (type, body length, magic cookie,
//! 96-bit transaction id) followed by a list of TLV attributes, each
//! padded to a 4-byte boundary. Both servers decode one datagram into a
//! [`Message`], act on it, and encode a reply that echoes the request's
//! transaction id; nothing here is persisted.
//!
//! ## Example
//!
//! ```rust
//! use pylon_proto::{Attribute, MessageClass, Method, Message};
//!
//! let request = Message::request(Method::Binding);
//! let bytes = request.encode();
//! let decoded = Message::decode(&bytes).unwrap();
//! assert_eq!(decoded.transaction_id, request.transaction_id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod message;

pub use error::ProtoError;
pub use message::{
    Attribute, HEADER_SIZE, MAGIC_COOKIE, Message, MessageClass, Method, TransactionId,
};
