//! Error types for the NAT traversal servers.

use thiserror::Error;

/// Server-level errors. Per-datagram protocol violations are not errors at
/// this level - they drop the datagram and the loop continues.
#[derive(Debug, Error)]
pub enum NatError {
    /// Socket I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire format violation
    #[error("wire format error: {0}")]
    Proto(#[from] pylon_proto::ProtoError),
}
