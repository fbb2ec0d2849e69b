//! Error types for swarm coordination.

use thiserror::Error;

/// Registry and gateway errors. All of these map to a structured `error`
/// reply (signaling) or an HTTP failure (tracker); none of them tear down
/// shared state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwarmError {
    /// Group is at its configured member capacity
    #[error("group {group} is full ({capacity} members)")]
    GroupFull {
        /// Group identifier
        group: String,
        /// Configured capacity
        capacity: usize,
    },

    /// Named group does not exist
    #[error("unknown group: {0}")]
    UnknownGroup(String),

    /// Named peer does not exist
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Named file is not announced in the group
    #[error("unknown file: {0}")]
    UnknownFile(String),

    /// File fingerprint is not 64 hex characters
    #[error("invalid file hash: {0:?}")]
    InvalidFileHash(String),

    /// Peer is not a member of the group it is operating on
    #[error("peer {peer} is not a member of {group}")]
    NotAMember {
        /// Peer identifier
        peer: String,
        /// Group identifier
        group: String,
    },
}
