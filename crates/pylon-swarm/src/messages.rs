//! Signaling message catalogue.
//!
//! JSON messages tagged by a `type` field, kebab-case on the wire.
//! Client frames are schema-validated before dispatch: a frame that is
//! valid JSON but not a valid [`ClientMessage`] earns an `error` reply
//! rather than a connection drop.

use crate::types::{FileInfo, FileSummary, PeerId, now_millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join (or lazily create) a room
    JoinRoom {
        /// Room identifier
        room: String,
    },
    /// Leave a room
    LeaveRoom {
        /// Room identifier
        room: String,
    },
    /// WebRTC offer relayed verbatim to `target`
    Offer {
        /// Destination peer id
        target: PeerId,
        /// Opaque SDP payload
        sdp: serde_json::Value,
    },
    /// WebRTC answer relayed verbatim to `target`
    Answer {
        /// Destination peer id
        target: PeerId,
        /// Opaque SDP payload
        sdp: serde_json::Value,
    },
    /// ICE candidate relayed verbatim to `target`
    IceCandidate {
        /// Destination peer id
        target: PeerId,
        /// Opaque candidate payload
        candidate: serde_json::Value,
    },
    /// Announce a shareable file to a room
    AnnounceFile {
        /// Room identifier
        room: String,
        /// Parsed `{name, size, hash}` triple from the metadata parser
        file: FileInfo,
    },
    /// Ask the room's seeders for a file
    RequestFile {
        /// Room identifier
        room: String,
        /// Content fingerprint
        hash: String,
    },
    /// Merge metadata into this peer's record
    PeerMetadata {
        /// Free-form key/value pairs, capped server-side
        metadata: HashMap<String, String>,
    },
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First message on every connection
    Welcome {
        /// Peer id assigned to this connection
        peer_id: PeerId,
        /// Unix millis
        timestamp: u64,
    },
    /// Reply to `join-room`: who and what is already there
    RoomState {
        /// Room identifier
        room: String,
        /// Current members, the joiner excluded
        peers: Vec<PeerId>,
        /// Files currently announced
        files: Vec<FileSummary>,
        /// Unix millis
        timestamp: u64,
    },
    /// Broadcast to existing members when someone joins
    PeerJoined {
        /// Room identifier
        room: String,
        /// The new member
        peer: PeerId,
        /// Unix millis
        timestamp: u64,
    },
    /// Broadcast to remaining members when someone leaves
    PeerLeft {
        /// Room identifier
        room: String,
        /// The departed member
        peer: PeerId,
        /// Unix millis
        timestamp: u64,
    },
    /// Relayed WebRTC offer
    Offer {
        /// Originating peer id
        from: PeerId,
        /// Opaque SDP payload
        sdp: serde_json::Value,
        /// Unix millis
        timestamp: u64,
    },
    /// Relayed WebRTC answer
    Answer {
        /// Originating peer id
        from: PeerId,
        /// Opaque SDP payload
        sdp: serde_json::Value,
        /// Unix millis
        timestamp: u64,
    },
    /// Relayed ICE candidate
    IceCandidate {
        /// Originating peer id
        from: PeerId,
        /// Opaque candidate payload
        candidate: serde_json::Value,
        /// Unix millis
        timestamp: u64,
    },
    /// Broadcast to the room (announcer excluded) after `announce-file`
    FileAnnounced {
        /// Room identifier
        room: String,
        /// The announced file
        file: FileSummary,
        /// Announcing peer
        from: PeerId,
        /// Unix millis
        timestamp: u64,
    },
    /// Sent to each seeder after `request-file`
    FileRequested {
        /// Room identifier
        room: String,
        /// Content fingerprint
        hash: String,
        /// Requesting peer
        from: PeerId,
        /// Unix millis
        timestamp: u64,
    },
    /// Structured error; the connection stays open
    Error {
        /// Stable machine-readable cause
        code: String,
        /// Human-readable description
        message: String,
        /// Unix millis
        timestamp: u64,
    },
}

impl ServerMessage {
    /// Error reply naming its cause.
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    /// Serialize for the wire. Serialization of these types cannot fail.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
