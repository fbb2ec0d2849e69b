//! # Pylon Swarm
//!
//! In-memory peer/room/file coordination shared by two front-ends:
//!
//! - [`signaling::SignalingGateway`] - persistent WebSocket protocol
//!   (join/leave rooms, WebRTC offer/answer/candidate relay, file
//!   announce/request)
//! - [`tracker::TrackerGateway`] - stateless HTTP announce protocol keyed
//!   by content fingerprint
//!
//! Both mutate a [`registry::SwarmRegistry`]; each gateway owns its own
//! instance so tests (and deployments) can isolate them. Nothing here
//! touches disk and nothing survives a restart - peers re-announce on
//! their own cadence.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod messages;
pub mod rate_limit;
pub mod registry;
pub mod signaling;
pub mod tracker;
mod types;

pub use error::SwarmError;
pub use registry::{RegistryConfig, SwarmRegistry};
pub use signaling::{SignalingConfig, SignalingGateway};
pub use tracker::{TrackerConfig, TrackerGateway};
pub use types::{FileInfo, FileSummary, PeerId, now_millis};
