//! # Pylon NAT
//!
//! UDP-facing NAT traversal servers:
//!
//! - [`stun::respond`] / [`stun::StunServer`] - stateless binding-request
//!   responder reporting the sender's observed address
//! - [`turn::TurnAllocator`] / [`turn::TurnServer`] - relay allocation
//!   manager with permission sets, renewable lifetimes and port reclamation
//!
//! Both speak the wire format from `pylon-proto`. Malformed datagrams are
//! dropped without a reply and without touching any state.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod stun;
pub mod turn;

pub use error::NatError;
pub use stun::StunServer;
pub use turn::{Allocation, TurnAllocator, TurnConfig, TurnServer};
