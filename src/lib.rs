//! RingElect - Ring-Based Leader Election
//!
//! Each node process sits in a unidirectional logical ring: it accepts one
//! inbound connection from its upstream peer and keeps one outbound
//! connection to its configured neighbor. Nodes pass identity tokens around
//! the ring until the node with the largest identity sees its own token
//! return, declares itself leader, and announces it to the ring.
//!
//! # Architecture
//!
//! - [`id`]: random 128-bit node identities, totally ordered
//! - [`protocol`]: newline-delimited JSON records carrying a token and flag
//! - [`network`]: inbound listener, outbound connector and stream codec
//! - [`state`]: the election state machine
//! - [`node`]: the orchestrator running the two legs of a node

pub mod config;
pub mod error;
pub mod id;
pub mod protocol;
pub mod network;
pub mod state;
pub mod node;

#[cfg(test)]
mod testing;

pub use config::RingConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RingConfig;
    pub use crate::error::{Error, Result};
    pub use crate::id::NodeId;
    pub use crate::node::{NodeHandle, NodePhase, RingNode};
    pub use crate::protocol::Message;
    pub use crate::state::{ElectionState, ElectionTracker};
}
