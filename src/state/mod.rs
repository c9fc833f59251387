//! State Management Module
//!
//! Holds the election state of a node.

pub mod election;

pub use election::{on_message, Decision, ElectionState, ElectionTracker, Verdict};
