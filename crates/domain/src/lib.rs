//! Shared types for the live-chat engine crates.
//!
//! Holds the configuration tree, the common error type, structured trace
//! events, and the small value types (destinations, visitor events) that
//! every other crate passes around.

pub mod config;
pub mod destination;
pub mod error;
pub mod event;
pub mod trace;

pub use destination::Destination;
pub use event::{EventKind, EventRecord, VariableSet};
