//! Reconnect cache for the live-chat engine.
//!
//! Keeps a bounded record of each session's chat lines and acknowledgement
//! point so an interrupted chat can ask the server to replay what was
//! missed.  Snapshots live in memory and, when a state directory is
//! configured, are written through to disk by a background task so they
//! survive a process restart.

pub mod expiry;
pub mod persist;
pub mod snapshot;
pub mod store;

pub use expiry::{EvictReason, ExpiryPolicy};
pub use snapshot::{CachedMessage, Direction, ReplaySnapshot};
pub use store::ReplayCache;
