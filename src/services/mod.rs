//! Built-in services.

pub mod heartbeat;

pub use heartbeat::{Heartbeat, HeartbeatSettings};
