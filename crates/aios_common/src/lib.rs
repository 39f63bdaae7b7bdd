//! AI-OS Common - shared protocol and hardware layer for the AI-OS daemons
//!
//! The agent daemon and its siblings (power, network, notify, input) speak
//! the same length-prefixed JSON framing and drive devices through the same
//! HAL capability trait.

pub mod client;
pub mod extract;
pub mod frame;
pub mod hal;
pub mod intent;
pub mod ipc;
pub mod paths;

pub use extract::extract_intent;
pub use intent::{ActionIntent, ActionResult};
pub use ipc::{Request, Response, ResponseStatus};

/// Crate version, reported by `status`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
