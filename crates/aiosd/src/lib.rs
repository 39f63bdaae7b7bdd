//! aiosd - AI-OS agent daemon
//!
//! Accepts chat, action, status and clear requests over a local socket,
//! answers chat through a remote language model or the local keyword
//! fallback, and turns the resulting intents into HAL calls.

pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod fallback;
pub mod handler;
pub mod logging;
pub mod prompts;
pub mod provider;
pub mod server;
pub mod state;

pub use config::{AgentConfig, ProviderKind};
pub use server::Listener;
pub use state::AgentState;
