//! IPC protocol definitions for the AI-OS agent
//!
//! Requests are tagged by `cmd`, responses carry `status`. Each message
//! travels as one frame (see [`crate::frame`]).

use crate::hal::SystemInfo;
use crate::intent::{ActionIntent, ActionResult};
use serde::{Deserialize, Serialize};

/// Request from a client to the agent daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Request {
    /// Natural-language turn
    Chat { text: String },

    /// Structured action, bypassing language generation
    Action {
        #[serde(alias = "intent")]
        action: serde_json::Value,
    },

    /// Daemon and system snapshot
    Status,

    /// Drop the shared conversation history
    Clear,
}

impl Request {
    pub fn chat(text: impl Into<String>) -> Self {
        Request::Chat { text: text.into() }
    }

    pub fn action(intent: &ActionIntent) -> Self {
        Request::Action {
            action: serde_json::json!({ "name": intent.name, "params": intent.params }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Chat { .. } => "chat",
            Request::Action { .. } => "action",
            Request::Status => "status",
            Request::Clear => "clear",
        }
    }
}

/// Top-level response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Response to `chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: ResponseStatus,
    /// Assistant reply text
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionResult>,
}

/// Response to `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: ResponseStatus,
    pub result: ActionResult,
}

/// System snapshot reported by `status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub hostname: String,
    pub kernel: String,
    pub memory_mb: u64,
    pub memory_free_mb: u64,
    pub uptime_hours: u64,
}

impl From<&SystemInfo> for SystemSnapshot {
    fn from(info: &SystemInfo) -> Self {
        Self {
            hostname: info.hostname.clone(),
            kernel: info.kernel.clone(),
            memory_mb: info.memory_total_kb / 1024,
            memory_free_mb: info.memory_free_kb / 1024,
            uptime_hours: info.uptime_seconds / 3600,
        }
    }
}

/// Response to `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ResponseStatus,
    pub running: bool,
    pub ai_configured: bool,
    pub provider: String,
    pub model: String,
    pub history_len: usize,
    pub uptime_secs: u64,
    pub version: String,
    /// Absent when the hardware layer could not produce a snapshot
    pub system: Option<SystemSnapshot>,
}

/// Server-side failure that is not a protocol violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: ResponseStatus,
    pub message: String,
}

/// Bare acknowledgement (`clear`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: ResponseStatus,
}

/// Any response the agent can send.
///
/// Untagged on the wire; variant order matters for decoding because
/// `Ack` matches every object with a `status` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Chat(ChatResponse),
    Action(ActionResponse),
    Status(StatusResponse),
    Error(ErrorResponse),
    Ack(AckResponse),
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack(AckResponse {
            status: ResponseStatus::Ok,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            status: ResponseStatus::Error,
            message: message.into(),
        })
    }

    pub fn chat(response: impl Into<String>, action_result: Option<ActionResult>) -> Self {
        Response::Chat(ChatResponse {
            status: ResponseStatus::Ok,
            response: response.into(),
            action_result,
        })
    }

    pub fn action(result: ActionResult) -> Self {
        Response::Action(ActionResponse {
            status: ResponseStatus::Ok,
            result,
        })
    }

    pub fn status(&self) -> ResponseStatus {
        match self {
            Response::Chat(r) => r.status,
            Response::Action(r) => r.status,
            Response::Status(r) => r.status,
            Response::Error(r) => r.status,
            Response::Ack(r) => r.status,
        }
    }
}
