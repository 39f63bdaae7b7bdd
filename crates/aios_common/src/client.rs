//! Agent IPC client
//!
//! Used by the shell, CLI and voice front-ends, and by the daemon's own
//! integration tests. One client owns one connection and sends requests
//! strictly one at a time, matching the server's per-connection ordering.

use crate::frame::{self, AGENT_MAX_MESSAGE_SIZE};
use crate::intent::ActionIntent;
use crate::ipc::{ActionResponse, ChatResponse, Request, Response, StatusResponse};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// Default per-request timeout; chat may wait on a remote provider
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

pub struct AgentClient {
    stream: UnixStream,
    max_message_size: usize,
    timeout: Duration,
}

impl AgentClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to agent at {}. Is aiosd running?",
                    socket_path.display()
                )
            })?;
        Ok(Self {
            stream,
            max_message_size: AGENT_MAX_MESSAGE_SIZE,
            timeout: CLIENT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and wait for its response.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let max = self.max_message_size;
        let exchange = async {
            frame::write_json(&mut self.stream, request, max)
                .await
                .context("Failed to send request")?;
            let response = frame::read_json::<_, Response>(&mut self.stream, max)
                .await
                .context("Failed to read response")?
                .context("Agent closed the connection without responding")?;
            Ok::<_, anyhow::Error>(response)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .with_context(|| format!("{} request timed out", request.name()))?
    }

    pub async fn chat(&mut self, text: &str) -> Result<ChatResponse> {
        match self.request(&Request::chat(text)).await? {
            Response::Chat(resp) => Ok(resp),
            Response::Error(err) => bail!("Agent error: {}", err.message),
            other => bail!("Unexpected response to chat: {:?}", other),
        }
    }

    pub async fn action(&mut self, intent: &ActionIntent) -> Result<ActionResponse> {
        match self.request(&Request::action(intent)).await? {
            Response::Action(resp) => Ok(resp),
            Response::Error(err) => bail!("Agent error: {}", err.message),
            other => bail!("Unexpected response to action: {:?}", other),
        }
    }

    pub async fn status(&mut self) -> Result<StatusResponse> {
        match self.request(&Request::Status).await? {
            Response::Status(resp) => Ok(resp),
            Response::Error(err) => bail!("Agent error: {}", err.message),
            other => bail!("Unexpected response to status: {:?}", other),
        }
    }

    pub async fn clear(&mut self) -> Result<()> {
        match self.request(&Request::Clear).await? {
            Response::Ack(_) => Ok(()),
            Response::Error(err) => bail!("Agent error: {}", err.message),
            other => bail!("Unexpected response to clear: {:?}", other),
        }
    }

    /// Write raw bytes, bypassing the codec
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one frame, `None` if the agent closed the connection
    pub async fn read_raw_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let max = self.max_message_size;
        tokio::time::timeout(self.timeout, frame::read_frame(&mut self.stream, max))
            .await
            .context("Timed out waiting for a frame")?
            .map_err(Into::into)
    }
}
