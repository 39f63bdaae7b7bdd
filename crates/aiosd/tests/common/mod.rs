//! Shared harness: a real daemon on a temp socket with a virtual HAL.

#![allow(dead_code)]

use aios_common::client::AgentClient;
use aios_common::hal::VirtualHal;
use aiosd::provider::ChatProvider;
use aiosd::{AgentConfig, AgentState, Listener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TestDaemon {
    _dir: TempDir,
    pub socket: PathBuf,
    pub hal: Arc<VirtualHal>,
    pub state: Arc<AgentState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

/// Test defaults: no provider, power actions parked far in the future
pub fn test_config() -> AgentConfig {
    AgentConfig {
        power_action_delay: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(2),
        ..AgentConfig::default()
    }
}

impl TestDaemon {
    pub async fn start() -> Self {
        Self::start_with(test_config(), None).await
    }

    pub async fn start_with(mut config: AgentConfig, provider: Option<Arc<dyn ChatProvider>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("agent.sock");
        config.socket_path = socket.clone();

        let hal = Arc::new(VirtualHal::new());
        let state = Arc::new(AgentState::new(config, hal.clone(), provider));
        let listener = Listener::bind(&socket).unwrap();

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(Arc::clone(&state), rx));

        Self {
            _dir: dir,
            socket,
            hal,
            state,
            shutdown,
            task: Some(task),
        }
    }

    pub async fn client(&self) -> AgentClient {
        AgentClient::connect(&self.socket)
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(10))
    }

    /// Signal shutdown and wait for the listener to drain
    pub async fn stop(&mut self) {
        self.shutdown.send(true).unwrap();
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("listener did not stop")
                .unwrap()
                .unwrap();
        }
    }
}

/// Length-prefixed frame from raw payload bytes
pub fn raw_frame(payload: &[u8]) -> Vec<u8> {
    let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}
