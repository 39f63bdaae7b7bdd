//! Listener - owns the agent socket and supervises connection handlers.

use crate::handler::handle_connection;
use crate::state::AgentState;
use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Pause after a failed accept (e.g. EMFILE) before retrying
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
}

impl Listener {
    /// Create the socket directory, replace any stale socket, bind, and open
    /// the socket to every local user (0666).
    pub fn bind(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create socket directory {}", dir.display()))?;
        }

        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind socket at {}", path.display()))?;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
            .context("Failed to set socket permissions")?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept until `shutdown` flips to true, then remove the socket and wait
    /// for in-flight handlers to finish their current request.
    pub async fn run(self, state: Arc<AgentState>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut handlers = JoinSet::new();
        let mut next_id: u64 = 0;

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed; stopping listener");
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        next_id += 1;
                        info!("Connection {} accepted ({} active)", next_id, handlers.len() + 1);
                        handlers.spawn(handle_connection(
                            stream,
                            Arc::clone(&state),
                            shutdown.clone(),
                            next_id,
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection handler panicked: {}", e);
                    }
                }
            }
        }

        let Self { listener, path } = self;
        drop(listener);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove socket {}: {}", path.display(), e);
        }

        if !handlers.is_empty() {
            info!("[SHUTDOWN] Waiting for {} connection(s) to finish", handlers.len());
        }
        while let Some(finished) = handlers.join_next().await {
            if let Err(e) = finished {
                error!("Connection handler panicked: {}", e);
            }
        }

        info!("[SHUTDOWN] Listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_and_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("agent.sock");

        let first = Listener::bind(&path).unwrap();
        drop(first);
        assert!(path.exists());

        let listener = Listener::bind(&path).unwrap();
        let mode = std::fs::metadata(listener.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
    }

    #[tokio::test]
    async fn test_bind_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // Parent is a regular file, so the directory cannot be created
        assert!(Listener::bind(&blocker.join("agent.sock")).is_err());
    }
}
