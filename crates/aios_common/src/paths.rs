//! Path helpers for AI-OS daemons
//!
//! Every daemon owns one socket under the runtime directory. Clients and
//! daemons agree on these defaults; `AIOS_SOCKET` overrides the agent's.

use std::path::PathBuf;

/// Runtime directory for daemon sockets
pub const RUNTIME_DIR: &str = "/run/aios";

/// Configuration directory
pub const CONFIG_DIR: &str = "/etc/aios";

/// Environment override for the agent socket path, applied by the agent config
pub const SOCKET_ENV: &str = "AIOS_SOCKET";

/// Socket of a named daemon, e.g. `service_socket_path("power")`
pub fn service_socket_path(service: &str) -> PathBuf {
    PathBuf::from(RUNTIME_DIR).join(format!("{}.sock", service))
}

/// Default agent socket: /run/aios/agent.sock
pub fn default_agent_socket() -> PathBuf {
    service_socket_path("agent")
}

/// Default agent config file: /etc/aios/agent.toml
pub fn default_agent_config() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("agent.toml")
}
