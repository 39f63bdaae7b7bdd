//! Hardware Abstraction Layer
//!
//! A capability interface over per-domain device primitives. Callers never
//! learn how a backend implements a call: `LinuxHal` mixes sysfs reads with
//! CLI tools, `VirtualHal` keeps everything in memory.
//!
//! Every call is synchronous and either succeeds or fails as a whole. Errors
//! carry a description for logs only; callers treat any `Err` as "the action
//! did not happen".

mod linux;
mod virtual_hal;

pub use linux::LinuxHal;
pub use virtual_hal::{PowerEvent, VirtualHal};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub type HalResult<T> = Result<T, HalError>;

#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("device not available: {0}")]
    Unavailable(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("unexpected device output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Battery snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub present: bool,
    /// Charge percentage (0-100)
    pub level: u8,
    /// Charging, Discharging, Full, Unknown
    pub status: String,
    /// Minutes, when discharging and the rate is known
    pub time_to_empty: Option<u32>,
    /// Minutes, when charging and the rate is known
    pub time_to_full: Option<u32>,
}

/// System information snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    /// e.g. "Linux 6.8.0"
    pub kernel: String,
    pub cpu_load: f64,
    pub memory_total_kb: u64,
    pub memory_free_kb: u64,
    pub disk_total_kb: u64,
    pub disk_free_kb: u64,
    pub uptime_seconds: u64,
}

/// Device-control capabilities consumed by the daemons
pub trait Hal: Send + Sync {
    // Display
    fn brightness(&self) -> HalResult<u8>;
    fn set_brightness(&self, level: u8) -> HalResult<()>;

    // Audio
    fn volume(&self) -> HalResult<u8>;
    fn set_volume(&self, level: u8) -> HalResult<()>;
    fn muted(&self) -> HalResult<bool>;
    fn set_muted(&self, muted: bool) -> HalResult<()>;

    // Radios
    fn wifi_enabled(&self) -> HalResult<bool>;
    fn set_wifi(&self, enabled: bool) -> HalResult<()>;
    fn bluetooth_enabled(&self) -> HalResult<bool>;
    fn set_bluetooth(&self, enabled: bool) -> HalResult<()>;

    // Power
    fn battery(&self) -> HalResult<BatteryInfo>;
    fn on_ac_power(&self) -> HalResult<bool>;
    fn suspend(&self) -> HalResult<()>;
    fn hibernate(&self) -> HalResult<()>;
    fn poweroff(&self) -> HalResult<()>;
    fn reboot(&self) -> HalResult<()>;

    // System
    fn system_info(&self) -> HalResult<SystemInfo>;

    // Applications
    fn launch_app(&self, name: &str) -> HalResult<()>;
    fn list_apps(&self) -> HalResult<Vec<String>>;
}

/// Backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HalBackend {
    /// sysfs plus amixer / nmcli / bluetoothctl / systemctl
    #[default]
    Linux,
    /// In-memory device model
    Virtual,
}

impl HalBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            HalBackend::Linux => "linux",
            HalBackend::Virtual => "virtual",
        }
    }

    pub fn build(&self) -> Arc<dyn Hal> {
        match self {
            HalBackend::Linux => Arc::new(LinuxHal::new()),
            HalBackend::Virtual => Arc::new(VirtualHal::new()),
        }
    }
}

impl FromStr for HalBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linux" | "sysfs" => Ok(HalBackend::Linux),
            "virtual" | "memory" => Ok(HalBackend::Virtual),
            other => Err(format!("unknown HAL backend '{}'", other)),
        }
    }
}

/// Clamp any integer into the 0-100 device range
pub fn clamp_level(level: i64) -> u8 {
    level.clamp(0, 100) as u8
}

/// Programs that change power state; never started through `launch_app`
pub const POWER_COMMANDS: &[&str] = &[
    "halt",
    "poweroff",
    "shutdown",
    "reboot",
    "systemctl",
    "loginctl",
    "init",
    "telinit",
];

/// True when `name` is a power-state program rather than an application
pub fn is_power_command(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    let program = name.split_whitespace().next().unwrap_or_default();
    POWER_COMMANDS.contains(&program)
}
