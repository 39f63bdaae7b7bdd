//! In-memory HAL backend.
//!
//! Holds a plausible device state, counts every call and records power
//! events instead of performing them. Used by tests and by `hal = "virtual"`
//! on machines without the real devices.

use super::{clamp_level, BatteryInfo, Hal, HalError, HalResult, SystemInfo};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Power transitions requested through the virtual backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Suspend,
    Hibernate,
    Poweroff,
    Reboot,
}

#[derive(Debug)]
struct DeviceState {
    brightness: u8,
    volume: u8,
    muted: bool,
    wifi: bool,
    bluetooth: bool,
    battery: BatteryInfo,
    on_ac: bool,
    apps: Vec<String>,
    launched: Vec<String>,
    power_events: Vec<PowerEvent>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            brightness: 50,
            volume: 50,
            muted: false,
            wifi: true,
            bluetooth: false,
            battery: BatteryInfo {
                present: true,
                level: 76,
                status: "Discharging".to_string(),
                time_to_empty: Some(190),
                time_to_full: None,
            },
            on_ac: false,
            apps: vec![
                "firefox".to_string(),
                "org.gnome.Terminal".to_string(),
                "code".to_string(),
            ],
            launched: Vec::new(),
            power_events: Vec::new(),
        }
    }
}

pub struct VirtualHal {
    state: Mutex<DeviceState>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl VirtualHal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState::default()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Start from explicit brightness and volume levels
    pub fn with_levels(brightness: u8, volume: u8) -> Self {
        let hal = Self::new();
        {
            let mut state = hal.lock();
            state.brightness = brightness.min(100);
            state.volume = volume.min(100);
        }
        hal
    }

    /// Number of HAL calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn power_events(&self) -> Vec<PowerEvent> {
        self.lock().power_events.clone()
    }

    pub fn launched_apps(&self) -> Vec<String> {
        self.lock().launched.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, then hand out the state unless failure is injected
    fn enter(&self) -> HalResult<MutexGuard<'_, DeviceState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(HalError::Unavailable("virtual device offline".to_string()));
        }
        Ok(self.lock())
    }

    fn power(&self, event: PowerEvent) -> HalResult<()> {
        self.enter()?.power_events.push(event);
        Ok(())
    }
}

impl Default for VirtualHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for VirtualHal {
    fn brightness(&self) -> HalResult<u8> {
        Ok(self.enter()?.brightness)
    }

    fn set_brightness(&self, level: u8) -> HalResult<()> {
        self.enter()?.brightness = clamp_level(level as i64);
        Ok(())
    }

    fn volume(&self) -> HalResult<u8> {
        Ok(self.enter()?.volume)
    }

    fn set_volume(&self, level: u8) -> HalResult<()> {
        self.enter()?.volume = clamp_level(level as i64);
        Ok(())
    }

    fn muted(&self) -> HalResult<bool> {
        Ok(self.enter()?.muted)
    }

    fn set_muted(&self, muted: bool) -> HalResult<()> {
        self.enter()?.muted = muted;
        Ok(())
    }

    fn wifi_enabled(&self) -> HalResult<bool> {
        Ok(self.enter()?.wifi)
    }

    fn set_wifi(&self, enabled: bool) -> HalResult<()> {
        self.enter()?.wifi = enabled;
        Ok(())
    }

    fn bluetooth_enabled(&self) -> HalResult<bool> {
        Ok(self.enter()?.bluetooth)
    }

    fn set_bluetooth(&self, enabled: bool) -> HalResult<()> {
        self.enter()?.bluetooth = enabled;
        Ok(())
    }

    fn battery(&self) -> HalResult<BatteryInfo> {
        Ok(self.enter()?.battery.clone())
    }

    fn on_ac_power(&self) -> HalResult<bool> {
        Ok(self.enter()?.on_ac)
    }

    fn suspend(&self) -> HalResult<()> {
        self.power(PowerEvent::Suspend)
    }

    fn hibernate(&self) -> HalResult<()> {
        self.power(PowerEvent::Hibernate)
    }

    fn poweroff(&self) -> HalResult<()> {
        self.power(PowerEvent::Poweroff)
    }

    fn reboot(&self) -> HalResult<()> {
        self.power(PowerEvent::Reboot)
    }

    fn system_info(&self) -> HalResult<SystemInfo> {
        let _state = self.enter()?;
        Ok(SystemInfo {
            hostname: "aios-virtual".to_string(),
            kernel: "Linux virtual".to_string(),
            cpu_load: 0.15,
            memory_total_kb: 8 * 1024 * 1024,
            memory_free_kb: 5 * 1024 * 1024,
            disk_total_kb: 256 * 1024 * 1024,
            disk_free_kb: 128 * 1024 * 1024,
            uptime_seconds: 7 * 3600,
        })
    }

    fn launch_app(&self, name: &str) -> HalResult<()> {
        let mut state = self.enter()?;
        let needle = name.trim().to_lowercase();
        let found = state
            .apps
            .iter()
            .find(|app| app.to_lowercase().contains(&needle))
            .cloned();
        match found {
            Some(app) if !needle.is_empty() => {
                state.launched.push(app);
                Ok(())
            }
            _ => Err(HalError::Unavailable(format!("no application named {}", name))),
        }
    }

    fn list_apps(&self) -> HalResult<Vec<String>> {
        Ok(self.enter()?.apps.clone())
    }
}
