//! Linux HAL backend.
//!
//! Display and power state come straight from sysfs. Audio, radios and power
//! transitions go through the usual CLI tools (amixer, nmcli, bluetoothctl,
//! systemctl). System information comes from `sysinfo`.

use super::{clamp_level, is_power_command, BatteryInfo, Hal, HalError, HalResult, SystemInfo};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use sysinfo::{Disks, System};
use tracing::{debug, warn};

const BACKLIGHT_DIR: &str = "sys/class/backlight";
const POWER_SUPPLY_DIR: &str = "sys/class/power_supply";
const APPLICATIONS_DIR: &str = "/usr/share/applications";

pub struct LinuxHal {
    /// Root that `sys/class/...` is resolved against, `/` in production
    sysfs_root: PathBuf,
    applications_dir: PathBuf,
}

impl LinuxHal {
    pub fn new() -> Self {
        Self::with_roots("/", APPLICATIONS_DIR)
    }

    /// Resolve sysfs and `.desktop` lookups under alternative roots
    pub fn with_roots(sysfs_root: impl Into<PathBuf>, applications_dir: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            applications_dir: applications_dir.into(),
        }
    }

    fn class_dir(&self, class: &str) -> PathBuf {
        self.sysfs_root.join(class)
    }

    /// First backlight device, in name order
    fn backlight_device(&self) -> HalResult<PathBuf> {
        sorted_entries(&self.class_dir(BACKLIGHT_DIR))
            .into_iter()
            .next()
            .ok_or_else(|| HalError::Unavailable("no backlight device".to_string()))
    }

    /// First power supply that reports itself as a battery
    fn battery_device(&self) -> Option<PathBuf> {
        sorted_entries(&self.class_dir(POWER_SUPPLY_DIR))
            .into_iter()
            .find(|path| {
                let is_bat_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with("BAT"))
                    .unwrap_or(false);
                is_bat_name || read_str(&path.join("type")).as_deref() == Some("Battery")
            })
    }
}

impl Default for LinuxHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for LinuxHal {
    fn brightness(&self) -> HalResult<u8> {
        let device = self.backlight_device()?;
        let current = read_int(&device.join("brightness"))?;
        let max = read_int(&device.join("max_brightness"))?;
        if max <= 0 {
            return Err(HalError::Parse("max_brightness is zero".to_string()));
        }
        Ok(clamp_level(current * 100 / max))
    }

    fn set_brightness(&self, level: u8) -> HalResult<()> {
        let device = self.backlight_device()?;
        let max = read_int(&device.join("max_brightness"))?;
        if max <= 0 {
            return Err(HalError::Parse("max_brightness is zero".to_string()));
        }
        let raw = max * clamp_level(level as i64) as i64 / 100;
        fs::write(device.join("brightness"), raw.to_string())?;
        Ok(())
    }

    fn volume(&self) -> HalResult<u8> {
        let out = run_capture("amixer", &["get", "Master"])?;
        parse_amixer_volume(&out)
            .ok_or_else(|| HalError::Parse("no volume percentage in amixer output".to_string()))
    }

    fn set_volume(&self, level: u8) -> HalResult<()> {
        let arg = format!("{}%", clamp_level(level as i64));
        run_status("amixer", &["set", "Master", &arg])
    }

    fn muted(&self) -> HalResult<bool> {
        let out = run_capture("amixer", &["get", "Master"])?;
        Ok(parse_amixer_muted(&out))
    }

    fn set_muted(&self, muted: bool) -> HalResult<()> {
        run_status("amixer", &["set", "Master", if muted { "mute" } else { "unmute" }])
    }

    fn wifi_enabled(&self) -> HalResult<bool> {
        let out = run_capture("nmcli", &["radio", "wifi"])?;
        Ok(out.trim() == "enabled")
    }

    fn set_wifi(&self, enabled: bool) -> HalResult<()> {
        run_status("nmcli", &["radio", "wifi", if enabled { "on" } else { "off" }])
    }

    fn bluetooth_enabled(&self) -> HalResult<bool> {
        let out = run_capture("bluetoothctl", &["show"])?;
        Ok(out.lines().any(|l| l.trim() == "Powered: yes"))
    }

    fn set_bluetooth(&self, enabled: bool) -> HalResult<()> {
        run_status("bluetoothctl", &["power", if enabled { "on" } else { "off" }])
    }

    fn battery(&self) -> HalResult<BatteryInfo> {
        let Some(device) = self.battery_device() else {
            return Ok(BatteryInfo {
                status: "Unknown".to_string(),
                ..BatteryInfo::default()
            });
        };

        // Some firmwares omit `present`; a listed BAT node counts as present then.
        let present = read_int(&device.join("present")).map(|v| v == 1).unwrap_or(true);
        if !present {
            return Ok(BatteryInfo {
                status: "Unknown".to_string(),
                ..BatteryInfo::default()
            });
        }

        let level = read_int(&device.join("capacity")).map(clamp_level).unwrap_or(0);
        let status = read_str(&device.join("status")).unwrap_or_else(|| "Unknown".to_string());

        let energy_now = read_int(&device.join("energy_now")).ok();
        let energy_full = read_int(&device.join("energy_full")).ok();
        let power_now = read_int(&device.join("power_now")).ok().filter(|p| *p > 0);

        let (time_to_empty, time_to_full) = match (power_now, energy_now, status.as_str()) {
            (Some(power), Some(now), "Discharging") => (Some((now * 60 / power) as u32), None),
            (Some(power), Some(now), "Charging") => {
                let full = energy_full.unwrap_or(now);
                (None, Some(((full - now).max(0) * 60 / power) as u32))
            }
            _ => (None, None),
        };

        Ok(BatteryInfo {
            present: true,
            level,
            status,
            time_to_empty,
            time_to_full,
        })
    }

    fn on_ac_power(&self) -> HalResult<bool> {
        let dir = self.class_dir(POWER_SUPPLY_DIR);
        if !dir.exists() {
            return Err(HalError::Unavailable("no power_supply class".to_string()));
        }
        let online = sorted_entries(&dir).into_iter().any(|path| {
            let is_mains = read_str(&path.join("type")).as_deref() == Some("Mains");
            is_mains && read_int(&path.join("online")).map(|v| v == 1).unwrap_or(false)
        });
        Ok(online)
    }

    fn suspend(&self) -> HalResult<()> {
        run_status("systemctl", &["suspend"])
    }

    fn hibernate(&self) -> HalResult<()> {
        run_status("systemctl", &["hibernate"])
    }

    fn poweroff(&self) -> HalResult<()> {
        run_status("systemctl", &["poweroff"])
    }

    fn reboot(&self) -> HalResult<()> {
        run_status("systemctl", &["reboot"])
    }

    fn system_info(&self) -> HalResult<SystemInfo> {
        let mut sys = System::new();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let root = disks.iter().find(|d| d.mount_point() == Path::new("/"));

        Ok(SystemInfo {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            kernel: format!(
                "{} {}",
                System::name().unwrap_or_else(|| "Linux".to_string()),
                System::kernel_version().unwrap_or_default()
            )
            .trim()
            .to_string(),
            cpu_load: System::load_average().one,
            memory_total_kb: sys.total_memory() / 1024,
            memory_free_kb: sys.available_memory() / 1024,
            disk_total_kb: root.map(|d| d.total_space() / 1024).unwrap_or(0),
            disk_free_kb: root.map(|d| d.available_space() / 1024).unwrap_or(0),
            uptime_seconds: System::uptime(),
        })
    }

    fn launch_app(&self, name: &str) -> HalResult<()> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(HalError::Unavailable(format!("invalid application name '{}'", name)));
        }
        if is_power_command(name) {
            return Err(HalError::Unavailable(format!("{} is not an application", name)));
        }

        if spawn_detached(name, &[]).is_ok() {
            return Ok(());
        }
        if run_status("gtk-launch", &[name]).is_ok() {
            return Ok(());
        }

        let needle = name.to_lowercase();
        let desktop = self
            .list_apps()?
            .into_iter()
            .find(|app| app.to_lowercase().contains(&needle))
            .ok_or_else(|| HalError::Unavailable(format!("no application named {}", name)))?;
        run_status("gtk-launch", &[&desktop])
    }

    fn list_apps(&self) -> HalResult<Vec<String>> {
        let mut apps: Vec<String> = sorted_entries(&self.applications_dir)
            .into_iter()
            .filter_map(|path| {
                let file = path.file_name()?.to_string_lossy().to_string();
                file.strip_suffix(".desktop").map(str::to_string)
            })
            .collect();
        apps.dedup();
        Ok(apps)
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| {
            rd.flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| !n.to_string_lossy().starts_with('.'))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries
}

fn read_str(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_int(path: &Path) -> HalResult<i64> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse()
        .map_err(|_| HalError::Parse(format!("{}: '{}'", path.display(), raw.trim())))
}

fn run_capture(program: &str, args: &[&str]) -> HalResult<String> {
    debug!("HAL exec: {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| HalError::CommandFailed(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        return Err(HalError::CommandFailed(format!(
            "{} exited with {}",
            program, output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn run_status(program: &str, args: &[&str]) -> HalResult<()> {
    run_capture(program, args).map(|_| ())
}

/// Start a program without blocking on it; a reaper thread collects its
/// exit status so no zombie is left behind.
fn spawn_detached(program: &str, args: &[&str]) -> HalResult<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| HalError::CommandFailed(format!("{}: {}", program, e)))?;

    let name = program.to_string();
    std::thread::Builder::new()
        .name(format!("reap-{}", child.id()))
        .spawn(move || match child.wait() {
            Ok(status) => debug!("{} exited with {}", name, status),
            Err(e) => warn!("Failed to reap {}: {}", name, e),
        })
        .map(|_| ())
        .map_err(|e| HalError::CommandFailed(format!("reaper thread for {}: {}", program, e)))
}

/// First `[NN%]` in `amixer get` output
fn parse_amixer_volume(output: &str) -> Option<u8> {
    output.split('[').skip(1).find_map(|chunk| {
        let inner = chunk.split(']').next()?;
        inner.strip_suffix('%')?.parse::<i64>().ok().map(clamp_level)
    })
}

fn parse_amixer_muted(output: &str) -> bool {
    output.contains("[off]")
}
