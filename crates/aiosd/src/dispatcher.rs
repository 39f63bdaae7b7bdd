//! Action dispatcher
//!
//! A closed switch from intent name to exactly one HAL call. Parameters are
//! validated before the HAL is touched, so a bad intent has no side effect.

use aios_common::hal::{clamp_level, is_power_command, Hal, HalError};
use aios_common::ipc::SystemSnapshot;
use aios_common::{ActionIntent, ActionResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Every intent name the dispatcher accepts
pub const ACTIONS: &[&str] = &[
    "brightness",
    "volume",
    "mute",
    "wifi",
    "bluetooth",
    "suspend",
    "hibernate",
    "shutdown",
    "reboot",
    "launch",
    "info",
];

const UNKNOWN_ACTION: &str = "Unknown action";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerAction {
    Poweroff,
    Reboot,
}

impl PowerAction {
    fn label(&self) -> &'static str {
        match self {
            PowerAction::Poweroff => "shutdown",
            PowerAction::Reboot => "reboot",
        }
    }
}

#[derive(Clone)]
pub struct ActionDispatcher {
    hal: Arc<dyn Hal>,
    power_delay: Duration,
}

impl ActionDispatcher {
    pub fn new(hal: Arc<dyn Hal>, power_delay: Duration) -> Self {
        Self { hal, power_delay }
    }

    pub fn is_known(name: &str) -> bool {
        ACTIONS.contains(&name)
    }

    /// Execute one intent. Never panics, never returns an error: every
    /// failure is a `success: false` result.
    pub fn execute(&self, intent: &ActionIntent) -> ActionResult {
        let result = match intent.name.as_str() {
            "brightness" => self.set_level(intent, "Brightness", |hal, level| {
                hal.set_brightness(level)
            }),
            "volume" => self.set_level(intent, "Volume", |hal, level| hal.set_volume(level)),
            "mute" => self.mute(intent),
            "wifi" => self.toggle(intent, "WiFi", |hal, on| hal.set_wifi(on)),
            "bluetooth" => self.toggle(intent, "Bluetooth", |hal, on| hal.set_bluetooth(on)),
            "suspend" => self.call("Suspended", "suspend", |hal| hal.suspend()),
            "hibernate" => self.call("Hibernating", "hibernate", |hal| hal.hibernate()),
            "shutdown" => {
                // Older clients send {"action": "shutdown", "reboot": true}
                match intent.param(&["reboot"]).map(Value::as_bool) {
                    Some(Some(true)) => self.schedule_power(PowerAction::Reboot),
                    Some(None) => ActionResult::failed("Invalid parameter: reboot must be a boolean"),
                    _ => self.schedule_power(PowerAction::Poweroff),
                }
            }
            "reboot" => self.schedule_power(PowerAction::Reboot),
            "launch" => self.launch(intent),
            "info" => self.info(intent),
            _ => ActionResult::failed(UNKNOWN_ACTION),
        };

        if result.success {
            info!("Action {} -> {}", intent.name, result.message);
        } else {
            warn!("Action {} failed: {}", intent.name, result.message);
        }
        result
    }

    fn set_level<F>(&self, intent: &ActionIntent, label: &str, set: F) -> ActionResult
    where
        F: FnOnce(&dyn Hal, u8) -> Result<(), HalError>,
    {
        let level = match intent.param(&["level", "value"]) {
            None => return ActionResult::failed("Missing parameter: level"),
            Some(raw) => match level_value(raw) {
                Some(level) => clamp_level(level),
                None => return ActionResult::failed("Invalid parameter: level must be a number"),
            },
        };

        match set(self.hal.as_ref(), level) {
            Ok(()) => ActionResult::ok(format!("{} set to {}%", label, level)),
            Err(e) => {
                warn!("{} HAL call failed: {}", label, e);
                ActionResult::failed(format!("Failed to set {}", label.to_lowercase()))
            }
        }
    }

    fn mute(&self, intent: &ActionIntent) -> ActionResult {
        let muted = match intent.param(&["muted", "mute"]) {
            None => true,
            Some(raw) => match raw.as_bool() {
                Some(v) => v,
                None => return ActionResult::failed("Invalid parameter: muted must be a boolean"),
            },
        };

        match self.hal.set_muted(muted) {
            Ok(()) => ActionResult::ok(if muted { "Muted" } else { "Unmuted" }),
            Err(e) => {
                warn!("Mute HAL call failed: {}", e);
                ActionResult::failed("Failed to change mute state")
            }
        }
    }

    fn toggle<F>(&self, intent: &ActionIntent, label: &str, set: F) -> ActionResult
    where
        F: FnOnce(&dyn Hal, bool) -> Result<(), HalError>,
    {
        let enabled = match intent.param(&["enabled", "enable"]) {
            None => return ActionResult::failed("Missing parameter: enabled"),
            Some(raw) => match raw.as_bool() {
                Some(v) => v,
                None => {
                    return ActionResult::failed("Invalid parameter: enabled must be a boolean")
                }
            },
        };

        match set(self.hal.as_ref(), enabled) {
            Ok(()) => ActionResult::ok(format!(
                "{} {}",
                label,
                if enabled { "enabled" } else { "disabled" }
            )),
            Err(e) => {
                warn!("{} HAL call failed: {}", label, e);
                ActionResult::failed(format!("Failed to change {} state", label))
            }
        }
    }

    fn call<F>(&self, message: &str, what: &str, f: F) -> ActionResult
    where
        F: FnOnce(&dyn Hal) -> Result<(), HalError>,
    {
        match f(self.hal.as_ref()) {
            Ok(()) => ActionResult::ok(message),
            Err(e) => {
                warn!("{} HAL call failed: {}", what, e);
                ActionResult::failed(format!("Failed to {}", what))
            }
        }
    }

    /// Acknowledge now, act after the delay so the reply reaches the caller
    fn schedule_power(&self, action: PowerAction) -> ActionResult {
        let hal = Arc::clone(&self.hal);
        let delay = self.power_delay;

        let spawned = std::thread::Builder::new()
            .name(format!("aiosd-{}", action.label()))
            .spawn(move || {
                std::thread::sleep(delay);
                info!("Performing scheduled {}", action.label());
                let outcome = match action {
                    PowerAction::Poweroff => hal.poweroff(),
                    PowerAction::Reboot => hal.reboot(),
                };
                if let Err(e) = outcome {
                    error!("Scheduled {} failed: {}", action.label(), e);
                }
            });

        match spawned {
            Ok(_) => {
                let message = match action {
                    PowerAction::Poweroff => "Shutting down...",
                    PowerAction::Reboot => "Rebooting...",
                };
                ActionResult::ok_with_data(message, json!({"delay_secs": delay.as_secs()}))
            }
            Err(e) => {
                error!("Failed to schedule {}: {}", action.label(), e);
                ActionResult::failed(format!("Failed to schedule {}", action.label()))
            }
        }
    }

    fn launch(&self, intent: &ActionIntent) -> ActionResult {
        let app = match intent.param(&["app", "name"]).and_then(Value::as_str) {
            Some(app) if !app.trim().is_empty() => app.trim(),
            _ => return ActionResult::failed("Missing parameter: app"),
        };
        if is_power_command(app) {
            warn!("Refusing to launch power command {}", app);
            return ActionResult::failed(format!(
                "{} is not an application; use the shutdown or reboot action",
                app
            ));
        }

        match self.hal.launch_app(app) {
            Ok(()) => ActionResult::ok(format!("Launched {}", app)),
            Err(e) => {
                warn!("Launch of {} failed: {}", app, e);
                ActionResult::failed(format!("Failed to launch {}", app))
            }
        }
    }

    fn info(&self, intent: &ActionIntent) -> ActionResult {
        let kind = match intent.param(&["type"]) {
            None | Some(Value::Null) => "system",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return ActionResult::failed("Invalid parameter: type must be a string"),
        };

        let outcome = match kind {
            "system" => self.hal.system_info().map(|info| {
                let snapshot = SystemSnapshot::from(&info);
                let mut data = json!(snapshot);
                data["cpu_load"] = json!(info.cpu_load);
                data["disk_total_mb"] = json!(info.disk_total_kb / 1024);
                data["disk_free_mb"] = json!(info.disk_free_kb / 1024);
                ("System info retrieved".to_string(), data)
            }),
            "battery" => self.hal.battery().map(|battery| {
                let message = if battery.present {
                    format!("Battery at {}% ({})", battery.level, battery.status)
                } else {
                    "No battery present".to_string()
                };
                (message, json!(battery))
            }),
            "wifi" => self.hal.wifi_enabled().map(|on| {
                (
                    format!("WiFi is {}", if on { "on" } else { "off" }),
                    json!({"enabled": on}),
                )
            }),
            "bluetooth" => self.hal.bluetooth_enabled().map(|on| {
                (
                    format!("Bluetooth is {}", if on { "on" } else { "off" }),
                    json!({"enabled": on}),
                )
            }),
            "power" => self.hal.on_ac_power().and_then(|on_ac| {
                let battery = self.hal.battery()?;
                let message = if on_ac { "On AC power" } else { "On battery power" };
                Ok((message.to_string(), json!({"on_ac": on_ac, "battery": battery})))
            }),
            "apps" => self.hal.list_apps().map(|apps| {
                (format!("{} applications available", apps.len()), json!({"apps": apps}))
            }),
            other => return ActionResult::failed(format!("Unknown info type: {}", other)),
        };

        match outcome {
            Ok((message, data)) => ActionResult::ok_with_data(message, data),
            Err(e) => {
                warn!("Info ({}) HAL call failed: {}", kind, e);
                ActionResult::failed(format!("Failed to read {} info", kind))
            }
        }
    }
}

/// Integer level from a JSON number or numeric string
fn level_value(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aios_common::hal::{PowerEvent, VirtualHal};

    fn dispatcher() -> (Arc<VirtualHal>, ActionDispatcher) {
        let hal = Arc::new(VirtualHal::new());
        let dispatcher = ActionDispatcher::new(hal.clone(), Duration::ZERO);
        (hal, dispatcher)
    }

    fn wait_for_power_event(hal: &VirtualHal) -> Vec<PowerEvent> {
        for _ in 0..100 {
            let events = hal.power_events();
            if !events.is_empty() {
                return events;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        hal.power_events()
    }

    #[test]
    fn test_brightness_sets_level() {
        let (hal, d) = dispatcher();
        let result = d.execute(&ActionIntent::new("brightness").with("level", 80));
        assert!(result.success);
        assert_eq!(result.message, "Brightness set to 80%");
        assert_eq!(hal.brightness().unwrap(), 80);
    }

    #[test]
    fn test_out_of_range_levels_clamp() {
        let (hal, d) = dispatcher();
        let result = d.execute(&ActionIntent::new("brightness").with("level", 150));
        assert!(result.success);
        assert_eq!(hal.brightness().unwrap(), 100);

        d.execute(&ActionIntent::new("volume").with("level", -30));
        assert_eq!(hal.volume().unwrap(), 0);
    }

    #[test]
    fn test_level_accepts_float_and_string() {
        let (hal, d) = dispatcher();
        d.execute(&ActionIntent::new("volume").with("level", 33.6));
        assert_eq!(hal.volume().unwrap(), 34);
        d.execute(&ActionIntent::new("volume").with("level", "45%"));
        assert_eq!(hal.volume().unwrap(), 45);
    }

    #[test]
    fn test_unknown_action_touches_nothing() {
        let (hal, d) = dispatcher();
        let result = d.execute(&ActionIntent::new("unknown_xyz"));
        assert_eq!(result, ActionResult::failed("Unknown action"));
        assert_eq!(hal.call_count(), 0);
    }

    #[test]
    fn test_missing_or_bad_params_touch_nothing() {
        let (hal, d) = dispatcher();
        let cases = [
            ActionIntent::new("brightness"),
            ActionIntent::new("volume").with("level", "loud"),
            ActionIntent::new("wifi"),
            ActionIntent::new("bluetooth").with("enabled", "yes"),
            ActionIntent::new("mute").with("muted", 1),
            ActionIntent::new("launch"),
            ActionIntent::new("launch").with("app", "   "),
            ActionIntent::new("info").with("type", "gpu"),
            ActionIntent::new("shutdown").with("reboot", "soon"),
        ];
        for intent in &cases {
            let result = d.execute(intent);
            assert!(!result.success, "{:?} should fail", intent);
        }
        assert_eq!(hal.call_count(), 0);
    }

    #[test]
    fn test_launch_refuses_power_commands() {
        let (hal, d) = dispatcher();
        for app in ["halt", "poweroff", "Reboot", "systemctl poweroff"] {
            let result = d.execute(&ActionIntent::new("launch").with("app", app));
            assert!(!result.success, "{}", app);
            assert!(result.message.contains("not an application"));
        }
        assert_eq!(hal.call_count(), 0);
        assert!(hal.launched_apps().is_empty());
    }

    #[test]
    fn test_param_aliases() {
        let (hal, d) = dispatcher();
        assert_eq!(d.execute(&ActionIntent::new("mute").with("mute", true)).message, "Muted");
        assert!(hal.muted().unwrap());
        assert_eq!(d.execute(&ActionIntent::new("mute").with("muted", false)).message, "Unmuted");
        assert_eq!(
            d.execute(&ActionIntent::new("wifi").with("enable", false)).message,
            "WiFi disabled"
        );
        assert_eq!(
            d.execute(&ActionIntent::new("launch").with("name", "firefox")).message,
            "Launched firefox"
        );
    }

    #[test]
    fn test_mute_defaults_to_true() {
        let (hal, d) = dispatcher();
        assert!(d.execute(&ActionIntent::new("mute")).success);
        assert!(hal.muted().unwrap());
    }

    #[test]
    fn test_hal_failure_is_reported() {
        let (hal, d) = dispatcher();
        hal.set_failing(true);
        let result = d.execute(&ActionIntent::new("bluetooth").with("enabled", true));
        assert!(!result.success);
        assert_eq!(result.message, "Failed to change Bluetooth state");
        assert!(!d.execute(&ActionIntent::new("launch").with("app", "firefox")).success);
    }

    #[test]
    fn test_shutdown_is_deferred() {
        let hal = Arc::new(VirtualHal::new());
        let d = ActionDispatcher::new(hal.clone(), Duration::from_millis(50));
        let result = d.execute(&ActionIntent::new("shutdown"));
        assert!(result.success);
        assert_eq!(result.message, "Shutting down...");
        assert!(hal.power_events().is_empty());
        assert_eq!(wait_for_power_event(&hal), vec![PowerEvent::Poweroff]);
    }

    #[test]
    fn test_reboot_forms() {
        let (hal, d) = dispatcher();
        assert_eq!(d.execute(&ActionIntent::new("reboot")).message, "Rebooting...");
        assert_eq!(wait_for_power_event(&hal), vec![PowerEvent::Reboot]);

        let (hal, d) = dispatcher();
        let result = d.execute(&ActionIntent::new("shutdown").with("reboot", true));
        assert_eq!(result.message, "Rebooting...");
        assert_eq!(wait_for_power_event(&hal), vec![PowerEvent::Reboot]);
    }

    #[test]
    fn test_suspend_runs_immediately() {
        let (hal, d) = dispatcher();
        assert_eq!(d.execute(&ActionIntent::new("suspend")).message, "Suspended");
        assert_eq!(hal.power_events(), vec![PowerEvent::Suspend]);
    }

    #[test]
    fn test_info_variants() {
        let (_hal, d) = dispatcher();
        let system = d.execute(&ActionIntent::new("info"));
        assert_eq!(system.message, "System info retrieved");
        let data = system.data.unwrap();
        assert_eq!(data["hostname"], "aios-virtual");
        assert_eq!(data["memory_mb"], 8192);
        assert_eq!(data["uptime_hours"], 7);

        let battery = d.execute(&ActionIntent::new("info").with("type", "battery"));
        assert_eq!(battery.message, "Battery at 76% (Discharging)");

        let wifi = d.execute(&ActionIntent::new("info").with("type", "wifi"));
        assert_eq!(wifi.data.unwrap()["enabled"], true);

        let power = d.execute(&ActionIntent::new("info").with("type", "power"));
        assert_eq!(power.message, "On battery power");

        let apps = d.execute(&ActionIntent::new("info").with("type", "apps"));
        assert_eq!(apps.data.unwrap()["apps"].as_array().unwrap().len(), 3);
    }
}
