//! Local fallback interpreter
//!
//! Keyword matching over lower-cased input, used whenever no remote provider
//! answered. Produces an acknowledgement and at most one intent drawn from
//! the dispatcher vocabulary. Unrecognized input gets the capability list;
//! this path never fails.

use aios_common::hal::{clamp_level, Hal};
use aios_common::ActionIntent;
use chrono::Local;
use std::sync::Arc;
use tracing::debug;

pub const BRIGHTNESS_STEP: i64 = 20;
pub const VOLUME_STEP: i64 = 10;

pub const CAPABILITIES: &str = "I can help with: brightness, volume, mute, battery, time, date, \
wifi, bluetooth, suspend, shutdown, reboot, launching apps and system info";

const UP_WORDS: &[&str] = &["up", "increase", "higher", "raise", "brighter", "louder"];
const DOWN_WORDS: &[&str] = &["down", "decrease", "lower", "reduce", "dim", "dimmer", "quieter"];
const APP_VERBS: &[&str] = &["open", "launch", "start", "run"];
const APP_FILLER: &[&str] = &["the", "a", "an", "app", "application", "please", "program"];

/// Acknowledgement plus the intent to run, if any
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackReply {
    pub text: String,
    pub intent: Option<ActionIntent>,
}

impl FallbackReply {
    fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent: None,
        }
    }

    fn act(text: impl Into<String>, intent: ActionIntent) -> Self {
        Self {
            text: text.into(),
            intent: Some(intent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjust {
    Absolute(i64),
    Relative(i64),
}

/// Normalized input: lower-cased text plus its word tokens
struct Input {
    text: String,
    words: Vec<String>,
}

impl Input {
    fn new(raw: &str) -> Self {
        let text = raw.to_lowercase();
        let words = text
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '%' || c == '.'))
            .map(|w| w.trim_matches(|c: char| c == '.' || c == '-').to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Self { text, words }
    }

    fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.text.contains(n))
    }

    fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn has_any_word(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.has_word(w))
    }

    /// First token that is cleanly an integer, allowing a trailing '%'
    fn number(&self) -> Option<i64> {
        self.words
            .iter()
            .find_map(|w| w.trim_end_matches('%').parse::<i64>().ok())
    }
}

pub struct FallbackInterpreter {
    hal: Arc<dyn Hal>,
    confirm_dangerous: bool,
}

impl FallbackInterpreter {
    pub fn new(hal: Arc<dyn Hal>, confirm_dangerous: bool) -> Self {
        Self {
            hal,
            confirm_dangerous,
        }
    }

    pub fn interpret(&self, raw: &str) -> FallbackReply {
        let input = Input::new(raw);
        let reply = self.match_input(&input);
        debug!(
            "Fallback matched {:?} for {:?}",
            reply.intent.as_ref().map(|i| i.name.as_str()),
            input.text
        );
        reply
    }

    fn match_input(&self, input: &Input) -> FallbackReply {
        if input.contains("brightness") || input.has_any_word(&["screen", "display"]) {
            return self.level(input, "brightness", BRIGHTNESS_STEP, 10);
        }
        if input.contains("unmute") {
            return FallbackReply::act(
                "Unmuting audio",
                ActionIntent::new("mute").with("muted", false),
            );
        }
        if input.has_any_word(&["mute", "silence"]) {
            return FallbackReply::act("Muting audio", ActionIntent::new("mute").with("muted", true));
        }
        if input.contains("volume") || input.has_any_word(&["louder", "quieter", "sound"]) {
            return self.level(input, "volume", VOLUME_STEP, 0);
        }
        if input.contains("battery") {
            return self.battery();
        }
        if input.contains_any(&["wifi", "wi-fi", "wireless"]) {
            return radio(input, "wifi", "WiFi");
        }
        if input.contains("bluetooth") {
            return radio(input, "bluetooth", "Bluetooth");
        }
        if input.contains_any(&["shutdown", "shut down", "power off", "poweroff"]) {
            return self.dangerous(input, "shutdown", "Shutting down", "shut down");
        }
        if input.contains_any(&["reboot", "restart"]) {
            return self.dangerous(input, "reboot", "Rebooting", "reboot");
        }
        if input.contains("hibernate") {
            return FallbackReply::act("Hibernating", ActionIntent::new("hibernate"));
        }
        if input.contains("suspend") || input.has_word("sleep") {
            return FallbackReply::act("Suspending the system", ActionIntent::new("suspend"));
        }
        if let Some(app) = app_name(input) {
            return FallbackReply::act(
                format!("Launching {}", app),
                ActionIntent::new("launch").with("app", app),
            );
        }
        if input.contains("system") && input.has_any_word(&["info", "information", "status"]) {
            return FallbackReply::act("Gathering system information", ActionIntent::new("info"));
        }
        if input.has_any_word(&["time", "clock"]) {
            return FallbackReply::say(format!("The time is {}", Local::now().format("%H:%M:%S")));
        }
        if input.has_any_word(&["date", "today", "day"]) {
            return FallbackReply::say(format!(
                "Today is {}",
                Local::now().format("%A, %B %d, %Y")
            ));
        }
        FallbackReply::say(CAPABILITIES)
    }

    /// Brightness or volume: explicit number, named level, or relative step.
    ///
    /// A direction word turns a number into the step size ("increase
    /// brightness by 10"), unless the number follows "to" ("turn the volume
    /// down to 30"), which stays absolute.
    fn level(&self, input: &Input, name: &str, step: i64, min_level: i64) -> FallbackReply {
        let direction = if input.has_any_word(UP_WORDS) {
            Some(1)
        } else if input.has_any_word(DOWN_WORDS) {
            Some(-1)
        } else {
            None
        };

        let adjust = match (input.number(), direction) {
            (Some(n), None) => Some(Adjust::Absolute(n)),
            (Some(n), Some(_)) if input.has_word("to") => Some(Adjust::Absolute(n)),
            (Some(n), Some(sign)) => Some(Adjust::Relative(sign * n.abs())),
            (None, _) if input.has_any_word(&["max", "maximum", "full"]) => Some(Adjust::Absolute(100)),
            (None, _) if input.has_any_word(&["min", "minimum"]) => Some(Adjust::Absolute(min_level)),
            (None, Some(sign)) => Some(Adjust::Relative(sign * step)),
            (None, None) => None,
        };

        let current = || match name {
            "brightness" => self.hal.brightness(),
            _ => self.hal.volume(),
        };

        let target = match adjust {
            Some(Adjust::Absolute(n)) => clamp_level(n),
            Some(Adjust::Relative(delta)) => match current() {
                Ok(now) => clamp_level(now as i64 + delta),
                Err(e) => {
                    debug!("Could not read current {}: {}", name, e);
                    return FallbackReply::say(format!("I couldn't read the current {}", name));
                }
            },
            None => {
                return match current() {
                    Ok(now) => FallbackReply::say(format!("The {} is at {}%", name, now)),
                    Err(_) => FallbackReply::say(format!("The {} level is unavailable", name)),
                }
            }
        };

        FallbackReply::act(
            format!("Setting {} to {}%", name, target),
            ActionIntent::new(name).with("level", target),
        )
    }

    fn battery(&self) -> FallbackReply {
        match self.hal.battery() {
            Ok(b) if b.present => FallbackReply::say(format!("Battery: {}%, Status: {}", b.level, b.status)),
            Ok(_) => FallbackReply::say("No battery detected"),
            Err(_) => FallbackReply::say("Battery information is unavailable"),
        }
    }

    fn dangerous(&self, input: &Input, name: &str, doing: &str, verb: &str) -> FallbackReply {
        if self.confirm_dangerous && !input.contains("confirm") {
            return FallbackReply::say(format!(
                "Are you sure you want to {}? Say \"confirm {}\" to proceed.",
                verb, name
            ));
        }
        FallbackReply::act(format!("{} the system", doing), ActionIntent::new(name))
    }
}

fn radio(input: &Input, name: &str, label: &str) -> FallbackReply {
    let on = input.has_word("on") || input.contains("enable") || input.has_word("connect");
    let off = input.has_word("off") || input.contains("disable") || input.has_word("disconnect");

    match (on, off) {
        (true, false) => FallbackReply::act(
            format!("Turning {} on", label),
            ActionIntent::new(name).with("enabled", true),
        ),
        (false, true) => FallbackReply::act(
            format!("Turning {} off", label),
            ActionIntent::new(name).with("enabled", false),
        ),
        _ => FallbackReply::act(
            format!("Checking {} status", label),
            ActionIntent::new("info").with("type", name),
        ),
    }
}

/// "open firefox", "please launch the terminal app"
fn app_name(input: &Input) -> Option<String> {
    let verb = input.words.iter().position(|w| APP_VERBS.contains(&w.as_str()))?;
    let name: Vec<&str> = input.words[verb + 1..]
        .iter()
        .map(String::as_str)
        .filter(|w| !APP_FILLER.contains(w))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name.join(" "))
    }
}
