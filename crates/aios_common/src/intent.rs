//! Action intents and results.
//!
//! An intent reaches the dispatcher in one of two shapes:
//! - canonical: `{"name": "brightness", "params": {"level": 80}}`
//! - flat, as emitted by providers and older clients: `{"action": "brightness", "level": 80}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named, parameterized device-control action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ActionIntent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Builder-style parameter insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Interpret a JSON value as an intent, accepting both shapes.
    ///
    /// Returns `None` when the value is not an object or carries no string
    /// name under `name` or `action`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            let params = match obj.get("params") {
                Some(Value::Object(p)) => p.clone(),
                Some(Value::Null) | None => Map::new(),
                Some(_) => return None,
            };
            return Some(Self::new(name.trim()).with_params(params));
        }

        let name = obj.get("action").and_then(Value::as_str)?;
        let params = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "action")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self::new(name.trim()).with_params(params))
    }

    fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// First present parameter among `keys`
    pub fn param(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|k| self.params.get(*k))
    }

    /// Shutdown and reboot are the only intents that take the machine away
    pub fn is_dangerous(&self) -> bool {
        matches!(self.name.as_str(), "shutdown" | "reboot")
    }
}

/// Outcome of executing one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_shape() {
        let intent =
            ActionIntent::from_value(&json!({"name": "volume", "params": {"level": 30}})).unwrap();
        assert_eq!(intent.name, "volume");
        assert_eq!(intent.params["level"], 30);
    }

    #[test]
    fn test_flat_provider_shape() {
        let intent = ActionIntent::from_value(&json!({"action": "wifi", "enabled": false})).unwrap();
        assert_eq!(intent.name, "wifi");
        assert_eq!(intent.params.len(), 1);
        assert_eq!(intent.params["enabled"], false);
    }

    #[test]
    fn test_name_without_params() {
        let intent = ActionIntent::from_value(&json!({"name": "unknown_xyz"})).unwrap();
        assert_eq!(intent.name, "unknown_xyz");
        assert!(intent.params.is_empty());
    }

    #[test]
    fn test_rejects_non_intents() {
        assert!(ActionIntent::from_value(&json!([1, 2])).is_none());
        assert!(ActionIntent::from_value(&json!({"level": 3})).is_none());
        assert!(ActionIntent::from_value(&json!({"action": 7})).is_none());
        assert!(ActionIntent::from_value(&json!({"name": "x", "params": 5})).is_none());
    }

    #[test]
    fn test_param_aliases() {
        let intent = ActionIntent::new("mute").with("mute", false);
        assert_eq!(intent.param(&["muted", "mute"]), Some(&json!(false)));
        assert!(intent.param(&["level"]).is_none());
    }

    #[test]
    fn test_result_omits_empty_data() {
        let json = serde_json::to_value(ActionResult::failed("Unknown action")).unwrap();
        assert_eq!(json, json!({"success": false, "message": "Unknown action"}));
    }
}
