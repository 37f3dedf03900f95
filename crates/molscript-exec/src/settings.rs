//! Engine settings
//!
//! A small fixed set of options, serialized with serde and adjustable from
//! scripts through `set name value`. Names are matched case-insensitively.

use molscript_lang::Value;
use serde::{Deserialize, Serialize};

/// Options consulted by the script engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// `select` with no argument includes hydrogens
    pub select_hydrogen: bool,
    /// `select` with no argument includes hetero atoms
    pub select_hetero: bool,
    /// Frames per second used to turn `delay` seconds into ticks
    pub frame_rate: u32,
    pub max_call_depth: usize,
    /// Stop the script at the first runtime error
    pub halt_on_error: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            select_hydrogen: true,
            select_hetero: true,
            frame_rate: 30,
            max_call_depth: 64,
            halt_on_error: true,
        }
    }
}

/// Script-facing names, in `state()` order
pub const SETTING_NAMES: &[&str] = &[
    "selectHydrogen",
    "selectHetero",
    "frameRate",
    "maxCallDepth",
    "haltOnError",
];

impl EngineSettings {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Canonical spelling of a setting name
    pub fn canonical_name(name: &str) -> Option<&'static str> {
        SETTING_NAMES
            .iter()
            .copied()
            .find(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn is_setting(name: &str) -> bool {
        Self::canonical_name(name).is_some()
    }

    /// Apply a script value; returns `false` for an unknown name
    pub fn apply(&mut self, name: &str, value: &Value) -> bool {
        match Self::canonical_name(name) {
            Some("selectHydrogen") => self.select_hydrogen = value.as_boolean(),
            Some("selectHetero") => self.select_hetero = value.as_boolean(),
            Some("frameRate") => self.frame_rate = value.as_int().max(1) as u32,
            Some("maxCallDepth") => self.max_call_depth = value.as_int().max(1) as usize,
            Some("haltOnError") => self.halt_on_error = value.as_boolean(),
            _ => return false,
        }
        log::debug!("setting {} = {}", name, value);
        true
    }

    /// Current value as a script value
    pub fn get(&self, name: &str) -> Option<Value> {
        Some(match Self::canonical_name(name)? {
            "selectHydrogen" => Value::Boolean(self.select_hydrogen),
            "selectHetero" => Value::Boolean(self.select_hetero),
            "frameRate" => Value::Integer(self.frame_rate as i32),
            "maxCallDepth" => Value::Integer(self.max_call_depth as i32),
            "haltOnError" => Value::Boolean(self.halt_on_error),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert!(settings.select_hydrogen);
        assert!(settings.select_hetero);
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.max_call_depth, 64);
    }

    #[test]
    fn test_json_partial() {
        let settings = EngineSettings::from_json(r#"{"frameRate": 15, "selectHetero": false}"#).unwrap();
        assert_eq!(settings.frame_rate, 15);
        assert!(!settings.select_hetero);
        assert!(settings.select_hydrogen);

        let text = settings.to_json().unwrap();
        assert_eq!(EngineSettings::from_json(&text).unwrap(), settings);
    }

    #[test]
    fn test_apply_case_insensitive() {
        let mut settings = EngineSettings::default();
        assert!(settings.apply("SELECTHYDROGEN", &Value::Boolean(false)));
        assert!(!settings.select_hydrogen);
        assert!(settings.apply("framerate", &Value::Integer(0)));
        assert_eq!(settings.frame_rate, 1);
        assert!(!settings.apply("nonsense", &Value::Integer(1)));
        assert!(matches!(settings.get("frameRate"), Some(Value::Integer(1))));
    }
}
