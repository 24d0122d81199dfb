use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::EngineError;

pub const DEFAULT_ATTRIBUTE_PREFIX: &str = "data-tse-bind-";
pub const LEGACY_ATTRIBUTE_PREFIX: &str = "data-bind-";
pub const DEFAULT_DISABLE_ATTRIBUTE: &str = "data-tse-disable";
pub const DEFAULT_TEMPLATE_DELIMITER: &str = r"\$\{([^}]+)\}";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(10);

/// A placeholder pattern with exactly one capture group (the expression).
#[derive(Clone, Debug)]
pub struct Delimiter(Regex);

impl Delimiter {
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        let regex = Regex::new(pattern)
            .map_err(|e| EngineError::Config(format!("templateDelimiter: {e}")))?;
        // captures_len counts the implicit whole-match group.
        if regex.captures_len() != 2 {
            return Err(EngineError::Config(format!(
                "templateDelimiter must have exactly one capture group, found {}",
                regex.captures_len() - 1
            )));
        }
        Ok(Self(regex))
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(Regex::new(DEFAULT_TEMPLATE_DELIMITER).expect("default delimiter is valid"))
    }
}

impl Serialize for Delimiter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}

/// Engine configuration. Replaced wholesale on update; readers get a clone.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub attribute_prefix: String,
    pub template_delimiter: Delimiter,
    pub observe_mutations: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub debounce_time: Duration,
    pub disable_attribute: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attribute_prefix: DEFAULT_ATTRIBUTE_PREFIX.to_string(),
            template_delimiter: Delimiter::default(),
            observe_mutations: true,
            debounce_time: DEFAULT_DEBOUNCE,
            disable_attribute: DEFAULT_DISABLE_ATTRIBUTE.to_string(),
        }
    }
}

impl Config {
    /// Defaults with the older `data-bind-` attribute prefix.
    pub fn legacy() -> Self {
        Self {
            attribute_prefix: LEGACY_ATTRIBUTE_PREFIX.to_string(),
            ..Self::default()
        }
    }

    /// Merge `overrides` field by field into a new configuration.
    ///
    /// The second value reports whether a running watcher must be recreated.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Result<(Self, bool), EngineError> {
        let mut next = self.clone();
        if let Some(prefix) = &overrides.attribute_prefix {
            if prefix.is_empty() {
                return Err(EngineError::Config("attributePrefix must not be empty".into()));
            }
            next.attribute_prefix = prefix.clone();
        }
        if let Some(pattern) = &overrides.template_delimiter {
            next.template_delimiter = Delimiter::new(pattern)?;
        }
        if let Some(observe) = overrides.observe_mutations {
            next.observe_mutations = observe;
        }
        if let Some(ms) = overrides.debounce_time {
            next.debounce_time = Duration::from_millis(ms);
        }
        if let Some(attr) = &overrides.disable_attribute {
            if attr.is_empty() {
                return Err(EngineError::Config("disableAttribute must not be empty".into()));
            }
            next.disable_attribute = attr.to_ascii_lowercase();
        }
        let watcher_changed = next.observe_mutations != self.observe_mutations
            || next.debounce_time != self.debounce_time;
        Ok((next, watcher_changed))
    }
}

/// Partial configuration as accepted by `initialize`/`configure`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverrides {
    pub attribute_prefix: Option<String>,
    pub template_delimiter: Option<String>,
    pub eval_context: Option<Map<String, Value>>,
    pub observe_mutations: Option<bool>,
    /// Milliseconds.
    pub debounce_time: Option<u64>,
    pub disable_attribute: Option<String>,
}

impl ConfigOverrides {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))
    }
}
