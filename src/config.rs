use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::error::{SettingsError, SettingsResult};

/// Prefix the runner uses when exposing step inputs as environment variables.
pub const INPUT_ENV_PREFIX: &str = "INPUT_";

/// Per-read options for [`ConfigSource::input`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputOptions {
    pub required: bool,
}

impl InputOptions {
    pub fn required(required: bool) -> Self {
        Self { required }
    }
}

/// key: config-source
/// Named, string-valued configuration inputs.
pub trait ConfigSource: Send + Sync {
    /// Raw value of `name`, if set.
    fn raw(&self, name: &str) -> Option<String>;

    /// Trimmed, non-empty value of `name`. A required input that is unset is an error.
    fn input(&self, name: &str, options: InputOptions) -> SettingsResult<Option<String>> {
        let value = self
            .raw(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if value.is_none() && options.required {
            return Err(SettingsError::MissingRequiredField {
                field: name.to_string(),
            });
        }
        Ok(value)
    }
}

/// Inputs exposed as `INPUT_<NAME>` environment variables.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvInputs;

impl EnvInputs {
    pub fn variable_name(name: &str) -> String {
        format!(
            "{INPUT_ENV_PREFIX}{}",
            name.replace(' ', "_").to_ascii_uppercase()
        )
    }
}

impl ConfigSource for EnvInputs {
    fn raw(&self, name: &str) -> Option<String> {
        read_optional_env(&Self::variable_name(name))
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// In-memory inputs.
#[derive(Clone, Default)]
pub struct MapInputs {
    values: HashMap<String, String>,
}

impl MapInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

impl<K, V> FromIterator<(K, V)> for MapInputs
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MapInputs {
    fn raw(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl fmt::Debug for MapInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("MapInputs").field("names", &names).finish()
    }
}

/// key: timestamp-unit
/// Unit of the integer `nbf`/`exp` payload values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimestampUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl TimestampUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampUnit::Seconds => "seconds",
            TimestampUnit::Milliseconds => "milliseconds",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Some(TimestampUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Some(TimestampUnit::Milliseconds),
            _ => None,
        }
    }

    pub fn encode(&self, instant: DateTime<Utc>) -> i64 {
        match self {
            TimestampUnit::Seconds => instant.timestamp(),
            TimestampUnit::Milliseconds => instant.timestamp_millis(),
        }
    }

    pub fn from_source(source: &dyn ConfigSource) -> SettingsResult<Self> {
        match source.input("timestamp_unit", InputOptions::default())? {
            None => Ok(Self::default()),
            Some(raw) => Self::parse(&raw).ok_or_else(|| SettingsError::InvalidInput {
                input: "timestamp_unit".to_string(),
                reason: format!("unsupported unit '{raw}'; expected 'seconds' or 'milliseconds'"),
            }),
        }
    }
}

impl fmt::Display for TimestampUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn variable_names_follow_runner_convention() {
        assert_eq!(EnvInputs::variable_name("key_use"), "INPUT_KEY_USE");
        assert_eq!(EnvInputs::variable_name("policy keys"), "INPUT_POLICY_KEYS");
    }

    #[test]
    fn blank_inputs_are_unset() {
        let inputs = MapInputs::new().with("name", "   ").with("options", " generate ");
        assert_eq!(inputs.input("name", InputOptions::default()).unwrap(), None);
        assert_eq!(
            inputs.input("options", InputOptions::default()).unwrap(),
            Some("generate".to_string())
        );
    }

    #[test]
    fn required_inputs_must_be_set() {
        let inputs = MapInputs::new();
        let err = inputs
            .input("name", InputOptions::required(true))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::MissingRequiredField { ref field } if field == "name"
        ));
    }

    #[test]
    fn timestamp_unit_defaults_to_seconds() {
        let inputs = MapInputs::new();
        assert_eq!(
            TimestampUnit::from_source(&inputs).unwrap(),
            TimestampUnit::Seconds
        );

        let inputs = MapInputs::new().with("timestamp_unit", "Milliseconds");
        assert_eq!(
            TimestampUnit::from_source(&inputs).unwrap(),
            TimestampUnit::Milliseconds
        );

        let inputs = MapInputs::new().with("timestamp_unit", "hours");
        assert!(matches!(
            TimestampUnit::from_source(&inputs),
            Err(SettingsError::InvalidInput { .. })
        ));
    }

    #[test]
    fn encodes_instants() {
        let instant = Utc.with_ymd_and_hms(2024, 9, 3, 0, 0, 0).unwrap();
        assert_eq!(TimestampUnit::Seconds.encode(instant), 1_725_321_600);
        assert_eq!(TimestampUnit::Milliseconds.encode(instant), 1_725_321_600_000);
    }

    #[test]
    fn debug_lists_names_only() {
        let inputs: MapInputs = [("client_secret", "s3cr3t")].into_iter().collect();
        let debug = format!("{inputs:?}");
        assert!(debug.contains("client_secret"));
        assert!(!debug.contains("s3cr3t"));
    }
}
