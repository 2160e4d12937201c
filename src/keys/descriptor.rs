use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

use super::policy::KeyField;

static SNAKE_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\w)").expect("invalid regex"));

/// `key_use` -> `keyUse`. Keys without underscores are returned unchanged.
pub fn to_camel_case(value: &str) -> String {
    SNAKE_SEGMENT
        .replace_all(value, |caps: &regex::Captures<'_>| caps[1].to_uppercase())
        .into_owned()
}

/// key: policy-key-descriptor
/// Untyped description of one policy key, as found in configuration.
///
/// Values are kept raw; typing and validation happen when the descriptor is
/// turned into a [`PolicyKey`](super::PolicyKey).
#[derive(Clone, Default, PartialEq)]
pub struct PolicyKeyDescriptor {
    pub name: Option<String>,
    pub options: Option<String>,
    pub key_use: Option<String>,
    pub key_type: Option<String>,
    pub secret: Option<String>,
    pub file_path: Option<String>,
    pub certificate_kind: Option<String>,
    pub password: Option<String>,
    pub activation_date: Option<Value>,
    pub expiration_date: Option<Value>,
}

impl PolicyKeyDescriptor {
    /// Builds a descriptor from one JSON object. Keys go through [`to_camel_case`] first, so
    /// both `key_use` and `keyUse` resolve to the same attribute. Unknown keys are ignored.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut descriptor = Self::default();
        for (key, value) in map {
            match to_camel_case(key).as_str() {
                "name" => descriptor.name = scalar(key, value),
                "options" => descriptor.options = scalar(key, value),
                "keyUse" => descriptor.key_use = scalar(key, value),
                "keyType" => descriptor.key_type = scalar(key, value),
                "secret" => descriptor.secret = scalar(key, value),
                "filePath" => descriptor.file_path = scalar(key, value),
                "certificateKind" => descriptor.certificate_kind = scalar(key, value),
                "password" => descriptor.password = scalar(key, value),
                "activationDate" => descriptor.activation_date = present(value),
                "expirationDate" => descriptor.expiration_date = present(value),
                _ => tracing::debug!(%key, "ignoring unknown policy key attribute"),
            }
        }
        descriptor
    }

    /// Raw value of a string-typed attribute.
    pub fn text(&self, field: KeyField) -> Option<&str> {
        let value = match field {
            KeyField::Name => &self.name,
            KeyField::Disposition => &self.options,
            KeyField::Usage => &self.key_use,
            KeyField::AlgorithmFamily => &self.key_type,
            KeyField::SecretValue => &self.secret,
            KeyField::SourcePath => &self.file_path,
            KeyField::ContainerFormat => &self.certificate_kind,
            KeyField::ContainerPassword => &self.password,
            KeyField::NotBefore | KeyField::NotAfter => return None,
        };
        value.as_deref()
    }
}

impl fmt::Debug for PolicyKeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyKeyDescriptor")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("key_use", &self.key_use)
            .field("key_type", &self.key_type)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("file_path", &self.file_path)
            .field("certificate_kind", &self.certificate_kind)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("activation_date", &self.activation_date)
            .field("expiration_date", &self.expiration_date)
            .finish()
    }
}

fn scalar(key: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(_) | Value::Object(_) => {
            tracing::debug!(%key, "ignoring non-scalar policy key attribute");
            None
        }
    }
}

fn present(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

/// Longest all-digit string read as a calendar value rather than epoch milliseconds.
const MAX_CALENDAR_DIGITS: usize = 8;

/// Parses a configured instant: RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC), `YYYY-MM-DD`
/// (midnight UTC), a bare `YYYY` year (January 1st, UTC) or integer epoch
/// milliseconds of more than eight digits.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(number) = raw.parse::<i64>() {
        let digits = raw.trim_start_matches(|c: char| c == '-' || c == '+').len();
        if digits > MAX_CALENDAR_DIGITS {
            return Utc.timestamp_millis_opt(number).single();
        }
        if digits == 4 && number > 0 {
            return Utc
                .with_ymd_and_hms(i32::try_from(number).ok()?, 1, 1, 0, 0, 0)
                .single();
        }
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// JSON flavour of [`parse_instant`]: numbers are epoch milliseconds.
pub fn parse_instant_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_instant(text),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|millis| millis.is_finite() && millis.fract() == 0.0)
                    .map(|millis| millis as i64)
            })
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
