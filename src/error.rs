use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::keys::{KeyDisposition, KeyField, KEY_NAME_PREFIX};

/// Violation found on a single policy key. Never carries a field value, only its name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyKeyError {
    #[error("name must be non-empty and start with `{}`", KEY_NAME_PREFIX)]
    InvalidName,
    #[error("options must be one of `generate`, `manual` or `upload`")]
    InvalidDisposition,
    #[error("`{field}` (input `{}`) is required when options is `{disposition}`", .field.input_name())]
    MissingRequiredField {
        field: KeyField,
        disposition: KeyDisposition,
    },
    #[error("key file `{}` does not exist or is not readable", .path.display())]
    FileNotFound { path: PathBuf },
    #[error("`{field}` (input `{}`) is not a valid timestamp", .field.input_name())]
    InvalidTimestamp { field: KeyField },
}

/// Reason the multi-key `policy_keys` input was rejected.
#[derive(Debug, Error)]
pub enum MalformedInput {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON array of key descriptors")]
    NotAnArray,
    #[error("element {index} is not a JSON object")]
    NotAnObject { index: usize },
}

/// Failures of one key, identified by its position in the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyFailure {
    pub index: usize,
    pub name: String,
    pub errors: Vec<PolicyKeyError>,
}

/// key: settings-validation-report
/// Consolidated validation verdict over every configured key, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub failures: Vec<KeyFailure>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.failures.iter().map(|failure| failure.errors.len()).sum()
    }

    /// All errors reported for the key at `index`.
    pub fn errors_for(&self, index: usize) -> &[PolicyKeyError] {
        self.failures
            .iter()
            .find(|failure| failure.index == index)
            .map(|failure| failure.errors.as_slice())
            .unwrap_or_default()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} policy key(s) failed validation",
            self.failures.len()
        )?;
        for failure in &self.failures {
            let name = if failure.name.is_empty() {
                "<unnamed>"
            } else {
                failure.name.as_str()
            };
            write!(f, "\n  key #{} ({name}):", failure.index)?;
            for error in &failure.errors {
                write!(f, "\n    - {error}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse `policy_keys`: {0}")]
    MalformedInput(#[source] MalformedInput),
    #[error("missing required input `{field}`")]
    MissingRequiredField { field: String },
    #[error("invalid input `{input}`: {reason}")]
    InvalidInput { input: String, reason: String },
    #[error("{0}")]
    Validation(ValidationReport),
    #[error("failed to serialize key #{index} ({name}): {source}")]
    Serialization {
        index: usize,
        name: String,
        #[source]
        source: PolicyKeyError,
    },
}

impl From<MalformedInput> for SettingsError {
    fn from(err: MalformedInput) -> Self {
        SettingsError::MalformedInput(err)
    }
}

pub type SettingsResult<T> = Result<T, SettingsError>;
