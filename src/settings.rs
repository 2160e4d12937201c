use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::config::{ConfigSource, InputOptions, TimestampUnit};
use crate::error::{
    KeyFailure, MalformedInput, PolicyKeyError, SettingsError, SettingsResult, ValidationReport,
};
use crate::file_store::KeyFileSource;
use crate::keys::{
    with_name_prefix, KeyField, KeyUpload, NewPolicyKey, PayloadContext, PolicyKey,
    PolicyKeyDescriptor, TypedDescriptor,
};
use crate::secrets::{Credentials, SecretMasker};

/// Input holding the multi-key JSON array.
pub const POLICY_KEYS_INPUT: &str = "policy_keys";

/// Which input path produced the configured keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// The single-key inputs (`name`, `options`, ...).
    SingleKey,
    /// The `policy_keys` JSON array.
    PolicyKeys,
}

#[derive(Debug)]
struct KeyEntry {
    name: String,
    /// Unset when `options` could not be typed.
    key: Option<PolicyKey>,
    construction_errors: Vec<PolicyKeyError>,
}

impl KeyEntry {
    fn from_descriptor(descriptor: &PolicyKeyDescriptor) -> Self {
        let TypedDescriptor { key, errors } = NewPolicyKey::type_descriptor(descriptor);
        Self {
            name: descriptor.name.clone().unwrap_or_default(),
            key: key.map(PolicyKey::new),
            construction_errors: errors,
        }
    }

    fn built_key(&self) -> Option<&PolicyKey> {
        self.key
            .as_ref()
            .filter(|_| self.construction_errors.is_empty())
    }

    async fn errors(&self, files: &dyn KeyFileSource) -> Vec<PolicyKeyError> {
        let mut errors = match &self.key {
            Some(key) => key.validate(files).await.err().unwrap_or_default(),
            None => Vec::new(),
        };
        errors.extend(self.construction_errors.iter().cloned());
        errors
    }
}

/// key: settings
/// Policy keys and transport credentials read from one configuration snapshot.
pub struct Settings {
    key_source: KeySource,
    single_key: PolicyKeyDescriptor,
    policy_keys_json: Option<String>,
    entries: Vec<KeyEntry>,
    credentials: Credentials,
    timestamp_unit: TimestampUnit,
}

impl Settings {
    /// Reads every input and builds the key entries.
    ///
    /// A non-empty `policy_keys` array wins over the single-key inputs. Without it,
    /// `name` and `options` are required. Keys that cannot be typed are kept and
    /// surface in [`Settings::validate`].
    pub fn from_source(source: &dyn ConfigSource) -> SettingsResult<Self> {
        let policy_keys_json = source.input(POLICY_KEYS_INPUT, InputOptions::default())?;
        let descriptors = match policy_keys_json.as_deref() {
            Some(raw) => parse_policy_keys(raw)?,
            None => Vec::new(),
        };

        let single_key = read_single_key(source, descriptors.is_empty())?;
        let (key_source, entries) = if descriptors.is_empty() {
            let mut descriptor = single_key.clone();
            descriptor.name = descriptor.name.as_deref().map(with_name_prefix);
            (
                KeySource::SingleKey,
                vec![KeyEntry::from_descriptor(&descriptor)],
            )
        } else {
            if single_key.name.is_some() || single_key.options.is_some() {
                tracing::debug!("`policy_keys` is set, ignoring single-key inputs");
            }
            (
                KeySource::PolicyKeys,
                descriptors.iter().map(KeyEntry::from_descriptor).collect(),
            )
        };

        let duplicates = duplicate_names(&entries);
        if !duplicates.is_empty() {
            tracing::warn!(?duplicates, "policy key names are not unique");
        }

        let credentials = Credentials {
            tenant_id: optional(source, "tenant_id")?,
            client_id: optional(source, "client_id")?,
            client_secret: optional(source, "client_secret")?,
        };
        let timestamp_unit = TimestampUnit::from_source(source)?;

        tracing::info!(
            source = ?key_source,
            keys = entries.len(),
            %timestamp_unit,
            "loaded policy key settings"
        );

        Ok(Self {
            key_source,
            single_key,
            policy_keys_json,
            entries,
            credentials,
            timestamp_unit,
        })
    }

    pub fn key_source(&self) -> KeySource {
        self.key_source
    }

    /// Number of configured keys, including those that could not be typed.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Keys built without construction errors, in input order.
    pub fn policy_keys(&self) -> Vec<&PolicyKey> {
        self.entries.iter().filter_map(KeyEntry::built_key).collect()
    }

    /// Names configured for more than one key, in order of first appearance.
    pub fn duplicate_names(&self) -> Vec<&str> {
        duplicate_names(&self.entries)
    }

    /// Raw single-key inputs as read, before the name prefix is applied.
    pub fn single_key_inputs(&self) -> &PolicyKeyDescriptor {
        &self.single_key
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn timestamp_unit(&self) -> TimestampUnit {
        self.timestamp_unit
    }

    /// Validates every key and fails with one report covering all of them.
    pub async fn validate(&self, files: &dyn KeyFileSource) -> SettingsResult<()> {
        let checks = self.entries.iter().enumerate().map(|(index, entry)| async move {
            KeyFailure {
                index,
                name: entry.name.clone(),
                errors: entry.errors(files).await,
            }
        });

        let report = ValidationReport {
            failures: join_all(checks)
                .await
                .into_iter()
                .filter(|failure| !failure.errors.is_empty())
                .collect(),
        };

        if report.is_empty() {
            tracing::info!(keys = self.entries.len(), "policy keys validated");
            return Ok(());
        }

        tracing::warn!(
            failed_keys = report.failures.len(),
            errors = report.error_count(),
            "policy key validation failed"
        );
        Err(SettingsError::Validation(report))
    }

    /// Validates all keys, then builds their uploads in input order. Nothing is
    /// produced unless every key is valid.
    pub async fn prepare_uploads(
        &self,
        files: &dyn KeyFileSource,
        masker: &dyn SecretMasker,
    ) -> SettingsResult<Vec<KeyUpload>> {
        self.validate(files).await?;

        let ctx = PayloadContext::new(files, masker).with_timestamp_unit(self.timestamp_unit);
        let mut uploads = Vec::with_capacity(self.entries.len());
        for (index, key) in self.policy_keys().into_iter().enumerate() {
            let upload = KeyUpload::prepare(key, &ctx).await.map_err(|source| {
                SettingsError::Serialization {
                    index,
                    name: key.name().to_string(),
                    source,
                }
            })?;
            tracing::debug!(
                key_set = %upload.key_set_id,
                endpoint = %upload.endpoint,
                fields = ?upload.wire_names(),
                "prepared policy key upload"
            );
            uploads.push(upload);
        }
        Ok(uploads)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("key_source", &self.key_source)
            .field("single_key", &self.single_key)
            .field("policy_keys_json", &self.policy_keys_json.as_ref().map(|_| "[redacted]"))
            .field("entries", &self.entries)
            .field("credentials", &self.credentials)
            .field("timestamp_unit", &self.timestamp_unit)
            .finish()
    }
}

fn duplicate_names(entries: &[KeyEntry]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for entry in entries.iter().filter(|entry| !entry.name.is_empty()) {
        let name = entry.name.as_str();
        if !seen.insert(name) && !duplicates.contains(&name) {
            duplicates.push(name);
        }
    }
    duplicates
}

/// Parses the `policy_keys` input. An empty array yields no descriptors.
pub fn parse_policy_keys(raw: &str) -> Result<Vec<PolicyKeyDescriptor>, MalformedInput> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Array(items) = value else {
        return Err(MalformedInput::NotAnArray);
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object()
                .map(PolicyKeyDescriptor::from_map)
                .ok_or(MalformedInput::NotAnObject { index })
        })
        .collect()
}

fn read_single_key(
    source: &dyn ConfigSource,
    required: bool,
) -> SettingsResult<PolicyKeyDescriptor> {
    let text = |field: KeyField| source.input(field.input_name(), InputOptions::default());
    let instant = |field: KeyField| -> SettingsResult<Option<Value>> {
        Ok(text(field)?.map(Value::String))
    };

    Ok(PolicyKeyDescriptor {
        name: source.input(KeyField::Name.input_name(), InputOptions::required(required))?,
        options: source.input(
            KeyField::Disposition.input_name(),
            InputOptions::required(required),
        )?,
        key_use: text(KeyField::Usage)?,
        key_type: text(KeyField::AlgorithmFamily)?,
        secret: text(KeyField::SecretValue)?,
        file_path: text(KeyField::SourcePath)?,
        certificate_kind: text(KeyField::ContainerFormat)?,
        password: text(KeyField::ContainerPassword)?,
        activation_date: instant(KeyField::NotBefore)?,
        expiration_date: instant(KeyField::NotAfter)?,
    })
}

fn optional(source: &dyn ConfigSource, name: &str) -> SettingsResult<String> {
    Ok(source
        .input(name, InputOptions::default())?
        .unwrap_or_default())
}

/// Descriptor object for a single key, in the `policy_keys` element format.
pub fn descriptor_object(descriptor: &PolicyKeyDescriptor) -> Map<String, Value> {
    let mut object = Map::new();
    for field in [
        KeyField::Name,
        KeyField::Disposition,
        KeyField::Usage,
        KeyField::AlgorithmFamily,
        KeyField::SecretValue,
        KeyField::SourcePath,
        KeyField::ContainerFormat,
        KeyField::ContainerPassword,
    ] {
        if let Some(value) = descriptor.text(field) {
            object.insert(field.input_name().to_string(), Value::from(value));
        }
    }
    if let Some(value) = &descriptor.activation_date {
        object.insert(KeyField::NotBefore.input_name().to_string(), value.clone());
    }
    if let Some(value) = &descriptor.expiration_date {
        object.insert(KeyField::NotAfter.input_name().to_string(), value.clone());
    }
    object
}
