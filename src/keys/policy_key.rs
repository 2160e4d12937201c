use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::TimestampUnit;
use crate::error::PolicyKeyError;
use crate::file_store::KeyFileSource;
use crate::secrets::SecretMasker;

use super::descriptor::{parse_instant_value, PolicyKeyDescriptor};
use super::models::{
    is_valid_key_name, CertificateContainerFormat, KeyAlgorithmFamily, KeyDisposition, KeyUsage,
};
use super::policy::{required_fields, KeyField, FIELD_RULES};

/// Typed inputs for [`PolicyKey::new`].
#[derive(Clone, PartialEq, Eq)]
pub struct NewPolicyKey {
    pub name: String,
    pub disposition: KeyDisposition,
    pub usage: Option<KeyUsage>,
    pub algorithm_family: Option<KeyAlgorithmFamily>,
    pub secret_value: Option<String>,
    pub source_path: Option<PathBuf>,
    pub container_format: Option<CertificateContainerFormat>,
    pub container_password: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

impl NewPolicyKey {
    pub fn new(name: impl Into<String>, disposition: KeyDisposition) -> Self {
        Self {
            name: name.into(),
            disposition,
            usage: None,
            algorithm_family: None,
            secret_value: None,
            source_path: None,
            container_format: None,
            container_password: None,
            not_before: None,
            not_after: None,
        }
    }

    /// Types the raw values of a descriptor.
    ///
    /// Fails when the descriptor carries any construction error: a missing or unknown
    /// `options`, or an unparseable timestamp. Every such problem is reported, together
    /// with an invalid name. Unrecognized enumeration values are dropped so that a
    /// required one surfaces later as a missing field.
    pub fn from_descriptor(descriptor: &PolicyKeyDescriptor) -> Result<Self, Vec<PolicyKeyError>> {
        let TypedDescriptor { key, mut errors } = Self::type_descriptor(descriptor);
        match key {
            Some(key) if errors.is_empty() => Ok(key),
            Some(key) => {
                if !is_valid_key_name(&key.name) {
                    errors.insert(0, PolicyKeyError::InvalidName);
                }
                Err(errors)
            }
            None => Err(errors),
        }
    }

    /// Types a descriptor as far as possible.
    ///
    /// The key is built whenever `options` parses. Unparseable timestamps are left
    /// unset and reported in [`TypedDescriptor::errors`] so the remaining rules can
    /// still be checked. Without a disposition no key is built and an invalid name
    /// is reported alongside.
    pub fn type_descriptor(descriptor: &PolicyKeyDescriptor) -> TypedDescriptor {
        let mut errors = Vec::new();
        let name = descriptor.name.clone().unwrap_or_default();

        let disposition = descriptor.options.as_deref().and_then(KeyDisposition::parse);
        if disposition.is_none() {
            errors.push(PolicyKeyError::InvalidDisposition);
        }
        let not_before = parse_timestamp(
            descriptor.activation_date.as_ref(),
            KeyField::NotBefore,
            &mut errors,
        );
        let not_after = parse_timestamp(
            descriptor.expiration_date.as_ref(),
            KeyField::NotAfter,
            &mut errors,
        );

        let Some(disposition) = disposition else {
            if !is_valid_key_name(&name) {
                errors.insert(0, PolicyKeyError::InvalidName);
            }
            return TypedDescriptor { key: None, errors };
        };

        let key = Self {
            name,
            disposition,
            usage: parse_choice(descriptor, KeyField::Usage, KeyUsage::parse),
            algorithm_family: parse_choice(
                descriptor,
                KeyField::AlgorithmFamily,
                KeyAlgorithmFamily::parse,
            ),
            secret_value: descriptor.secret.clone(),
            source_path: descriptor.file_path.as_ref().map(PathBuf::from),
            container_format: parse_choice(
                descriptor,
                KeyField::ContainerFormat,
                CertificateContainerFormat::parse,
            ),
            container_password: descriptor.password.clone(),
            not_before,
            not_after,
        };
        TypedDescriptor {
            key: Some(key),
            errors,
        }
    }
}

/// Result of [`NewPolicyKey::type_descriptor`].
#[derive(Debug)]
pub struct TypedDescriptor {
    pub key: Option<NewPolicyKey>,
    /// Construction errors that validation of `key` cannot detect.
    pub errors: Vec<PolicyKeyError>,
}

impl fmt::Debug for NewPolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewPolicyKey")
            .field("name", &self.name)
            .field("disposition", &self.disposition)
            .field("secret_value", &self.secret_value.as_ref().map(|_| "[redacted]"))
            .field(
                "container_password",
                &self.container_password.as_ref().map(|_| "[redacted]"),
            )
            .finish_non_exhaustive()
    }
}

fn parse_choice<T>(
    descriptor: &PolicyKeyDescriptor,
    field: KeyField,
    parse: fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = descriptor.text(field)?.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = parse(raw);
    if parsed.is_none() {
        tracing::warn!(
            field = %field,
            input = field.input_name(),
            value = raw,
            "unrecognized value, treating it as absent"
        );
    }
    parsed
}

fn parse_timestamp(
    raw: Option<&Value>,
    field: KeyField,
    errors: &mut Vec<PolicyKeyError>,
) -> Option<DateTime<Utc>> {
    let raw = raw?;
    if raw.as_str().is_some_and(|text| text.trim().is_empty()) {
        return None;
    }
    let parsed = parse_instant_value(raw);
    if parsed.is_none() {
        errors.push(PolicyKeyError::InvalidTimestamp { field });
    }
    parsed
}

/// Collaborators and options used while producing a key's wire payload.
#[derive(Clone, Copy)]
pub struct PayloadContext<'a> {
    pub files: &'a dyn KeyFileSource,
    pub masker: &'a dyn SecretMasker,
    pub timestamp_unit: TimestampUnit,
}

impl<'a> PayloadContext<'a> {
    pub fn new(files: &'a dyn KeyFileSource, masker: &'a dyn SecretMasker) -> Self {
        Self {
            files,
            masker,
            timestamp_unit: TimestampUnit::default(),
        }
    }

    pub fn with_timestamp_unit(mut self, timestamp_unit: TimestampUnit) -> Self {
        self.timestamp_unit = timestamp_unit;
        self
    }
}

/// key: policy-key
/// One key operation against a trust-framework key set.
///
/// Immutable once built. Only the fields meaningful for its [`KeyDisposition`]
/// are checked by [`PolicyKey::validate`] and emitted by
/// [`PolicyKey::to_normalized_object`]; the rest are carried but ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct PolicyKey {
    name: String,
    disposition: KeyDisposition,
    usage: Option<KeyUsage>,
    algorithm_family: Option<KeyAlgorithmFamily>,
    secret_value: Option<String>,
    source_path: Option<PathBuf>,
    container_format: Option<CertificateContainerFormat>,
    container_password: Option<String>,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

impl PolicyKey {
    pub fn new(key: NewPolicyKey) -> Self {
        Self {
            name: key.name,
            disposition: key.disposition,
            usage: key.usage,
            algorithm_family: key.algorithm_family,
            secret_value: key.secret_value,
            source_path: key.source_path,
            container_format: key.container_format,
            container_password: key.container_password,
            not_before: key.not_before,
            not_after: key.not_after,
        }
    }

    pub fn from_descriptor(descriptor: &PolicyKeyDescriptor) -> Result<Self, Vec<PolicyKeyError>> {
        NewPolicyKey::from_descriptor(descriptor).map(Self::new)
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, Vec<PolicyKeyError>> {
        Self::from_descriptor(&PolicyKeyDescriptor::from_map(map))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disposition(&self) -> KeyDisposition {
        self.disposition
    }

    pub fn usage(&self) -> Option<KeyUsage> {
        self.usage
    }

    pub fn algorithm_family(&self) -> Option<KeyAlgorithmFamily> {
        self.algorithm_family
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn container_format(&self) -> Option<CertificateContainerFormat> {
        self.container_format
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// Whether `field` holds a non-empty value.
    pub fn has_value(&self, field: KeyField) -> bool {
        match field {
            KeyField::Name => !self.name.is_empty(),
            KeyField::Disposition => true,
            KeyField::Usage => self.usage.is_some(),
            KeyField::AlgorithmFamily => self.algorithm_family.is_some(),
            KeyField::SecretValue => non_empty(&self.secret_value).is_some(),
            KeyField::SourcePath => self.present_source_path().is_some(),
            KeyField::ContainerFormat => self.container_format.is_some(),
            KeyField::ContainerPassword => non_empty(&self.container_password).is_some(),
            KeyField::NotBefore => self.not_before.is_some(),
            KeyField::NotAfter => self.not_after.is_some(),
        }
    }

    /// Checks every rule that applies to this key and reports all violations.
    pub async fn validate(&self, files: &dyn KeyFileSource) -> Result<(), Vec<PolicyKeyError>> {
        let mut errors = Vec::new();

        if !is_valid_key_name(&self.name) {
            errors.push(PolicyKeyError::InvalidName);
        }

        for field in required_fields(self.disposition, self.container_format) {
            if !self.has_value(field) {
                errors.push(PolicyKeyError::MissingRequiredField {
                    field,
                    disposition: self.disposition,
                });
            }
        }

        if self.disposition == KeyDisposition::Upload {
            if let Some(path) = self.present_source_path() {
                if !files.exists(path).await {
                    errors.push(PolicyKeyError::FileNotFound {
                        path: path.to_path_buf(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Wire names this key emits, in payload order.
    pub fn wire_names(&self) -> Vec<&'static str> {
        FIELD_RULES
            .iter()
            .filter(|rule| rule.scope.applies(self.disposition, self.container_format))
            .filter(|rule| self.has_value(rule.field))
            .filter_map(|rule| rule.wire_name)
            .collect()
    }

    /// Projects the key onto its wire object.
    ///
    /// Sensitive values are handed to the masker as they are read. Uploaded files are
    /// read here, not at construction or validation.
    pub async fn to_normalized_object(
        &self,
        ctx: &PayloadContext<'_>,
    ) -> Result<Map<String, Value>, PolicyKeyError> {
        let mut object = Map::new();
        for rule in FIELD_RULES.iter() {
            let Some(wire_name) = rule.wire_name else {
                continue;
            };
            if !rule.scope.applies(self.disposition, self.container_format) {
                continue;
            }
            if let Some(value) = self.wire_value(rule.field, ctx).await? {
                object.insert(wire_name.to_string(), value);
            }
        }
        Ok(object)
    }

    pub async fn to_json(&self, ctx: &PayloadContext<'_>) -> Result<String, PolicyKeyError> {
        let object = self.to_normalized_object(ctx).await?;
        Ok(Value::Object(object).to_string())
    }

    async fn wire_value(
        &self,
        field: KeyField,
        ctx: &PayloadContext<'_>,
    ) -> Result<Option<Value>, PolicyKeyError> {
        let value = match field {
            KeyField::Usage => self.usage.map(|usage| Value::from(usage.as_str())),
            KeyField::AlgorithmFamily => self
                .algorithm_family
                .map(|family| Value::from(family.as_str())),
            KeyField::SecretValue => non_empty(&self.secret_value).map(|secret| {
                ctx.masker.mask(secret);
                Value::from(secret)
            }),
            KeyField::ContainerPassword => non_empty(&self.container_password).map(|password| {
                ctx.masker.mask(password);
                Value::from(password)
            }),
            KeyField::SourcePath => match self.present_source_path() {
                Some(path) => {
                    let bytes = ctx.files.read_bytes(path).await.map_err(|error| {
                        tracing::warn!(?error, path = %path.display(), "failed to read key file");
                        PolicyKeyError::FileNotFound {
                            path: path.to_path_buf(),
                        }
                    })?;
                    Some(Value::from(STANDARD.encode(bytes)))
                }
                None => None,
            },
            KeyField::NotBefore => self
                .not_before
                .map(|instant| Value::from(ctx.timestamp_unit.encode(instant))),
            KeyField::NotAfter => self
                .not_after
                .map(|instant| Value::from(ctx.timestamp_unit.encode(instant))),
            KeyField::Name | KeyField::Disposition | KeyField::ContainerFormat => None,
        };
        Ok(value)
    }

    fn present_source_path(&self) -> Option<&Path> {
        self.source_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl fmt::Debug for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyKey")
            .field("name", &self.name)
            .field("disposition", &self.disposition)
            .field("usage", &self.usage)
            .field("algorithm_family", &self.algorithm_family)
            .field("secret_value", &self.secret_value.as_ref().map(|_| "[redacted]"))
            .field("source_path", &self.source_path)
            .field("container_format", &self.container_format)
            .field(
                "container_password",
                &self.container_password.as_ref().map(|_| "[redacted]"),
            )
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::LocalFileSource;
    use crate::secrets::RecordingMasker;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn generate_key() -> PolicyKey {
        PolicyKey::new(NewPolicyKey {
            usage: Some(KeyUsage::Signature),
            algorithm_family: Some(KeyAlgorithmFamily::Rsa),
            ..NewPolicyKey::new("B2C_1A_test", KeyDisposition::Generate)
        })
    }

    #[tokio::test]
    async fn generate_key_is_valid() {
        assert!(generate_key().validate(&LocalFileSource).await.is_ok());
    }

    #[tokio::test]
    async fn upload_without_file_reports_both_missing_fields() {
        let key = PolicyKey::new(NewPolicyKey {
            usage: Some(KeyUsage::Signature),
            algorithm_family: Some(KeyAlgorithmFamily::Rsa),
            ..NewPolicyKey::new("B2C_1A_test", KeyDisposition::Upload)
        });
        let errors = key.validate(&LocalFileSource).await.unwrap_err();
        assert_eq!(
            errors,
            vec![
                PolicyKeyError::MissingRequiredField {
                    field: KeyField::SourcePath,
                    disposition: KeyDisposition::Upload,
                },
                PolicyKeyError::MissingRequiredField {
                    field: KeyField::ContainerFormat,
                    disposition: KeyDisposition::Upload,
                },
            ]
        );
    }

    #[tokio::test]
    async fn validation_does_not_stop_at_first_failure() {
        let key = PolicyKey::new(NewPolicyKey::new("test", KeyDisposition::Manual));
        let errors = key.validate(&LocalFileSource).await.unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], PolicyKeyError::InvalidName);
        assert!(errors.contains(&PolicyKeyError::MissingRequiredField {
            field: KeyField::SecretValue,
            disposition: KeyDisposition::Manual,
        }));
    }

    #[tokio::test]
    async fn empty_pkcs12_password_is_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("container.pfx");
        std::fs::write(&path, b"pfx").unwrap();
        let key = PolicyKey::new(NewPolicyKey {
            source_path: Some(path),
            container_format: Some(CertificateContainerFormat::Pkcs12),
            container_password: Some(String::new()),
            ..NewPolicyKey::new("B2C_1A_container", KeyDisposition::Upload)
        });
        let errors = key.validate(&LocalFileSource).await.unwrap_err();
        assert_eq!(
            errors,
            vec![PolicyKeyError::MissingRequiredField {
                field: KeyField::ContainerPassword,
                disposition: KeyDisposition::Upload,
            }]
        );
    }

    #[tokio::test]
    async fn missing_upload_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.crt");
        let key = PolicyKey::new(NewPolicyKey {
            source_path: Some(path.clone()),
            container_format: Some(CertificateContainerFormat::X509),
            ..NewPolicyKey::new("B2C_1A_cert", KeyDisposition::Upload)
        });
        let errors = key.validate(&LocalFileSource).await.unwrap_err();
        assert_eq!(errors, vec![PolicyKeyError::FileNotFound { path }]);
    }

    #[tokio::test]
    async fn generate_payload_ignores_irrelevant_secret() {
        let key = PolicyKey::new(NewPolicyKey {
            usage: Some(KeyUsage::Signature),
            algorithm_family: Some(KeyAlgorithmFamily::Rsa),
            secret_value: Some("TestSecret".to_string()),
            ..NewPolicyKey::new("B2C_1A_test", KeyDisposition::Generate)
        });
        let masker = RecordingMasker::new();
        let ctx = PayloadContext::new(&LocalFileSource, &masker);
        assert_eq!(
            key.to_json(&ctx).await.unwrap(),
            r#"{"kty":"RSA","use":"sig"}"#
        );
        assert!(masker.masked().is_empty());
    }

    #[tokio::test]
    async fn manual_payload_masks_secret_on_read() {
        let key = PolicyKey::new(NewPolicyKey {
            usage: Some(KeyUsage::Signature),
            algorithm_family: Some(KeyAlgorithmFamily::Rsa),
            secret_value: Some("TestSecret".to_string()),
            ..NewPolicyKey::new("B2C_1A_test", KeyDisposition::Manual)
        });
        let masker = RecordingMasker::new();
        assert!(!masker.is_masked("TestSecret"));

        let ctx = PayloadContext::new(&LocalFileSource, &masker);
        assert_eq!(
            key.to_json(&ctx).await.unwrap(),
            r#"{"use":"sig","k":"TestSecret"}"#
        );
        assert!(masker.is_masked("TestSecret"));
    }

    #[tokio::test]
    async fn timestamps_follow_configured_unit() {
        let not_before = Utc.with_ymd_and_hms(2024, 9, 3, 0, 0, 0).unwrap();
        let not_after = Utc.with_ymd_and_hms(2025, 9, 3, 0, 0, 0).unwrap();
        let key = PolicyKey::new(NewPolicyKey {
            usage: Some(KeyUsage::Encryption),
            algorithm_family: Some(KeyAlgorithmFamily::Oct),
            not_before: Some(not_before),
            not_after: Some(not_after),
            ..NewPolicyKey::new("B2C_1A_enc", KeyDisposition::Generate)
        });
        let masker = RecordingMasker::new();

        let seconds = PayloadContext::new(&LocalFileSource, &masker)
            .with_timestamp_unit(TimestampUnit::Seconds);
        assert_eq!(
            Value::Object(key.to_normalized_object(&seconds).await.unwrap()),
            json!({ "kty": "OCT", "use": "enc", "nbf": 1_725_321_600_i64, "exp": 1_756_857_600_i64 })
        );

        let millis = seconds.with_timestamp_unit(TimestampUnit::Milliseconds);
        let object = key.to_normalized_object(&millis).await.unwrap();
        assert_eq!(object["nbf"], json!(1_725_321_600_000_i64));
        assert_eq!(object["exp"], json!(1_756_857_600_000_i64));
    }

    #[tokio::test]
    async fn upload_payload_reads_file_lazily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("later.crt");
        let key = PolicyKey::new(NewPolicyKey {
            source_path: Some(path.clone()),
            container_format: Some(CertificateContainerFormat::X509),
            container_password: Some("unused".to_string()),
            ..NewPolicyKey::new("B2C_1A_cert", KeyDisposition::Upload)
        });
        std::fs::write(&path, b"hello").unwrap();

        let masker = RecordingMasker::new();
        let ctx = PayloadContext::new(&LocalFileSource, &masker);
        assert_eq!(key.to_json(&ctx).await.unwrap(), r#"{"key":"aGVsbG8="}"#);
        assert!(!masker.is_masked("unused"));

        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            key.to_json(&ctx).await.unwrap_err(),
            PolicyKeyError::FileNotFound { path }
        );
    }

    #[test]
    fn descriptor_with_bad_disposition_reports_name_too() {
        let map = json!({ "name": "plain", "options": "rotate", "expiration_date": "soon" });
        let errors = PolicyKey::from_map(map.as_object().unwrap()).unwrap_err();
        assert_eq!(
            errors,
            vec![
                PolicyKeyError::InvalidName,
                PolicyKeyError::InvalidDisposition,
                PolicyKeyError::InvalidTimestamp {
                    field: KeyField::NotAfter
                },
            ]
        );
    }

    #[test]
    fn typing_keeps_the_key_when_only_a_timestamp_is_bad() {
        let map = json!({ "name": "B2C_1A_x", "options": "upload", "activation_date": "garbage" });
        let descriptor = PolicyKeyDescriptor::from_map(map.as_object().unwrap());
        let typed = NewPolicyKey::type_descriptor(&descriptor);
        let key = typed.key.unwrap();
        assert_eq!(key.disposition, KeyDisposition::Upload);
        assert_eq!(key.not_before, None);
        assert_eq!(
            typed.errors,
            vec![PolicyKeyError::InvalidTimestamp {
                field: KeyField::NotBefore
            }]
        );
        assert!(NewPolicyKey::from_descriptor(&descriptor).is_err());
    }

    #[test]
    fn unknown_choice_is_dropped() {
        let map = json!({ "name": "B2C_1A_x", "options": "generate", "key_use": "verify", "key_type": "rsa" });
        let key = PolicyKey::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(key.usage(), None);
        assert_eq!(key.algorithm_family(), Some(KeyAlgorithmFamily::Rsa));
    }

    #[test]
    fn debug_never_shows_secrets() {
        let key = PolicyKey::new(NewPolicyKey {
            secret_value: Some("TestSecret".to_string()),
            container_password: Some("TestPassword".to_string()),
            ..NewPolicyKey::new("B2C_1A_test", KeyDisposition::Manual)
        });
        let debug = format!("{key:?}");
        assert!(!debug.contains("TestSecret"));
        assert!(!debug.contains("TestPassword"));
        assert!(debug.contains("B2C_1A_test"));
    }

    #[test]
    fn wire_names_only_cover_present_fields() {
        assert_eq!(generate_key().wire_names(), vec!["kty", "use"]);
    }
}
