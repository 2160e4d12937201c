use std::fmt;

use super::models::{CertificateContainerFormat, KeyDisposition};

/// Attributes of a policy key, named as the entity names them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyField {
    Name,
    Disposition,
    Usage,
    AlgorithmFamily,
    SecretValue,
    SourcePath,
    ContainerFormat,
    ContainerPassword,
    NotBefore,
    NotAfter,
}

impl KeyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyField::Name => "name",
            KeyField::Disposition => "disposition",
            KeyField::Usage => "usage",
            KeyField::AlgorithmFamily => "algorithmFamily",
            KeyField::SecretValue => "secretValue",
            KeyField::SourcePath => "sourcePath",
            KeyField::ContainerFormat => "containerFormat",
            KeyField::ContainerPassword => "containerPassword",
            KeyField::NotBefore => "notBefore",
            KeyField::NotAfter => "notAfter",
        }
    }

    /// Name of the configuration input (and descriptor key) feeding this attribute.
    pub fn input_name(&self) -> &'static str {
        match self {
            KeyField::Name => "name",
            KeyField::Disposition => "options",
            KeyField::Usage => "key_use",
            KeyField::AlgorithmFamily => "key_type",
            KeyField::SecretValue => "secret",
            KeyField::SourcePath => "file_path",
            KeyField::ContainerFormat => "certificate_kind",
            KeyField::ContainerPassword => "password",
            KeyField::NotBefore => "activation_date",
            KeyField::NotAfter => "expiration_date",
        }
    }

    pub fn is_sensitive(&self) -> bool {
        matches!(self, KeyField::SecretValue | KeyField::ContainerPassword)
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition under which a field is meaningful for a key.
#[derive(Clone, Copy, Debug)]
pub enum FieldScope {
    Always,
    Dispositions(&'static [KeyDisposition]),
    /// Upload of a password-protected container.
    ProtectedUpload,
}

impl FieldScope {
    pub fn applies(
        &self,
        disposition: KeyDisposition,
        format: Option<CertificateContainerFormat>,
    ) -> bool {
        match self {
            FieldScope::Always => true,
            FieldScope::Dispositions(dispositions) => dispositions.contains(&disposition),
            FieldScope::ProtectedUpload => {
                disposition == KeyDisposition::Upload
                    && format.is_some_and(|format| format.is_password_protected())
            }
        }
    }
}

/// key: policy-key-field-rules
/// One row of the disposition-indexed rule table.
#[derive(Clone, Copy, Debug)]
pub struct FieldRule {
    pub field: KeyField,
    /// `None` for routing-only fields that never reach the payload.
    pub wire_name: Option<&'static str>,
    pub scope: FieldScope,
    pub required: bool,
}

/// Rules for every disposition-dependent field. Row order is the payload key order.
pub const FIELD_RULES: [FieldRule; 8] = [
    FieldRule {
        field: KeyField::AlgorithmFamily,
        wire_name: Some("kty"),
        scope: FieldScope::Dispositions(&[KeyDisposition::Generate]),
        required: true,
    },
    FieldRule {
        field: KeyField::Usage,
        wire_name: Some("use"),
        scope: FieldScope::Dispositions(&[KeyDisposition::Generate, KeyDisposition::Manual]),
        required: true,
    },
    FieldRule {
        field: KeyField::SecretValue,
        wire_name: Some("k"),
        scope: FieldScope::Dispositions(&[KeyDisposition::Manual]),
        required: true,
    },
    FieldRule {
        field: KeyField::SourcePath,
        wire_name: Some("key"),
        scope: FieldScope::Dispositions(&[KeyDisposition::Upload]),
        required: true,
    },
    FieldRule {
        field: KeyField::ContainerFormat,
        wire_name: None,
        scope: FieldScope::Dispositions(&[KeyDisposition::Upload]),
        required: true,
    },
    FieldRule {
        field: KeyField::ContainerPassword,
        wire_name: Some("password"),
        scope: FieldScope::ProtectedUpload,
        required: true,
    },
    FieldRule {
        field: KeyField::NotBefore,
        wire_name: Some("nbf"),
        scope: FieldScope::Always,
        required: false,
    },
    FieldRule {
        field: KeyField::NotAfter,
        wire_name: Some("exp"),
        scope: FieldScope::Always,
        required: false,
    },
];

/// Fields that must be present for the given disposition and container format.
pub fn required_fields(
    disposition: KeyDisposition,
    format: Option<CertificateContainerFormat>,
) -> impl Iterator<Item = KeyField> {
    FIELD_RULES
        .iter()
        .filter(move |rule| rule.required && rule.scope.applies(disposition, format))
        .map(|rule| rule.field)
}

/// Wire names a payload may carry for the given disposition and format.
pub fn wire_names(
    disposition: KeyDisposition,
    format: Option<CertificateContainerFormat>,
) -> Vec<&'static str> {
    FIELD_RULES
        .iter()
        .filter(|rule| rule.scope.applies(disposition, format))
        .filter_map(|rule| rule.wire_name)
        .collect()
}
