use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix every trust-framework key set name must carry.
pub const KEY_NAME_PREFIX: &str = "B2C_1A_";

/// True when `name` carries [`KEY_NAME_PREFIX`] followed by at least one character.
pub fn is_valid_key_name(name: &str) -> bool {
    name.len() > KEY_NAME_PREFIX.len() && name.starts_with(KEY_NAME_PREFIX)
}

/// Prepends [`KEY_NAME_PREFIX`] unless `name` already carries it.
pub fn with_name_prefix(name: &str) -> String {
    if name.starts_with(KEY_NAME_PREFIX) {
        name.to_string()
    } else {
        format!("{KEY_NAME_PREFIX}{name}")
    }
}

/// key: policy-key-disposition
/// Selects how the key material reaches the key store and which other fields are meaningful.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KeyDisposition {
    Generate,
    Manual,
    Upload,
}

impl KeyDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyDisposition::Generate => "generate",
            KeyDisposition::Manual => "manual",
            KeyDisposition::Upload => "upload",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "generate" => Some(KeyDisposition::Generate),
            "manual" => Some(KeyDisposition::Manual),
            "upload" => Some(KeyDisposition::Upload),
            _ => None,
        }
    }
}

impl fmt::Display for KeyDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: policy-key-family
/// Key family the service generates (`kty`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum KeyAlgorithmFamily {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "OCT")]
    Oct,
}

impl KeyAlgorithmFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithmFamily::Rsa => "RSA",
            KeyAlgorithmFamily::Oct => "OCT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RSA" => Some(KeyAlgorithmFamily::Rsa),
            "OCT" => Some(KeyAlgorithmFamily::Oct),
            _ => None,
        }
    }
}

impl fmt::Display for KeyAlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: policy-key-usage
/// Cryptographic purpose of the key (`use`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::Signature => "sig",
            KeyUsage::Encryption => "enc",
        }
    }

    /// Accepts the wire form (`sig`, `enc`) as well as the long form (`signature`, `encryption`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sig" | "signature" => Some(KeyUsage::Signature),
            "enc" | "encryption" => Some(KeyUsage::Encryption),
            _ => None,
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: policy-key-container
/// Encoding of an uploaded certificate file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CertificateContainerFormat {
    #[serde(rename = "X509")]
    X509,
    #[serde(rename = "PKCS12")]
    Pkcs12,
}

impl CertificateContainerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateContainerFormat::X509 => "X509",
            CertificateContainerFormat::Pkcs12 => "PKCS12",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "X509" => Some(CertificateContainerFormat::X509),
            "PKCS12" => Some(CertificateContainerFormat::Pkcs12),
            _ => None,
        }
    }

    /// Password-protected containers carry a `password` on the wire.
    pub fn is_password_protected(&self) -> bool {
        matches!(self, CertificateContainerFormat::Pkcs12)
    }
}

impl fmt::Display for CertificateContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
