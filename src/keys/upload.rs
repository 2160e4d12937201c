use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::PolicyKeyError;

use super::models::{CertificateContainerFormat, KeyDisposition};
use super::policy::FIELD_RULES;
use super::policy_key::{PayloadContext, PolicyKey};

/// Collection path of trust-framework key sets.
pub const KEY_SETS_PATH: &str = "trustFramework/keySets";

/// Key-set action that consumes the payload of a key with this disposition and format.
pub fn upload_action(
    disposition: KeyDisposition,
    format: Option<CertificateContainerFormat>,
) -> &'static str {
    match (disposition, format) {
        (KeyDisposition::Generate, _) => "generateKey",
        (KeyDisposition::Manual, _) => "uploadSecret",
        (KeyDisposition::Upload, Some(CertificateContainerFormat::X509)) => "uploadCertificate",
        (KeyDisposition::Upload, _) => "uploadPkcs12",
    }
}

/// key: key-upload-plan
/// One call for the key-store client: ensure the key set exists, then post the payload
/// to `endpoint`.
#[derive(Clone, PartialEq)]
pub struct KeyUpload {
    pub key_set_id: String,
    pub endpoint: String,
    pub payload: Map<String, Value>,
}

impl KeyUpload {
    pub async fn prepare(
        key: &PolicyKey,
        ctx: &PayloadContext<'_>,
    ) -> Result<Self, PolicyKeyError> {
        let payload = key.to_normalized_object(ctx).await?;
        let action = upload_action(key.disposition(), key.container_format());
        Ok(Self {
            key_set_id: key.name().to_string(),
            endpoint: format!("{KEY_SETS_PATH}/{}/{action}", key.name()),
            payload,
        })
    }

    /// Body of the key-set creation request sent to [`KEY_SETS_PATH`].
    pub fn key_set_body(&self) -> Value {
        json!({ "id": self.key_set_id })
    }

    pub fn payload_json(&self) -> String {
        Value::Object(self.payload.clone()).to_string()
    }

    pub fn wire_names(&self) -> Vec<&str> {
        self.payload.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for KeyUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload: Vec<(&str, &dyn fmt::Debug)> = self
            .payload
            .iter()
            .map(|(name, value)| {
                let sensitive = FIELD_RULES.iter().any(|rule| {
                    rule.wire_name == Some(name.as_str()) && rule.field.is_sensitive()
                });
                let shown: &dyn fmt::Debug = if sensitive { &"[redacted]" } else { value };
                (name.as_str(), shown)
            })
            .collect();
        f.debug_struct("KeyUpload")
            .field("key_set_id", &self.key_set_id)
            .field("endpoint", &self.endpoint)
            .field("payload", &payload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::LocalFileSource;
    use crate::keys::{KeyUsage, NewPolicyKey};
    use crate::secrets::RecordingMasker;

    #[test]
    fn actions_per_disposition() {
        assert_eq!(upload_action(KeyDisposition::Generate, None), "generateKey");
        assert_eq!(upload_action(KeyDisposition::Manual, None), "uploadSecret");
        assert_eq!(
            upload_action(
                KeyDisposition::Upload,
                Some(CertificateContainerFormat::X509)
            ),
            "uploadCertificate"
        );
        assert_eq!(
            upload_action(
                KeyDisposition::Upload,
                Some(CertificateContainerFormat::Pkcs12)
            ),
            "uploadPkcs12"
        );
    }

    #[tokio::test]
    async fn prepares_manual_upload() {
        let key = PolicyKey::new(NewPolicyKey {
            usage: Some(KeyUsage::Encryption),
            secret_value: Some("TestSecret".to_string()),
            ..NewPolicyKey::new("B2C_1A_Secret", KeyDisposition::Manual)
        });
        let masker = RecordingMasker::new();
        let ctx = PayloadContext::new(&LocalFileSource, &masker);
        let upload = KeyUpload::prepare(&key, &ctx).await.unwrap();

        assert_eq!(upload.endpoint, "trustFramework/keySets/B2C_1A_Secret/uploadSecret");
        assert_eq!(upload.key_set_body(), json!({ "id": "B2C_1A_Secret" }));
        assert_eq!(upload.wire_names(), vec!["use", "k"]);
        assert_eq!(upload.payload_json(), r#"{"use":"enc","k":"TestSecret"}"#);

        let debug = format!("{upload:?}");
        assert!(!debug.contains("TestSecret"));
        assert!(debug.contains("uploadSecret"));
    }
}
