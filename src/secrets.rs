use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// key: secret-masker
/// Registers values the surrounding runner must redact from its logs.
pub trait SecretMasker: Send + Sync {
    /// Idempotent; empty values are ignored.
    fn mask(&self, value: &str);
}

/// Emits the runner's `::add-mask::` workflow command on stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionsMasker;

impl SecretMasker for ActionsMasker {
    fn mask(&self, value: &str) {
        if value.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        for line in value.lines().filter(|line| !line.trim().is_empty()) {
            if let Err(error) = writeln!(stdout, "::add-mask::{line}") {
                tracing::warn!(?error, "failed to register secret mask");
            }
        }
    }
}

/// Keeps registered values in memory.
#[derive(Debug, Default)]
pub struct RecordingMasker {
    values: Mutex<BTreeSet<String>>,
}

impl RecordingMasker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn masked(&self) -> Vec<String> {
        self.values
            .lock()
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_masked(&self, value: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.contains(value))
            .unwrap_or(false)
    }

    /// Replaces every registered value in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        let Ok(values) = self.values.lock() else {
            return text.to_string();
        };
        // Longest first so a secret containing another secret is fully hidden.
        let mut ordered: Vec<&String> = values.iter().collect();
        ordered.sort_by_key(|value| std::cmp::Reverse(value.len()));
        ordered
            .into_iter()
            .fold(text.to_string(), |acc, value| acc.replace(value.as_str(), "***"))
    }
}

impl SecretMasker for RecordingMasker {
    fn mask(&self, value: &str) {
        if value.is_empty() {
            return;
        }
        if let Ok(mut values) = self.values.lock() {
            values.insert(value.to_string());
        }
    }
}

/// key: transport-credentials
/// Tenant and client identifiers handed through to the key-store client.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn register_secrets(&self, masker: &dyn SecretMasker) {
        masker.mask(&self.tenant_id);
        masker.mask(&self.client_id);
        masker.mask(&self.client_secret);
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &"[redacted]")
            .field("client_id", &"[redacted]")
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_masker_is_idempotent() {
        let masker = RecordingMasker::new();
        masker.mask("hunter2");
        masker.mask("hunter2");
        masker.mask("");
        assert_eq!(masker.masked(), vec!["hunter2".to_string()]);
    }

    #[test]
    fn redact_hides_longest_match_first() {
        let masker = RecordingMasker::new();
        masker.mask("abc");
        masker.mask("abcdef");
        assert_eq!(masker.redact("token=abcdef;x=abc"), "token=***;x=***");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials {
            tenant_id: "contoso.onmicrosoft.com".to_string(),
            client_id: "client-123".to_string(),
            client_secret: "s3cr3t".to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("client-123"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn register_secrets_masks_all_identifiers() {
        let masker = RecordingMasker::new();
        let credentials = Credentials {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        };
        assert!(credentials.is_complete());
        credentials.register_secrets(&masker);
        assert!(masker.is_masked("tenant"));
        assert!(masker.is_masked("client"));
        assert!(masker.is_masked("secret"));
    }
}
