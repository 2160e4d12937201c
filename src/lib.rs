pub mod config;
pub mod error;
pub mod file_store;
pub mod keys;
pub mod secrets;
pub mod settings;
pub mod telemetry;

pub use config::{ConfigSource, EnvInputs, InputOptions, MapInputs, TimestampUnit};
pub use error::{
    KeyFailure, MalformedInput, PolicyKeyError, SettingsError, SettingsResult, ValidationReport,
};
pub use file_store::{KeyFileSource, LocalFileSource};
pub use keys::{
    CertificateContainerFormat, KeyAlgorithmFamily, KeyDisposition, KeyField, KeyUpload,
    KeyUsage, NewPolicyKey, PayloadContext, PolicyKey, PolicyKeyDescriptor,
};
pub use secrets::{ActionsMasker, Credentials, RecordingMasker, SecretMasker};
pub use settings::{KeySource, Settings};
