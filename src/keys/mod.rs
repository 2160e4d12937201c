//! Trust-framework policy keys: typing, validation and wire projection.

pub mod descriptor;
pub mod models;
pub mod policy;
pub mod policy_key;
pub mod upload;

pub use descriptor::{parse_instant, parse_instant_value, to_camel_case, PolicyKeyDescriptor};
pub use models::{
    is_valid_key_name, with_name_prefix, CertificateContainerFormat, KeyAlgorithmFamily,
    KeyDisposition, KeyUsage, KEY_NAME_PREFIX,
};
pub use policy::{required_fields, wire_names, FieldRule, FieldScope, KeyField, FIELD_RULES};
pub use policy_key::{NewPolicyKey, PayloadContext, PolicyKey, TypedDescriptor};
pub use upload::{upload_action, KeyUpload, KEY_SETS_PATH};
