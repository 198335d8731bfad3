//! Content fingerprinting for idempotent credential change detection
//!
//! The fingerprint is a SHA-256 digest over the canonical serialization of a
//! Secret's data. Secret data is a `BTreeMap`, so serialization is key-sorted
//! and two logically identical records always produce the same digest no
//! matter the order their entries were inserted in.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use sha2::{Digest, Sha256};

use crate::controller::error::Result;

/// Secret payload: account name to opaque password material
pub type SecretData = BTreeMap<String, ByteString>;

/// Compute the content fingerprint of a credential record
pub fn fingerprint(data: &SecretData) -> Result<String> {
    let canonical = serde_json::to_vec(data)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Whether the source record (identified by its fingerprint) differs from the
/// mirror record's current contents
pub fn changed(source_fingerprint: &str, mirror: &Secret) -> Result<bool> {
    let empty = SecretData::new();
    let mirror_data = mirror.data.as_ref().unwrap_or(&empty);
    Ok(fingerprint(mirror_data)? != source_fingerprint)
}
