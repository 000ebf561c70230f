use std::path::{Component, Path};

use crate::StoreError;

/// Validates a fingerprint before it is used as a directory name.
///
/// Fingerprints are hex digests; anything that is not plain ASCII
/// alphanumeric could name a path outside the upload root.
pub fn validate_fingerprint(fingerprint: &str) -> Result<(), StoreError> {
    if fingerprint.is_empty() {
        return Err(StoreError::InvalidInput("empty fingerprint".into()));
    }
    if !fingerprint.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(StoreError::InvalidInput(format!(
            "fingerprint must be alphanumeric: {fingerprint}"
        )));
    }
    Ok(())
}

/// Validates a file extension (as returned by `extension_of`) before it is
/// appended to a file name in the upload root.
///
/// Rejects separators, traversal and anything that would not stay a single
/// normal path component.
pub fn validate_extension(ext: &str) -> Result<(), StoreError> {
    if ext.is_empty() {
        return Ok(());
    }
    if ext.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidInput(format!(
            "extension contains a path separator: {ext}"
        )));
    }

    let mut components = Path::new(ext).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::InvalidInput(format!(
            "extension is not a plain name: {ext}"
        ))),
    }
}
