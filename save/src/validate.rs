//! Structural validation and integrity checking of save blobs.
//!
//! The checksum covers a canonical re-emission of the `components`
//! sub-tree: compact text with object keys sorted lexicographically at
//! every level. Canonicalization makes the checksum independent of
//! whitespace and emission order, so `add_checksum` and `validate` agree
//! no matter which codec produced the blob.

use crc32fast::Hasher;

use crate::error::SaveError;
use crate::text;
use crate::value::Value;

/// Verdict of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// The blob has no `meta` object.
    MissingMetadata,
    /// The blob is structurally broken; the reason is human-readable.
    InvalidStructure(String),
    /// `meta.version` exceeds the newest accepted version.
    VersionMismatch { save_version: u32, max_supported: u32 },
    /// `meta.checksum` does not match the components sub-tree.
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Structurally checks a text blob and, when a checksum is present,
/// verifies it. Checks run in order: parse, root object, metadata
/// presence, version gate, checksum, components object.
pub fn validate(blob: &[u8], max_version: u32) -> Validity {
    let root = match text::from_bytes(blob) {
        Ok(root) => root,
        Err(err) => return Validity::InvalidStructure(err.to_string()),
    };
    if root.as_map().is_none() {
        return Validity::InvalidStructure("save root is not an object".to_owned());
    }

    let Some(meta) = root.get("meta") else {
        return Validity::MissingMetadata;
    };
    if meta.as_map().is_none() {
        return Validity::InvalidStructure("meta is not an object".to_owned());
    }

    let Some(version) = meta.get("version").and_then(Value::as_u32) else {
        return Validity::InvalidStructure("meta.version is not an integer".to_owned());
    };
    if version > max_version {
        return Validity::VersionMismatch {
            save_version: version,
            max_supported: max_version,
        };
    }

    if let Some(checksum) = meta.get("checksum") {
        let Some(expected) = checksum.as_u32() else {
            return Validity::InvalidStructure("meta.checksum is not an integer".to_owned());
        };
        let actual = match components_checksum(&root) {
            Ok(actual) => actual,
            Err(err) => return Validity::InvalidStructure(err.to_string()),
        };
        if expected != actual {
            return Validity::ChecksumMismatch { expected, actual };
        }
    }

    match root.get("components") {
        Some(components) if components.as_map().is_some() => Validity::Valid,
        Some(_) => Validity::InvalidStructure("components is not an object".to_owned()),
        None => Validity::InvalidStructure("save has no components object".to_owned()),
    }
}

/// Re-emits `blob` with `meta.checksum` set to the CRC-32 of its
/// components sub-tree. The output is compact text.
pub fn add_checksum(blob: &[u8]) -> Result<Vec<u8>, SaveError> {
    let mut root = text::from_bytes(blob)?;
    if root.as_map().is_none() {
        return Err(SaveError::InvalidSaveFormat(
            "save root is not an object".to_owned(),
        ));
    }
    let checksum = components_checksum(&root)?;

    if root.get("meta").is_none() {
        if let Some(entries) = root.as_map_mut() {
            entries.insert(0, ("meta".to_owned(), Value::Map(Vec::new())));
        }
    }
    if let Some(meta) = root.get_mut("meta") {
        meta.insert("checksum", Value::U64(checksum as u64));
    }
    text::to_bytes(&root, false)
}

/// CRC-32 of the canonical form of the blob's `components` sub-tree.
pub fn components_checksum(root: &Value) -> Result<u32, SaveError> {
    let components = root.get("components").ok_or_else(|| {
        SaveError::InvalidSaveFormat("save has no components object".to_owned())
    })?;
    let canonical_bytes = text::to_bytes(&canonicalize(components), false)?;
    Ok(crc32(&canonical_bytes))
}

/// Stable CRC-32 (IEEE) over arbitrary bytes.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Deep copy with object keys sorted lexicographically at every level.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::List(items) => Value::List(items.iter().map(canonicalize).collect()),
        Value::Map(entries) => {
            let mut sorted: Vec<(String, Value)> = entries
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Map(sorted)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> Vec<u8> {
        br#"{"meta":{"version":1},"components":{"Position":[{"entt":0,"data":{"x":1.5,"y":2}}]}}"#
            .to_vec()
    }

    #[test]
    fn valid_blob_passes() {
        assert_eq!(validate(&blob(), 1), Validity::Valid);
    }

    #[test]
    fn parse_failure_is_invalid_structure() {
        assert!(matches!(
            validate(b"not a save", 1),
            Validity::InvalidStructure(_)
        ));
    }

    #[test]
    fn missing_meta_is_reported() {
        assert_eq!(
            validate(br#"{"components":{}}"#, 1),
            Validity::MissingMetadata
        );
    }

    #[test]
    fn version_above_max_is_rejected() {
        assert_eq!(
            validate(br#"{"meta":{"version":9},"components":{}}"#, 3),
            Validity::VersionMismatch {
                save_version: 9,
                max_supported: 3
            }
        );
    }

    #[test]
    fn missing_components_is_invalid() {
        assert!(matches!(
            validate(br#"{"meta":{"version":1}}"#, 1),
            Validity::InvalidStructure(_)
        ));
    }

    #[test]
    fn checksummed_blob_validates() {
        let stamped = add_checksum(&blob()).unwrap();
        assert_eq!(validate(&stamped, 1), Validity::Valid);
    }

    #[test]
    fn mutating_components_breaks_the_checksum() {
        let stamped = add_checksum(&blob()).unwrap();
        let corrupted = String::from_utf8(stamped).unwrap().replace("1.5", "1.6");
        assert!(matches!(
            validate(corrupted.as_bytes(), 1),
            Validity::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn checksum_ignores_whitespace_and_key_order() {
        let a = br#"{"components":{"B":[],"A":[{"entt":0,"data":{"y":2,"x":1}}]}}"#;
        let b = br#"{ "components" : { "A": [ { "data": { "x": 1, "y": 2 }, "entt": 0 } ], "B": [] } }"#;
        let crc_a = components_checksum(&text::from_bytes(a).unwrap()).unwrap();
        let crc_b = components_checksum(&text::from_bytes(b).unwrap()).unwrap();
        assert_eq!(crc_a, crc_b);
    }

    #[test]
    fn crc32_is_stable() {
        // IEEE CRC-32 of "123456789" is the classic check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"abc"), crc32(b"abc"));
    }
}
