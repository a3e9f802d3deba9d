//! Error surface of the save engine.
//!
//! Errors fall into three classes:
//!
//! 1. **Input errors** — malformed blobs, type mismatches, version gates,
//!    checksum failures. Surfaced to the caller; the in-flight call leaves
//!    the output untouched apart from entities already created during the
//!    first deserialization pass.
//! 2. **Schema errors** — non-serializable types, custom emit without a
//!    custom parse. Raised when a codec or set is constructed, so they
//!    cannot reach a shipped game.
//! 3. **Resource limits** — over-long strings/arrays, oversized files.
//!    Distinct variants so operators can raise the limits deliberately.

use thiserror::Error;

/// Any failure surfaced at the save/load API boundary.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("save was written by a newer version: {save_version} (newest supported: {max_supported})")]
    SaveFromNewerVersion { save_version: u32, max_supported: u32 },

    #[error("save version {save_version} predates the oldest loadable version {min_supported}")]
    SaveTooOld { save_version: u32, min_supported: u32 },

    #[error("invalid save format: {0}")]
    InvalidSaveFormat(String),

    #[error("component type '{type_name}' is not registered with this codec")]
    UnregisteredComponent { type_name: String },

    #[error("entity reference {saved_id} cannot be represented")]
    InvalidEntityReference { saved_id: u64 },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },

    #[error("array length mismatch: expected {expected} elements, found {found}")]
    ArrayLengthMismatch { expected: usize, found: usize },

    #[error("missing field '{field}' in component '{component}'")]
    MissingField { component: String, field: String },

    #[error("'{value}' is not a variant of {enum_name}")]
    InvalidEnumValue { enum_name: String, value: String },

    #[error("'{tag}' is not a variant tag of {union_name}")]
    InvalidUnionTag { union_name: String, tag: String },

    #[error("checksum mismatch: expected {expected:#010x}, actual {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("string of {len} bytes exceeds the {max} byte limit")]
    StringTooLong { len: usize, max: usize },

    #[error("array of {len} elements exceeds the {max} element limit")]
    ArrayTooLong { len: usize, max: usize },

    #[error("file of {len} bytes exceeds the {max} byte limit")]
    FileTooLarge { len: u64, max: u64 },

    #[error("invalid magic bytes {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported binary format version {0}")]
    UnsupportedFormatVersion(u32),

    #[error("component '{type_name}' is not present in the save")]
    ComponentNotInSave { type_name: String },

    #[error("no migration path from version {from} toward {target}")]
    NoMigrationPath { from: u32, target: u32 },

    #[error("save metadata carries no version")]
    MissingVersion,

    #[error("save carries no metadata")]
    MissingMetadata,

    #[error("component '{type_name}' provides a custom emit but no custom parse and cannot be deserialized")]
    NotDeserializable { type_name: &'static str },
}

impl SaveError {
    /// Whether this error reports a configured resource bound rather than
    /// corrupt or incompatible data.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::StringTooLong { .. } | Self::ArrayTooLong { .. } | Self::FileTooLarge { .. }
        )
    }

    /// Whether this error should have been caught before shipping: it
    /// reports a registered schema, not a bad save.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::NotDeserializable { .. } | Self::UnregisteredComponent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_errors_are_classified() {
        assert!(SaveError::StringTooLong { len: 11, max: 10 }.is_resource_limit());
        assert!(SaveError::ArrayTooLong { len: 11, max: 10 }.is_resource_limit());
        assert!(!SaveError::MissingVersion.is_resource_limit());
    }

    #[test]
    fn schema_errors_are_classified() {
        assert!(SaveError::NotDeserializable { type_name: "Mesh" }.is_schema_error());
        assert!(!SaveError::MissingMetadata.is_schema_error());
    }

    #[test]
    fn display_names_the_versions() {
        let err = SaveError::SaveFromNewerVersion {
            save_version: 9,
            max_supported: 3,
        };
        let text = err.to_string();
        assert!(text.contains('9'));
        assert!(text.contains('3'));
    }
}
