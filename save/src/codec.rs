//! The registry codec: serializing a registry into a save and populating a
//! registry from one.
//!
//! Encoding walks the component set in declared order and emits one block
//! per type. Decoding is two-pass: pass one allocates a fresh entity for
//! every distinct saved id and records the mapping, pass two rewrites the
//! entity references inside each record through that table and attaches
//! the decoded components. The remap table lives only for the duration of
//! one load.
//!
//! A failed load returns the registry exactly as the failing call found
//! it, except that entities created during pass one are not rolled back.
//! Callers that need atomicity decode into a throwaway registry and swap.

use std::collections::HashMap;

use time::OffsetDateTime;

use crate::binary::{self, reader::ByteReader, writer::ByteWriter};
use crate::component::TypeDescriptor;
use crate::config::SaveConfig;
use crate::entity::Entity;
use crate::error::SaveError;
use crate::registry::Registry;
use crate::set::ComponentSet;
use crate::text;
use crate::value::Value;
use crate::walk;

/// The `meta` block of a save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveMetadata {
    pub version: u32,
    pub lib_version: String,
    pub timestamp: i64,
    pub game_name: Option<String>,
    pub checksum: Option<u32>,
}

impl SaveMetadata {
    /// Fresh metadata for a new save under `config`.
    pub fn new(config: &SaveConfig) -> Self {
        Self {
            version: config.save_version,
            lib_version: env!("CARGO_PKG_VERSION").to_owned(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            game_name: config.game_name.clone(),
            checksum: None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut entries = vec![
            ("version".to_owned(), Value::U64(self.version as u64)),
            (
                "lib_version".to_owned(),
                Value::String(self.lib_version.clone()),
            ),
            ("timestamp".to_owned(), Value::I64(self.timestamp)),
        ];
        if let Some(name) = &self.game_name {
            entries.push(("game_name".to_owned(), Value::String(name.clone())));
        }
        if let Some(checksum) = self.checksum {
            entries.push(("checksum".to_owned(), Value::U64(checksum as u64)));
        }
        Value::Map(entries)
    }

    pub(crate) fn from_value(value: &Value) -> Result<Self, SaveError> {
        if value.as_map().is_none() {
            return Err(SaveError::InvalidSaveFormat(
                "meta is not an object".to_owned(),
            ));
        }
        let version = match value.get("version") {
            None => return Err(SaveError::MissingVersion),
            Some(v) => v.as_u32().ok_or_else(|| {
                SaveError::InvalidSaveFormat("meta.version is not an integer".to_owned())
            })?,
        };
        let checksum = match value.get("checksum") {
            None => None,
            Some(v) => Some(v.as_u32().ok_or_else(|| {
                SaveError::InvalidSaveFormat("meta.checksum is not an integer".to_owned())
            })?),
        };
        Ok(Self {
            version,
            lib_version: value
                .get("lib_version")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            timestamp: value
                .get("timestamp")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            game_name: value
                .get("game_name")
                .and_then(Value::as_str)
                .map(str::to_owned),
            checksum,
        })
    }
}

/// One per-entity record of a component block.
#[derive(Debug, Clone)]
enum Record {
    /// Tag component: the entity id is the whole payload.
    Tag(u32),
    /// Data component: entity id plus wire-model value.
    Data(u32, Value),
}

impl Record {
    fn entity_id(&self) -> u32 {
        match self {
            Record::Tag(id) => *id,
            Record::Data(id, _) => *id,
        }
    }
}

/// A decoded save, format-independent.
struct Document {
    meta: Option<SaveMetadata>,
    components: Vec<(String, Vec<Record>)>,
}

/// Statistics returned from a successful load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Entities allocated by the remap pass.
    pub entities_created: u32,
    /// Components attached across all types.
    pub components_added: u64,
    /// Per-type component counts, in declared set order.
    pub component_counts: Vec<(String, u64)>,
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Encodes a registry into text or binary saves.
pub struct Serializer<'a> {
    set: &'a ComponentSet,
    config: &'a SaveConfig,
}

impl<'a> Serializer<'a> {
    pub fn new(set: &'a ComponentSet, config: &'a SaveConfig) -> Result<Self, SaveError> {
        set.check_shapes()?;
        Ok(Self { set, config })
    }

    /// A serializer over a reduced type list. `subset` must be a subset of
    /// `all`; anything else is a schema mistake reported immediately.
    pub fn selective(
        all: &ComponentSet,
        subset: &'a ComponentSet,
        config: &'a SaveConfig,
    ) -> Result<Self, SaveError> {
        if let Some(missing) = subset.first_not_in(all) {
            return Err(SaveError::UnregisteredComponent {
                type_name: missing.name().to_owned(),
            });
        }
        Self::new(subset, config)
    }

    pub fn component_set(&self) -> &ComponentSet {
        self.set
    }

    /// Serializes to the text format.
    pub fn to_text(&self, registry: &Registry) -> Result<Vec<u8>, SaveError> {
        let document = self.document(registry)?;
        let bytes = text::to_bytes(&document, self.config.pretty)?;
        self.config.logger.debug(|| {
            format!(
                "serialized {} component types into {} text bytes",
                self.set.len(),
                bytes.len()
            )
        });
        Ok(bytes)
    }

    /// Serializes to the binary format.
    pub fn to_binary(&self, registry: &Registry) -> Result<Vec<u8>, SaveError> {
        let blocks = self.collect(registry)?;

        let mut distinct = std::collections::HashSet::new();
        for (_, records) in &blocks {
            for (id, _) in records {
                distinct.insert(*id);
            }
        }

        let mut w = ByteWriter::new();
        w.put_bytes(&binary::MAGIC);
        w.put_u32(binary::FORMAT_VERSION);
        w.put_u32(self.config.save_version);

        if self.config.emit_metadata {
            let meta = SaveMetadata::new(self.config);
            w.put_u8(1);
            w.put_i64(meta.timestamp);
            w.put_str(meta.game_name.as_deref().unwrap_or(""), &self.config.limits)?;
        } else {
            w.put_u8(0);
        }

        w.put_u32(distinct.len() as u32);
        w.put_u32(blocks.len() as u32);
        for (descriptor, records) in &blocks {
            w.put_str(descriptor.name(), &self.config.limits)?;
            w.put_u32(records.len() as u32);
            for (id, data) in records {
                w.put_u32(*id);
                if let Some(value) = data {
                    binary::writer::encode_payload(
                        &mut w,
                        descriptor.shape(),
                        value,
                        &self.config.limits,
                        descriptor.name(),
                    )?;
                }
            }
        }

        self.config.logger.debug(|| {
            format!(
                "serialized {} component types into {} binary bytes",
                self.set.len(),
                w.len()
            )
        });
        Ok(w.into_bytes())
    }

    /// Builds the logical save document (the text model) without encoding
    /// it to bytes. The validator and checksum paths reuse this.
    pub fn document(&self, registry: &Registry) -> Result<Value, SaveError> {
        let blocks = self.collect(registry)?;

        let mut root = Vec::with_capacity(2);
        if self.config.emit_metadata {
            root.push(("meta".to_owned(), SaveMetadata::new(self.config).to_value()));
        }

        let mut components = Vec::with_capacity(blocks.len());
        for (descriptor, records) in blocks {
            let list = records
                .into_iter()
                .map(|(id, data)| match data {
                    None => Value::U64(id as u64),
                    Some(value) => Value::Map(vec![
                        ("entt".to_owned(), Value::U64(id as u64)),
                        ("data".to_owned(), value),
                    ]),
                })
                .collect();
            components.push((descriptor.name().to_owned(), Value::List(list)));
        }
        root.push(("components".to_owned(), Value::Map(components)));
        Ok(Value::Map(root))
    }

    fn collect(
        &self,
        registry: &Registry,
    ) -> Result<Vec<(&'a TypeDescriptor, Vec<(u32, Option<Value>)>)>, SaveError> {
        self.set
            .iter()
            .map(|descriptor| Ok((descriptor, descriptor.collect(registry)?)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Deserializer
// ---------------------------------------------------------------------------

/// Decodes saves into a registry.
pub struct Deserializer<'a> {
    /// Every type this codec can decode (used to walk binary blocks).
    known: &'a ComponentSet,
    /// Reduced list actually applied to the registry, when selective.
    requested: Option<&'a ComponentSet>,
    skip_missing: bool,
    config: &'a SaveConfig,
}

impl<'a> Deserializer<'a> {
    pub fn new(set: &'a ComponentSet, config: &'a SaveConfig) -> Result<Self, SaveError> {
        set.check_shapes()?;
        set.check_parseable()?;
        Ok(Self {
            known: set,
            requested: None,
            skip_missing: false,
            config,
        })
    }

    /// A deserializer that applies only `subset` of the full `all` list.
    ///
    /// With `skip_missing`, a requested type absent from the save is
    /// silently ignored; otherwise the load fails with
    /// [`SaveError::ComponentNotInSave`]. Presence means the type's key
    /// exists in the save, even with zero records.
    pub fn selective(
        all: &'a ComponentSet,
        subset: &'a ComponentSet,
        skip_missing: bool,
        config: &'a SaveConfig,
    ) -> Result<Self, SaveError> {
        if let Some(missing) = subset.first_not_in(all) {
            return Err(SaveError::UnregisteredComponent {
                type_name: missing.name().to_owned(),
            });
        }
        all.check_shapes()?;
        subset.check_parseable()?;
        Ok(Self {
            known: all,
            requested: Some(subset),
            skip_missing,
            config,
        })
    }

    /// Decodes a save blob (either format, sniffed by magic) into the
    /// registry.
    pub fn load(&self, bytes: &[u8], registry: &mut Registry) -> Result<LoadReport, SaveError> {
        self.config.logger.debug(|| "validating save blob".to_owned());
        let document = if bytes.starts_with(&binary::MAGIC) {
            self.decode_binary(bytes)?
        } else {
            self.decode_text(bytes)?
        };

        if let Some(meta) = &document.meta {
            if meta.version > self.config.max_version {
                return Err(SaveError::SaveFromNewerVersion {
                    save_version: meta.version,
                    max_supported: self.config.max_version,
                });
            }
            if meta.version < self.config.min_version {
                return Err(SaveError::SaveTooOld {
                    save_version: meta.version,
                    min_supported: self.config.min_version,
                });
            }
        }

        self.apply(document, registry)
    }

    fn decode_text(&self, bytes: &[u8]) -> Result<Document, SaveError> {
        let mut root = text::from_bytes(bytes)?;
        if root.as_map().is_none() {
            return Err(SaveError::InvalidSaveFormat(
                "save root is not an object".to_owned(),
            ));
        }

        let meta = match root.get("meta") {
            Some(value) => Some(SaveMetadata::from_value(value)?),
            None => None,
        };

        let components_value = root.remove("components").ok_or_else(|| {
            SaveError::InvalidSaveFormat("save has no components object".to_owned())
        })?;
        let entries = match components_value {
            Value::Map(entries) => entries,
            other => {
                return Err(SaveError::InvalidSaveFormat(format!(
                    "components is {}, not an object",
                    other.kind()
                )))
            }
        };

        let mut components = Vec::with_capacity(entries.len());
        for (name, records_value) in entries {
            let Some(descriptor) = self.known.get(&name) else {
                // Types this build does not know are skipped for forward
                // compatibility.
                self.config
                    .logger
                    .debug(|| format!("ignoring unknown component type '{name}'"));
                continue;
            };
            let records_value = match records_value {
                Value::List(list) => list,
                other => {
                    return Err(SaveError::InvalidSaveFormat(format!(
                        "records of '{name}' are {}, not an array",
                        other.kind()
                    )))
                }
            };
            let mut records = Vec::with_capacity(records_value.len());
            for record in records_value {
                records.push(Self::text_record(descriptor, record, &name)?);
            }
            components.push((name, records));
        }

        Ok(Document { meta, components })
    }

    fn text_record(
        descriptor: &TypeDescriptor,
        record: Value,
        name: &str,
    ) -> Result<Record, SaveError> {
        if descriptor.is_tag() {
            let id = record.as_u32().ok_or_else(|| SaveError::TypeMismatch {
                expected: "entity id record for tag component",
                found: record.kind().to_owned(),
            })?;
            return Ok(Record::Tag(id));
        }
        let mut record = match record {
            Value::Map(entries) => Value::Map(entries),
            other => {
                return Err(SaveError::TypeMismatch {
                    expected: "record object with entt and data",
                    found: other.kind().to_owned(),
                })
            }
        };
        let id = record
            .get("entt")
            .and_then(Value::as_u32)
            .ok_or_else(|| SaveError::InvalidSaveFormat(format!(
                "record of '{name}' has no integer entt field"
            )))?;
        let data = record.remove("data").ok_or_else(|| SaveError::MissingField {
            component: name.to_owned(),
            field: "data".to_owned(),
        })?;
        Ok(Record::Data(id, data))
    }

    fn decode_binary(&self, bytes: &[u8]) -> Result<Document, SaveError> {
        let mut r = ByteReader::new(bytes);

        let magic: [u8; 4] = r.take(4)?.try_into().unwrap();
        if magic != binary::MAGIC {
            return Err(SaveError::InvalidMagic(magic));
        }
        let format_version = r.get_u32()?;
        if format_version > binary::FORMAT_VERSION {
            return Err(SaveError::UnsupportedFormatVersion(format_version));
        }
        let save_version = r.get_u32()?;

        let meta = match r.get_u8()? {
            0 => SaveMetadata {
                version: save_version,
                lib_version: String::new(),
                timestamp: 0,
                game_name: None,
                checksum: None,
            },
            1 => {
                let timestamp = r.get_i64()?;
                let game_name = r.get_str(&self.config.limits)?;
                SaveMetadata {
                    version: save_version,
                    lib_version: String::new(),
                    timestamp,
                    game_name: (!game_name.is_empty()).then_some(game_name),
                    checksum: None,
                }
            }
            other => {
                return Err(SaveError::InvalidSaveFormat(format!(
                    "metadata flag must be 0 or 1, found {other}"
                )))
            }
        };

        let _distinct_entities = r.get_u32()?;
        let type_count = r.get_u32()?;

        let mut components = Vec::with_capacity(type_count as usize);
        for _ in 0..type_count {
            let name = r.get_str(&self.config.limits)?;
            let descriptor =
                self.known
                    .get(&name)
                    .ok_or_else(|| SaveError::UnregisteredComponent {
                        type_name: name.clone(),
                    })?;
            let count = r.get_u32()?;
            let mut records = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let id = r.get_u32()?;
                if descriptor.is_tag() {
                    records.push(Record::Tag(id));
                } else {
                    let value = binary::reader::decode_payload(
                        &mut r,
                        descriptor.shape(),
                        &self.config.limits,
                        &name,
                    )?;
                    records.push(Record::Data(id, value));
                }
            }
            components.push((name, records));
        }

        if r.remaining() != 0 {
            return Err(SaveError::InvalidSaveFormat(format!(
                "{} trailing bytes after the last component block",
                r.remaining()
            )));
        }

        Ok(Document {
            meta: Some(meta),
            components,
        })
    }

    fn apply(&self, document: Document, registry: &mut Registry) -> Result<LoadReport, SaveError> {
        let requested = self.requested.unwrap_or(self.known);

        let mut blocks: HashMap<String, Vec<Record>> = document.components.into_iter().collect();

        for descriptor in requested.iter() {
            if !blocks.contains_key(descriptor.name()) {
                if self.skip_missing {
                    self.config.logger.debug(|| {
                        format!("component '{}' not in save, skipping", descriptor.name())
                    });
                } else {
                    return Err(SaveError::ComponentNotInSave {
                        type_name: descriptor.name().to_owned(),
                    });
                }
            }
        }

        // Pass one: allocate a fresh entity per distinct saved id.
        self.config.logger.debug(|| "creating entities".to_owned());
        let mut remap: HashMap<u32, Entity> = HashMap::new();
        let mut entities_created = 0u32;
        for descriptor in requested.iter() {
            let Some(records) = blocks.get(descriptor.name()) else {
                continue;
            };
            for record in records {
                remap.entry(record.entity_id()).or_insert_with(|| {
                    entities_created += 1;
                    registry.create()
                });
            }
        }

        // Pass two: remap references, decode, attach.
        self.config.logger.debug(|| "populating registry".to_owned());
        let lookup = |saved_id: u32| remap.get(&saved_id).map(|e| e.id());
        let mut components_added = 0u64;
        let mut component_counts = Vec::with_capacity(requested.len());
        for descriptor in requested.iter() {
            let Some(records) = blocks.remove(descriptor.name()) else {
                continue;
            };
            let mut count = 0u64;
            for record in records {
                match record {
                    Record::Tag(id) => {
                        descriptor.insert(registry, remap[&id], None)?;
                    }
                    Record::Data(id, mut wire) => {
                        walk::remap_entity_refs(descriptor.shape(), &mut wire, &lookup);
                        descriptor.insert(registry, remap[&id], Some(wire))?;
                    }
                }
                count += 1;
            }
            components_added += count;
            component_counts.push((descriptor.name().to_owned(), count));
        }

        self.config.logger.info(|| {
            format!(
                "loaded {entities_created} entities and {components_added} components"
            )
        });

        Ok(LoadReport {
            entities_created,
            components_added,
            component_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_set;
    use crate::Saveable;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Saveable)]
    struct Marker;

    #[test]
    fn metadata_value_roundtrip() {
        let meta = SaveMetadata {
            version: 3,
            lib_version: "0.4.2".to_owned(),
            timestamp: 1_700_000_000,
            game_name: Some("Quest".to_owned()),
            checksum: Some(0xDEAD_BEEF),
        };
        let parsed = SaveMetadata::from_value(&meta.to_value()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn metadata_without_version_is_rejected() {
        let value = Value::Map(vec![("timestamp".to_owned(), Value::I64(0))]);
        assert!(matches!(
            SaveMetadata::from_value(&value),
            Err(SaveError::MissingVersion)
        ));
    }

    #[test]
    fn optional_metadata_fields_are_omitted() {
        let meta = SaveMetadata {
            version: 1,
            lib_version: String::new(),
            timestamp: 0,
            game_name: None,
            checksum: None,
        };
        let value = meta.to_value();
        assert!(value.get("game_name").is_none());
        assert!(value.get("checksum").is_none());
    }

    #[test]
    fn binary_header_gates_format_version() {
        let set = component_set![Marker];
        let config = SaveConfig::default();
        let deserializer = Deserializer::new(&set, &config).unwrap();

        let mut blob = Vec::new();
        blob.extend_from_slice(&crate::binary::MAGIC);
        blob.extend_from_slice(&2u32.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes());

        let mut registry = Registry::new();
        assert!(matches!(
            deserializer.load(&blob, &mut registry),
            Err(SaveError::UnsupportedFormatVersion(2))
        ));
    }

    #[test]
    fn unknown_binary_component_is_unregistered() {
        let mut registry = Registry::new();
        let entity = registry.create();
        registry.add(entity, Marker);

        let set = component_set![Marker];
        let config = SaveConfig::default();
        let blob = Serializer::new(&set, &config)
            .unwrap()
            .to_binary(&registry)
            .unwrap();

        // A decoder that does not know Marker cannot skip its block.
        let empty = crate::ComponentSet::new();
        let deserializer = Deserializer::new(&empty, &config).unwrap();
        let mut target = Registry::new();
        assert!(matches!(
            deserializer.load(&blob, &mut target),
            Err(SaveError::UnregisteredComponent { ref type_name }) if type_name == "Marker"
        ));
    }

    #[test]
    fn text_without_components_is_invalid() {
        let set = component_set![Marker];
        let config = SaveConfig::default();
        let mut registry = Registry::new();
        let err = Deserializer::new(&set, &config)
            .unwrap()
            .load(br#"{"meta":{"version":1}}"#, &mut registry)
            .unwrap_err();
        assert!(matches!(err, SaveError::InvalidSaveFormat(_)));
    }

    #[test]
    fn shared_entity_ids_collapse_to_one_entity() {
        let mut registry = Registry::new();
        let entity = registry.create();
        registry.add(entity, Marker);

        let set = component_set![Marker];
        let config = SaveConfig::default();
        let blob = Serializer::new(&set, &config)
            .unwrap()
            .to_binary(&registry)
            .unwrap();

        let mut target = Registry::new();
        let report = Deserializer::new(&set, &config)
            .unwrap()
            .load(&blob, &mut target)
            .unwrap();
        assert_eq!(report.entities_created, 1);
        assert_eq!(target.count::<Marker>(), 1);
    }
}
