//! # lodesave
//!
//! Schema-driven save/load for ECS worlds.
//!
//! The engine translates the contents of a [`Registry`] to and from
//! self-describing save blobs in two formats, readable text and compact
//! binary, sharing one logical model. Cross-entity references survive the
//! trip: saved entity ids are remapped onto freshly allocated entities on
//! load, including references nested inside structs, arrays and variant
//! payloads.
//!
//! ## Core types
//!
//! - [`Saveable`] — derive this (plus serde's traits) on every component
//!   that should persist; the macro builds the [`Shape`] tree that drives
//!   both codecs
//! - [`ComponentSet`] / [`component_set!`] — the ordered list of types a
//!   codec handles; supports exclusion (transients), merging and subsetting
//! - [`Serializer`] / [`Deserializer`] — the registry codec
//! - [`Migrator`] / [`SaveTree`] — version-chain migrations over a generic
//!   save tree
//! - [`validate`] / [`add_checksum`] — structural checks and CRC-32
//!   integrity
//! - [`envelope`] / [`SlotFiles`] — on-disk framing and slot layout
//!
//! ## Example
//!
//! ```
//! use lodesave::{component_set, Deserializer, Registry, SaveConfig, Saveable, Serializer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Saveable)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! #[derive(Serialize, Deserialize, Saveable)]
//! struct Player;
//!
//! let mut registry = Registry::new();
//! let hero = registry.create();
//! registry.add(hero, Position { x: 100.0, y: 200.0 });
//! registry.add(hero, Player);
//!
//! let set = component_set![Position, Player];
//! let config = SaveConfig::default();
//!
//! let blob = Serializer::new(&set, &config).unwrap().to_text(&registry).unwrap();
//!
//! let mut restored = Registry::new();
//! Deserializer::new(&set, &config).unwrap().load(&blob, &mut restored).unwrap();
//! assert_eq!(restored.entity_count(), 1);
//! ```

// Lets the derive macro refer to `lodesave::…` from inside this crate.
extern crate self as lodesave;

mod binary;
mod codec;
mod component;
mod config;
mod entity;
mod error;
mod logger;
mod migrate;
mod registry;
mod set;
mod shape;
mod slots;
mod sparse_set;
mod text;
mod validate;
pub mod envelope;
pub mod value;
mod walk;

pub use binary::{FORMAT_VERSION as BINARY_FORMAT_VERSION, MAGIC as BINARY_MAGIC};
pub use codec::{Deserializer, LoadReport, SaveMetadata, Serializer};
pub use component::{SaveField, Saveable, TypeDescriptor};
pub use config::{Limits, SaveConfig};
pub use entity::Entity;
pub use error::SaveError;
pub use logger::{LogLevel, SaveLogger};
pub use migrate::{MigrationOutcome, Migrator, SaveTree};
pub use registry::Registry;
pub use set::ComponentSet;
pub use shape::{EnumVariantDef, FieldDef, FloatWidth, IntWidth, Shape, VariantDef};
pub use slots::{SlotFiles, SlotLayout};
pub use sparse_set::SparseSet;
pub use validate::{add_checksum, components_checksum, crc32, validate, Validity};
pub use value::Value;
pub use walk::remap_entity_refs;

// The derive macro; same name as the trait, like serde's.
pub use lodesave_macro::Saveable;
