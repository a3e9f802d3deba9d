//! Full-pipeline coverage: checksum stamping, envelope framing, slot
//! files and migration chained in front of a load, the way a game
//! actually ships saves.

use lodesave::{
    add_checksum, component_set, envelope, validate, Deserializer, Limits, Migrator, Registry,
    SaveConfig, SaveLogger, Saveable, Serializer, SlotFiles, SlotLayout, Validity, Value,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Saveable)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Saveable)]
struct Health {
    current: u8,
    #[saveable(default = 100)]
    max: u8,
}

#[test]
fn save_checksum_envelope_slot_load_cycle() {
    let mut registry = Registry::new();
    let hero = registry.create();
    registry.add(hero, Position { x: 3.0, y: -7.5 });
    registry.add(
        hero,
        Health {
            current: 64,
            max: 100,
        },
    );

    let set = component_set![Position, Health];
    let config = SaveConfig::default();

    // Serialize, stamp, frame, store.
    let blob = Serializer::new(&set, &config)
        .unwrap()
        .to_text(&registry)
        .unwrap();
    let stamped = add_checksum(&blob).unwrap();
    let framed = envelope::wrap(&stamped, envelope::CompressionAlgo::None);

    let dir = TempDir::new().unwrap();
    let layout = SlotLayout {
        dir: dir.path().to_path_buf(),
        ..SlotLayout::default()
    };
    let files = SlotFiles::new(layout, Limits::default());
    files.write_slot(0, &framed).unwrap();

    // Retrieve, unframe, verify, load.
    let from_disk = files.read_slot(0).unwrap();
    assert!(envelope::has_header(&from_disk));
    let payload = envelope::unwrap(&from_disk).unwrap();
    assert_eq!(validate(&payload, config.max_version), Validity::Valid);

    let mut restored = Registry::new();
    Deserializer::new(&set, &config)
        .unwrap()
        .load(&payload, &mut restored)
        .unwrap();

    let (entity, position) = restored.view::<Position>().next().unwrap();
    assert_eq!(*position, Position { x: 3.0, y: -7.5 });
    assert_eq!(restored.get::<Health>(entity).unwrap().current, 64);
}

#[test]
fn corrupting_the_stored_blob_is_caught() {
    let blob = br#"{"meta":{"version":1},"components":{"Health":[{"entt":0,"data":{"current":9}}]}}"#;
    let stamped = add_checksum(blob).unwrap();

    let tampered = String::from_utf8(stamped).unwrap().replace(
        r#""current":9"#,
        r#""current":90"#,
    );
    assert!(matches!(
        validate(tampered.as_bytes(), 1),
        Validity::ChecksumMismatch { .. }
    ));
}

#[test]
fn migration_chain_feeds_a_current_load() {
    // A v1 save from a build where Health was called HP and had no max.
    let legacy =
        br#"{"meta":{"version":1},"components":{"HP":[{"entt":1,"data":{"current":80}}],"Position":[{"entt":1,"data":{"x":0,"y":0}}]}}"#;

    let mut migrator = Migrator::with_logger(SaveLogger::off());
    migrator.register(1, 2, "rename HP to Health", |tree| {
        tree.rename_component("HP", "Health");
        Ok(())
    });
    migrator.register(2, 3, "add Health.max default 100", |tree| {
        tree.add_field_default("Health", "max", Value::U64(100));
        Ok(())
    });

    let outcome = migrator.migrate(legacy, 3).unwrap();
    assert_eq!(outcome.migrations_run, 2);
    assert_eq!(outcome.log.len(), 2);

    let set = component_set![Position, Health];
    let config = SaveConfig {
        save_version: 3,
        max_version: 3,
        ..SaveConfig::default()
    };
    let mut registry = Registry::new();
    Deserializer::new(&set, &config)
        .unwrap()
        .load(&outcome.blob, &mut registry)
        .unwrap();

    let (entity, health) = registry.view::<Health>().next().unwrap();
    assert_eq!(health.current, 80);
    assert_eq!(health.max, 100);
    // Both records referred to the same saved id, so they share an entity.
    assert!(registry.has::<Position>(entity));
    assert_eq!(registry.entity_count(), 1);
}

#[test]
fn checksum_survives_the_binary_and_text_detour() {
    // A checksum computed on a pretty blob still validates after the blob
    // is re-emitted compactly (canonicalization is whitespace-blind).
    let mut registry = Registry::new();
    let entity = registry.create();
    registry.add(entity, Position { x: 1.0, y: 2.0 });

    let set = component_set![Position];
    let pretty_config = SaveConfig {
        pretty: true,
        ..SaveConfig::default()
    };
    let compact_config = SaveConfig::default();

    let pretty_blob = Serializer::new(&set, &pretty_config)
        .unwrap()
        .to_text(&registry)
        .unwrap();
    let compact_blob = Serializer::new(&set, &compact_config)
        .unwrap()
        .to_text(&registry)
        .unwrap();

    let crc_pretty = lodesave::components_checksum(
        &lodesave::SaveTree::parse(&pretty_blob).unwrap().into_value(),
    )
    .unwrap();
    let crc_compact = lodesave::components_checksum(
        &lodesave::SaveTree::parse(&compact_blob).unwrap().into_value(),
    )
    .unwrap();
    assert_eq!(crc_pretty, crc_compact);
}
