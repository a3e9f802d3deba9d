//! Walkthrough: build a small world, save it both ways, migrate an old
//! blob, and bring everything back.
//!
//! Run with `cargo run --example demo`.

use lodesave::{
    add_checksum, component_set, validate, Deserializer, Entity, Migrator, Registry, SaveConfig,
    Saveable, Serializer, Validity, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Saveable)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Saveable)]
struct Health {
    current: u8,
    #[saveable(default = 100)]
    max: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Saveable)]
struct FollowTarget {
    target: Entity,
    distance: f32,
}

#[derive(Debug, Serialize, Deserialize, Saveable)]
struct Player;

fn main() {
    let mut registry = Registry::new();

    let hero = registry.create();
    registry.add(hero, Position { x: 100.0, y: 200.0 });
    registry.add(hero, Health { current: 80, max: 100 });
    registry.add(hero, Player);

    let companion = registry.create();
    registry.add(companion, Position { x: 90.0, y: 195.0 });
    registry.add(
        companion,
        FollowTarget {
            target: hero,
            distance: 5.0,
        },
    );

    let set = component_set![Position, Health, FollowTarget, Player];
    let config = SaveConfig {
        pretty: true,
        game_name: Some("demo quest".to_owned()),
        ..SaveConfig::default()
    };

    let serializer = Serializer::new(&set, &config).expect("schema is valid");
    let text = serializer.to_text(&registry).expect("serialize text");
    let binary = serializer.to_binary(&registry).expect("serialize binary");
    println!("text save: {} bytes, binary save: {} bytes", text.len(), binary.len());
    println!("{}", String::from_utf8_lossy(&text));

    let stamped = add_checksum(&text).expect("stamp checksum");
    assert_eq!(validate(&stamped, config.max_version), Validity::Valid);

    let deserializer = Deserializer::new(&set, &config).expect("schema is valid");
    let mut restored = Registry::new();
    let report = deserializer.load(&binary, &mut restored).expect("load binary");
    println!(
        "restored {} entities / {} components",
        report.entities_created, report.components_added
    );

    let (_, follow) = restored.view::<FollowTarget>().next().expect("companion");
    let leader = restored.get::<Position>(follow.target).expect("leader position");
    println!("companion follows the entity at ({}, {})", leader.x, leader.y);

    // A v1 save from a build where Health was still called HP.
    let legacy = br#"{"meta":{"version":1},"components":{"HP":[{"entt":1,"data":{"current":40}}]}}"#;
    let mut migrator = Migrator::new();
    migrator.register(1, 2, "rename HP to Health", |tree| {
        tree.rename_component("HP", "Health");
        Ok(())
    });
    migrator.register(2, 3, "add Health.max default 100", |tree| {
        tree.add_field_default("Health", "max", Value::U64(100));
        Ok(())
    });
    let outcome = migrator.migrate(legacy, 3).expect("migrate");
    for line in &outcome.log {
        println!("{line}");
    }
}
