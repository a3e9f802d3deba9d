//! Save migrations.
//!
//! Old saves are brought forward by chaining version-to-version steps over
//! a parsed, mutable save tree. No component types are involved, so a v1
//! blob can mention components that no longer exist in the code. Steps run in
//! version order: the driver reads the blob's version, applies the unique
//! step registered for it, bumps `meta.version`, and repeats until the
//! target is reached.

use crate::error::SaveError;
use crate::logger::SaveLogger;
use crate::text;
use crate::value::Value;

/// A parsed save held as a mutable generic tree.
///
/// The edit operations cover the common schema changes; anything more
/// exotic can work on [`root_mut`](SaveTree::root_mut) directly.
pub struct SaveTree {
    root: Value,
}

impl SaveTree {
    /// Parses a text-format blob.
    pub fn parse(bytes: &[u8]) -> Result<Self, SaveError> {
        let root = text::from_bytes(bytes)?;
        if root.as_map().is_none() {
            return Err(SaveError::InvalidSaveFormat(
                "save root is not an object".to_owned(),
            ));
        }
        Ok(Self { root })
    }

    pub fn from_value(root: Value) -> Result<Self, SaveError> {
        if root.as_map().is_none() {
            return Err(SaveError::InvalidSaveFormat(
                "save root is not an object".to_owned(),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Re-emits the tree as text-format bytes.
    pub fn to_bytes(&self, pretty: bool) -> Result<Vec<u8>, SaveError> {
        text::to_bytes(&self.root, pretty)
    }

    pub fn version(&self) -> Result<u32, SaveError> {
        let meta = self.root.get("meta").ok_or(SaveError::MissingMetadata)?;
        meta.get("version")
            .ok_or(SaveError::MissingVersion)?
            .as_u32()
            .ok_or(SaveError::MissingVersion)
    }

    /// Sets `meta.version`, creating the metadata object if absent.
    pub fn set_version(&mut self, version: u32) {
        if self.root.get("meta").is_none() {
            // New meta goes first so the emitted document keeps the usual
            // layout.
            if let Some(entries) = self.root.as_map_mut() {
                entries.insert(0, ("meta".to_owned(), Value::Map(Vec::new())));
            }
        }
        if let Some(meta) = self.root.get_mut("meta") {
            meta.insert("version", Value::U64(version as u64));
        }
    }

    fn components_mut(&mut self) -> Option<&mut Vec<(String, Value)>> {
        self.root.get_mut("components")?.as_map_mut()
    }

    /// Renames a component key. Returns whether the component existed.
    pub fn rename_component(&mut self, old: &str, new: &str) -> bool {
        let Some(components) = self.components_mut() else {
            return false;
        };
        match components.iter_mut().find(|(name, _)| name == old) {
            Some((name, _)) => {
                *name = new.to_owned();
                true
            }
            None => false,
        }
    }

    /// Drops a component key. Returns whether the component existed.
    pub fn remove_component(&mut self, name: &str) -> bool {
        let Some(components) = self.components_mut() else {
            return false;
        };
        let before = components.len();
        components.retain(|(key, _)| key != name);
        components.len() != before
    }

    /// Renames a field in every record's data object. Returns the number
    /// of records touched.
    pub fn rename_field(&mut self, component: &str, old: &str, new: &str) -> usize {
        let mut touched = 0;
        self.for_each_data(component, |data| {
            if let Some(entries) = data.as_map_mut() {
                for (key, _) in entries.iter_mut() {
                    if key == old {
                        *key = new.to_owned();
                        touched += 1;
                        break;
                    }
                }
            }
        });
        touched
    }

    /// Inserts `value` under `field` in every record where the field is
    /// absent. Returns the number of records touched.
    pub fn add_field_default(&mut self, component: &str, field: &str, value: Value) -> usize {
        let mut touched = 0;
        self.for_each_data(component, |data| {
            if data.get(field).is_none() {
                data.insert(field, value.clone());
                touched += 1;
            }
        });
        touched
    }

    /// Applies `transform` to every present integer value of `field`.
    /// Returns the number of records touched.
    pub fn transform_int_field(
        &mut self,
        component: &str,
        field: &str,
        transform: impl Fn(i64) -> i64,
    ) -> usize {
        let mut touched = 0;
        self.for_each_data(component, |data| {
            if let Some(slot) = data.get_mut(field) {
                if let Some(current) = slot.as_i64() {
                    *slot = Value::I64(transform(current));
                    touched += 1;
                }
            }
        });
        touched
    }

    fn for_each_data(&mut self, component: &str, mut apply: impl FnMut(&mut Value)) {
        let Some(components) = self.components_mut() else {
            return;
        };
        let Some((_, records)) = components.iter_mut().find(|(name, _)| name == component) else {
            return;
        };
        let Some(records) = records.as_list_mut() else {
            return;
        };
        for record in records {
            if let Some(data) = record.get_mut("data") {
                apply(data);
            }
        }
    }
}

type MigrationFn = Box<dyn Fn(&mut SaveTree) -> Result<(), SaveError>>;

struct MigrationStep {
    from: u32,
    to: u32,
    description: String,
    run: MigrationFn,
}

/// Registered migration steps plus the chain driver.
pub struct Migrator {
    steps: Vec<MigrationStep>,
    logger: SaveLogger,
}

/// Result of a successful migration run.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// The migrated blob, re-emitted as text.
    pub blob: Vec<u8>,
    /// Number of steps applied.
    pub migrations_run: u32,
    /// One human-readable line per applied step.
    pub log: Vec<String>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::with_logger(SaveLogger::default())
    }

    pub fn with_logger(logger: SaveLogger) -> Self {
        Self {
            steps: Vec::new(),
            logger,
        }
    }

    /// Registers a step migrating `from` one version `to` the next.
    ///
    /// Only one step per `from` version is allowed; later duplicates log a
    /// warning and are dropped.
    pub fn register(
        &mut self,
        from: u32,
        to: u32,
        description: impl Into<String>,
        step: impl Fn(&mut SaveTree) -> Result<(), SaveError> + 'static,
    ) {
        if self.steps.iter().any(|s| s.from == from) {
            self.logger.warn(|| {
                format!("duplicate migration step for version {from}; keeping the first")
            });
            return;
        }
        self.steps.push(MigrationStep {
            from,
            to,
            description: description.into(),
            run: Box::new(step),
        });
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Migrates a text blob up to `target`, returning the new blob with
    /// `meta.version` updated and a log of the applied steps.
    pub fn migrate(&self, blob: &[u8], target: u32) -> Result<MigrationOutcome, SaveError> {
        let mut tree = SaveTree::parse(blob)?;
        let pretty = blob.contains(&b'\n');
        let outcome_log = self.migrate_tree(&mut tree, target)?;
        Ok(MigrationOutcome {
            blob: tree.to_bytes(pretty)?,
            migrations_run: outcome_log.len() as u32,
            log: outcome_log,
        })
    }

    /// In-place variant of [`migrate`](Migrator::migrate); returns the log
    /// lines of the applied steps.
    pub fn migrate_tree(&self, tree: &mut SaveTree, target: u32) -> Result<Vec<String>, SaveError> {
        let mut current = tree.version()?;
        if current > target {
            return Err(SaveError::SaveFromNewerVersion {
                save_version: current,
                max_supported: target,
            });
        }

        let mut log = Vec::new();
        while current < target {
            let step = self
                .steps
                .iter()
                .find(|s| s.from == current)
                .ok_or(SaveError::NoMigrationPath {
                    from: current,
                    target,
                })?;
            (step.run)(tree)?;
            tree.set_version(step.to);

            let line = format!(
                "migrated save v{} -> v{}: {}",
                step.from, step.to, step.description
            );
            self.logger.info(|| line.clone());
            log.push(line);

            if step.to <= current {
                // A step that does not advance the version would loop
                // forever.
                return Err(SaveError::NoMigrationPath {
                    from: step.to,
                    target,
                });
            }
            current = step.to;
        }
        Ok(log)
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}
