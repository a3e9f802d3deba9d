//! Save-slot path layout and the file sink/source.
//!
//! Manual slots live at `<dir>/<slot_prefix><NN>.<ext>`; rotating
//! auto-saves at `<dir>/<auto_prefix><NN>.<ext>` with the slot index
//! taken modulo the configured auto-slot count. Writes are atomic:
//! payload goes to a temp file, is synced, then renamed over the target,
//! so a crash mid-save never leaves a half-written slot.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::config::Limits;
use crate::error::SaveError;

/// Path scheme for save files.
#[derive(Debug, Clone)]
pub struct SlotLayout {
    pub dir: PathBuf,
    pub slot_prefix: String,
    pub auto_prefix: String,
    pub extension: String,
    /// Auto-saves rotate across this many slots.
    pub auto_slot_count: u32,
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("saves"),
            slot_prefix: "save_".to_owned(),
            auto_prefix: "auto_".to_owned(),
            extension: "sav".to_owned(),
            auto_slot_count: 3,
        }
    }
}

impl SlotLayout {
    /// Path of a manual slot: `<dir>/<slot_prefix><NN>.<ext>`.
    pub fn slot_path(&self, slot: u32) -> PathBuf {
        self.dir
            .join(format!("{}{:02}.{}", self.slot_prefix, slot, self.extension))
    }

    /// Path of the auto-save slot for rotation counter `counter`.
    pub fn auto_path(&self, counter: u32) -> PathBuf {
        let slot = counter % self.auto_slot_count.max(1);
        self.dir
            .join(format!("{}{:02}.{}", self.auto_prefix, slot, self.extension))
    }
}

/// File sink and source for save blobs.
pub struct SlotFiles {
    layout: SlotLayout,
    limits: Limits,
    auto_counter: u32,
}

impl SlotFiles {
    pub fn new(layout: SlotLayout, limits: Limits) -> Self {
        Self {
            layout,
            limits,
            auto_counter: 0,
        }
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Atomically writes `bytes` into a manual slot. Returns the path.
    pub fn write_slot(&self, slot: u32, bytes: &[u8]) -> Result<PathBuf, SaveError> {
        let path = self.layout.slot_path(slot);
        write_atomic(&path, bytes)?;
        log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Reads a manual slot, enforcing the configured file-size cap.
    pub fn read_slot(&self, slot: u32) -> Result<Vec<u8>, SaveError> {
        read_capped(&self.layout.slot_path(slot), self.limits.max_file_len)
    }

    pub fn slot_exists(&self, slot: u32) -> bool {
        self.layout.slot_path(slot).exists()
    }

    /// Deletes a manual slot if present.
    pub fn delete_slot(&self, slot: u32) -> Result<(), SaveError> {
        let path = self.layout.slot_path(slot);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Atomically writes the next rotating auto-save. Returns the path.
    pub fn write_auto(&mut self, bytes: &[u8]) -> Result<PathBuf, SaveError> {
        let path = self.layout.auto_path(self.auto_counter);
        self.auto_counter = self.auto_counter.wrapping_add(1);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Reads the auto-save slot for a given rotation counter value.
    pub fn read_auto(&self, counter: u32) -> Result<Vec<u8>, SaveError> {
        read_capped(&self.layout.auto_path(counter), self.limits.max_file_len)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SaveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_capped(path: &Path, max_len: u64) -> Result<Vec<u8>, SaveError> {
    let len = fs::metadata(path)?.len();
    if len > max_len {
        return Err(SaveError::FileTooLarge { len, max: max_len });
    }
    let mut file = File::open(path)?;
    let mut bytes = Vec::with_capacity(len as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}
