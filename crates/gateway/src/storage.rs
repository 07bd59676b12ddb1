//! Storage medium: mount check and capacity report.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

const MOUNT_PROBE: &str = ".mount-probe";

pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl StorageUsage {
    pub fn from_space(total_bytes: u64, free_bytes: u64) -> Self {
        Self {
            total_bytes,
            used_bytes: total_bytes.saturating_sub(free_bytes),
            free_bytes,
        }
    }
}

impl Storage {
    /// Make sure `root` exists and accepts writes. An error here is fatal at
    /// boot.
    pub fn mount(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("storage root unavailable: {}", root.display()))?;

        let probe = root.join(MOUNT_PROBE);
        fs::write(&probe, b"ok")
            .with_context(|| format!("storage root not writable: {}", root.display()))?;
        fs::remove_file(&probe)
            .with_context(|| format!("failed to remove mount probe: {}", probe.display()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Capacity of the disk holding the storage root. Zeros when the disk
    /// cannot be identified.
    pub fn usage(&self) -> StorageUsage {
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let disks = Disks::new_with_refreshed_list();

        disks
            .list()
            .iter()
            .filter(|d| root.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| StorageUsage::from_space(d.total_space(), d.available_space()))
            .unwrap_or_default()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
