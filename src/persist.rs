// src/persist.rs
//! Independently loadable JSON documents, rewritten wholesale on every change.
//!
//! Writes go to `<file>.tmp` first and are renamed over the target, so a crash leaves
//! either the previous snapshot or the new one, never a torn file.

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const ALERTS_FILE: &str = "alerts.json";
pub const PROCESSED_LINKS_FILE: &str = "processed_links.json";
pub const DEVICES_FILE: &str = "devices.json";
pub const LAST_SCAN_FILE: &str = "last_scan.json";

#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file → `T::default()`. A file that exists but does not parse is logged and
    /// also yields the default; the bad file is left in place for inspection until the next
    /// successful save overwrites it.
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        match fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => T::default(),
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(
                    target: "store",
                    path = %self.path.display(),
                    error = %e,
                    "unreadable state file, starting empty"
                );
                T::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                tracing::warn!(
                    target: "store",
                    path = %self.path.display(),
                    error = %e,
                    "state file read failed, starting empty"
                );
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&self, value: &T) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

/// The four state documents under one data directory.
#[derive(Debug, Clone)]
pub struct StateFiles {
    pub alerts: JsonDocument,
    pub processed_links: JsonDocument,
    pub devices: JsonDocument,
    pub last_scan: JsonDocument,
}

impl StateFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            alerts: JsonDocument::new(dir.join(ALERTS_FILE)),
            processed_links: JsonDocument::new(dir.join(PROCESSED_LINKS_FILE)),
            devices: JsonDocument::new(dir.join(DEVICES_FILE)),
            last_scan: JsonDocument::new(dir.join(LAST_SCAN_FILE)),
        }
    }
}
