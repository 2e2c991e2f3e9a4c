// src/devices.rs
//! Registered notification targets (`devices.json`). Append-only.

use crate::persist::JsonDocument;

pub const MAX_DEVICE_ID_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device id is empty")]
    Empty,
    #[error("device id longer than 512 bytes")]
    TooLong,
    #[error("writing device registry: {0}")]
    Persist(#[from] std::io::Error),
}

impl DeviceError {
    /// Caller mistake rather than a storage problem.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Empty | Self::TooLong)
    }
}

#[derive(Debug)]
pub struct RegisteredDeviceSet {
    ids: Vec<String>,
    doc: JsonDocument,
}

impl RegisteredDeviceSet {
    pub fn load(doc: JsonDocument) -> Self {
        let mut ids: Vec<String> = doc.load();
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| !id.trim().is_empty() && seen.insert(id.clone()));
        Self { ids, doc }
    }

    /// Returns `Ok(false)` when the id was already known (nothing written).
    /// The id stays registered in memory even if the write fails.
    pub fn register(&mut self, id: &str) -> Result<bool, DeviceError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(DeviceError::Empty);
        }
        if id.len() > MAX_DEVICE_ID_LEN {
            return Err(DeviceError::TooLong);
        }
        if self.ids.iter().any(|d| d == id) {
            return Ok(false);
        }
        self.ids.push(id.to_string());
        self.doc.save(&self.ids)?;
        Ok(true)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
