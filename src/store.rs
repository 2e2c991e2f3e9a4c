// src/store.rs
//! Bounded, probability-filtered alert feed mirrored to `alerts.json`.

use metrics::{counter, gauge};
use std::io;

use crate::model::AlertRecord;
use crate::persist::JsonDocument;

pub const DEFAULT_ACCEPT_THRESHOLD: u8 = 50;
pub const DEFAULT_CAPACITY: usize = 100;

/// The in-memory feed was updated but the snapshot could not be written.
#[derive(Debug, thiserror::Error)]
#[error("alert store not persisted to {path} ({admitted} admitted in memory): {source}")]
pub struct PersistError {
    pub admitted: usize,
    pub path: String,
    #[source]
    pub source: io::Error,
}

#[derive(Debug)]
pub struct AlertStore {
    records: Vec<AlertRecord>,
    doc: JsonDocument,
    threshold: u8,
    capacity: usize,
}

impl AlertStore {
    /// Load the persisted feed. Records that violate the current threshold or capacity
    /// (e.g. after a config change) are dropped in memory; the file is rewritten on the
    /// next admit.
    pub fn load(doc: JsonDocument, threshold: u8, capacity: usize) -> Self {
        let mut records: Vec<AlertRecord> = doc.load();
        records.retain(|r| r.probability() >= threshold);
        records.truncate(capacity);
        gauge!("alerts_in_store").set(records.len() as f64);
        tracing::info!(
            target: "store",
            path = %doc.path().display(),
            records = records.len(),
            "alert store loaded"
        );
        Self {
            records,
            doc,
            threshold,
            capacity,
        }
    }

    pub fn read(&self) -> &[AlertRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Sort `batch` by probability (descending, stable), put it in front of the existing
    /// records, drop anything under the threshold, cut to capacity, then persist.
    ///
    /// The in-memory feed is updated even when the write fails; the error carries the
    /// admitted count so the caller can report a degraded cycle. Returns how many incoming
    /// records survived.
    pub fn admit(&mut self, mut batch: Vec<AlertRecord>) -> Result<usize, PersistError> {
        batch.sort_by(|a, b| b.probability().cmp(&a.probability()));

        // An incoming record replaces an older entry for the same link.
        self.records
            .retain(|old| !batch.iter().any(|new| new.link() == old.link()));

        let incoming = batch.len();
        // The batch sits in front after the merge, so its survivors are cut last.
        let admitted = batch
            .iter()
            .filter(|r| r.probability() >= self.threshold)
            .count()
            .min(self.capacity);
        let mut combined = batch;
        combined.append(&mut self.records);
        combined.retain(|r| r.probability() >= self.threshold);
        combined.truncate(self.capacity);
        self.records = combined;

        counter!("alerts_admitted_total").increment(admitted as u64);
        gauge!("alerts_in_store").set(self.records.len() as f64);
        tracing::info!(
            target: "store",
            incoming,
            admitted,
            total = self.records.len(),
            "alerts admitted"
        );

        if let Err(e) = self.doc.save(&self.records) {
            counter!("store_persist_errors_total").increment(1);
            tracing::error!(target: "store", error = %e, "alert store persist failed");
            return Err(PersistError {
                admitted,
                path: self.doc.path().display().to_string(),
                source: e,
            });
        }
        Ok(admitted)
    }
}
