use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::SNAPSHOT_CAP;
use crate::error::Result;
use crate::types::{ProductRecord, StockState};

/// Sole owner of the persisted snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
    cap: usize,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_cap(path, SNAPSHOT_CAP)
    }

    pub fn with_cap(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self { path: path.into(), cap }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous run's records. A missing, empty or unreadable file is not an
    /// error: the store re-initializes it to an empty snapshot and returns
    /// nothing.
    pub fn load_previous(&self) -> Vec<ProductRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                info!("[SNAPSHOT] no readable snapshot at {} ({e}), starting empty", self.path.display());
                self.reinitialize();
                return Vec::new();
            }
        };

        if raw.trim().is_empty() {
            info!("[SNAPSHOT] {} is empty, starting empty", self.path.display());
            self.reinitialize();
            return Vec::new();
        }

        let entries: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[SNAPSHOT] {} is malformed ({e}), resetting it", self.path.display());
                self.reinitialize();
                return Vec::new();
            }
        };

        let total = entries.len();
        let records: Vec<ProductRecord> = entries
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if records.len() < total {
            warn!(
                "[SNAPSHOT] skipped {} unreadable entries out of {total}",
                total - records.len()
            );
        }
        records
    }

    /// Persist at most `cap` records. Failures are logged and reported as
    /// `false`; they never abort the run.
    pub fn save(&self, records: &[ProductRecord]) -> bool {
        match self.write_records(records) {
            Ok(n) => {
                info!("[SNAPSHOT] saved {n} records to {}", self.path.display());
                true
            }
            Err(e) => {
                error!("[SNAPSHOT] write to {} failed: {e}", self.path.display());
                false
            }
        }
    }

    fn write_records(&self, records: &[ProductRecord]) -> Result<usize> {
        let kept = &records[..records.len().min(self.cap)];
        let body = serde_json::to_string_pretty(kept)?;
        write_atomic(&self.path, &body)?;
        Ok(kept.len())
    }

    fn reinitialize(&self) {
        if let Err(e) = write_atomic(&self.path, "[]") {
            warn!("[SNAPSHOT] could not initialize {}: {e}", self.path.display());
        }
    }
}

/// Write through a sibling temp file so a crash never leaves half a snapshot.
fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn stock_index(records: &[ProductRecord]) -> HashMap<String, StockState> {
    records
        .iter()
        .map(|r| {
            (
                r.id.clone(),
                StockState {
                    in_stock: r.in_stock,
                    availability_text: r.availability_text.clone(),
                    current_price: r.current_price,
                },
            )
        })
        .collect()
}

pub fn previous_ids(records: &[ProductRecord]) -> HashSet<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Next snapshot: this run's records first, each marked `posted` when its id
/// was already in the previous snapshot, then previous records that were not
/// refetched. The cap is applied on save.
pub fn merge(current: &[ProductRecord], previous: &[ProductRecord]) -> Vec<ProductRecord> {
    let prev_ids = previous_ids(previous);
    let current_ids: HashSet<&str> = current.iter().map(|r| r.id.as_str()).collect();

    let mut merged: Vec<ProductRecord> = current
        .iter()
        .cloned()
        .map(|mut r| {
            r.posted = prev_ids.contains(&r.id);
            r
        })
        .collect();

    merged.extend(
        previous
            .iter()
            .filter(|r| !current_ids.contains(r.id.as_str()))
            .cloned(),
    );
    merged
}
