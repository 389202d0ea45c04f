use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{split_list, SAMPLE_TRACKED_IDS};
use crate::error::Result;
use crate::types::TrackingConfig;

/// Reads and writes the tracking config file.
pub struct TrackingStore {
    path: PathBuf,
}

impl TrackingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the config; when it is missing or unparsable, regenerate the
    /// built-in sample config and persist it right away.
    pub fn load_or_init(&self) -> TrackingConfig {
        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                if raw.trim().is_empty() {
                    Err("file is empty".to_string())
                } else {
                    serde_json::from_str::<TrackingConfig>(&raw).map_err(|e| e.to_string())
                }
            });

        match parsed {
            Ok(cfg) => cfg,
            Err(why) => {
                warn!(
                    "[TRACKING] {} unusable ({why}), writing the default sample config",
                    self.path.display()
                );
                let cfg = TrackingConfig {
                    tracked_ids: SAMPLE_TRACKED_IDS.iter().map(|s| s.to_string()).collect(),
                    ..TrackingConfig::default()
                };
                if let Err(e) = self.save(&cfg) {
                    warn!("[TRACKING] could not persist default config: {e}");
                }
                cfg
            }
        }
    }

    pub fn save(&self, cfg: &TrackingConfig) -> Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(cfg)?)?;
        Ok(())
    }

    /// Append ids not already tracked and persist if anything changed.
    /// Returns how many were added.
    pub fn add_identifiers(&self, ids: &[String]) -> Result<usize> {
        let mut cfg = self.load_or_init();
        let mut added = 0;

        for id in ids {
            if cfg.tracked_ids.iter().any(|t| t == id) {
                info!("[TRACKING] already tracked: {id}");
            } else {
                cfg.tracked_ids.push(id.clone());
                info!("[TRACKING] added: {id}");
                added += 1;
            }
        }

        if added > 0 {
            self.save(&cfg)?;
            info!("[TRACKING] {added} id(s) added, {} tracked", cfg.tracked_ids.len());
        }
        Ok(added)
    }
}

/// Ids from an inline comma-separated list.
pub fn parse_inline_ids(raw: &str) -> Vec<String> {
    split_list(raw)
}

/// Ids from a file, one per line; blank lines and `#` comments are ignored.
pub fn read_id_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect())
}
