//! Flat JSON file of prior results, keyed by request head label.
use log::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{decision::TestStatus, error::Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub status: TestStatus,
    pub head_sha: String,
    /// Unix timestamp of the run that produced this entry.
    pub tested_at: i64,
}

#[derive(Debug, Default)]
pub struct PersistedState {
    path: PathBuf,
    entries: BTreeMap<String, StateEntry>,
}

impl PersistedState {
    /// Loads the state file. A missing or malformed file yields an empty
    /// state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        "ignoring malformed state file {}: {err}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(err) => {
                debug!("no state loaded from {}: {err}", path.display());
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&StateEntry> {
        self.entries.get(key)
    }

    pub fn record(&mut self, key: impl Into<String>, entry: StateEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)?;
        info!("wrote {} state entries to {}", self.len(), self.path.display());
        Ok(())
    }
}
