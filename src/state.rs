//! Persisted sync state: which highlights have already been uploaded, and
//! the last seen content hash per export file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedHighlight {
    pub synced_at: String,
    pub book: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncState {
    synced_highlights: HashMap<String, SyncedHighlight>,
    file_hashes: HashMap<String, String>,
}

/// Single source of truth for idempotency across runs.
///
/// Saves are full snapshots overwriting prior contents. There is no locking;
/// the tool assumes one sequential invocation at a time, and concurrent runs
/// would race on the persisted file.
#[derive(Debug, Default)]
pub struct SyncStateStore {
    state: SyncState,
    path: Option<PathBuf>,
}

impl SyncStateStore {
    /// Read persisted state, or start empty when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read sync state {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("sync state {} is not valid JSON", path.display()))?
        } else {
            debug!("no sync state at {}, starting empty", path.display());
            SyncState::default()
        };

        Ok(Self {
            state,
            path: Some(path.to_path_buf()),
        })
    }

    /// Store without a backing file; `save` is a no-op.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn has_synced(&self, highlight_id: &str) -> bool {
        self.state.synced_highlights.contains_key(highlight_id)
    }

    pub fn mark_synced(&mut self, highlight_id: &str, book: &str, synced_at: &str) {
        self.state.synced_highlights.insert(
            highlight_id.to_string(),
            SyncedHighlight {
                synced_at: synced_at.to_string(),
                book: book.to_string(),
            },
        );
    }

    pub fn file_hash(&self, path: &Path) -> Option<&str> {
        self.state.file_hashes.get(&path_key(path)).map(String::as_str)
    }

    pub fn set_file_hash(&mut self, path: &Path, hash: &str) {
        self.state.file_hashes.insert(path_key(path), hash.to_string());
    }

    pub fn synced_count(&self) -> usize {
        self.state.synced_highlights.len()
    }

    /// Durable write of the full current state.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let raw = serde_json::to_string_pretty(&self.state)?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write sync state {}", path.display()))?;
        Ok(())
    }
}

/// Hashes key on the path string exactly as seen; a renamed file counts as
/// never-seen even when its content is unchanged.
fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
