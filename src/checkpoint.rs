//! Run checkpointing.
//!
//! The checkpoint records which pages completed and which failed so an
//! interrupted run can resume. Saves are backed by a `.bak` copy of the
//! previous checkpoint; loads fall back to the backup when the primary file
//! is missing or corrupt. A checkpoint that cannot be read at all is treated
//! as absent, never as a fatal error.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::OcrError;
use crate::utils::PageFile;

/// Persisted run state, stored as `.ocr_checkpoint.json` in the input
/// directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub completed_pages: Vec<u32>,
    #[serde(default)]
    pub failed_pages: Vec<u32>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub last_updated: String,
    /// Hash of the recognition-relevant configuration at save time; a resumed
    /// run warns when it no longer matches.
    #[serde(default)]
    pub config_hash: String,
}

fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}

/// Writes the checkpoint, first preserving the previous one as `.bak`.
///
/// A failed backup copy is logged and ignored; losing the backup must not
/// block forward progress.
pub fn save_checkpoint(state: &mut CheckpointState, path: &Path) -> Result<(), OcrError> {
    if path.exists() {
        if let Err(err) = std::fs::copy(path, backup_path(path)) {
            warn!(error = %err, "failed to back up previous checkpoint");
        }
    }

    state.last_updated = Utc::now().to_rfc3339();
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)?;
    debug!(
        completed = state.completed_pages.len(),
        failed = state.failed_pages.len(),
        "checkpoint saved"
    );
    Ok(())
}

/// Loads the checkpoint, falling back to the `.bak` copy when the primary is
/// unreadable. Returns `None` when neither file yields valid state.
pub fn load_checkpoint(path: &Path) -> Option<CheckpointState> {
    match read_state(path) {
        Ok(state) => return Some(state),
        Err(err) if path.exists() => {
            warn!(error = %err, "primary checkpoint unreadable, trying backup");
        }
        Err(_) => {}
    }

    let backup = backup_path(path);
    match read_state(&backup) {
        Ok(state) => Some(state),
        Err(err) => {
            if backup.exists() {
                warn!(error = %err, "backup checkpoint unreadable, starting fresh");
            }
            None
        }
    }
}

fn read_state(path: &Path) -> Result<CheckpointState, OcrError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Filters `pages` down to those not yet completed. Failed pages are retried.
pub fn remaining_pages(pages: &[PageFile], state: Option<&CheckpointState>) -> Vec<PageFile> {
    let Some(state) = state else {
        return pages.to_vec();
    };
    let completed: BTreeSet<u32> = state.completed_pages.iter().copied().collect();
    pages
        .iter()
        .filter(|p| !completed.contains(&p.number))
        .cloned()
        .collect()
}
