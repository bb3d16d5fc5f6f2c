//! JSON file round-trip for the candidate queue
//!
//! The store itself only knows about callbacks; these helpers give
//! callers file-backed durability in one line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::store::{Candidate, PersistCallback};

/// Write the full candidate list to a JSON file, creating parent
/// directories as needed.
pub fn save_candidates(path: &Path, candidates: &[Candidate]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(candidates)
        .context("Failed to serialize candidates")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read a candidate list back. A missing file is an empty store, not an
/// error.
pub fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Persistence callback writing to the given path after every change.
pub fn file_persistence(path: PathBuf) -> PersistCallback {
    Box::new(move |candidates| save_candidates(&path, candidates))
}
