// ==============================================================================
// persist.rs - JSON State Files
// ==============================================================================
// Description: Tolerant loading and write-then-replace saving of JSON state
// Author: Matt Barham
// Created: 2025-11-21
// Modified: 2025-11-21
// Version: 1.0.0
// ==============================================================================

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure to persist a state file (fatal for the run)
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("Failed to write {what} to {path:?}: {source}")]
    Write {
        what: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Load a JSON state file
///
/// A missing, unreadable or unparsable file yields `None`: state files are an
/// optimisation for resuming, never a reason to fail a run.
pub fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Option<T> {
    if !path.is_file() {
        debug!("No {} found at {:?}", what, path);
        return None;
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Ignoring unreadable {} {:?}: {}", what, path, e);
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unparsable {} {:?}: {}", what, path, e);
            None
        }
    }
}

/// Rename an unusable state file to `<name>.corrupt` so a later save does
/// not destroy it
///
/// Returns the new location, or `None` if the file could not be moved.
pub fn set_aside(path: &Path, what: &str) -> Option<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    let target = PathBuf::from(target);

    match std::fs::rename(path, &target) {
        Ok(()) => {
            warn!("Moved unusable {} {:?} to {:?}", what, path, target);
            Some(target)
        }
        Err(e) => {
            warn!("Could not move unusable {} {:?} aside: {}", what, path, e);
            None
        }
    }
}

/// Replace `path` with the JSON encoding of `value`
///
/// The data is written to a temporary file in the same directory, synced and
/// renamed over the target, so readers see either the old or the new file.
pub fn save_json<T: Serialize>(
    path: &Path,
    value: &T,
    what: &'static str,
) -> Result<(), PersistError> {
    let bytes =
        serde_json::to_vec(value).map_err(|source| PersistError::Serialize { what, source })?;

    let write_err = |source: std::io::Error| PersistError::Write {
        what,
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}
