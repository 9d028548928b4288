//! Snapshot file handling.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::codec::{decode_state, encode_state};
use super::error::PersistError;
use crate::registry::Registries;
use crate::time::WallClock;

/// The on-disk snapshot of server state.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file yields empty registries.
    pub fn load(&self) -> Result<Registries, PersistError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No database yet, starting empty");
                return Ok(Registries::new());
            }
            Err(source) => {
                return Err(PersistError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state = decode_state(&data, &WallClock::now())?;
        info!(
            path = %self.path.display(),
            clients = state.clients.len(),
            thermals = state.thermals.len(),
            waves = state.waves.len(),
            traffic = state.traffic.len(),
            "Database loaded"
        );
        Ok(state)
    }

    /// Write a snapshot, replacing the previous one atomically.
    pub fn save(&self, state: &Registries) -> Result<(), PersistError> {
        let data = encode_state(state, &WallClock::now());
        let write_error = |source| PersistError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(&data).map_err(write_error)?;
        file.as_file().sync_all().map_err(write_error)?;
        file.persist(&self.path)
            .map_err(|e| write_error(e.error))?;

        debug!(path = %self.path.display(), bytes = data.len(), "Database saved");
        Ok(())
    }
}
