//! YAML-file-backed [`GeofenceStore`] implementation.
//!
//! Local geofence definitions are authoritative and live in a YAML file
//! maintained by business workflows. This store loads the file once at
//! open, serves list queries from memory, and persists `external_id` /
//! `synced_at` write-backs by rewriting the file, so a re-run after a
//! partial sync sees the ids recorded by the previous run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use async_trait::async_trait;
use waypost_core::{
    ExternalGeofenceId, GeofenceDefinition, GeofenceId, GeofenceStore, GeofenceStoreError,
    GeofenceTag, Timestamp,
};

/// On-disk document shape
#[derive(Debug, Serialize, Deserialize)]
struct DefinitionsFile {
    geofences: Vec<GeofenceDefinition>,
}

/// Errors opening or parsing a definitions file
#[derive(Debug, thiserror::Error)]
pub enum DefinitionsFileError {
    #[error("Could not read '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("Could not parse '{path}': {message}")]
    Parse { path: PathBuf, message: String },
}

/// [`GeofenceStore`] backed by a YAML definitions file
pub struct YamlGeofenceStore {
    path: PathBuf,
    definitions: Mutex<Vec<GeofenceDefinition>>,
}

impl YamlGeofenceStore {
    /// Open and parse a definitions file.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionsFileError`] when the file cannot be read or is
    /// not a valid definitions document.
    pub async fn open(path: &Path) -> Result<Self, DefinitionsFileError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DefinitionsFileError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let file: DefinitionsFile =
            serde_yaml::from_str(&raw).map_err(|e| DefinitionsFileError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            definitions: Mutex::new(file.geofences),
        })
    }

    /// Number of definitions loaded
    pub fn definition_count(&self) -> usize {
        self.definitions.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Serialize current definitions back to the file
    async fn persist(&self, definitions: Vec<GeofenceDefinition>) -> Result<(), GeofenceStoreError> {
        let document = DefinitionsFile {
            geofences: definitions,
        };
        let yaml =
            serde_yaml::to_string(&document).map_err(|e| GeofenceStoreError::WriteFailed {
                message: e.to_string(),
            })?;

        tokio::fs::write(&self.path, yaml)
            .await
            .map_err(|e| GeofenceStoreError::WriteFailed {
                message: format!("writing '{}': {}", self.path.display(), e),
            })
    }
}

#[async_trait]
impl GeofenceStore for YamlGeofenceStore {
    async fn list(
        &self,
        tag: Option<&GeofenceTag>,
    ) -> Result<Vec<GeofenceDefinition>, GeofenceStoreError> {
        let definitions = self
            .definitions
            .lock()
            .map_err(|_| GeofenceStoreError::Unavailable {
                message: "definitions lock poisoned".to_string(),
            })?;

        Ok(definitions
            .iter()
            .filter(|d| tag.is_none_or(|t| &d.tag == t))
            .cloned()
            .collect())
    }

    async fn record_sync(
        &self,
        id: GeofenceId,
        external_id: &ExternalGeofenceId,
        synced_at: Timestamp,
    ) -> Result<(), GeofenceStoreError> {
        let snapshot = {
            let mut definitions =
                self.definitions
                    .lock()
                    .map_err(|_| GeofenceStoreError::Unavailable {
                        message: "definitions lock poisoned".to_string(),
                    })?;

            let definition = definitions.iter_mut().find(|d| d.id == id).ok_or_else(|| {
                GeofenceStoreError::WriteFailed {
                    message: format!("no definition with id {}", id),
                }
            })?;

            definition.external_id = Some(external_id.clone());
            definition.synced_at = Some(synced_at);
            definitions.clone()
        };

        self.persist(snapshot).await
    }
}

#[cfg(test)]
#[path = "geofence_store_tests.rs"]
mod tests;
