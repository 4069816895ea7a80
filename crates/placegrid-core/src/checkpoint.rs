//! Durable extraction progress.
//!
//! The checkpoint file holds the loop position, the counters, every seen id
//! and every collected place, so a resumed run never replays a search to
//! rebuild its dedup state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;
use crate::models::Place;
use crate::traits::CheckpointStore;
use crate::util::write_json_atomic;

/// Progress metadata stored alongside the collected data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Highest fully processed position in the row-major cell sequence;
    /// `None` when no cell has finished yet.
    pub last_completed_cell_index: Option<usize>,
    pub total_unique_places: usize,
    pub total_api_calls: u64,
    pub total_duplicates_skipped: u64,
    #[serde(default)]
    pub total_malformed_skipped: u64,
    /// Size of the grid the run was using; 0 when unknown.
    #[serde(default)]
    pub grid_cells: usize,
    /// Written as RFC 3339. Values without an offset are read as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

impl Checkpoint {
    /// Cell position a resumed run starts from.
    pub fn resume_index(&self) -> usize {
        self.last_completed_cell_index.map_or(0, |i| i + 1)
    }
}

/// Full snapshot as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub checkpoint: Checkpoint,
    pub seen_place_ids: Vec<String>,
    pub places: Vec<Place>,
}

impl CheckpointSnapshot {
    /// Check that the metadata agrees with the stored data.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.checkpoint.total_unique_places != self.places.len() {
            return Err(AppError::CheckpointError(format!(
                "total_unique_places is {} but {} places are stored",
                self.checkpoint.total_unique_places,
                self.places.len()
            )));
        }

        let seen: HashSet<&str> = self.seen_place_ids.iter().map(String::as_str).collect();
        if let Some(place) = self.places.iter().find(|p| !seen.contains(p.id.as_str())) {
            return Err(AppError::CheckpointError(format!(
                "place {} is missing from seen_place_ids",
                place.id
            )));
        }

        if let Some(last) = self.checkpoint.last_completed_cell_index {
            let cells = self.checkpoint.grid_cells;
            if cells > 0 && last >= cells {
                return Err(AppError::CheckpointError(format!(
                    "last completed cell {last} is outside a grid of {cells} cells"
                )));
            }
        }

        Ok(())
    }
}

/// Checkpoint store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<CheckpointSnapshot>, AppError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: CheckpointSnapshot = serde_json::from_str(&content)?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, snapshot: &CheckpointSnapshot) -> Result<(), AppError> {
        write_json_atomic(&self.path, snapshot).map_err(|e| {
            AppError::CheckpointError(format!("failed to write {}: {e}", self.path.display()))
        })?;
        tracing::info!(path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    fn load(&self) -> Option<CheckpointSnapshot> {
        match self.read() {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "No checkpoint found");
                None
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unusable checkpoint, starting fresh"
                );
                None
            }
        }
    }

    fn clear(&self) -> Result<(), AppError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Checkpoint file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::CheckpointError(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
