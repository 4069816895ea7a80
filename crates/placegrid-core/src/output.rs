use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::Place;
use crate::traits::PlaceSink;
use crate::util::write_json_atomic;

/// Writes the final place list as a pretty-printed UTF-8 JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlaceSink for JsonFileSink {
    fn write(&self, places: &[Place]) -> Result<(), AppError> {
        write_json_atomic(&self.path, places)?;
        tracing::info!(
            path = %self.path.display(),
            places = places.len(),
            "Final output saved"
        );
        Ok(())
    }
}
