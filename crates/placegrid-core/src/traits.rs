use std::future::Future;
use std::time::Duration;

use crate::checkpoint::CheckpointSnapshot;
use crate::error::AppError;
use crate::models::{NearbyPage, NearbyRequest, Place};

/// Issues a single nearby-search call against the remote places API.
pub trait PlacesApi: Send + Sync + Clone {
    /// Fetch one page. Transport failures are `Err`; API-level statuses such
    /// as `OVER_QUERY_LIMIT` are reported through [`NearbyPage::status`].
    fn nearby_search(
        &self,
        request: &NearbyRequest,
    ) -> impl Future<Output = Result<NearbyPage, AppError>> + Send;
}

/// Waits for a duration. Rate-limit, pagination and backoff delays all go
/// through this so tests can observe them without real time passing.
pub trait Sleeper: Send + Sync + Clone {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Persists and restores extraction progress.
pub trait CheckpointStore: Send + Sync {
    /// Durably write a snapshot. A concurrent reader must never see a
    /// partially written one.
    fn save(&self, snapshot: &CheckpointSnapshot) -> Result<(), AppError>;

    /// Read the last snapshot. Missing or unusable data is `None`.
    fn load(&self) -> Option<CheckpointSnapshot>;

    /// Remove the snapshot after a successful run.
    fn clear(&self) -> Result<(), AppError>;
}

/// A no-op CheckpointStore for use when checkpointing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCheckpointStore;

impl CheckpointStore for NullCheckpointStore {
    fn save(&self, _snapshot: &CheckpointSnapshot) -> Result<(), AppError> {
        Ok(())
    }

    fn load(&self) -> Option<CheckpointSnapshot> {
        None
    }

    fn clear(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Receives the final, sorted list of places.
pub trait PlaceSink: Send + Sync {
    fn write(&self, places: &[Place]) -> Result<(), AppError>;
}
