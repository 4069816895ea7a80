//! In-memory fakes for the core ports.
//!
//! Compiled for unit tests and, behind the `test-support` feature, for the
//! `tests/` integration suite. Each fake records what it was asked to do
//! behind an `Arc<Mutex<_>>`, so clones handed to the service still report
//! back to the test.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::checkpoint::CheckpointSnapshot;
use crate::error::AppError;
use crate::models::{NearbyPage, NearbyRequest, Place, SearchStatus};
use crate::traits::{CheckpointStore, PlaceSink, PlacesApi, Sleeper};

// ---------------------------------------------------------------------------
// MockPlacesApi
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&NearbyRequest) -> Result<NearbyPage, AppError> + Send + Sync;

/// Mock places API that replays queued pages or delegates to a closure.
#[derive(Clone)]
pub struct MockPlacesApi {
    /// Replayed front to back; an empty queue answers `ZERO_RESULTS`.
    responses: Arc<Mutex<Vec<Result<NearbyPage, AppError>>>>,
    handler: Option<Arc<Handler>>,
    fail_always: bool,
    requests: Arc<Mutex<Vec<NearbyRequest>>>,
}

impl MockPlacesApi {
    pub fn with_responses(responses: Vec<Result<NearbyPage, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            handler: None,
            fail_always: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails with a network error.
    pub fn always_failing() -> Self {
        Self {
            fail_always: true,
            ..Self::with_responses(Vec::new())
        }
    }

    /// Answer each request with `handler`.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&NearbyRequest) -> Result<NearbyPage, AppError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::with_responses(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<NearbyRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl PlacesApi for MockPlacesApi {
    async fn nearby_search(&self, request: &NearbyRequest) -> Result<NearbyPage, AppError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.fail_always {
            return Err(AppError::NetworkError("connection refused".into()));
        }
        if let Some(handler) = &self.handler {
            return (**handler)(request);
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(NearbyPage::with_status(SearchStatus::ZeroResults))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Sleeper that returns immediately and records every requested duration.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn count_of(&self, duration: Duration) -> usize {
        self.slept
            .lock()
            .unwrap()
            .iter()
            .filter(|d| **d == duration)
            .count()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// In-memory checkpoint store that records every save.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    current: Arc<Mutex<Option<CheckpointSnapshot>>>,
    pub saves: Arc<Mutex<Vec<CheckpointSnapshot>>>,
    /// Every call to `save`, failed ones included.
    pub save_attempts: Arc<Mutex<u32>>,
    pub clears: Arc<Mutex<u32>>,
    fail_saves: bool,
}

impl MemoryCheckpointStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store that already holds a snapshot, as after a crash.
    pub fn with_snapshot(snapshot: CheckpointSnapshot) -> Self {
        Self {
            current: Arc::new(Mutex::new(Some(snapshot))),
            ..Self::default()
        }
    }

    /// Store whose every save fails, as on a full disk.
    pub fn with_save_error() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<CheckpointSnapshot> {
        self.current.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn save_attempt_count(&self) -> u32 {
        *self.save_attempts.lock().unwrap()
    }

    pub fn clear_count(&self) -> u32 {
        *self.clears.lock().unwrap()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, snapshot: &CheckpointSnapshot) -> Result<(), AppError> {
        *self.save_attempts.lock().unwrap() += 1;
        if self.fail_saves {
            return Err(AppError::CheckpointError("disk full".into()));
        }
        self.saves.lock().unwrap().push(snapshot.clone());
        *self.current.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Option<CheckpointSnapshot> {
        self.current.lock().unwrap().clone()
    }

    fn clear(&self) -> Result<(), AppError> {
        *self.clears.lock().unwrap() += 1;
        *self.current.lock().unwrap() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that keeps the written places in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub written: Arc<Mutex<Option<Vec<Place>>>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn places(&self) -> Option<Vec<Place>> {
        self.written.lock().unwrap().clone()
    }
}

impl PlaceSink for MemorySink {
    fn write(&self, places: &[Place]) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Io(std::io::Error::other("read-only filesystem")));
        }
        *self.written.lock().unwrap() = Some(places.to_vec());
        Ok(())
    }
}
