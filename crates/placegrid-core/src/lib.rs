pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod error;
pub mod extraction;
pub mod grid;
pub mod models;
pub mod output;
pub mod retry;
pub mod search;
#[cfg(any(test, feature = "test-support"))]
pub mod testutil;
pub mod traits;
pub mod util;

pub use checkpoint::{Checkpoint, CheckpointSnapshot, JsonCheckpointStore};
pub use collector::{Collector, Ingest};
pub use config::{DEFAULT_CATEGORIES, ExtractionConfig, ExtractionPlan};
pub use error::AppError;
pub use extraction::{
    ExtractionEvent, ExtractionReporter, ExtractionService, ExtractionSummary, RunOutcome,
    RunState, TracingReporter,
};
pub use grid::generate_grid;
pub use models::{
    BoundingBox, CategoryFilter, GridCell, LatLng, NearbyPage, NearbyRequest, Place, SearchStatus,
    SearchTask,
};
pub use output::JsonFileSink;
pub use retry::RetryPolicy;
pub use search::{SearchConfig, SearchExecutor, SearchOutcome};
pub use traits::{CheckpointStore, NullCheckpointStore, PlaceSink, PlacesApi, Sleeper, TokioSleeper};
