use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use placegrid_core::testutil::{MockPlacesApi, RecordingSleeper};
use placegrid_core::{
    AppError, BoundingBox, ExtractionConfig, ExtractionService, JsonCheckpointStore, JsonFileSink,
    NearbyPage, NearbyRequest, RetryPolicy,
};

pub type FileService =
    ExtractionService<MockPlacesApi, RecordingSleeper, JsonCheckpointStore, JsonFileSink>;

/// 3×3 grid, two categories plus the generic search, no delays.
pub fn test_config(dir: &Path) -> ExtractionConfig {
    ExtractionConfig {
        bbox: BoundingBox::new(18.15, 17.95, -15.85, -16.10),
        rows: 3,
        cols: 3,
        radius_m: 1500,
        categories: vec!["pharmacy".into(), "bakery".into()],
        include_generic: true,
        request_delay: Duration::ZERO,
        pagination_delay: Duration::ZERO,
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        checkpoint_interval: 2,
        enable_checkpointing: true,
        output_path: dir.join("places.json"),
        checkpoint_path: dir.join("checkpoint.json"),
    }
}

/// Deterministic fake API: each category search yields two pages, the
/// second of which overlaps the neighbouring cell's results.
pub fn fake_places(request: &NearbyRequest) -> Result<NearbyPage, AppError> {
    let lat = (request.location.lat * 1000.0).round() as i64;
    let lng = (request.location.lng * 1000.0).round() as i64;
    let kind = request.category.clone().unwrap_or_else(|| "any".into());

    let place = |id: String| {
        json!({
            "place_id": id,
            "name": format!("{kind} {id}"),
            "types": [kind.clone(), "point_of_interest"],
            "geometry": {"location": {"lat": request.location.lat, "lng": request.location.lng}}
        })
    };

    match request.page_token.as_deref() {
        None => Ok(NearbyPage::ok(
            vec![place(format!("{kind}-{lat}-{lng}"))],
            Some(format!("{lat}:{lng}")),
        )),
        // Shared across every cell on the same row.
        Some(_) => Ok(NearbyPage::ok(vec![place(format!("{kind}-row-{lat}"))], None)),
    }
}

pub fn service(api: MockPlacesApi, config: &ExtractionConfig) -> FileService {
    ExtractionService::from_config(
        api,
        RecordingSleeper::new(),
        JsonCheckpointStore::new(&config.checkpoint_path),
        JsonFileSink::new(&config.output_path),
        config,
    )
}

/// API that trips `token` once `after` calls have been served.
pub fn cancelling_api(token: CancellationToken, after: usize) -> MockPlacesApi {
    let calls = Arc::new(AtomicUsize::new(0));
    MockPlacesApi::from_fn(move |request| {
        if calls.fetch_add(1, Ordering::SeqCst) + 1 == after {
            token.cancel();
        }
        fake_places(request)
    })
}
