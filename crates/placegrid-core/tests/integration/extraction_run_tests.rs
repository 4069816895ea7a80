use tokio_util::sync::CancellationToken;

use placegrid_core::testutil::{MockPlacesApi, RecordingSleeper};
use placegrid_core::{
    CheckpointSnapshot, ExtractionService, JsonFileSink, NullCheckpointStore, Place, RunOutcome,
    RunState, TracingReporter,
};

use crate::common::{cancelling_api, fake_places, service, test_config};

fn read_places(path: &std::path::Path) -> Vec<Place> {
    let content = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn full_run_writes_sorted_output_and_removes_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut svc = service(MockPlacesApi::from_fn(fake_places), &config);

    let outcome = svc
        .run(&config.grid(), &CancellationToken::new(), &TracingReporter)
        .await
        .unwrap();

    let summary = outcome.summary();
    assert!(outcome.is_completed());
    assert_eq!(summary.total_cells, 9);
    assert_eq!(summary.unique_places, 36);
    assert_eq!(summary.duplicates_skipped, 18);
    assert_eq!(summary.api_calls, 54);
    assert_eq!(summary.exhausted_queries, 0);

    let places = read_places(&config.output_path);
    assert_eq!(places.len(), 36);
    let keys: Vec<String> = places.iter().map(|p| p.name.to_lowercase()).collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    let mut ids: Vec<&str> = places.iter().map(|p| p.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 36);

    assert!(!config.checkpoint_path.exists());
}

#[tokio::test]
async fn interrupted_run_resumes_to_the_same_output() {
    let baseline_dir = tempfile::tempdir().unwrap();
    let baseline_config = test_config(baseline_dir.path());
    service(MockPlacesApi::from_fn(fake_places), &baseline_config)
        .run(
            &baseline_config.grid(),
            &CancellationToken::new(),
            &TracingReporter,
        )
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let grid = config.grid();

    // Calls 7 and 8 are the pharmacy pages of cell 1.
    let cancel = CancellationToken::new();
    let mut first = service(cancelling_api(cancel.clone(), 8), &config);
    let outcome = first.run(&grid, &cancel, &TracingReporter).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Interrupted(_)));
    assert_eq!(first.state(), RunState::Interrupted);
    assert!(!config.output_path.exists());

    let content = std::fs::read_to_string(&config.checkpoint_path).unwrap();
    let snapshot: CheckpointSnapshot = serde_json::from_str(&content).unwrap();
    snapshot.validate().unwrap();
    assert_eq!(snapshot.checkpoint.last_completed_cell_index, Some(0));
    assert_eq!(snapshot.checkpoint.grid_cells, 9);
    assert_eq!(snapshot.checkpoint.total_api_calls, 8);
    assert_eq!(snapshot.places.len(), 7);
    assert_eq!(snapshot.seen_place_ids.len(), 7);

    let api = MockPlacesApi::from_fn(fake_places);
    let mut second = service(api.clone(), &config);
    let outcome = second
        .run(&grid, &CancellationToken::new(), &TracingReporter)
        .await
        .unwrap();

    let summary = outcome.summary();
    assert!(outcome.is_completed());
    assert_eq!(summary.cells_processed, 8);
    assert_eq!(api.call_count(), 48);
    assert_eq!(summary.api_calls, 56);
    assert_eq!(summary.unique_places, 36);
    assert_eq!(summary.duplicates_skipped, 20);

    assert_eq!(
        read_places(&config.output_path),
        read_places(&baseline_config.output_path)
    );
    assert!(!config.checkpoint_path.exists());
}

#[tokio::test]
async fn periodic_checkpoint_survives_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let grid = config.grid();

    // Cell 2 starts at call 13; cell 1 has already been checkpointed.
    let cancel = CancellationToken::new();
    let mut svc = service(cancelling_api(cancel.clone(), 14), &config);
    svc.run(&grid, &cancel, &TracingReporter).await.unwrap();

    let snapshot: CheckpointSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&config.checkpoint_path).unwrap()).unwrap();
    assert_eq!(snapshot.checkpoint.last_completed_cell_index, Some(1));
    assert_eq!(snapshot.checkpoint.resume_index(), 2);

    let api = MockPlacesApi::from_fn(fake_places);
    let mut resumed = service(api.clone(), &config);
    assert_eq!(resumed.resume(grid.len(), &TracingReporter), 2);
}

#[tokio::test]
async fn corrupt_checkpoint_restarts_from_the_first_cell() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(&config.checkpoint_path, "{ not json").unwrap();

    let api = MockPlacesApi::from_fn(fake_places);
    let mut svc = service(api.clone(), &config);
    let outcome = svc
        .run(&config.grid(), &CancellationToken::new(), &TracingReporter)
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(api.call_count(), 54);
    assert_eq!(read_places(&config.output_path).len(), 36);
    assert!(!config.checkpoint_path.exists());
}

#[tokio::test]
async fn disabled_checkpointing_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cancel = CancellationToken::new();
    let mut svc = ExtractionService::from_config(
        cancelling_api(cancel.clone(), 20),
        RecordingSleeper::new(),
        NullCheckpointStore,
        JsonFileSink::new(&config.output_path),
        &config,
    );

    let outcome = svc.run(&config.grid(), &cancel, &TracingReporter).await.unwrap();

    assert!(!outcome.is_completed());
    assert!(!config.checkpoint_path.exists());
    assert!(!config.output_path.exists());
}
