//! Drives the full search space: every grid cell, every category, in order.
//!
//! ```text
//! NotStarted --run--> Running --all cells done--> Completed   (output written, checkpoint removed)
//!                        |
//!                        +--cancel / error--> Interrupted    (checkpoint saved)
//! ```

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointSnapshot};
use crate::collector::{Collector, Ingest};
use crate::config::ExtractionConfig;
use crate::error::AppError;
use crate::models::{CategoryFilter, GridCell, SearchTask};
use crate::search::SearchExecutor;
use crate::traits::{CheckpointStore, PlaceSink, PlacesApi, Sleeper};

/// Lifecycle of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Interrupted,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub total_cells: usize,
    /// Cells finished by this process (not counting resumed ones).
    pub cells_processed: usize,
    pub last_completed_cell: Option<usize>,
    pub unique_places: usize,
    pub duplicates_skipped: u64,
    pub malformed_skipped: u64,
    pub api_calls: u64,
    /// Queries that gave up after exhausting their retries.
    pub exhausted_queries: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ExtractionSummary),
    /// Stopped by cancellation; a checkpoint was saved.
    Interrupted(ExtractionSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &ExtractionSummary {
        match self {
            RunOutcome::Completed(s) | RunOutcome::Interrupted(s) => s,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum ExtractionEvent<'a> {
    Resumed {
        resume_from: usize,
        places: usize,
        saved_at: DateTime<Utc>,
    },
    CheckpointDiscarded {
        reason: &'a str,
    },
    Started {
        start_index: usize,
        total_cells: usize,
        tasks_per_cell: usize,
    },
    CellStarted {
        index: usize,
        total: usize,
        cell: &'a GridCell,
    },
    SearchStarted {
        task: &'a SearchTask<'a>,
        position: usize,
        tasks_per_cell: usize,
        unique: usize,
    },
    SearchFinished {
        task: &'a SearchTask<'a>,
        results: usize,
        added: usize,
        pages: u32,
        exhausted: bool,
    },
    CellCompleted {
        index: usize,
        unique: usize,
        duplicates: u64,
        api_calls: u64,
    },
    CheckpointSaved {
        last_completed: Option<usize>,
        places: usize,
    },
    Interrupted {
        last_completed: Option<usize>,
    },
    Failed {
        error: &'a AppError,
    },
    Completed {
        summary: &'a ExtractionSummary,
    },
}

/// Trait for receiving extraction events (decoupled logging).
pub trait ExtractionReporter: Send + Sync {
    fn report(&self, event: ExtractionEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ExtractionReporter for TracingReporter {
    fn report(&self, event: ExtractionEvent<'_>) {
        match event {
            ExtractionEvent::Resumed {
                resume_from,
                places,
                saved_at,
            } => {
                tracing::info!(%resume_from, %places, %saved_at, "Checkpoint loaded, resuming");
            }
            ExtractionEvent::CheckpointDiscarded { reason } => {
                tracing::warn!(%reason, "Checkpoint discarded, starting from cell 0");
            }
            ExtractionEvent::Started {
                start_index,
                total_cells,
                tasks_per_cell,
            } => {
                tracing::info!(%start_index, %total_cells, %tasks_per_cell, "Starting extraction");
            }
            ExtractionEvent::CellStarted { index, total, cell } => {
                tracing::info!(
                    cell = index + 1,
                    %total,
                    row = cell.row,
                    col = cell.col,
                    center = %cell.center(),
                    "Searching cell"
                );
            }
            ExtractionEvent::SearchStarted {
                task,
                position,
                tasks_per_cell,
                unique,
            } => {
                tracing::info!(
                    cell = task.cell_index + 1,
                    category = %task.category,
                    task = position + 1,
                    of = tasks_per_cell,
                    %unique,
                    "Searching category"
                );
            }
            ExtractionEvent::SearchFinished {
                task,
                results,
                added,
                pages,
                exhausted,
            } => {
                tracing::debug!(
                    cell = task.cell_index + 1,
                    category = %task.category,
                    %results,
                    %added,
                    %pages,
                    %exhausted,
                    "Search finished"
                );
            }
            ExtractionEvent::CellCompleted {
                index,
                unique,
                duplicates,
                api_calls,
            } => {
                tracing::info!(cell = index + 1, %unique, %duplicates, %api_calls, "Cell complete");
            }
            ExtractionEvent::CheckpointSaved {
                last_completed,
                places,
            } => {
                tracing::info!(?last_completed, %places, "Progress checkpointed");
            }
            ExtractionEvent::Interrupted { last_completed } => {
                tracing::warn!(?last_completed, "Extraction interrupted, saving checkpoint");
            }
            ExtractionEvent::Failed { error } => {
                tracing::error!(
                    %error,
                    resource_failure = error.is_resource_failure(),
                    "Extraction failed, saving checkpoint"
                );
            }
            ExtractionEvent::Completed { summary } => {
                tracing::info!(
                    unique = summary.unique_places,
                    duplicates = summary.duplicates_skipped,
                    malformed = summary.malformed_skipped,
                    api_calls = summary.api_calls,
                    exhausted_queries = summary.exhausted_queries,
                    "Extraction complete"
                );
            }
        }
    }
}

enum CellLoop {
    Finished,
    Cancelled,
}

/// Runs every (cell, category) search in order and owns all run state.
pub struct ExtractionService<A, Z, K, O>
where
    A: PlacesApi,
    Z: Sleeper,
    K: CheckpointStore,
    O: PlaceSink,
{
    executor: SearchExecutor<A, Z>,
    store: K,
    sink: O,
    tasks: Vec<CategoryFilter>,
    checkpoint_interval: usize,
    collector: Collector,
    api_calls: u64,
    exhausted_queries: u64,
    last_completed: Option<usize>,
    cells_processed: usize,
    grid_cells: usize,
    state: RunState,
}

impl<A, Z, K, O> ExtractionService<A, Z, K, O>
where
    A: PlacesApi,
    Z: Sleeper,
    K: CheckpointStore,
    O: PlaceSink,
{
    pub fn new(
        executor: SearchExecutor<A, Z>,
        store: K,
        sink: O,
        tasks: Vec<CategoryFilter>,
        checkpoint_interval: usize,
    ) -> Self {
        Self {
            executor,
            store,
            sink,
            tasks,
            checkpoint_interval,
            collector: Collector::new(),
            api_calls: 0,
            exhausted_queries: 0,
            last_completed: None,
            cells_processed: 0,
            grid_cells: 0,
            state: RunState::NotStarted,
        }
    }

    /// Wire a service from an [`ExtractionConfig`].
    pub fn from_config(api: A, sleeper: Z, store: K, sink: O, config: &ExtractionConfig) -> Self {
        Self::new(
            SearchExecutor::new(api, sleeper, config.search_config()),
            store,
            sink,
            config.search_tasks(),
            config.checkpoint_interval,
        )
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    /// Restore state from the checkpoint store and return the first cell
    /// index still to process.
    pub fn resume<R: ExtractionReporter>(&mut self, grid_len: usize, reporter: &R) -> usize {
        self.grid_cells = grid_len;
        let Some(snapshot) = self.store.load() else {
            return 0;
        };
        let CheckpointSnapshot {
            checkpoint,
            seen_place_ids,
            places,
        } = snapshot;

        if checkpoint.grid_cells != 0 && checkpoint.grid_cells != grid_len {
            reporter.report(ExtractionEvent::CheckpointDiscarded {
                reason: "grid size changed since the checkpoint was written",
            });
            return 0;
        }

        self.collector = Collector::restore(
            seen_place_ids,
            places,
            checkpoint.total_duplicates_skipped,
            checkpoint.total_malformed_skipped,
        );
        self.api_calls = checkpoint.total_api_calls;
        self.last_completed = checkpoint.last_completed_cell_index;

        let resume_from = checkpoint.resume_index().min(grid_len);
        reporter.report(ExtractionEvent::Resumed {
            resume_from,
            places: self.collector.unique_count(),
            saved_at: checkpoint.timestamp,
        });
        resume_from
    }

    /// Resume from the checkpoint store, then extract the rest of `grid`.
    pub async fn run<R: ExtractionReporter>(
        &mut self,
        grid: &[GridCell],
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<RunOutcome, AppError> {
        let start = self.resume(grid.len(), reporter);
        self.extract(grid, start, cancel, reporter).await
    }

    /// Process cells `start..` of `grid`.
    ///
    /// Cancellation is checked before every search, so an in-flight query
    /// always finishes. If writing the output fails, a checkpoint is saved
    /// before the error is returned. A failed checkpoint write is returned
    /// as is. An empty grid is refused before anything is written.
    pub async fn extract<R: ExtractionReporter>(
        &mut self,
        grid: &[GridCell],
        start: usize,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<RunOutcome, AppError> {
        if grid.is_empty() {
            return Err(AppError::ConfigError("grid has no cells".into()));
        }
        self.state = RunState::Running;
        self.grid_cells = grid.len();
        reporter.report(ExtractionEvent::Started {
            start_index: start,
            total_cells: grid.len(),
            tasks_per_cell: self.tasks.len(),
        });

        match self.process_cells(grid, start, cancel, reporter).await {
            Ok(CellLoop::Finished) => match self.complete(reporter) {
                Ok(summary) => Ok(RunOutcome::Completed(summary)),
                Err(error) => {
                    self.fail(&error, reporter);
                    if let Err(save_error) = self.save_checkpoint(reporter) {
                        tracing::error!(error = %save_error, "Could not save checkpoint after failure");
                    }
                    Err(error)
                }
            },
            Ok(CellLoop::Cancelled) => self
                .interrupt(reporter)
                .map(RunOutcome::Interrupted)
                .inspect_err(|error| self.fail(error, reporter)),
            // The cell loop only fails on a checkpoint write; it is not retried.
            Err(error) => {
                self.fail(&error, reporter);
                Err(error)
            }
        }
    }

    fn fail<R: ExtractionReporter>(&mut self, error: &AppError, reporter: &R) {
        self.state = RunState::Interrupted;
        reporter.report(ExtractionEvent::Failed { error });
    }

    async fn process_cells<R: ExtractionReporter>(
        &mut self,
        grid: &[GridCell],
        start: usize,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CellLoop, AppError> {
        let total = grid.len();

        for (index, cell) in grid.iter().enumerate().skip(start) {
            reporter.report(ExtractionEvent::CellStarted { index, total, cell });

            for (position, category) in self.tasks.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Ok(CellLoop::Cancelled);
                }

                let task = SearchTask {
                    cell_index: index,
                    cell,
                    category,
                };
                reporter.report(ExtractionEvent::SearchStarted {
                    task: &task,
                    position,
                    tasks_per_cell: self.tasks.len(),
                    unique: self.collector.unique_count(),
                });

                let outcome = self.executor.search(cell.center(), category).await;
                self.api_calls += u64::from(outcome.api_calls);
                if outcome.exhausted {
                    self.exhausted_queries += 1;
                }

                let added = outcome
                    .results
                    .iter()
                    .filter(|record| self.collector.ingest(record) == Ingest::Added)
                    .count();

                reporter.report(ExtractionEvent::SearchFinished {
                    task: &task,
                    results: outcome.results.len(),
                    added,
                    pages: outcome.pages,
                    exhausted: outcome.exhausted,
                });
            }

            self.last_completed = Some(index);
            self.cells_processed += 1;

            if self.checkpoint_interval > 0 && (index + 1) % self.checkpoint_interval == 0 {
                self.save_checkpoint(reporter)?;
            }

            reporter.report(ExtractionEvent::CellCompleted {
                index,
                unique: self.collector.unique_count(),
                duplicates: self.collector.duplicate_count(),
                api_calls: self.api_calls,
            });
        }

        Ok(CellLoop::Finished)
    }

    fn complete<R: ExtractionReporter>(
        &mut self,
        reporter: &R,
    ) -> Result<ExtractionSummary, AppError> {
        self.sink.write(&self.collector.sorted_places())?;
        self.store.clear()?;
        self.state = RunState::Completed;

        let summary = self.summary();
        reporter.report(ExtractionEvent::Completed { summary: &summary });
        Ok(summary)
    }

    fn interrupt<R: ExtractionReporter>(
        &mut self,
        reporter: &R,
    ) -> Result<ExtractionSummary, AppError> {
        reporter.report(ExtractionEvent::Interrupted {
            last_completed: self.last_completed,
        });
        self.save_checkpoint(reporter)?;
        self.state = RunState::Interrupted;
        Ok(self.summary())
    }

    fn save_checkpoint<R: ExtractionReporter>(&self, reporter: &R) -> Result<(), AppError> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot)?;
        reporter.report(ExtractionEvent::CheckpointSaved {
            last_completed: self.last_completed,
            places: snapshot.places.len(),
        });
        Ok(())
    }

    /// Current state as a checkpoint snapshot.
    pub fn snapshot(&self) -> CheckpointSnapshot {
        let mut seen_place_ids: Vec<String> =
            self.collector.seen_ids().map(str::to_string).collect();
        seen_place_ids.sort_unstable();

        CheckpointSnapshot {
            checkpoint: Checkpoint {
                last_completed_cell_index: self.last_completed,
                total_unique_places: self.collector.unique_count(),
                total_api_calls: self.api_calls,
                total_duplicates_skipped: self.collector.duplicate_count(),
                total_malformed_skipped: self.collector.malformed_count(),
                grid_cells: self.grid_cells,
                timestamp: Utc::now(),
            },
            seen_place_ids,
            places: self.collector.places().to_vec(),
        }
    }

    pub fn summary(&self) -> ExtractionSummary {
        ExtractionSummary {
            total_cells: self.grid_cells,
            cells_processed: self.cells_processed,
            last_completed_cell: self.last_completed,
            unique_places: self.collector.unique_count(),
            duplicates_skipped: self.collector.duplicate_count(),
            malformed_skipped: self.collector.malformed_count(),
            api_calls: self.api_calls,
            exhausted_queries: self.exhausted_queries,
        }
    }
}
