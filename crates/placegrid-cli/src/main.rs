use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use placegrid_client::{GooglePlacesClient, mask_api_key};
use placegrid_core::models::{BoundingBox, NearbyRequest, Place, SearchStatus};
use placegrid_core::traits::{CheckpointStore, NullCheckpointStore, PlacesApi, TokioSleeper};
use placegrid_core::{
    AppError, ExtractionConfig, ExtractionService, ExtractionSummary, GridCell,
    JsonCheckpointStore, JsonFileSink, RetryPolicy, RunOutcome, TracingReporter,
};

#[derive(Parser)]
#[command(
    name = "placegrid",
    version,
    about = "Exhaustive Google Places extraction over a lat/lng grid"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Append a debug-level log of every run to this file
    #[arg(long, global = true, env = "PLACEGRID_LOG_FILE", default_value = "extraction.log")]
    log_file: PathBuf,

    /// Log to stderr only
    #[arg(long, global = true, env = "PLACEGRID_NO_LOG_FILE")]
    no_log_file: bool,
}

impl Cli {
    fn log_file(&self) -> Option<&Path> {
        (!self.no_log_file).then_some(self.log_file.as_path())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search every grid cell for every category and write the unique places
    Extract {
        #[command(flatten)]
        area: AreaArgs,

        #[command(flatten)]
        grid: GridArgs,

        #[command(flatten)]
        categories: CategoryArgs,

        #[command(flatten)]
        timing: TimingArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Google Places API key
        #[arg(long, env = "GOOGLE_PLACES_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Show how many cells and API calls a run would take, without calling the API
    Plan {
        #[command(flatten)]
        area: AreaArgs,

        #[command(flatten)]
        grid: GridArgs,

        #[command(flatten)]
        categories: CategoryArgs,
    },

    /// Run one nearby search at the centre of the area to verify the setup
    Check {
        #[command(flatten)]
        area: AreaArgs,

        /// Place type to search for
        #[arg(long, default_value = "restaurant")]
        category: String,

        /// Search radius in metres
        #[arg(long, default_value_t = 1000)]
        radius: u32,

        /// Google Places API key
        #[arg(long, env = "GOOGLE_PLACES_API_KEY", hide_env_values = true)]
        api_key: String,
    },
}

/// Bounding box; unset edges fall back to the built-in area.
#[derive(Args)]
struct AreaArgs {
    #[arg(long, env = "PLACEGRID_NORTH", allow_negative_numbers = true)]
    north: Option<f64>,

    #[arg(long, env = "PLACEGRID_SOUTH", allow_negative_numbers = true)]
    south: Option<f64>,

    #[arg(long, env = "PLACEGRID_EAST", allow_negative_numbers = true)]
    east: Option<f64>,

    #[arg(long, env = "PLACEGRID_WEST", allow_negative_numbers = true)]
    west: Option<f64>,
}

impl AreaArgs {
    fn bbox(&self, default: BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.north.unwrap_or(default.north),
            self.south.unwrap_or(default.south),
            self.east.unwrap_or(default.east),
            self.west.unwrap_or(default.west),
        )
    }
}

#[derive(Args)]
struct GridArgs {
    /// Grid rows (south to north)
    #[arg(long, env = "PLACEGRID_ROWS")]
    rows: Option<u32>,

    /// Grid columns (west to east)
    #[arg(long, env = "PLACEGRID_COLS")]
    cols: Option<u32>,

    /// Search radius per cell in metres
    #[arg(long, env = "PLACEGRID_RADIUS")]
    radius: Option<u32>,
}

#[derive(Args)]
struct CategoryArgs {
    /// Comma-separated place types (defaults to the built-in list)
    #[arg(long, env = "PLACEGRID_CATEGORIES", value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// Skip the unfiltered search in each cell
    #[arg(long, env = "PLACEGRID_NO_GENERIC")]
    no_generic: bool,
}

#[derive(Args)]
struct TimingArgs {
    /// Pause after each query, in milliseconds
    #[arg(long, env = "PLACEGRID_REQUEST_DELAY_MS")]
    request_delay_ms: Option<u64>,

    /// Pause before using a next-page token, in milliseconds
    #[arg(long, env = "PLACEGRID_PAGINATION_DELAY_MS")]
    pagination_delay_ms: Option<u64>,

    /// Attempts per page before giving up
    #[arg(long, env = "PLACEGRID_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// First retry backoff in milliseconds; doubles on each failure
    #[arg(long, env = "PLACEGRID_RETRY_DELAY_MS")]
    retry_delay_ms: Option<u64>,
}

#[derive(Args)]
struct OutputArgs {
    /// Final JSON output file
    #[arg(short, long, env = "PLACEGRID_OUTPUT")]
    output: Option<PathBuf>,

    /// Checkpoint file used for resuming
    #[arg(long, env = "PLACEGRID_CHECKPOINT")]
    checkpoint: Option<PathBuf>,

    /// Save progress every N cells (0 saves only on interrupt)
    #[arg(long, env = "PLACEGRID_CHECKPOINT_INTERVAL")]
    checkpoint_interval: Option<usize>,

    /// Disable checkpointing entirely
    #[arg(long, env = "PLACEGRID_NO_CHECKPOINT")]
    no_checkpoint: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_file())?;

    match cli.command {
        Commands::Extract {
            area,
            grid,
            categories,
            timing,
            output,
            api_key,
        } => {
            let config = build_config(&area, &grid, &categories, Some(&timing), Some(&output));
            cmd_extract(config, &api_key).await
        }
        Commands::Plan {
            area,
            grid,
            categories,
        } => {
            let config = build_config(&area, &grid, &categories, None, None);
            cmd_plan(&config)
        }
        Commands::Check {
            area,
            category,
            radius,
            api_key,
        } => {
            let bbox = area.bbox(ExtractionConfig::default().bbox);
            cmd_check(bbox, &category, radius, &api_key).await
        }
    }
}

/// Console logging filtered by `RUST_LOG`, plus an optional debug log file.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env().add_directive("placegrid=info".parse()?));

    let file = match log_file {
        Some(path) => Some(file_layer(path)?),
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(())
}

/// Plain-text layer appending `placegrid` debug events to `path`.
fn file_layer<S>(path: &Path) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::<File>::new(file))
        .with_filter(EnvFilter::new("warn,placegrid=debug")))
}

/// Layer command-line/env overrides onto the built-in defaults.
fn build_config(
    area: &AreaArgs,
    grid: &GridArgs,
    categories: &CategoryArgs,
    timing: Option<&TimingArgs>,
    output: Option<&OutputArgs>,
) -> ExtractionConfig {
    let mut config = ExtractionConfig::default();

    config.bbox = area.bbox(config.bbox);
    config.rows = grid.rows.unwrap_or(config.rows);
    config.cols = grid.cols.unwrap_or(config.cols);
    config.radius_m = grid.radius.unwrap_or(config.radius_m);

    if let Some(list) = &categories.categories {
        config.categories = list.clone();
    }
    config.include_generic = !categories.no_generic;

    if let Some(timing) = timing {
        if let Some(ms) = timing.request_delay_ms {
            config.request_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.pagination_delay_ms {
            config.pagination_delay = Duration::from_millis(ms);
        }
        config.retry = RetryPolicy::new(
            timing.max_retries.unwrap_or(config.retry.max_attempts),
            timing
                .retry_delay_ms
                .map_or(config.retry.initial_delay, Duration::from_millis),
        );
    }

    if let Some(output) = output {
        if let Some(path) = &output.output {
            config.output_path = path.clone();
        }
        if let Some(path) = &output.checkpoint {
            config.checkpoint_path = path.clone();
        }
        config.checkpoint_interval = output
            .checkpoint_interval
            .unwrap_or(config.checkpoint_interval);
        config.enable_checkpointing = !output.no_checkpoint;
    }

    config
}

async fn cmd_extract(config: ExtractionConfig, api_key: &str) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let client = GooglePlacesClient::new(api_key).context("Failed to create HTTP client")?;
    let grid = config.grid();
    let plan = config.plan();

    tracing::info!(
        api_key = %mask_api_key(api_key),
        cells = plan.cells,
        tasks_per_cell = plan.tasks_per_cell,
        min_api_calls = plan.min_api_calls,
        radius_m = config.radius_m,
        output = %config.output_path.display(),
        "Starting placegrid extraction"
    );

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current search");
            token.cancel();
        }
    });

    let sink = JsonFileSink::new(&config.output_path);
    let result = if config.enable_checkpointing {
        let store = JsonCheckpointStore::new(&config.checkpoint_path);
        run_extraction(client, store, sink, &config, &grid, &cancel).await
    } else {
        run_extraction(client, NullCheckpointStore, sink, &config, &grid, &cancel).await
    };

    match result.context("Extraction failed")? {
        RunOutcome::Completed(summary) => {
            print_summary(&summary, &config);
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Interrupted(summary) => {
            eprintln!(
                "Interrupted after {} places and {} API calls.",
                summary.unique_places, summary.api_calls
            );
            if config.enable_checkpointing {
                eprintln!(
                    "Progress saved to {}; run the same command again to resume.",
                    config.checkpoint_path.display()
                );
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_extraction<A, K>(
    api: A,
    store: K,
    sink: JsonFileSink,
    config: &ExtractionConfig,
    grid: &[GridCell],
    cancel: &CancellationToken,
) -> Result<RunOutcome, AppError>
where
    A: PlacesApi,
    K: CheckpointStore,
{
    let mut service = ExtractionService::from_config(api, TokioSleeper, store, sink, config);
    service.run(grid, cancel, &TracingReporter).await
}

fn print_summary(summary: &ExtractionSummary, config: &ExtractionConfig) {
    println!("Extraction complete");
    println!("  Cells:              {}", summary.total_cells);
    println!("  Unique places:      {}", summary.unique_places);
    println!("  Duplicates skipped: {}", summary.duplicates_skipped);
    println!("  Malformed skipped:  {}", summary.malformed_skipped);
    println!("  API calls:          {}", summary.api_calls);
    if summary.exhausted_queries > 0 {
        println!("  Failed queries:     {}", summary.exhausted_queries);
    }
    println!("  Output:             {}", config.output_path.display());
}

fn cmd_plan(config: &ExtractionConfig) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;
    let plan = config.plan();
    let b = &config.bbox;

    println!(
        "Area:           N {} / S {} / E {} / W {}",
        b.north, b.south, b.east, b.west
    );
    println!(
        "Grid:           {} x {} = {} cells",
        config.rows, config.cols, plan.cells
    );
    println!(
        "Cell spacing:   {:.0} m (N-S) x {:.0} m (E-W)",
        plan.span_ns_m, plan.span_ew_m
    );
    println!(
        "Search radius:  {} m ({})",
        plan.radius_m,
        if plan.covers_cells() {
            "covers each cell"
        } else {
            "leaves gaps between cell centres"
        }
    );
    println!("Tasks per cell: {}", plan.tasks_per_cell);
    println!(
        "API calls:      {} to {} (before retries)",
        plan.min_api_calls, plan.max_api_calls
    );

    Ok(ExitCode::SUCCESS)
}

async fn cmd_check(bbox: BoundingBox, category: &str, radius: u32, api_key: &str) -> Result<ExitCode> {
    let client = GooglePlacesClient::new(api_key).context("Failed to create HTTP client")?;
    let center = bbox.center();
    let category = category.trim();

    println!("API key: {}", mask_api_key(api_key));
    println!("Searching near {center} (radius {radius} m)...");

    let request = NearbyRequest {
        location: center,
        radius_m: radius,
        category: (!category.is_empty()).then(|| category.to_string()),
        page_token: None,
    };
    let page = client
        .nearby_search(&request)
        .await
        .context("Nearby search request failed")?;

    println!("Status:  {}", page.status);
    println!("Results: {}", page.results.len());
    if let Some(message) = &page.error_message {
        println!("Message: {message}");
    }

    if let Some(place) = page.results.first().and_then(Place::from_record) {
        println!("Sample result:");
        println!("  Name:     {}", place.name);
        println!("  Place ID: {}", place.id);
        println!(
            "  Types:    {}",
            place
                .categories
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("  Location: ({}, {})", place.latitude, place.longitude);
    }

    let ok = match page.status {
        SearchStatus::Ok => true,
        SearchStatus::ZeroResults => {
            println!("The API works but found nothing; check the area and radius.");
            true
        }
        SearchStatus::RequestDenied => {
            println!("Request denied: enable the Places API and billing for this key.");
            false
        }
        SearchStatus::OverQueryLimit => {
            println!("Query limit exceeded: check the project's Places API quota.");
            false
        }
        _ => false,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
