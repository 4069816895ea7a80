use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::grid::{cell_span_meters, generate_grid};
use crate::models::{BoundingBox, CategoryFilter, GridCell};
use crate::retry::RetryPolicy;
use crate::search::SearchConfig;

/// Pages the nearby-search endpoint hands out per query at most (3 × 20).
pub const MAX_PAGES_PER_QUERY: u64 = 3;

/// Place types queried in every cell by default.
#[rustfmt::skip]
pub const DEFAULT_CATEGORIES: &[&str] = &[
    // Essential/Common
    "restaurant", "cafe", "bar", "food",
    "lodging", "hotel", "mosque",
    "school", "university", "library",
    "hospital", "pharmacy", "doctor", "dentist",
    "bank", "atm",
    "store", "supermarket", "shopping_mall",
    "gas_station", "car_repair",
    "bus_station", "taxi_stand", "airport",
    // Services
    "laundry", "beauty_salon", "hair_care", "spa",
    "gym", "stadium", "park",
    "movie_theater", "night_club", "casino",
    "travel_agency", "real_estate_agency",
    "lawyer", "accountant", "insurance_agency",
    "post_office", "courthouse", "embassy",
    "police", "fire_station", "local_government_office",
    // Retail
    "bakery", "electronics_store", "furniture_store",
    "hardware_store", "home_goods_store",
    "clothing_store", "shoe_store", "jewelry_store",
    "book_store", "florist", "pet_store",
    // Automotive
    "car_dealer", "car_rental", "car_wash", "parking",
    // Religious & cultural
    "church", "hindu_temple", "synagogue",
    "museum", "art_gallery", "aquarium", "zoo",
    // Professional
    "veterinary_care", "plumber", "electrician",
    "locksmith", "roofing_contractor", "painter",
    "moving_company", "storage",
    // Financial
    "finance", "accounting",
    // Miscellaneous
    "point_of_interest", "establishment",
    "cemetery", "funeral_home",
    "campground", "rv_park",
    "tourist_attraction", "amusement_park",
];

/// Every tunable of an extraction run.
///
/// Defaults cover metropolitan Nouakchott with a 10×10 grid and a 1 km
/// radius. Radius and grid divisions are independent: a radius wider than
/// half the cell spacing makes neighbouring searches overlap, and the
/// collector absorbs the resulting duplicates.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub bbox: BoundingBox,
    pub rows: u32,
    pub cols: u32,
    pub radius_m: u32,
    pub categories: Vec<String>,
    /// Also run one unfiltered search per cell.
    pub include_generic: bool,
    pub request_delay: Duration,
    pub pagination_delay: Duration,
    pub retry: RetryPolicy,
    /// Save a checkpoint every N cells; 0 disables periodic saves.
    pub checkpoint_interval: usize,
    pub enable_checkpointing: bool,
    pub output_path: PathBuf,
    pub checkpoint_path: PathBuf,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::new(18.15, 17.95, -15.85, -16.10),
            rows: 10,
            cols: 10,
            radius_m: 1000,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            include_generic: true,
            request_delay: Duration::from_millis(500),
            pagination_delay: Duration::from_millis(2500),
            retry: RetryPolicy::default(),
            checkpoint_interval: 10,
            enable_checkpointing: true,
            output_path: PathBuf::from("nouakchott_places.json"),
            checkpoint_path: PathBuf::from("extraction_checkpoint.json"),
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let b = &self.bbox;
        if ![b.north, b.south, b.east, b.west].iter().all(|v| v.is_finite()) {
            return Err(AppError::ConfigError(
                "bounding box coordinates must be finite".into(),
            ));
        }
        if b.north <= b.south {
            return Err(AppError::ConfigError(format!(
                "north ({}) must be greater than south ({})",
                b.north, b.south
            )));
        }
        if b.east <= b.west {
            return Err(AppError::ConfigError(format!(
                "east ({}) must be greater than west ({})",
                b.east, b.west
            )));
        }
        if !(-90.0..=90.0).contains(&b.north) || !(-90.0..=90.0).contains(&b.south) {
            return Err(AppError::ConfigError(
                "latitudes must lie within [-90, 90]".into(),
            ));
        }
        if !(-180.0..=180.0).contains(&b.east) || !(-180.0..=180.0).contains(&b.west) {
            return Err(AppError::ConfigError(
                "longitudes must lie within [-180, 180]".into(),
            ));
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(AppError::ConfigError(format!(
                "grid must have at least one row and one column, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.radius_m == 0 || self.radius_m > 50_000 {
            return Err(AppError::ConfigError(format!(
                "search radius {} m must be between 1 and 50000",
                self.radius_m
            )));
        }
        if self.search_tasks().is_empty() {
            return Err(AppError::ConfigError(
                "no categories configured and generic search disabled".into(),
            ));
        }
        Ok(())
    }

    /// Generate the cell sequence for this configuration.
    pub fn grid(&self) -> Vec<GridCell> {
        generate_grid(&self.bbox, self.rows, self.cols)
    }

    /// Category filters run in every cell, in order: configured types, then
    /// the unfiltered search.
    pub fn search_tasks(&self) -> Vec<CategoryFilter> {
        let mut tasks: Vec<CategoryFilter> = self
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| CategoryFilter::Type(c.to_string()))
            .collect();
        if self.include_generic {
            tasks.push(CategoryFilter::Generic);
        }
        tasks
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            radius_m: self.radius_m,
            request_delay: self.request_delay,
            pagination_delay: self.pagination_delay,
            retry: self.retry,
        }
    }

    /// Quota estimate for a full run, without touching the API.
    pub fn plan(&self) -> ExtractionPlan {
        let cells = u64::from(self.rows) * u64::from(self.cols);
        let tasks_per_cell = self.search_tasks().len() as u64;
        let (span_ns_m, span_ew_m) = cell_span_meters(&self.bbox, self.rows, self.cols);
        ExtractionPlan {
            cells,
            tasks_per_cell,
            min_api_calls: cells * tasks_per_cell,
            max_api_calls: cells * tasks_per_cell * MAX_PAGES_PER_QUERY,
            span_ns_m,
            span_ew_m,
            radius_m: self.radius_m,
        }
    }
}

/// Size of a run: how many searches it issues and how the search circles
/// relate to the cell spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPlan {
    pub cells: u64,
    pub tasks_per_cell: u64,
    /// One page per query, no retries.
    pub min_api_calls: u64,
    /// Every query paginates fully, no retries.
    pub max_api_calls: u64,
    pub span_ns_m: f64,
    pub span_ew_m: f64,
    pub radius_m: u32,
}

impl ExtractionPlan {
    /// True when the search circle reaches the cell corners, leaving no gaps
    /// between neighbouring searches.
    pub fn covers_cells(&self) -> bool {
        let half_diagonal = (self.span_ns_m.powi(2) + self.span_ew_m.powi(2)).sqrt() / 2.0;
        f64::from(self.radius_m) >= half_diagonal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grid().len(), 100);
        assert_eq!(config.search_tasks().last(), Some(&CategoryFilter::Generic));
        assert_eq!(config.search_tasks().len(), DEFAULT_CATEGORIES.len() + 1);
    }

    #[test]
    fn generic_search_can_be_disabled() {
        let config = ExtractionConfig {
            categories: vec!["bank".into(), " ".into(), "atm".into()],
            include_generic: false,
            ..ExtractionConfig::default()
        };
        assert_eq!(
            config.search_tasks(),
            vec![
                CategoryFilter::Type("bank".into()),
                CategoryFilter::Type("atm".into())
            ]
        );
    }

    #[test]
    fn inverted_box_is_rejected() {
        let config = ExtractionConfig {
            bbox: BoundingBox::new(17.0, 18.0, -15.0, -16.0),
            ..ExtractionConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn zero_radius_is_rejected() {
        let config = ExtractionConfig {
            radius_m: 0,
            ..ExtractionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_grid_divisions_are_rejected() {
        for (rows, cols) in [(0, 10), (10, 0), (0, 0)] {
            let config = ExtractionConfig {
                rows,
                cols,
                ..ExtractionConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(AppError::ConfigError(ref m)) if m.contains("row")),
                "{rows}x{cols} passed validation"
            );
        }
    }

    #[test]
    fn empty_task_list_is_rejected() {
        let config = ExtractionConfig {
            categories: vec![],
            include_generic: false,
            ..ExtractionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn plan_counts_calls() {
        let config = ExtractionConfig {
            rows: 4,
            cols: 5,
            categories: vec!["cafe".into(), "bank".into()],
            ..ExtractionConfig::default()
        };
        let plan = config.plan();
        assert_eq!(plan.cells, 20);
        assert_eq!(plan.tasks_per_cell, 3);
        assert_eq!(plan.min_api_calls, 60);
        assert_eq!(plan.max_api_calls, 180);
    }

    #[test]
    fn coverage_depends_on_radius() {
        let mut config = ExtractionConfig::default();
        assert!(!config.plan().covers_cells());
        config.radius_m = 2_000;
        assert!(config.plan().covers_cells());
    }
}
