use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

/// Rectangular search area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.south..=self.north).contains(&point.lat)
            && (self.west..=self.east).contains(&point.lng)
    }
}

/// One point of interest, as written to the output and checkpoint files.
///
/// Field names on the wire (`place_id`, `types`) are the ones read by the
/// viewer and report tools, so they must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(rename = "place_id")]
    pub id: String,
    pub name: String,
    /// Category tags; the first one is the primary category.
    #[serde(rename = "types")]
    pub categories: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Place {
    /// Build a place from a raw nearby-search result.
    ///
    /// Returns `None` when the record has no usable `place_id`. Missing
    /// geometry becomes the `(0.0, 0.0)` sentinel.
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = record
            .get("place_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())?;

        let name = record
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let categories = record
            .get("types")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let location = record.pointer("/geometry/location");
        let coord = |key: &str| {
            location
                .and_then(|l| l.get(key))
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        };

        Some(Self {
            id: id.to_string(),
            name: name.to_string(),
            categories,
            latitude: coord("lat"),
            longitude: coord("lng"),
        })
    }

    pub fn primary_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    /// False for the `(0.0, 0.0)` sentinel used when the source omitted geometry.
    pub fn has_location(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// A search unit: the centre of one mesh cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub center_lat: f64,
    pub center_lng: f64,
}

impl GridCell {
    pub fn center(&self) -> LatLng {
        LatLng::new(self.center_lat, self.center_lng)
    }
}

/// Optional place-type restriction for one search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CategoryFilter {
    Type(String),
    /// No type filter.
    Generic,
}

impl CategoryFilter {
    pub fn as_type(&self) -> Option<&str> {
        match self {
            CategoryFilter::Type(t) => Some(t),
            CategoryFilter::Generic => None,
        }
    }

    pub fn label(&self) -> &str {
        self.as_type().unwrap_or("generic")
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One (cell, category) pair. Never persisted; implied by loop position.
#[derive(Debug, Clone, Copy)]
pub struct SearchTask<'a> {
    pub cell_index: usize,
    pub cell: &'a GridCell,
    pub category: &'a CategoryFilter,
}

/// A single nearby-search call.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyRequest {
    pub location: LatLng,
    pub radius_m: u32,
    pub category: Option<String>,
    pub page_token: Option<String>,
}

/// Status string returned by the nearby-search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Ok,
    ZeroResults,
    OverQueryLimit,
    RequestDenied,
    InvalidRequest,
    UnknownError,
    Other(String),
}

impl SearchStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "OK" => SearchStatus::Ok,
            "ZERO_RESULTS" => SearchStatus::ZeroResults,
            "OVER_QUERY_LIMIT" => SearchStatus::OverQueryLimit,
            "REQUEST_DENIED" => SearchStatus::RequestDenied,
            "INVALID_REQUEST" => SearchStatus::InvalidRequest,
            "UNKNOWN_ERROR" => SearchStatus::UnknownError,
            other => SearchStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SearchStatus::Ok => "OK",
            SearchStatus::ZeroResults => "ZERO_RESULTS",
            SearchStatus::OverQueryLimit => "OVER_QUERY_LIMIT",
            SearchStatus::RequestDenied => "REQUEST_DENIED",
            SearchStatus::InvalidRequest => "INVALID_REQUEST",
            SearchStatus::UnknownError => "UNKNOWN_ERROR",
            SearchStatus::Other(s) => s,
        }
    }

    /// `OK` and `ZERO_RESULTS` both end a page successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, SearchStatus::Ok | SearchStatus::ZeroResults)
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of nearby-search results.
#[derive(Debug, Clone)]
pub struct NearbyPage {
    pub status: SearchStatus,
    pub results: Vec<Value>,
    pub next_page_token: Option<String>,
    pub error_message: Option<String>,
}

impl NearbyPage {
    pub fn ok(results: Vec<Value>, next_page_token: Option<String>) -> Self {
        Self {
            status: SearchStatus::Ok,
            results,
            next_page_token,
            error_message: None,
        }
    }

    pub fn with_status(status: SearchStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
            next_page_token: None,
            error_message: None,
        }
    }
}
