use std::collections::HashSet;

use serde_json::Value;

use crate::models::Place;

/// Result of ingesting one raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Added,
    /// The id was already collected; the record was discarded.
    Duplicate,
    /// The record had no `place_id`.
    Malformed,
}

/// Accumulates places keyed by their external id.
///
/// The first sighting of an id wins; later sightings are counted and
/// dropped, never merged.
#[derive(Debug, Default, Clone)]
pub struct Collector {
    seen: HashSet<String>,
    /// Insertion order is kept so the output sort stays stable.
    places: Vec<Place>,
    duplicates: u64,
    malformed: u64,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild collector state from a checkpoint.
    ///
    /// Every place id is marked seen even if `seen_ids` omits it, and a
    /// repeated place keeps only its first copy.
    pub fn restore(
        seen_ids: impl IntoIterator<Item = String>,
        places: Vec<Place>,
        duplicates: u64,
        malformed: u64,
    ) -> Self {
        let mut seen: HashSet<String> = seen_ids.into_iter().collect();
        let mut kept = Vec::with_capacity(places.len());
        let mut restored = HashSet::with_capacity(places.len());
        for place in places {
            if restored.insert(place.id.clone()) {
                seen.insert(place.id.clone());
                kept.push(place);
            }
        }

        Self {
            seen,
            places: kept,
            duplicates,
            malformed,
        }
    }

    pub fn ingest(&mut self, record: &Value) -> Ingest {
        let Some(place) = Place::from_record(record) else {
            self.malformed += 1;
            let name = record.get("name").and_then(Value::as_str).unwrap_or("unknown");
            tracing::warn!(%name, "Place without place_id");
            return Ingest::Malformed;
        };

        if self.seen.contains(&place.id) {
            self.duplicates += 1;
            return Ingest::Duplicate;
        }

        self.seen.insert(place.id.clone());
        self.places.push(place);
        Ingest::Added
    }

    pub fn unique_count(&self) -> usize {
        self.places.len()
    }

    pub fn duplicate_count(&self) -> u64 {
        self.duplicates
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Places in the order they were first seen.
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn seen_ids(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    /// Places sorted by lowercase name; equal names keep insertion order.
    pub fn sorted_places(&self) -> Vec<Place> {
        let mut places = self.places.clone();
        places.sort_by_cached_key(|p| p.name.to_lowercase());
        places
    }
}
