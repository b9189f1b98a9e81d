use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::Result;

/// Axis-aligned box in source image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box that covers every vertex, clamped at zero
    pub fn around(polygon: &[(f32, f32)]) -> Option<Self> {
        if polygon.is_empty() {
            return None;
        }

        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for &(x, y) in polygon {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let x = min_x.max(0.0) as u32;
        let y = min_y.max(0.0) as u32;
        Some(Self {
            x,
            y,
            width: (max_x.max(0.0) as u32).saturating_sub(x) + 1,
            height: (max_y.max(0.0) as u32).saturating_sub(y) + 1,
        })
    }
}

/// One segmented book spine
#[derive(Debug, Clone)]
pub struct Detection {
    pub id: String,
    pub confidence: f32,
    /// Polygon vertices in the order returned by the model
    pub polygon: Vec<(f32, f32)>,
    /// Masked crop of the spine's bounding box; pixels outside the polygon are black
    pub crop: DynamicImage,
    pub source_image_name: String,
}

impl Detection {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::around(&self.polygon)
    }

    pub fn crop_file_name(&self) -> String {
        format!("segmented_{}.png", self.id)
    }
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Extraction result for one candidate title, as written to the checkpoint
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CandidateEntry {
    pub extraction_result: String,
    pub crop_path: PathBuf,
    pub polygon: Vec<(f32, f32)>,
}

/// Metadata scraped from a catalog page
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BookRecord {
    pub title: String,
    pub authors: String,
    pub description: String,
    pub genres: Vec<String>,
    pub reviews: Vec<String>,
    pub source_link: String,
}

/// String-keyed map that iterates in first-insertion order.
///
/// Re-inserting an existing key replaces the value but keeps its position.
#[derive(Debug, Clone)]
pub struct InsertionMap<V> {
    order: Vec<String>,
    entries: HashMap<String, V>,
}

impl<V> InsertionMap<V> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Insert or overwrite, returning the replaced value
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|value| (key.as_str(), value)))
    }
}

impl<V> Default for InsertionMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for InsertionMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Candidate title → extraction metadata
pub type CandidateMap = InsertionMap<CandidateEntry>;

/// Book name → scraped record
pub type Catalog = InsertionMap<BookRecord>;

/// What happened to one detection or candidate during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// `replaced` is set when an earlier candidate had already stored a
    /// record under the same book name
    Found { link: String, replaced: bool },
    /// No search result pointed at the catalog site
    NoLink,
    SearchFailed { reason: String },
    ScrapeFailed { link: String, reason: String },
    /// The language model returned no usable title for a detection
    ExtractionMiss { reason: Option<String> },
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Found { .. } => "found",
            OutcomeStatus::NoLink => "no-link",
            OutcomeStatus::SearchFailed { .. } => "search-failed",
            OutcomeStatus::ScrapeFailed { .. } => "scrape-failed",
            OutcomeStatus::ExtractionMiss { .. } => "extraction-miss",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Found {
                link,
                replaced: false,
            } => write!(f, "found ({link})"),
            OutcomeStatus::Found {
                link,
                replaced: true,
            } => write!(f, "found ({link}), replacing an earlier record"),
            OutcomeStatus::NoLink => write!(f, "no-link"),
            OutcomeStatus::SearchFailed { reason } => write!(f, "search-failed: {reason}"),
            OutcomeStatus::ScrapeFailed { link, reason } => {
                write!(f, "scrape-failed ({link}): {reason}")
            }
            OutcomeStatus::ExtractionMiss { reason: Some(reason) } => {
                write!(f, "extraction-miss: {reason}")
            }
            OutcomeStatus::ExtractionMiss { reason: None } => write!(f, "extraction-miss"),
        }
    }
}

/// Outcome keyed by candidate title, or by detection id for extraction misses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOutcome {
    pub key: String,
    pub status: OutcomeStatus,
}

/// Everything a run hands back to its caller
#[derive(Debug, Clone, Default)]
pub struct CatalogRun {
    pub detections: usize,
    pub candidates: CandidateMap,
    pub catalog: Catalog,
    pub outcomes: Vec<CandidateOutcome>,
}

impl CatalogRun {
    pub fn outcome(&self, key: &str) -> Option<&OutcomeStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.key == key)
            .map(|outcome| &outcome.status)
    }

    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status.label() == label)
            .count()
    }
}

/// Catalog key for a candidate: words split on whitespace and the
/// title/author hyphen, joined with single spaces
pub fn book_name(candidate: &str) -> String {
    candidate
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
