pub mod browser;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod segmentation;

pub use browser::{Browser, BrowserSession, HttpBrowser, SessionGuard};
pub use catalog::{MetadataScraper, ScrapeError, ScrapeState};
pub use config::{
    BrowserConfig, ExtractionConfig, OutputConfig, PipelineConfig, RetryPolicy, ScrapeConfig,
    SearchConfig, SegmentationConfig, WaitPolicy,
};
pub use error::{PipelineError, Result};
pub use extraction::{TitleExtractionService, VisionModel};
pub use models::{
    BookRecord, BoundingBox, CandidateEntry, CandidateMap, CandidateOutcome, Catalog, CatalogRun,
    Detection, OutcomeStatus,
};
pub use pipeline::BookPipeline;
pub use search::SearchClient;
pub use segmentation::{DetectionModel, Prediction, SegmentationService};
