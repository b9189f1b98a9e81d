#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from shelfscan for tests
pub use shelfscan::browser::with_session;
pub use shelfscan::{
    BookRecord, CatalogRun, MetadataScraper, OutcomeStatus, PipelineError, ScrapeState,
    SearchClient, SearchConfig,
};
