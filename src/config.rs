use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL_ID: &str = "bookstore-cxuck/1";

pub const TITLE_INSTRUCTION: &str = "Read the text on the book spine. \
    Only say the book cover title and author if you can find them. \
    Return the format [title]-[author], with hypen in between.";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36";

/// Settings for the hosted instance-segmentation model
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    pub api_key: String,
    pub model_id: String,
    pub endpoint: String,
    /// Predictions below this score are dropped. `None` keeps everything.
    pub min_confidence: Option<f32>,
    pub timeout: Duration,
}

impl SegmentationConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            endpoint: "https://outline.roboflow.com".to_string(),
            min_confidence: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: Option<f32>) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

/// Retry behaviour for calls to the language model
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before the given retry (1-based), doubling up to 32x the base delay
    pub fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.base_delay * (1u32 << capped)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub instruction: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ExtractionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-4-turbo".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            instruction: TITLE_INSTRUCTION.to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    /// CSS class that marks one organic result row
    pub result_row_class: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.google.com/search".to_string(),
            result_row_class: "MjjYud".to_string(),
        }
    }
}

/// Bounded wait-for-condition: poll every `poll_interval` until `timeout` elapses
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn immediate() -> Self {
        Self {
            timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Links must start with this origin to be scraped
    pub site_base: String,
    /// Appended to every search query
    pub site_hint: String,
    pub max_reviews: usize,
    pub review_wait: WaitPolicy,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            site_base: "https://www.goodreads.com/".to_string(),
            site_hint: "goodreads".to_string(),
            max_reviews: 3,
            review_wait: WaitPolicy::default(),
        }
    }
}

/// Where the run writes its crops and JSON snapshots
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub scratch_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub catalog_path: PathBuf,
}

impl OutputConfig {
    /// Lay out all outputs under a single directory
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            checkpoint_path: dir.join("temp").join("all_details.json"),
            catalog_path: dir.join("book_details.json"),
            scratch_dir: dir.join("temp"),
        }
    }

    pub fn segmentations_dir(&self) -> PathBuf {
        self.scratch_dir.join("segmentations")
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("temp"),
            checkpoint_path: PathBuf::from("temp/all_details.json"),
            catalog_path: PathBuf::from("book_details.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output: OutputConfig,
    pub scrape: ScrapeConfig,
    /// Pause between candidates to stay under search and catalog rate limits
    pub candidate_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            scrape: ScrapeConfig::default(),
            candidate_delay: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn with_scrape(mut self, scrape: ScrapeConfig) -> Self {
        self.scrape = scrape;
        self
    }

    pub fn with_candidate_delay(mut self, delay: Duration) -> Self {
        self.candidate_delay = delay;
        self
    }
}
