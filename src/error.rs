use thiserror::Error;

/// Errors raised by the identification and enrichment pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The detection model could not produce predictions. Fatal for a run.
    #[error("detection model failed: {0}")]
    Model(String),

    #[error("request to {service} failed: {source}")]
    Upstream {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to load {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("browser session has no page loaded")]
    NoPage,

    /// A required DOM node is missing from the page.
    #[error("element `{selector}` not found on {url}")]
    ElementNotFound { selector: String, url: String },

    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn upstream(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| PipelineError::Upstream { service, source }
    }

    pub fn is_element_not_found(&self) -> bool {
        matches!(self, PipelineError::ElementNotFound { .. })
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
