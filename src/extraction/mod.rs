pub mod openai;

use image::DynamicImage;
use tracing::debug;

use crate::config::{ExtractionConfig, TITLE_INSTRUCTION};
use crate::error::Result;
use crate::models::encode_png;

pub use openai::OpenAiVisionClient;

/// A multimodal model that answers an instruction about one image
pub trait VisionModel {
    /// Returns the raw text of the first answer, or `None` when the
    /// response carries no answer at all.
    fn ask(&self, image_png: &[u8], instruction: &str) -> Result<Option<String>>;
}

/// Reads a "title-author" string off a cropped spine
pub struct TitleExtractionService {
    model: Box<dyn VisionModel>,
    instruction: String,
}

impl TitleExtractionService {
    pub fn new(model: Box<dyn VisionModel>) -> Self {
        Self {
            model,
            instruction: TITLE_INSTRUCTION.to_string(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let client = OpenAiVisionClient::new(config)?;
        Ok(Self::new(Box::new(client)).with_instruction(config.instruction.clone()))
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn extract(&self, crop: &DynamicImage) -> Result<Option<String>> {
        let png = encode_png(crop)?;
        let answer = self.model.ask(&png, &self.instruction)?;
        debug!(raw = ?answer, "title extraction answered");
        Ok(answer.as_deref().and_then(clean_title))
    }
}

/// Drop every trailing `Title:` artifact, flatten newlines and trim.
///
/// Returns `None` when nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let mut text = raw.trim_end();
    while let Some(stripped) = text.strip_suffix("Title:") {
        text = stripped.trim_end();
    }

    let cleaned = text.replace("\r\n", " ").replace('\n', " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
