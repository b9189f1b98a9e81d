pub mod mask;
pub mod roboflow;

use std::path::Path;

use image::ImageReader;
use tracing::{debug, info, warn};

use crate::config::SegmentationConfig;
use crate::error::Result;
use crate::models::Detection;

pub use roboflow::HostedSegmentationModel;

/// One raw prediction from a detection model
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub detection_id: Option<String>,
    pub confidence: f32,
    pub class: Option<String>,
    /// Polygon vertices in source image pixels
    pub points: Vec<(f32, f32)>,
}

/// Backend that turns encoded image bytes into polygon predictions
pub trait DetectionModel {
    fn infer(&self, image: &[u8]) -> Result<Vec<Prediction>>;
}

/// Finds book spines in a shelf photo and cuts each one out
pub struct SegmentationService {
    model: Box<dyn DetectionModel>,
    min_confidence: Option<f32>,
}

impl SegmentationService {
    pub fn new(model: Box<dyn DetectionModel>) -> Self {
        Self {
            model,
            min_confidence: None,
        }
    }

    /// Build a service backed by the hosted model described in `config`
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        let model = HostedSegmentationModel::new(config)?;
        Ok(Self::new(Box::new(model)).with_min_confidence(config.min_confidence))
    }

    pub fn with_min_confidence(mut self, min_confidence: Option<f32>) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Run the model once and return one masked crop per accepted prediction.
    ///
    /// Any inference failure is returned as [`crate::error::PipelineError::Model`].
    pub fn segment(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let bytes = std::fs::read(image_path)?;
        let image = ImageReader::open(image_path)?.with_guessed_format()?.decode()?;
        let source_image_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let predictions = self.model.infer(&bytes)?;
        info!(
            image = %source_image_name,
            predictions = predictions.len(),
            "segmentation finished"
        );

        let mut detections = Vec::with_capacity(predictions.len());
        for prediction in predictions {
            if let Some(min) = self.min_confidence {
                if prediction.confidence < min {
                    debug!(
                        confidence = prediction.confidence,
                        min,
                        "dropping low-confidence prediction"
                    );
                    continue;
                }
            }

            let id = prediction
                .detection_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let Some(crop) = mask::crop_polygon(&image, &prediction.points) else {
                warn!(
                    detection = %id,
                    points = prediction.points.len(),
                    "skipping degenerate polygon"
                );
                continue;
            };

            debug!(
                detection = %id,
                class = prediction.class.as_deref().unwrap_or("unlabeled"),
                confidence = prediction.confidence,
                width = crop.width(),
                height = crop.height(),
                "cropped spine"
            );
            detections.push(Detection {
                id,
                confidence: prediction.confidence,
                polygon: prediction.points,
                crop,
                source_image_name: source_image_name.clone(),
            });
        }

        Ok(detections)
    }
}

impl std::fmt::Debug for SegmentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationService")
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

