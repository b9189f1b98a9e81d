//! Client for a hosted instance-segmentation endpoint.

use base64::Engine;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use super::{DetectionModel, Prediction};
use crate::config::SegmentationConfig;
use crate::error::{PipelineError, Result};

pub struct HostedSegmentationModel {
    client: Client,
    url: String,
    api_key: String,
}

impl HostedSegmentationModel {
    pub fn new(config: &SegmentationConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::Model("missing segmentation API key".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Model(format!("failed to build HTTP client: {e}")))?;
        let url = format!(
            "{}/{}",
            config.endpoint.trim_end_matches('/'),
            config.model_id.trim_matches('/')
        );
        Ok(Self {
            client,
            url,
            api_key: config.api_key.trim().to_string(),
        })
    }
}

impl DetectionModel for HostedSegmentationModel {
    fn infer(&self, image: &[u8]) -> Result<Vec<Prediction>> {
        let body = base64::engine::general_purpose::STANDARD.encode(image);
        debug!(url = %self.url, bytes = image.len(), "requesting segmentation");

        let resp = self
            .client
            .post(&self.url)
            .query(&[("api_key", self.api_key.as_str())])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .map_err(|e| PipelineError::Model(format!("inference request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        if !status.is_success() {
            return Err(PipelineError::Model(format!(
                "inference endpoint returned {status}: {text}"
            )));
        }

        parse_predictions(&text)
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    predictions: Option<Vec<RawPrediction>>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    detection_id: Option<String>,
    confidence: f32,
    class: Option<String>,
    #[serde(default)]
    points: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    x: f32,
    y: f32,
}

fn parse_predictions(body: &str) -> Result<Vec<Prediction>> {
    let parsed: InferenceResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Model(format!("malformed inference response: {e}")))?;
    let predictions = parsed.predictions.ok_or_else(|| {
        PipelineError::Model(format!("inference response has no predictions: {body}"))
    })?;

    Ok(predictions
        .into_iter()
        .map(|raw| Prediction {
            detection_id: raw.detection_id,
            confidence: raw.confidence,
            class: raw.class,
            points: raw.points.into_iter().map(|p| (p.x, p.y)).collect(),
        })
        .collect())
}
