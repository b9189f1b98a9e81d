//! Chat-completions client for vision prompts.

use std::thread;
use std::time::Duration;

use base64::Engine;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::VisionModel;
use crate::config::{ExtractionConfig, RetryPolicy};
use crate::error::{PipelineError, Result};

const SERVICE: &str = "chat completions";

/// Blocking client for OpenAI-compatible chat completion endpoints
pub struct OpenAiVisionClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiVisionClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|e| PipelineError::UpstreamStatus {
                service: SERVICE,
                status: 0,
                body: format!("invalid API key header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(PipelineError::upstream(SERVICE))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: config.retry,
        })
    }
}

impl VisionModel for OpenAiVisionClient {
    fn ask(&self, image_png: &[u8], instruction: &str) -> Result<Option<String>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    Content::Text {
                        r#type: "text",
                        text: instruction,
                    },
                    Content::Image {
                        r#type: "image_url",
                        image_url: ImageUrl {
                            url: format!("data:image/png;base64,{encoded}"),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let body = send_with_retry(&self.retry, || {
            let resp = self.client.post(&self.endpoint).json(&request).send()?;
            let status = resp.status();
            Ok((status, resp.text()?))
        })?;
        let body: Value = serde_json::from_str(&body)?;
        Ok(first_answer(&body))
    }
}

/// What to do with a response received on attempt `attempt` (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Accept,
    Retry(Duration),
    Fail,
}

fn next_step(status: StatusCode, attempt: usize, policy: &RetryPolicy) -> Step {
    if status.is_success() {
        Step::Accept
    } else if should_retry(status) && attempt < policy.max_attempts {
        Step::Retry(policy.backoff(attempt))
    } else {
        Step::Fail
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Repeat `send` until a response is accepted or `policy` runs out.
///
/// Returns the body of the accepted response.
fn send_with_retry<F>(policy: &RetryPolicy, mut send: F) -> Result<String>
where
    F: FnMut() -> std::result::Result<(StatusCode, String), reqwest::Error>,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match send() {
            Ok((status, body)) => match next_step(status, attempt, policy) {
                Step::Accept => return Ok(body),
                Step::Retry(delay) => {
                    warn!(%status, attempt, "chat completion throttled, retrying");
                    thread::sleep(delay);
                }
                Step::Fail => {
                    warn!(%status, attempt, "chat completion failed");
                    return Err(PipelineError::UpstreamStatus {
                        service: SERVICE,
                        status: status.as_u16(),
                        body,
                    });
                }
            },
            Err(err) if is_retryable_error(&err) && attempt < policy.max_attempts => {
                warn!(error = %err, attempt, "chat completion failed, retrying");
                thread::sleep(policy.backoff(attempt));
            }
            Err(err) => {
                return Err(PipelineError::Upstream {
                    service: SERVICE,
                    source: err,
                });
            }
        }
    }
}

/// `choices[0].message.content`, if the payload has one
fn first_answer(body: &Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Content<'a> {
    Text { r#type: &'a str, text: &'a str },
    Image { r#type: &'a str, image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}
