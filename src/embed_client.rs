//! Client for the embedding service's `POST /embed` endpoint.
//!
//! Texts are sent in chunks of `batch_size`; the returned vectors are checked
//! for count and (optionally) dimension before being concatenated in input
//! order.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::LoaderConfig;
use crate::models::{EmbedRequest, EmbedResponse};

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("empty embedding response")]
    Empty,

    #[error("embedding count mismatch: sent {sent}, got {got}")]
    CountMismatch { sent: usize, got: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<EmbedError> },
}

pub struct EmbedClient {
    http: reqwest::Client,
    /// Base URL of the service, without the `/embed` path.
    base_url: String,
    batch_size: usize,
    max_retries: u32,
    /// If set, every returned vector must have this length.
    expected_dim: Option<usize>,
    /// First retry delay; doubled per attempt.
    base_delay: Duration,
}

impl EmbedClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        expected_dim: Option<usize>,
    ) -> Result<Self, EmbedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_size: 64,
            max_retries,
            expected_dim,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Build a client from the `[loader]` section.
    pub fn from_config(config: &LoaderConfig, expected_dim: Option<usize>) -> Result<Self, EmbedError> {
        Ok(Self::new(
            config.embed_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            expected_dim,
        )?
        .with_batch_size(config.batch_size))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Override the first backoff delay (tests use milliseconds).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn embed_url(&self) -> String {
        format!("{}/embed", self.base_url)
    }

    /// Embed a single text.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut out = self.embed_texts(&[text.to_string()]).await?;
        out.pop().ok_or(EmbedError::Empty)
    }

    /// Embed many texts, batching requests. Output order matches input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let mut part = self.embed_batch(batch).await?;
            if part.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    sent: batch.len(),
                    got: part.len(),
                });
            }
            if let Some(expected) = self.expected_dim {
                if let Some(bad) = part.iter().find(|v| v.len() != expected) {
                    return Err(EmbedError::DimMismatch {
                        expected,
                        got: bad.len(),
                    });
                }
            }
            vectors.append(&mut part);
        }
        Ok(vectors)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = EmbedRequest {
            texts: texts.to_vec(),
        };
        let url = self.embed_url();

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * (1u32 << (attempt - 1).min(5));
                let reason = last_err
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "retrying embed request"
                );
                tokio::time::sleep(delay).await;
            }

            match self.http.post(&url).json(&body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbedResponse = response.json().await?;
                        return Ok(parsed.vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = EmbedError::Status {
                        status,
                        body: body_text,
                    };
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(EmbedError::Http(e));
                    continue;
                }
            }
        }

        let last = last_err.unwrap_or(EmbedError::Empty);
        if self.max_retries == 0 {
            return Err(last);
        }
        Err(EmbedError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: Box::new(last),
        })
    }
}
