use async_trait::async_trait;
use common::domain::{DeliveryError, DeliveryResult, Envelope, EnvelopeSink};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const EVENTS_PATH: &str = "/api/v1/events";

/// Longest response body fragment carried in a status error
pub const RESPONSE_EXCERPT_LEN: usize = 200;

#[derive(Serialize)]
struct WireBatch<'a> {
    events: &'a [Envelope],
}

/// Posts envelope batches to the ingestion endpoint
///
/// Only HTTP 200 counts as delivered.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    events_url: String,
    api_token: String,
}

impl HttpDeliveryClient {
    pub fn new(
        endpoint_url: &str,
        api_token: impl Into<String>,
        request_timeout: Duration,
    ) -> DeliveryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| DeliveryError::Transport(format!("http client build failed: {err}")))?;

        Ok(Self {
            client,
            events_url: format!("{}{}", endpoint_url.trim_end_matches('/'), EVENTS_PATH),
            api_token: api_token.into(),
        })
    }

    pub fn events_url(&self) -> &str {
        &self.events_url
    }
}

#[async_trait]
impl EnvelopeSink for HttpDeliveryClient {
    #[instrument(skip_all, fields(batch_size = batch.len()))]
    async fn deliver(&self, batch: &[Envelope]) -> DeliveryResult<()> {
        let response = self
            .client
            .post(&self.events_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .json(&WireBatch { events: batch })
            .send()
            .await
            .map_err(|err| {
                if err.is_builder() {
                    DeliveryError::Encode(err.to_string())
                } else {
                    DeliveryError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            debug!("batch accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            excerpt: excerpt(&text),
        })
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(RESPONSE_EXCERPT_LEN).collect()
}
