//! Upload client for the highlight-management service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;

use crate::model::HighlightPayload;

/// Transport seam for highlight submission, so the sync pass can run against
/// a recording fake in tests.
#[async_trait]
pub trait HighlightSink {
    /// Submit one batch. Any error means the whole batch is considered
    /// not-uploaded and stays eligible for a future run.
    async fn send(&self, batch: &[HighlightPayload]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
    highlights: &'a [HighlightPayload],
}

pub struct ReadwiseClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl ReadwiseClient {
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl HighlightSink for ReadwiseClient {
    async fn send(&self, batch: &[HighlightPayload]) -> Result<()> {
        let response = self
            .http
            .post(&self.api_url)
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .json(&UploadBody { highlights: batch })
            .send()
            .await
            .context("highlight upload request failed")?;

        response
            .error_for_status()
            .context("highlight upload rejected")?;

        Ok(())
    }
}
