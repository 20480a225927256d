//! Pure Opus Blocks REST API client.
//!
//! A minimal client for the research-assistant backend. Supports submitting
//! pipeline jobs (fact extraction, paragraph generation, verification,
//! sentence edits), fetching job status, and reading back paragraph views,
//! fact libraries and run history.
//!
//! # Example
//!
//! ```rust,ignore
//! use opus_client::OpusClient;
//!
//! let client = OpusClient::new("http://localhost:8000/api/v1").with_token(token);
//!
//! let receipt = client.generate_paragraph(&paragraph_id).await?;
//! let job = client.get_job(&receipt.id.unwrap()).await?;
//! println!("{} is {}", job.job_type, job.status);
//! ```

pub mod error;
pub mod types;

pub use error::{resolve_detail, OpusError, Result};
pub use types::*;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Default API root when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

#[derive(Clone)]
pub struct OpusClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl OpusClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue fact extraction for a document.
    pub async fn extract_facts(&self, document_id: &str) -> Result<SubmitReceipt> {
        let path = format!("/documents/{}/extract_facts", document_id);
        self.submit(self.request(Method::POST, &path)).await
    }

    /// Queue generation of a paragraph from its allowed facts.
    pub async fn generate_paragraph(&self, paragraph_id: &str) -> Result<SubmitReceipt> {
        let path = format!("/paragraphs/{}/generate", paragraph_id);
        self.submit(self.request(Method::POST, &path)).await
    }

    /// Queue verification of a generated paragraph.
    pub async fn verify_paragraph(&self, paragraph_id: &str) -> Result<SubmitReceipt> {
        let path = format!("/paragraphs/{}/verify", paragraph_id);
        self.submit(self.request(Method::POST, &path)).await
    }

    /// Replace a sentence's text. The backend answers with the job that
    /// re-checks the owning paragraph.
    pub async fn update_sentence(&self, sentence_id: &str, text: &str) -> Result<SubmitReceipt> {
        let path = format!("/sentences/{}", sentence_id);
        let body = SentenceUpdate {
            text: text.to_string(),
        };
        self.submit(self.request(Method::PATCH, &path).json(&body))
            .await
    }

    /// Fetch the current status record of a job.
    pub async fn get_job(&self, job_id: &JobId) -> Result<Job> {
        let path = format!("/jobs/{}", job_id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    pub async fn get_paragraph_view(&self, paragraph_id: &str) -> Result<ParagraphView> {
        let path = format!("/paragraphs/{}/view", paragraph_id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    pub async fn list_document_facts(&self, document_id: &str) -> Result<Vec<Fact>> {
        let path = format!("/documents/{}/facts", document_id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    pub async fn list_paragraph_runs(&self, paragraph_id: &str) -> Result<Vec<Run>> {
        let builder = self
            .request(Method::GET, "/runs")
            .query(&[("paragraph_id", paragraph_id)]);
        self.send_json(builder).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Opus API request");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn submit(&self, builder: RequestBuilder) -> Result<SubmitReceipt> {
        Ok(self.send(builder).await?.unwrap_or_default())
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .ok_or_else(|| OpusError::Parse("empty response body".into()))
    }

    /// Send a request and decode its body. `204 No Content` and a JSON
    /// `null` body both come back as `None`.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>> {
        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OpusError::Api {
                status: status.as_u16(),
                message: resolve_detail(&body)
                    .unwrap_or_else(|| format!("Request failed ({})", status.as_u16())),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = OpusClient::new("http://localhost:8000/api/v1/");
        assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
    }

    #[test]
    fn blank_token_is_ignored() {
        let client = OpusClient::new(DEFAULT_BASE_URL).with_token("  ");
        assert!(client.token.is_none());

        let client = OpusClient::new(DEFAULT_BASE_URL).with_token("secret");
        assert_eq!(client.token.as_deref(), Some("secret"));
    }
}
