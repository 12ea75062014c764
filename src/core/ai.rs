//! Generative text backend for clinical summaries.
//!
//! The backend is optional. When it is missing or a call fails, the summarizer
//! falls back to its extractive path, so nothing here is load-bearing.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

const SYSTEM_PROMPT: &str = "You are a clinical documentation assistant. Summarize ICU \
monitoring data for a bedside nurse in plain prose. Mention abnormal vitals and alerts \
first. Do not invent findings.";

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn summarize(&self, text: &str, min_words: usize, max_words: usize) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Text generation over an Ollama-compatible `/api/generate` endpoint.
pub struct HttpTextModel {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpTextModel {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build model client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TextModel for HttpTextModel {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn summarize(&self, text: &str, min_words: usize, max_words: usize) -> Result<String> {
        let prompt = format!(
            "Summarize the following in {} to {} words.\n\n{}",
            min_words, max_words, text
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "system": SYSTEM_PROMPT,
                "stream": false,
            }))
            .send()
            .await
            .context("model request failed")?
            .error_for_status()
            .context("model backend returned an error status")?
            .json::<GenerateResponse>()
            .await
            .context("malformed model response")?;

        let summary = response.response.trim();
        if summary.is_empty() {
            bail!("model returned an empty summary");
        }
        Ok(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(server: &MockServer) -> HttpTextModel {
        HttpTextModel::new(&server.uri(), "llama3", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn returns_generated_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({ "model": "llama3", "stream": false })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": "  Patient is stable.  " })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = model(&server).summarize("Clinical data", 30, 150).await.unwrap();
        assert_eq!(text, "Patient is stable.");
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(model(&server).summarize("Clinical data", 30, 150).await.is_err());
    }

    #[tokio::test]
    async fn empty_generation_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "" })))
            .mount(&server)
            .await;

        assert!(model(&server).summarize("Clinical data", 30, 150).await.is_err());
    }
}
