//! OpenAI-compatible chat completions enricher.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{encode_batch, Enricher};
use crate::error::{Error, Result};

/// Blocking chat client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEnricher {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiEnricher {
    /// Builds a new client. Fails with [`Error::Configuration`] on a missing
    /// key or model.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        organization: Option<String>,
        timeout: Duration,
        max_tokens: u32,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("missing OpenAI API key".into()));
        }
        if model.trim().is_empty() {
            return Err(Error::Configuration("missing OpenAI model name".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| Error::Configuration("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(org) = organization.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org)
                    .map_err(|_| Error::Configuration("invalid OpenAI organization id".into()))?,
            );
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                Error::Configuration(format!("failed to build OpenAI HTTP client: {err}"))
            })?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            temperature: 0.3,
            max_tokens,
        })
    }

    /// Overrides the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Model sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sampling temperature sent with each request.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

impl Enricher for OpenAiEnricher {
    fn submit(&self, batch: &[String], system_prompt: &str) -> Result<String> {
        let user = encode_batch(batch)?;
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| Error::Transport(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Transport(format!(
                "OpenAI chat request failed ({status}): {body}"
            )));
        }
        let parsed: ChatResponse = resp
            .json()
            .map_err(|err| Error::Transport(format!("failed to read OpenAI response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::malformed("OpenAI response missing message content"))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}
