use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::cli::LlmOptions;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A language model that turns one prompt into one text answer.
pub trait LlmProvider {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Anthropic HTTP client")?;
        Ok(Self {
            api_key,
            model,
            client,
        })
    }

    pub fn from_options(options: &LlmOptions) -> Result<Self> {
        let Some(api_key) = options
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        else {
            bail!("no Anthropic API key configured; pass --api-key or set ANTHROPIC_API_KEY");
        };

        Self::new(
            api_key.to_string(),
            options.llm_model.clone(),
            Duration::from_secs(options.llm_timeout_secs),
        )
    }
}

impl LlmProvider for AnthropicProvider {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).context("invalid Anthropic API key")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: request.prompt,
                }],
            }],
        };

        let resp = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .headers(headers)
            .json(&body)
            .send()
            .context("failed to call Anthropic messages API")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Anthropic returned {}: {}", status, text);
        }

        let parsed: AnthropicResponse =
            resp.json().context("failed to parse Anthropic response")?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.is_empty() {
            bail!("Anthropic response missing text content");
        }

        Ok(answer)
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(api_key: Option<&str>) -> LlmOptions {
        LlmOptions {
            api_key: api_key.map(ToOwned::to_owned),
            llm_model: "test-model".to_string(),
            max_tokens: 128,
            temperature: 0.0,
            llm_timeout_secs: 5,
            prompt_only: false,
        }
    }

    #[test]
    fn provider_requires_api_key() {
        assert!(AnthropicProvider::from_options(&options(None)).is_err());
        assert!(AnthropicProvider::from_options(&options(Some("   "))).is_err());
        assert!(AnthropicProvider::from_options(&options(Some("sk-test"))).is_ok());
    }

    #[test]
    fn response_text_blocks_are_parsed() {
        let parsed: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Annotated"},{"type":"thinking"}]}"#,
        )
        .expect("parse");
        assert_eq!(parsed.content.len(), 2);
        assert!(matches!(
            &parsed.content[0],
            AnthropicResponseBlock::Text { text } if text == "Annotated"
        ));
    }
}
