//! Gemini API client used as the external intent classifier
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::BotError;
use crate::memory::TurnRole;
use crate::resolver::{ClassifierPrompt, IntentModel};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/{}:generateContent", BASE_URL, model),
        })
    }

    fn build_request(prompt: &ClassifierPrompt) -> GeminiRequest {
        let mut contents: Vec<Content> = prompt
            .history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                }
                .to_string(),
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect();

        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: prompt.message.clone(),
            }],
        });

        GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: prompt.instruction.to_string(),
                }],
            },
        }
    }
}

#[async_trait]
impl IntentModel for GeminiClient {
    async fn classify(&self, prompt: &ClassifierPrompt) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(BotError::UpstreamUnavailable(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = Self::build_request(prompt);
        debug!(turns = prompt.history.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                BotError::UpstreamUnavailable(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(BotError::UpstreamUnavailable(format!(
                "Gemini API returned {}",
                status
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            BotError::UpstreamUnavailable(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response.first_text().ok_or_else(|| {
            BotError::UpstreamUnavailable("Empty response from Gemini".to_string())
        })?;

        info!(chars = answer.len(), "Gemini response received");
        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

impl GeminiResponse {
    fn first_text(&self) -> Option<String> {
        let text = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<String>();

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
