//! Gemini AI provider implementation.
//!
//! Sends the prompt and the video as inline base64 data to Google's
//! `generateContent` endpoint and extracts the generated text.

use super::{
    AnalysisProvider, FinishReason, GenerationParams, ProviderError, ProviderResponse,
    SafetySetting, VideoInput,
};
use crate::config::GeminiSettings;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the API key, keeping it out of request URLs and logs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl From<&GeminiSettings> for GeminiConfig {
    fn from(settings: &GeminiSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            timeout: settings.timeout(),
        }
    }
}

/// Gemini video analysis provider.
pub struct GeminiVideoProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiVideoProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given model method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base, self.config.model, method
        )
    }
}

/// Assemble the `generateContent` body: prompt first, then the video.
fn build_request(
    prompt: &str,
    video: &VideoInput,
    params: &GenerationParams,
    safety_settings: &[SafetySetting],
) -> GenerateContentRequest {
    let parts = vec![
        RequestPart::Text {
            text: prompt.to_string(),
        },
        RequestPart::InlineData {
            inline_data: InlineData {
                mime_type: video.mime_type.clone(),
                data: STANDARD.encode(&video.data),
            },
        },
    ];

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: Some(GenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            max_output_tokens: params.max_tokens,
        }),
        safety_settings: if safety_settings.is_empty() {
            None
        } else {
            Some(safety_settings.to_vec())
        },
    }
}

/// Convert an API response into a [`ProviderResponse`].
///
/// Text parts of the first candidate are concatenated. A safety stop, or a
/// prompt blocked before any candidate was produced, is an error rather than
/// an empty result.
fn parse_response(api_response: GenerateContentResponse) -> Result<ProviderResponse, ProviderError> {
    let usage = api_response.usage_metadata.unwrap_or_default();

    let Some(candidate) = api_response.candidates.into_iter().next() else {
        if let Some(reason) = api_response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            tracing::warn!(block_reason = %reason, "Gemini blocked the prompt");
            return Err(ProviderError::ContentFiltered);
        }

        return Ok(ProviderResponse {
            text: None,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: 0,
            finish_reason: FinishReason::Complete,
        });
    };

    let finish_reason = match candidate.finish_reason.as_deref() {
        Some("STOP") | None => FinishReason::Complete,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
            FinishReason::ContentFilter
        }
        Some(_) => FinishReason::Error,
    };

    if finish_reason == FinishReason::ContentFilter {
        return Err(ProviderError::ContentFiltered);
    }

    let text = candidate.content.map(|content| {
        content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<String>()
    });

    Ok(ProviderResponse {
        text,
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
        finish_reason,
    })
}

#[async_trait]
impl AnalysisProvider for GeminiVideoProvider {
    async fn analyze(
        &self,
        prompt: &str,
        video: &VideoInput,
        params: &GenerationParams,
        safety_settings: &[SafetySetting],
    ) -> Result<ProviderResponse, ProviderError> {
        if video.data.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Uploaded video is empty".to_string(),
            ));
        }

        let request = build_request(prompt, video, params, safety_settings);
        let url = self.api_url("generateContent");

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            video_bytes = video.data.len(),
            mime_type = %video.mime_type,
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        parse_response(api_response)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        // Fetching the model verifies both the key and the model name
        let url = format!("{}/models/{}", self.config.api_base, self.config.model);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content<RequestPart>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_settings: Option<Vec<SafetySetting>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default = "Vec::new")]
    parts: Vec<P>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content<ResponsePart>>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Only text is read back; other part kinds are tolerated and skipped.
#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<ProviderResponse, ProviderError> {
        parse_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_request_body_shape() {
        let request = build_request(
            "Describe the hook.",
            &VideoInput::mp4(vec![1, 2, 3]),
            &GenerationParams::video_analysis(),
            &SafetySetting::video_analysis_policy(),
        );
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Describe the hook.");
        assert_eq!(
            body["contents"][0]["parts"][1]["inlineData"],
            json!({"mimeType": "video/mp4", "data": "AQID"})
        );
        let config = &body["generationConfig"];
        assert!((config["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(config["topP"].as_f64(), Some(1.0));
        assert_eq!(config["topK"], 32);
        assert_eq!(config["maxOutputTokens"], 4096);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(
            body["safetySettings"][0]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
    }

    #[test]
    fn test_text_parts_are_concatenated() {
        let response = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hook: "}, {"text": "strong."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 1200, "candidatesTokenCount": 8}
        }))
        .unwrap();

        assert_eq!(response.text.as_deref(), Some("Hook: strong."));
        assert_eq!(response.input_tokens, 1200);
        assert_eq!(response.output_tokens, 8);
        assert_eq!(response.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn test_max_tokens_is_not_an_error() {
        let response = parse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Truncated"}]},
                "finishReason": "MAX_TOKENS"
            }]
        }))
        .unwrap();

        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.text.as_deref(), Some("Truncated"));
    }

    #[test]
    fn test_safety_stop_is_content_filtered() {
        let result = parse(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }));
        assert!(matches!(result, Err(ProviderError::ContentFiltered)));
    }

    #[test]
    fn test_blocked_prompt_is_content_filtered() {
        let result = parse(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }));
        assert!(matches!(result, Err(ProviderError::ContentFiltered)));
    }

    #[test]
    fn test_no_candidates_is_empty_result() {
        let response = parse(json!({})).unwrap();
        assert!(response.text.is_none());
    }
}
