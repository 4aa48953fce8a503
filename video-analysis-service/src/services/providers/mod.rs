//! AI provider abstractions and implementations.
//!
//! This module provides a trait-based abstraction for multimodal providers,
//! allowing the Gemini backend to be swapped for a mock in tests.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// MIME type attached to every uploaded video.
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider timed out after {0}s")]
    Timeout(u64),
}

/// Result of a provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Generated text; `None` or empty when the model produced nothing.
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,

    /// Finish reason.
    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Complete => "complete",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Error => "error",
        }
    }
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Top-p sampling.
    pub top_p: Option<f32>,

    /// Top-k sampling.
    pub top_k: Option<i32>,

    /// Maximum output tokens.
    pub max_tokens: Option<i32>,
}

impl GenerationParams {
    /// Fixed sampling configuration used for every video analysis.
    pub fn video_analysis() -> Self {
        Self {
            temperature: Some(0.4),
            top_p: Some(1.0),
            top_k: Some(32),
            max_tokens: Some(4096),
        }
    }
}

/// Harm categories the provider can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

/// Severity at which the provider blocks output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

/// One content-safety rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    /// Block medium-and-above severity in every category.
    pub fn video_analysis_policy() -> Vec<SafetySetting> {
        [
            HarmCategory::Harassment,
            HarmCategory::HateSpeech,
            HarmCategory::SexuallyExplicit,
            HarmCategory::DangerousContent,
        ]
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: HarmBlockThreshold::BlockMediumAndAbove,
        })
        .collect()
    }
}

/// Video payload sent alongside the prompt.
#[derive(Debug, Clone)]
pub struct VideoInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl VideoInput {
    pub fn mp4(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: VIDEO_MIME_TYPE.to_string(),
        }
    }
}

/// Trait for multimodal providers that describe a video given a prompt.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Generate a free-text analysis of `video`.
    async fn analyze(
        &self,
        prompt: &str,
        video: &VideoInput,
        params: &GenerationParams,
        safety_settings: &[SafetySetting],
    ) -> Result<ProviderResponse, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_policy_serialization() {
        let json = serde_json::to_value(SafetySetting::video_analysis_policy()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
            ])
        );
    }

    #[test]
    fn test_video_analysis_params() {
        let params = GenerationParams::video_analysis();
        assert_eq!(params.temperature, Some(0.4));
        assert_eq!(params.top_p, Some(1.0));
        assert_eq!(params.top_k, Some(32));
        assert_eq!(params.max_tokens, Some(4096));
    }
}
