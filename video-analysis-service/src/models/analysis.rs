//! Wire types for the analysis endpoint.

use serde::{Deserialize, Serialize};

/// Prompt used when the caller supplies none (or an unusable one).
pub const DEFAULT_PROMPT: &str =
    "Analyze the video for storytelling, hook effectiveness, and transitions.";

/// Endpoint response, discriminated by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResponse {
    Success { analysis: String },
    Error { message: String },
}

/// Determine the effective prompt from the raw `analysis_request` field.
///
/// Anything other than a JSON object carrying a non-empty string `prompt`
/// falls back to [`DEFAULT_PROMPT`]; parse failures are never surfaced.
pub fn resolve_prompt(analysis_request: Option<&str>) -> String {
    let Some(raw) = analysis_request.filter(|s| !s.is_empty()) else {
        return DEFAULT_PROMPT.to_string();
    };

    // Parsed as a Value so that only a JSON object qualifies; a derived struct
    // would also accept `["..."]`.
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(mut body)) => match body.remove("prompt") {
            Some(serde_json::Value::String(prompt)) if !prompt.is_empty() => prompt,
            _ => {
                tracing::debug!("analysis_request has no usable prompt, using default");
                DEFAULT_PROMPT.to_string()
            }
        },
        Ok(_) => {
            tracing::debug!("analysis_request is not a JSON object, using default prompt");
            DEFAULT_PROMPT.to_string()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Malformed analysis_request, using default prompt");
            DEFAULT_PROMPT.to_string()
        }
    }
}
