use crate::models::{resolve_prompt, AnalysisResponse};
use crate::services::providers::{GenerationParams, ProviderError, SafetySetting, VideoInput};
use crate::services::ScratchFile;
use crate::startup::AppState;
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use service_core::middleware::RequestId;
use std::time::Instant;
use thiserror::Error;

const FILE_FIELD: &str = "file";
const PROMPT_FIELD: &str = "analysis_request";

/// Failures of the analysis endpoint.
///
/// All of them are reported as `200 {"status": "error", "message": ...}`,
/// with the `Display` text as the message.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid multipart request: {0}")]
    InvalidBody(String),

    #[error("Failed to read multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("No file uploaded")]
    MissingFile,

    #[error("File too large: exceeds the {limit} byte limit")]
    FileTooLarge { limit: usize },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("No analysis generated")]
    EmptyResult,
}

impl AnalysisError {
    /// Metrics label.
    fn outcome(&self) -> &'static str {
        match self {
            AnalysisError::InvalidBody(_)
            | AnalysisError::Multipart(_)
            | AnalysisError::MissingFile
            | AnalysisError::FileTooLarge { .. } => "invalid_upload",
            AnalysisError::Io(_) => "io_error",
            AnalysisError::Provider(ProviderError::Timeout(_)) => "timeout",
            AnalysisError::Provider(_) => "provider_error",
            AnalysisError::EmptyResult => "empty",
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(AnalysisResponse::Error {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

struct UploadedVideo {
    file_name: String,
    data: Vec<u8>,
}

/// Analyze an uploaded video with the configured provider.
///
/// The scratch file is removed before the response is produced, and by its
/// drop guard if the request is cancelled (client disconnect) mid-flight.
pub async fn analyze_video(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let request_id = request_id.map(|Extension(RequestId(id))| id);
    let result = match multipart {
        Ok(multipart) => run_analysis(&state, multipart).await,
        Err(rejection) => Err(AnalysisError::InvalidBody(rejection.body_text())),
    };

    match result {
        Ok(analysis) => {
            metrics::counter!("video_analysis_requests_total", "outcome" => "success")
                .increment(1);
            tracing::info!(
                request_id = request_id.as_deref().unwrap_or("-"),
                analysis_len = analysis.len(),
                "Video analysis completed"
            );
            Ok(Json(AnalysisResponse::Success { analysis }))
        }
        Err(e) => {
            metrics::counter!("video_analysis_requests_total", "outcome" => e.outcome())
                .increment(1);
            tracing::warn!(
                request_id = request_id.as_deref().unwrap_or("-"),
                error = %e,
                outcome = e.outcome(),
                "Video analysis failed"
            );
            Err(e)
        }
    }
}

async fn run_analysis(state: &AppState, mut multipart: Multipart) -> Result<String, AnalysisError> {
    let max_bytes = state.config.upload.max_bytes;
    let mut upload: Option<UploadedVideo> = None;
    let mut analysis_request: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                // A plain form value under `file` is not an upload.
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    return Err(AnalysisError::MissingFile);
                };
                let data = read_bounded(field, max_bytes).await?;
                upload = Some(UploadedVideo { file_name, data });
            }
            Some(PROMPT_FIELD) => analysis_request = Some(field.text().await?),
            other => tracing::debug!(field = ?other, "Ignoring unexpected multipart field"),
        }
    }

    let upload = upload.ok_or(AnalysisError::MissingFile)?;
    let prompt = resolve_prompt(analysis_request.as_deref());

    let mut scratch = state
        .scratch
        .persist(&upload.file_name, &upload.data)
        .await?;

    tracing::info!(
        scratch = %scratch.path().display(),
        filename = %upload.file_name,
        size = upload.data.len(),
        prompt_len = prompt.len(),
        "Video upload staged"
    );
    drop(upload);

    let result = invoke_provider(state, &prompt, &scratch).await;

    if let Err(e) = scratch.remove().await {
        tracing::warn!(
            scratch = %scratch.path().display(),
            error = %e,
            "Failed to remove scratch file"
        );
    }

    match result?.filter(|text| !text.is_empty()) {
        Some(text) => Ok(text),
        None => Err(AnalysisError::EmptyResult),
    }
}

/// Collect a field's bytes, failing as soon as `limit` is exceeded.
async fn read_bounded(mut field: Field<'_>, limit: usize) -> Result<Vec<u8>, AnalysisError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if data.len() + chunk.len() > limit {
            return Err(AnalysisError::FileTooLarge { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn invoke_provider(
    state: &AppState,
    prompt: &str,
    scratch: &ScratchFile,
) -> Result<Option<String>, AnalysisError> {
    let video = VideoInput::mp4(scratch.read().await?);
    let params = GenerationParams::video_analysis();
    let safety_settings = SafetySetting::video_analysis_policy();
    let timeout = state.config.gemini.timeout();

    let start = Instant::now();
    let outcome = tokio::time::timeout(
        timeout,
        state
            .provider
            .analyze(prompt, &video, &params, &safety_settings),
    )
    .await;
    let elapsed = start.elapsed();

    metrics::histogram!(
        "video_analysis_provider_latency_seconds",
        "model" => state.provider.model().to_string()
    )
    .record(elapsed.as_secs_f64());

    let response = outcome.map_err(|_| ProviderError::Timeout(timeout.as_secs()))??;

    tracing::info!(
        model = %state.provider.model(),
        latency_ms = elapsed.as_millis() as u64,
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        finish_reason = response.finish_reason.as_str(),
        "Provider responded"
    );

    Ok(response.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(error: AnalysisError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_empty_result_message() {
        let (status, body) = body_json(AnalysisError::EmptyResult).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"status": "error", "message": "No analysis generated"})
        );
    }

    #[tokio::test]
    async fn test_provider_error_message_is_passed_through() {
        let error = AnalysisError::from(ProviderError::NetworkError("connection reset".into()));
        let (status, body) = body_json(error).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Network error: connection reset");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(AnalysisError::MissingFile.outcome(), "invalid_upload");
        assert_eq!(
            AnalysisError::from(ProviderError::Timeout(5)).outcome(),
            "timeout"
        );
        assert_eq!(
            AnalysisError::from(ProviderError::ContentFiltered).outcome(),
            "provider_error"
        );
        assert_eq!(AnalysisError::EmptyResult.outcome(), "empty");
    }
}
