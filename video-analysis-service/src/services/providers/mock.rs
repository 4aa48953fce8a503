//! Mock provider implementation for testing.

use super::{
    AnalysisProvider, FinishReason, GenerationParams, ProviderError, ProviderResponse,
    SafetySetting, VideoInput,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted outcome of every `analyze` call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this text.
    Respond(String),
    /// Return the uploaded bytes as (lossy UTF-8) text.
    Echo,
    /// Return no text at all.
    Empty,
    /// Fail with `ProviderError::ApiError` carrying this message.
    Fail(String),
}

/// What the provider was asked to do.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub mime_type: String,
    pub video_len: usize,
    pub params: GenerationParams,
    pub safety_settings: Vec<SafetySetting>,
    /// Entries in the observed directory while the call was running.
    pub observed_files: Option<usize>,
}

/// Mock analysis provider for testing.
pub struct MockAnalysisProvider {
    behavior: MockBehavior,
    delay: Option<Duration>,
    observe_dir: Option<PathBuf>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockAnalysisProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            observe_dir: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Count the files in `dir` during each call, to check that the scratch
    /// file is on disk while the provider runs.
    pub fn observing(mut self, dir: impl Into<PathBuf>) -> Self {
        self.observe_dir = Some(dir.into());
        self
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisProvider for MockAnalysisProvider {
    async fn analyze(
        &self,
        prompt: &str,
        video: &VideoInput,
        params: &GenerationParams,
        safety_settings: &[SafetySetting],
    ) -> Result<ProviderResponse, ProviderError> {
        let observed_files = match &self.observe_dir {
            Some(dir) => Some(count_entries(dir).await),
            None => None,
        };

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                mime_type: video.mime_type.clone(),
                video_len: video.data.len(),
                params: params.clone(),
                safety_settings: safety_settings.to_vec(),
                observed_files,
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = match &self.behavior {
            MockBehavior::Respond(text) => Some(text.clone()),
            MockBehavior::Echo => Some(String::from_utf8_lossy(&video.data).into_owned()),
            MockBehavior::Empty => None,
            MockBehavior::Fail(message) => return Err(ProviderError::ApiError(message.clone())),
        };

        Ok(ProviderResponse {
            output_tokens: text.as_ref().map(|t| t.len() as i32 / 4).unwrap_or(0),
            text,
            input_tokens: prompt.len() as i32 / 4,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn model(&self) -> &str {
        "mock"
    }
}

async fn count_entries(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
    }
    count
}
