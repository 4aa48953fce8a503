#![allow(dead_code)]

use reqwest::multipart;
use secrecy::SecretString;
use service_core::config::Config as CoreConfig;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use video_analysis_service::config::{GeminiSettings, UploadConfig, VideoAnalysisConfig};
use video_analysis_service::services::providers::mock::{MockAnalysisProvider, MockBehavior};
use video_analysis_service::startup::Application;

pub const TEST_MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// Configuration pointing at a unique scratch directory and a random port.
pub fn test_config() -> VideoAnalysisConfig {
    VideoAnalysisConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        gemini: GeminiSettings {
            api_key: SecretString::new("test-api-key".to_string()),
            model: "gemini-2.0-flash".to_string(),
            // Nothing listens here; only the real provider would use it.
            api_base: "http://127.0.0.1:9".to_string(),
            timeout_secs: 5,
        },
        upload: UploadConfig {
            scratch_dir: format!("target/test-scratch-{}", Uuid::new_v4()),
            max_bytes: TEST_MAX_UPLOAD_BYTES,
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub scratch_dir: PathBuf,
    pub provider: Arc<MockAnalysisProvider>,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn with a mock that answers `behavior` and observes the scratch dir.
    pub async fn spawn(behavior: MockBehavior) -> Self {
        Self::spawn_with(test_config(), |dir| {
            MockAnalysisProvider::new(behavior).observing(dir)
        })
        .await
    }

    pub async fn spawn_with(
        config: VideoAnalysisConfig,
        make_provider: impl FnOnce(PathBuf) -> MockAnalysisProvider,
    ) -> Self {
        let scratch_dir = PathBuf::from(&config.upload.scratch_dir);
        let provider = Arc::new(make_provider(scratch_dir.clone()));

        let app = Application::build_with_provider(config, provider.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            scratch_dir,
            provider,
            client,
        }
    }

    /// POST a video (and optional raw `analysis_request`) to the endpoint.
    pub async fn analyze(
        &self,
        file_name: &str,
        data: Vec<u8>,
        analysis_request: Option<&str>,
    ) -> (reqwest::StatusCode, serde_json::Value) {
        let mut form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(data)
                .file_name(file_name.to_string())
                .mime_str("video/mp4")
                .unwrap(),
        );
        if let Some(raw) = analysis_request {
            form = form.text("analysis_request", raw.to_string());
        }

        let response = self
            .client
            .post(format!("{}/api/analyze-video", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request.");

        let status = response.status();
        let body = response.json().await.expect("Failed to parse JSON");
        (status, body)
    }

    /// Number of files currently in the scratch directory.
    pub async fn scratch_entries(&self) -> usize {
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(&self.scratch_dir)
            .await
            .expect("Scratch directory missing");
        while let Some(_) = entries.next_entry().await.unwrap() {
            count += 1;
        }
        count
    }

    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.scratch_dir).await;
    }
}
