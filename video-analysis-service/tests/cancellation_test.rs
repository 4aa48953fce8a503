//! Client disconnects drop the handler future; the scratch file must go with it.

mod common;

use axum::body::Body;
use axum::http::{header, Request};
use common::test_config;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use video_analysis_service::services::providers::mock::{MockAnalysisProvider, MockBehavior};
use video_analysis_service::startup::{router, Application};

const BOUNDARY: &str = "video-analysis-test-boundary";

fn multipart_body(file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: video/mp4\r\n\r\n",
        b = BOUNDARY,
        f = file_name
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn count_entries(dir: &str) -> usize {
    let mut count = 0;
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    while let Some(_) = entries.next_entry().await.unwrap() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn cancelled_request_removes_scratch_file() {
    let config = test_config();
    let scratch_dir = config.upload.scratch_dir.clone();
    let provider = Arc::new(
        MockAnalysisProvider::new(MockBehavior::Respond("never sent".to_string()))
            .with_delay(Duration::from_secs(30)),
    );

    let app = Application::build_with_provider(config, provider.clone())
        .await
        .expect("Failed to build application");
    let service = router(app.state().clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/analyze-video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("clip.mp4", b"in-flight video")))
        .unwrap();

    let in_flight = tokio::spawn(service.oneshot(request));

    // Wait until the provider is holding the request.
    for _ in 0..100 {
        if !provider.calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(count_entries(&scratch_dir).await, 1);

    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());

    assert_eq!(count_entries(&scratch_dir).await, 0);

    let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
}
