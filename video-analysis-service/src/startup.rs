//! Application startup and lifecycle management.

use crate::config::VideoAnalysisConfig;
use crate::handlers;
use crate::services::providers::gemini::{GeminiConfig, GeminiVideoProvider};
use crate::services::{AnalysisProvider, ScratchDir};
use axum::{
    extract::DefaultBodyLimit,
    http::Request,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Room for multipart framing and the prompt field on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: VideoAnalysisConfig,
    pub provider: Arc<dyn AnalysisProvider>,
    pub scratch: ScratchDir,
}

/// Build the HTTP router for the given state.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .upload
        .max_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/analyze-video", post(handlers::analyze_video))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the Gemini provider.
    pub async fn build(config: VideoAnalysisConfig) -> Result<Self, AppError> {
        let provider = GeminiVideoProvider::new(GeminiConfig::from(&config.gemini))
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        tracing::info!(
            model = %config.gemini.model,
            timeout_secs = config.gemini.timeout_secs,
            "Initialized Gemini video provider"
        );

        Self::build_with_provider(config, Arc::new(provider)).await
    }

    /// Build the application around an already constructed provider.
    pub async fn build_with_provider(
        config: VideoAnalysisConfig,
        provider: Arc<dyn AnalysisProvider>,
    ) -> Result<Self, AppError> {
        let scratch = ScratchDir::new(&config.upload.scratch_dir)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to initialize scratch directory at {}: {}",
                    config.upload.scratch_dir,
                    e
                );
                e
            })?;

        let addr = config.common.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            scratch_dir = %config.upload.scratch_dir,
            max_upload_bytes = config.upload.max_bytes,
            "Video analysis service listening"
        );

        Ok(Self {
            port,
            listener,
            state: AppState {
                config,
                provider,
                scratch,
            },
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until a shutdown signal is received.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        // Probe the provider once; failure is logged, not fatal.
        let provider = self.state.provider.clone();
        tokio::spawn(async move {
            match provider.health_check().await {
                Ok(()) => tracing::info!(model = %provider.model(), "Provider reachable"),
                Err(e) => tracing::warn!(
                    model = %provider.model(),
                    error = %e,
                    "Provider health check failed"
                ),
            }
        });

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
