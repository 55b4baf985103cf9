//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the echo handlers
//! - Wire up middleware (timeout, request ID, access log)
//! - Bind server to listener with peer addresses for the access log

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderName, Method, Uri},
    middleware,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

use crate::access_log::{DiagnosticSink, RecordBuilder, TracingSink};
use crate::config::ShimConfig;
use crate::http::middleware::access_log_middleware;

/// HTTP server that echoes requests and logs every one of them.
pub struct HttpServer {
    router: Router,
    config: ShimConfig,
}

impl HttpServer {
    /// Create a server logging through a [`TracingSink`].
    pub fn new(config: ShimConfig) -> Self {
        let sink = Arc::new(TracingSink::new(config.access_log.format));
        Self::with_sink(config, sink)
    }

    /// Create a server logging into the given sink.
    pub fn with_sink(config: ShimConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let router = Self::build_router(&config, sink);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ShimConfig, sink: Arc<dyn DiagnosticSink>) -> Router {
        let request_id_header = request_id_header(config);
        let builder = Arc::new(
            RecordBuilder::new(sink)
                .with_redact_params(config.access_log.redact_params.clone())
                .with_request_id_header(request_id_header.clone()),
        );

        let router = Router::new()
            .route("/panic", any(panic_handler))
            .route("/{*path}", any(echo_handler))
            .route("/", any(echo_handler))
            // Timeout inside the access log so a 408 is still logged
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(builder, access_log_middleware));

        if config.access_log.generate_request_id {
            // Outermost, so the access log sees the generated ID
            router.layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        } else {
            router
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// The configured router, for serving without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

fn request_id_header(config: &ShimConfig) -> HeaderName {
    HeaderName::try_from(config.access_log.request_id_header.as_str()).unwrap_or_else(|_| {
        tracing::warn!(
            header = %config.access_log.request_id_header,
            "Invalid request ID header, falling back to request-id"
        );
        HeaderName::from_static(crate::access_log::record::REQUEST_ID_HEADER)
    })
}

/// Echo the request line and body back to the client.
async fn echo_handler(method: Method, uri: Uri, body: Bytes) -> String {
    format!(
        "{} {}\n{}",
        method,
        uri.path(),
        String::from_utf8_lossy(&body)
    )
}

/// Always panics; exercises the error record path.
async fn panic_handler() -> &'static str {
    panic!("requested panic")
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
