//! # Depot
//!
//! A small HTTP service for streaming multipart file uploads.
//!
//! Request bodies are parsed incrementally: part boundaries are located in
//! bounded buffers, each part is validated against a size limit and a
//! magic-byte content allow-list, and accepted payloads are streamed to the
//! destination directory with progress reporting. Memory use per request is
//! on the order of one body chunk, never the size of the upload.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use depot::{Application, Config, config::Args, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Endpoints
//!
//! - `POST /upload` - multipart/form-data or multipart/mixed upload
//! - `GET /` - embedded upload form
//! - `GET /healthz` - liveness probe
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
pub mod limits;
pub mod multipart;
pub mod pipeline;
pub mod progress;
pub mod sniff;
mod static_assets;
pub mod storage;
pub mod telemetry;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};

pub use config::Config;

use crate::storage::UploadStore;

/// Application state shared across all request handlers.
///
/// Holds the immutable configuration and the upload store handle. There is
/// no mutable state shared between requests; concurrent requests run as
/// independent workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: UploadStore,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(AllowOrigin::any());
    } else {
        let origins = config
            .cors
            .allowed_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        cors = cors.allow_origin(origins);
    }

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// The default axum body limit is disabled on the upload route: the
/// pipeline enforces its own per-part limit and needs to drain over-limit
/// parts to keep the boundary framing intact for their siblings.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route(
            "/upload",
            post(api::handlers::upload::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/healthz", get(api::handlers::probes::healthz))
        .fallback(get(api::handlers::static_assets::serve_embedded_asset))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The assembled service: configuration applied, storage prepared, router
/// built. Created once at startup and consumed by [`Application::serve`].
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized.
    ///
    /// Fails when the destination directory cannot be created - without it
    /// no upload can succeed, so startup is the right place to find out.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting depot with configuration: {:#?}", config);

        let store = UploadStore::prepare(&config.uploads.dir).await?;

        let state = AppState {
            config: config.clone(),
            store,
        };
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Depot listening on http://{}, storing uploads in {}",
            bind_addr,
            self.config.uploads.dir.display()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}
