//! # nexusd: session-gated dashboard server
//!
//! `nexusd` serves a small server-rendered dashboard (KPI cards and charts over sample data)
//! behind a login. It stores no users and verifies no passwords itself: authentication belongs
//! to an external GoTrue-style identity service, reached through [`identity::IdentityProvider`].
//!
//! ## Request Flow
//!
//! Every request first passes through the session gate ([`auth::middleware`]), which is applied
//! around the router so it runs before path matching:
//!
//! 1. Paths under a bypass prefix (`/healthz`, `/static/`, `/favicon.ico`) go straight to the
//!    router.
//! 2. The gate asks the identity service for the current user, handing it the request cookies.
//!    The service may refresh the session while answering; the rotated cookie is recorded.
//! 3. The path is classified (root, auth page, protected page) and a decision is taken:
//!    signed-out callers on protected pages go to `/login`, signed-in callers on auth pages go to
//!    `/dashboard`, everything else is allowed.
//! 4. Redirects and allowed responses alike carry the recorded cookie mutations.
//!
//! If the identity service errors or exceeds `identity.request_timeout`, the gate logs the failure
//! and forwards the request untouched.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use nexusd::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = nexusd::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     nexusd::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module. `IDENTITY_URL` and `IDENTITY_ANON_KEY` are required.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod identity;
pub mod telemetry;
pub mod views;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use api::handlers;
use auth::{
    gate::{GatePolicy, SessionGate},
    middleware::session_gate_middleware,
};
use axum::{
    Router, ServiceExt,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use identity::{HttpIdentityClient, IdentityProvider};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use views::Views;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(Arc::new(config))
///     .identity(identity)
///     .gate(Arc::new(gate))
///     .views(Arc::new(Views::new()?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Shared identity service client, built once per process
    pub identity: Arc<dyn IdentityProvider>,
    pub gate: Arc<SessionGate>,
    pub views: Arc<Views>,
}

impl AppState {
    pub fn new(config: Config, identity: Arc<dyn IdentityProvider>) -> anyhow::Result<Self> {
        let gate = SessionGate::new(
            identity.clone(),
            GatePolicy::from(&config.gate),
            config.identity.request_timeout,
        );
        Ok(Self::builder()
            .config(Arc::new(config))
            .identity(identity)
            .gate(Arc::new(gate))
            .views(Arc::new(Views::new()?))
            .build())
    }
}

/// Build the page router. The session gate is applied around it by [`Application`].
pub fn build_router(state: &AppState) -> Router {
    let router = Router::new()
        .route("/", get(handlers::pages::home))
        .route("/healthz", get(handlers::pages::healthz))
        .route("/login", get(handlers::auth::login_page).post(handlers::auth::login))
        .route("/register", get(handlers::auth::register_page).post(handlers::auth::register))
        .route("/logout", post(handlers::auth::logout))
        .route("/dashboard", get(handlers::dashboard::dashboard_page))
        .route("/api/dashboard", get(handlers::dashboard::summary))
        .fallback(handlers::pages::not_found)
        .with_state(state.clone());

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Main application struct.
///
/// 1. **Create**: [`Application::new`] builds the identity client and the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal resolves, in-flight requests finish and telemetry is
///    flushed
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Arc<Config>,
}

impl Application {
    /// Create a new application talking to the configured identity service
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting nexusd with configuration: {:#?}", config);
        let identity: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityClient::new(&config.identity)?);
        Self::with_identity(config, identity)
    }

    /// Create an application with a caller-supplied identity provider
    pub fn with_identity(config: Config, identity: Arc<dyn IdentityProvider>) -> anyhow::Result<Self> {
        let app_state = AppState::new(config, identity)?;
        let router = build_router(&app_state);
        let config = app_state.config.clone();

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        // Apply middleware before path matching for tests
        let middleware = from_fn_with_state(self.app_state, session_gate_middleware);
        let service = middleware.layer(self.router).into_make_service();
        axum_test::TestServer::new(service).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("nexusd listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        // Apply middleware before path matching
        let middleware = from_fn_with_state(self.app_state, session_gate_middleware);
        let service = middleware.layer(self.router);

        axum::serve(listener, service.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
