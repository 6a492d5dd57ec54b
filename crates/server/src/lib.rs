//! Quillgate inbound HTTP API.
//!
//! Binds the [`nodes::Orchestrator`] to axum routes. The authentication
//! collaborator in front of this service forwards the caller's identity in a
//! configurable header (`x-user-id` by default); a request without it is
//! refused with 401 before its body is even parsed.
//!
//! ## Routes
//!
//! | Method | Path | Pipeline |
//! |--------|------|----------|
//! | `POST` | `/api/pipeline` | any, selected by the `kind` tag |
//! | `POST` | `/api/detect` | `detect` |
//! | `POST` | `/api/conversation` | `generate` |
//! | `POST` | `/api/translate` | `translate-only` |
//! | `POST` | `/api/rewrite` | `generate-then-translate` |
//! | `GET` | `/api/usage` | usage and entitlement snapshot |
//! | `GET` | `/health` | liveness |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Wire formats and status codes live here; every rule
//! lives in the [`pipeline`] and [`nodes`] crates.

pub mod error;
pub mod routes;

use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderName;
use axum::Router;
use nodes::Orchestrator;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;

/// Default header carrying the authenticated identity.
/// Header carrying the authenticated identity unless configured otherwise.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

/// Shared state accessible by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs every pipeline request.
    pub orchestrator: Arc<Orchestrator>,
    /// Header the identity is read from.
    pub identity_header: HeaderName,
}

impl AppState {
    /// Bundles the orchestrator with the identity header name.
    pub fn new(orchestrator: Arc<Orchestrator>, identity_header: HeaderName) -> Self {
        Self {
            orchestrator,
            identity_header,
        }
    }
}

/// Parses a configured identity header name (case-insensitive).
pub fn identity_header(name: &str) -> Result<HeaderName, axum::http::header::InvalidHeaderName> {
    HeaderName::try_from(name.trim().to_ascii_lowercase())
}

/// Builds the router with all routes and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .route("/health", axum::routing::get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
