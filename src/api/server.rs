//! HTTP server

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::broker::Broker;
use super::handlers::{self, AppState};

/// Router with every broker route
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Catalog
        .route("/resources/plans", get(handlers::plans))

        // Instances
        .route("/resources", post(handlers::add_instance))
        .route("/resources/:name", post(handlers::bind))
        .route("/resources/:name", delete(handlers::remove_instance))
        .route("/resources/:name/status", get(handlers::status))

        // Binds
        .route("/resources/:name/bind-app", post(handlers::bind_app))
        .route("/resources/:name/bind-app", delete(handlers::unbind_app))
        .route("/resources/:name/bind", post(handlers::bind_unit))
        .route("/resources/:name/bind", delete(handlers::unbind_unit))
        .route("/resources/:name/hostname/:host", delete(handlers::unbind_hostname))

        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP API Server
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Create a new server
    pub fn new(broker: Broker, addr: SocketAddr) -> Self {
        let state: AppState = Arc::new(broker);
        Self {
            router: router(state),
            addr,
        }
    }

    /// Run the server
    pub async fn run(self) -> Result<(), std::io::Error> {
        tracing::info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router).await
    }
}
