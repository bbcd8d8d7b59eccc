//! # HTTP Server
//!
//! Read API server: health check at the root, records under `/api`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::config::HttpServerConfig;
use super::routes::{api_routes, health_routes, ApiState};
use crate::search::SearchService;

/// HTTP server for the read API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, search: Arc<SearchService>) -> Self {
        let router = Self::build_router(&config, search);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, search: Arc<SearchService>) -> Router {
        let state = Arc::new(ApiState::new(search));

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .nest("/api", api_routes(state))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        self.config.bind_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    pub async fn start(self) -> std::io::Result<()> {
        let addr = self
            .bind_addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "read API listening");
        axum::serve(listener, self.router).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use tempfile::TempDir;

    #[test]
    fn test_server_with_custom_port() {
        let temp = TempDir::new().unwrap();
        let search = Arc::new(SearchService::new(RecordStore::open(temp.path()).unwrap()));
        let server = HttpServer::new(HttpServerConfig::on_port(8080), search);
        assert_eq!(server.bind_addr().unwrap().to_string(), "127.0.0.1:8080");
        let _router = server.router();
    }
}
