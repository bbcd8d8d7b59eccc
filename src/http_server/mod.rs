//! # HTTP Server Module
//!
//! Read-only JSON API over the record store.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/api/entities` - Entity search
//! - `/api/entities/{type}/[{sub_type}/]{slug}[/versions]` - Entity and history
//! - `/api/relationships` - Relationship search
//! - `/api/relationships/{id}[/versions]` - Relationship and history
//! - `/api/authors/{id}` - Author

pub mod config;
pub mod errors;
pub mod routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ApiError, INVALID_REQUEST};
pub use routes::ApiState;
pub use server::HttpServer;
