//! Search/Query Layer
//!
//! Filtered, paginated, deterministically ordered reads over entities,
//! relationships, authors and version history.

mod errors;
mod filters;
mod query;
mod service;

pub use errors::{SearchError, SearchResult};
pub use filters::{EntityFilter, RelationshipFilter};
pub use query::{clamp_limit, EntityQuery, Page, RelationshipQuery, DEFAULT_MAX_PAGE_SIZE};
pub use service::SearchService;
