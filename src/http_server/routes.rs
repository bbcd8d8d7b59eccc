//! Read API routes
//!
//! Entities, relationships, their version histories, and authors. Nothing
//! here mutates the store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use super::errors::ApiError;
use crate::model::{Author, Entity, EntityKey, Relationship, Version, HISTORY_SEGMENT};
use crate::search::{EntityQuery, Page, RelationshipQuery, SearchService};

// ==================
// Shared State
// ==================

pub struct ApiState {
    pub search: Arc<SearchService>,
}

impl ApiState {
    pub fn new(search: Arc<SearchService>) -> Self {
        Self { search }
    }
}

type Params = Query<HashMap<String, String>>;
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ==================
// Routes
// ==================

pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Routes mounted under `/api`.
pub fn api_routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/entities", get(search_entities_handler))
        .route("/entities/*path", get(entity_handler))
        .route("/relationships", get(search_relationships_handler))
        .route("/relationships/:id", get(relationship_handler))
        .route("/relationships/:id/versions", get(relationship_versions_handler))
        .route("/authors/:id", get(author_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}

// ==================
// Query parameter parsing
// ==================

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_param<T>(params: &HashMap<String, String>, name: &str) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    param(params, name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ApiError::invalid_request(format!("invalid {} '{}': {}", name, raw, e)))
        })
        .transpose()
}

fn parse_bool(params: &HashMap<String, String>, name: &str) -> Result<bool, ApiError> {
    match param(params, name) {
        None => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ApiError::invalid_request(format!(
            "invalid {} '{}': expected true or false",
            name, other
        ))),
    }
}

fn parse_date(params: &HashMap<String, String>, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    param(params, name)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::invalid_request(format!("invalid {} '{}': expected YYYY-MM-DD", name, raw))
            })
        })
        .transpose()
}

pub fn entity_query(params: &HashMap<String, String>) -> Result<EntityQuery, ApiError> {
    let attributes = match param(params, "attributes") {
        None => Default::default(),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => {
                return Err(ApiError::invalid_request(
                    "attributes must be a JSON object of exact-match filters",
                ))
            }
        },
    };

    Ok(EntityQuery {
        query: param(params, "query").map(str::to_string),
        entity_type: parse_param(params, "entity_type")?,
        sub_type: parse_param(params, "sub_type")?,
        attributes,
        limit: parse_param(params, "limit")?,
        offset: parse_param(params, "offset")?.unwrap_or(0),
    })
}

pub fn relationship_query(params: &HashMap<String, String>) -> Result<RelationshipQuery, ApiError> {
    Ok(RelationshipQuery {
        relationship_type: parse_param(params, "relationship_type")?,
        source: param(params, "source").map(str::to_string),
        target: param(params, "target").map(str::to_string),
        active_on: parse_date(params, "active_on")?,
        currently_active: parse_bool(params, "currently_active")?,
        limit: parse_param(params, "limit")?,
        offset: parse_param(params, "offset")?.unwrap_or(0),
    })
}

/// Splits `<type>/[<sub_type>/]<slug>[/versions]` into a key and whether the
/// version history was asked for.
fn entity_path(raw: &str) -> Result<(EntityKey, bool), ApiError> {
    let path = raw.trim_matches('/');
    // `versions` is never a slug, so a trailing one always means history
    if let Some(prefix) = path
        .strip_suffix(HISTORY_SEGMENT)
        .and_then(|p| p.strip_suffix('/'))
    {
        if let Ok(key) = EntityKey::from_path(prefix) {
            return Ok((key, true));
        }
    }
    EntityKey::from_path(path)
        .map(|key| (key, false))
        .map_err(|_| ApiError::not_found(format!("no entity at '{}'", path)))
}

fn history(versions: Vec<Version>) -> Page<Version> {
    let total = versions.len();
    Page {
        results: versions,
        total,
        limit: total,
        offset: 0,
    }
}

// ==================
// Handlers
// ==================

async fn search_entities_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Params,
) -> ApiResult<Page<Entity>> {
    let query = entity_query(&params)?;
    Ok(Json(state.search.search_entities(&query)?))
}

/// Serves both an entity and its version history.
async fn entity_handler(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (key, versions) = entity_path(&path)?;
    let body = if versions {
        serde_json::to_value(history(state.search.get_entity_versions(&key)?))
    } else {
        serde_json::to_value(state.search.get_entity(&key)?)
    };
    body.map(Json).map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
    })
}

async fn search_relationships_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Params,
) -> ApiResult<Page<Relationship>> {
    let query = relationship_query(&params)?;
    Ok(Json(state.search.search_relationships(&query)?))
}

async fn relationship_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Relationship> {
    Ok(Json(state.search.get_relationship(&id)?))
}

async fn relationship_versions_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Page<Version>> {
    Ok(Json(history(state.search.get_relationship_versions(&id)?)))
}

async fn author_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Author> {
    Ok(Json(state.search.get_author(&id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_entity_query_parsing() {
        let query = entity_query(&params(&[
            ("query", "ram"),
            ("entity_type", "person"),
            ("attributes", r#"{"party": "congress"}"#),
            ("limit", "10"),
        ]))
        .unwrap();
        assert_eq!(query.query.as_deref(), Some("ram"));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.attributes.len(), 1);
    }

    #[test]
    fn test_bad_params_are_invalid_request() {
        for bad in [
            params(&[("limit", "ten")]),
            params(&[("entity_type", "alien")]),
            params(&[("attributes", "[1,2]")]),
        ] {
            let err = entity_query(&bad).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        let err = relationship_query(&params(&[("active_on", "2024/01/01")])).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_entity_path() {
        let (key, versions) = entity_path("person/politician/ram-poudel/versions").unwrap();
        assert!(versions);
        assert_eq!(key.id(), "entity:person/politician/ram-poudel");

        let (key, versions) = entity_path("/person/ram-poudel").unwrap();
        assert!(!versions);
        assert_eq!(key.slug, "ram-poudel");

        assert!(entity_path("person").is_err());
    }

    #[test]
    fn test_trailing_versions_is_always_history() {
        // Would otherwise also read as the slug of entity:person/politician/versions
        let (key, versions) = entity_path("person/politician/versions").unwrap();
        assert!(versions);
        assert_eq!(key.id(), "entity:person/politician");

        assert!(entity_path("person/versions").is_err());
    }
}
