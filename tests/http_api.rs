//! Read API Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`:
//! - Search endpoints return paginated JSON
//! - Entity paths resolve with and without a sub-type
//! - Errors carry a stable code in a JSON envelope

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use civicdb::http_server::{HttpServer, HttpServerConfig};
use civicdb::model::{
    Author, EntityKey, EntitySubType, EntityType, Name, NewEntity, NewRelationship,
    RelationshipType,
};
use civicdb::services::Services;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// =============================================================================
// Test Utilities
// =============================================================================

const AUTHOR: &str = "api-tester";

struct Fixture {
    _temp: TempDir,
    router: Router,
    relationship_id: String,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let (services, _) = Services::open(temp.path()).unwrap();
    let publication = &services.publication;
    publication
        .register_author(Author::new(AUTHOR, "API Tester"))
        .unwrap();

    let person = publication
        .create_entity(
            NewEntity::new(
                EntityKey::new(EntityType::Person, Some(EntitySubType::Politician), "ram-poudel"),
                vec![Name::primary_en("Ram Chandra Poudel")],
            )
            .with_attribute("party", json!("nepali-congress")),
            AUTHOR,
            "Create",
        )
        .unwrap();
    let mut edited = person.clone();
    edited.attributes.insert("province".into(), json!("gandaki"));
    publication.update_entity(edited, AUTHOR, "Province").unwrap();

    let district = publication
        .create_entity(
            NewEntity::new(
                EntityKey::new(EntityType::Location, None, "tanahun"),
                vec![Name::primary_en("Tanahun")],
            ),
            AUTHOR,
            "Create",
        )
        .unwrap();
    let relationship = publication
        .create_relationship(
            NewRelationship::new(&person.key(), &district.key(), RelationshipType::LocatedIn),
            AUTHOR,
            "Residence",
        )
        .unwrap();

    let router = HttpServer::new(HttpServerConfig::default(), Arc::clone(&services.search)).router();
    Fixture {
        _temp: temp,
        router,
        relationship_id: relationship.id,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// =============================================================================
// Success Paths
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fx = fixture();
    let (status, body) = get(&fx.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_search_entities() {
    let fx = fixture();
    let (status, body) = get(&fx.router, "/api/entities?query=RAM&entity_type=person&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["results"][0]["slug"], "ram-poudel");

    let (_, body) = get(&fx.router, "/api/entities?offset=1").await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_entity_and_history() {
    let fx = fixture();
    let (status, body) = get(&fx.router, "/api/entities/person/politician/ram-poudel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version_summary"]["version_number"], 2);

    let (status, body) = get(&fx.router, "/api/entities/person/politician/ram-poudel/versions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["results"][0]["snapshot"]["attributes"], json!({"party": "nepali-congress"}));

    let (status, body) = get(&fx.router, "/api/entities/location/tanahun").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "location");
}

#[tokio::test]
async fn test_relationships_and_authors() {
    let fx = fixture();
    let (status, body) = get(
        &fx.router,
        "/api/relationships?relationship_type=LOCATED_IN&currently_active=true",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let uri = format!("/api/relationships/{}", fx.relationship_id);
    let (status, body) = get(&fx.router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target_entity_id"], "entity:location/tanahun");

    let (_, body) = get(&fx.router, &format!("{}/versions", uri)).await;
    assert_eq!(body["total"], 1);

    let (status, body) = get(&fx.router, &format!("/api/authors/{}", AUTHOR)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "API Tester");
}

// =============================================================================
// Error Envelope
// =============================================================================

#[tokio::test]
async fn test_bad_query_is_invalid_request() {
    let fx = fixture();
    let (status, body) = get(&fx.router, "/api/entities?limit=lots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let (status, body) = get(&fx.router, "/api/relationships?active_on=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    let fx = fixture();
    for uri in [
        "/api/entities/person/politician/nobody",
        "/api/entities/organization",
        "/api/relationships/relationship:00000000-0000-0000-0000-000000000000",
        "/api/authors/ghost",
    ] {
        let (status, body) = get(&fx.router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["error"]["code"], "NOT_FOUND", "{}", uri);
    }
}
