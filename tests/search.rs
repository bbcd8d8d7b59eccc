//! Search Determinism Tests
//!
//! Tests for:
//! - Name search is case-insensitive across English and Nepali renderings
//! - Pages are disjoint, ordered, and sum to the filtered total
//! - Limits are clamped to the configured maximum
//! - Searches keep working while records are deleted underneath them

use civicdb::model::{
    Author, EntityKey, EntitySubType, EntityType, Name, NameKind, NameParts, NewEntity,
    NewRelationship, RelationshipType,
};
use civicdb::search::{EntityQuery, RelationshipQuery, SearchService};
use civicdb::services::Services;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const AUTHOR: &str = "importer";

/// 23 people named Ram, 4 other people, and 3 organizations called Ram-something.
fn seeded() -> (TempDir, Services) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let (services, _) = Services::open_with(temp.path(), 20).unwrap();
    let publication = &services.publication;
    publication
        .register_author(Author::new(AUTHOR, "Bulk Importer"))
        .unwrap();

    for i in 0..23 {
        let key = EntityKey::new(
            EntityType::Person,
            Some(EntitySubType::Politician),
            format!("ram-{:02}", i),
        );
        let entity = NewEntity::new(key, vec![Name::primary_en(format!("Ram Kumar {}", i))])
            .with_attribute("cohort", json!(if i % 2 == 0 { "even" } else { "odd" }));
        publication.create_entity(entity, AUTHOR, "Seed").unwrap();
    }
    for slug in ["sita-devi", "hari-prasad", "gita-shrestha", "bikram-thapa"] {
        let key = EntityKey::new(EntityType::Person, None, slug);
        publication
            .create_entity(NewEntity::new(key, vec![Name::primary_en(slug.replace('-', " "))]), AUTHOR, "Seed")
            .unwrap();
    }
    for i in 0..3 {
        let key = EntityKey::new(
            EntityType::Organization,
            Some(EntitySubType::Ngo),
            format!("ram-trust-{}", i),
        );
        publication
            .create_entity(NewEntity::new(key, vec![Name::primary_en("Ram Trust")]), AUTHOR, "Seed")
            .unwrap();
    }
    (temp, services)
}

fn ram_people(offset: usize) -> EntityQuery {
    EntityQuery {
        query: Some("ram".into()),
        entity_type: Some(EntityType::Person),
        limit: Some(10),
        offset,
        ..Default::default()
    }
}

fn ids(search: &SearchService, query: &EntityQuery) -> Vec<String> {
    search
        .search_entities(query)
        .unwrap()
        .results
        .iter()
        .map(|e| e.id())
        .collect()
}

// =============================================================================
// Pagination
// =============================================================================

#[test]
fn test_pages_are_disjoint_and_cover_total() {
    let (_temp, services) = seeded();
    let search = &services.search;

    let first = search.search_entities(&ram_people(0)).unwrap();
    // "bikram thapa" also contains "ram"
    assert_eq!(first.total, 24);
    assert_eq!(first.results.len(), 10);
    assert!(first
        .results
        .iter()
        .all(|e| e.entity_type == EntityType::Person));

    let second = ids(search, &ram_people(10));
    let third = ids(search, &ram_people(20));
    assert_eq!(second.len(), 10);
    assert_eq!(third.len(), 4);

    let mut all: Vec<String> = first.results.iter().map(|e| e.id()).collect();
    all.extend(second);
    all.extend(third);
    let mut sorted = all.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(all, sorted, "pages must be ordered and disjoint");
    assert_eq!(all.len(), first.total);
}

#[test]
fn test_repeated_queries_are_identical() {
    let (_temp, services) = seeded();
    let search = &services.search;
    assert_eq!(ids(search, &ram_people(10)), ids(search, &ram_people(10)));
}

#[test]
fn test_offset_past_end_is_empty_page() {
    let (_temp, services) = seeded();
    let page = services.search.search_entities(&ram_people(500)).unwrap();
    assert!(page.results.is_empty());
    assert_eq!(page.total, 24);
}

#[test]
fn test_limit_is_clamped() {
    let (_temp, services) = seeded();
    let query = EntityQuery {
        limit: Some(1000),
        ..Default::default()
    };
    let page = services.search.search_entities(&query).unwrap();
    assert_eq!(page.limit, 20);
    assert_eq!(page.results.len(), 20);
    assert_eq!(page.total, 30);
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_nepali_rendering_and_attribute_filter() {
    let (_temp, services) = seeded();
    let key = EntityKey::new(EntityType::Person, Some(EntitySubType::Politician), "prachanda");
    let name = Name {
        kind: NameKind::Primary,
        en: Some(NameParts::full("Pushpa Kamal Dahal")),
        ne: Some(NameParts::full("पुष्पकमल दाहाल")),
    };
    services
        .publication
        .create_entity(NewEntity::new(key, vec![name]), AUTHOR, "Seed")
        .unwrap();

    let query = EntityQuery {
        query: Some("दाहाल".into()),
        ..Default::default()
    };
    assert_eq!(ids(&services.search, &query), vec!["entity:person/politician/prachanda"]);

    let mut query = ram_people(0);
    query.limit = None;
    query.attributes.insert("cohort".into(), json!("even"));
    let page = services.search.search_entities(&query).unwrap();
    assert_eq!(page.total, 12);
}

#[test]
fn test_relationship_filters() {
    let (_temp, services) = seeded();
    let person = EntityKey::new(EntityType::Person, Some(EntitySubType::Politician), "ram-00");
    let ngo = EntityKey::new(EntityType::Organization, Some(EntitySubType::Ngo), "ram-trust-0");

    let mut past = NewRelationship::new(&person, &ngo, RelationshipType::EmployedBy);
    past.start_date = Some("2001-01-01".parse().unwrap());
    past.end_date = Some("2005-12-31".parse().unwrap());
    services.publication.create_relationship(past, AUTHOR, "Seed").unwrap();
    services
        .publication
        .create_relationship(
            NewRelationship::new(&person, &ngo, RelationshipType::AffiliatedWith),
            AUTHOR,
            "Seed",
        )
        .unwrap();

    let by_source = RelationshipQuery {
        source: Some(person.id()),
        ..Default::default()
    };
    assert_eq!(services.search.search_relationships(&by_source).unwrap().total, 2);

    let active = RelationshipQuery {
        currently_active: true,
        ..Default::default()
    };
    let page = services.search.search_relationships(&active).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.results[0].relationship_type, RelationshipType::AffiliatedWith);

    let in_2003 = RelationshipQuery {
        relationship_type: Some(RelationshipType::EmployedBy),
        active_on: Some("2003-06-01".parse().unwrap()),
        ..Default::default()
    };
    assert_eq!(services.search.search_relationships(&in_2003).unwrap().total, 1);
}

// =============================================================================
// Concurrent Readers
// =============================================================================

#[test]
fn test_search_during_concurrent_deletes() {
    const PEOPLE: usize = 200;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let (services, _) = Services::open(temp.path()).unwrap();
    let publication = &services.publication;
    publication
        .register_author(Author::new(AUTHOR, "Bulk Importer"))
        .unwrap();
    let keys: Vec<EntityKey> = (0..PEOPLE)
        .map(|i| EntityKey::new(EntityType::Person, None, format!("person-{:04}", i)))
        .collect();
    for key in &keys {
        publication
            .create_entity(NewEntity::new(key.clone(), vec![Name::primary_en("Some Person")]), AUTHOR, "Seed")
            .unwrap();
    }

    let done = AtomicBool::new(false);
    let (deleted, totals) = thread::scope(|scope| {
        let deleter = scope.spawn(|| {
            let deleted = keys
                .iter()
                .filter(|key| matches!(publication.delete_entity(key), Ok(true)))
                .count();
            done.store(true, Ordering::SeqCst);
            deleted
        });

        let mut totals = Vec::new();
        while !done.load(Ordering::SeqCst) {
            let page = services
                .search
                .search_entities(&EntityQuery::default())
                .expect("search must not fail while records are deleted");
            assert!(page.results.len() <= page.total);
            totals.push(page.total);
        }
        (deleter.join().unwrap(), totals)
    });
    assert_eq!(deleted, PEOPLE);

    // Deletes only ever shrink what a later search sees
    assert!(totals.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(services.search.count_entities().unwrap(), 0);
}
