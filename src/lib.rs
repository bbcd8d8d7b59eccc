//! civicdb - versioned, file-backed records for public-interest data
//!
//! Entities (people, organizations, locations) and the relationships
//! between them live as JSON documents under a storage root. Every create
//! and update goes through the Publication Service and appends an immutable
//! version. Batch changes arrive as ordered, run-once migrations whose logs
//! prove they were applied.

pub mod cli;
pub mod config;
pub mod crash_point;
pub mod diff;
pub mod errors;
pub mod http_server;
pub mod ledger;
pub mod migration;
pub mod model;
pub mod normalize;
pub mod observability;
pub mod publication;
pub mod search;
pub mod services;
pub mod store;
