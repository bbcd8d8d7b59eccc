//! `migrate.json`: migration metadata and optional declarative steps

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::steps::Step;

pub const MANIFEST_FILE: &str = "migrate.json";
pub const README_FILE: &str = "README.md";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationManifest {
    pub author: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub description: String,
    #[serde(default)]
    pub change_description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl MigrationManifest {
    /// Every problem with the manifest's metadata.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.author.trim().is_empty() {
            problems.push("author must not be empty".to_string());
        }
        if self.description.trim().is_empty() {
            problems.push("description must not be empty".to_string());
        }
        if self.parsed_date().is_none() {
            problems.push(format!("date '{}' is not YYYY-MM-DD", self.date));
        }
        problems
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }
}
