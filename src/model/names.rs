//! Multilingual names
//!
//! Every entity carries an ordered list of names. Each name has a kind and up
//! to two language renderings (English and Nepali); at least one rendering
//! with a non-empty `full` must be present.

use serde::{Deserialize, Serialize};

use super::validation::{FieldError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NameKind {
    Primary,
    Alias,
    Alternate,
    Birth,
    Official,
}

/// One language rendering of a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParts {
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl NameParts {
    pub fn full(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            given: None,
            middle: None,
            family: None,
        }
    }

    /// Every populated part, `full` first.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.full.as_str())
            .chain(self.given.as_deref())
            .chain(self.middle.as_deref())
            .chain(self.family.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub kind: NameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<NameParts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<NameParts>,
}

impl Name {
    pub fn primary_en(full: impl Into<String>) -> Self {
        Self {
            kind: NameKind::Primary,
            en: Some(NameParts::full(full)),
            ne: None,
        }
    }

    pub fn renderings(&self) -> impl Iterator<Item = &NameParts> {
        self.en.iter().chain(self.ne.iter())
    }

    /// Case-insensitive substring match over every part of every rendering.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.renderings()
            .flat_map(|r| r.parts())
            .any(|part| part.to_lowercase().contains(needle))
    }
}

/// Checks the name list of an entity.
pub fn validate_names(names: &[Name]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if names.is_empty() {
        errors.push(FieldError::new("names", "at least one PRIMARY name is required"));
        return errors;
    }

    let primaries = names.iter().filter(|n| n.kind == NameKind::Primary).count();
    if primaries != 1 {
        errors.push(FieldError::new(
            "names",
            format!("exactly one PRIMARY name is required, found {}", primaries),
        ));
    }

    for (i, name) in names.iter().enumerate() {
        let has_full = name.renderings().any(|r| !r.full.trim().is_empty());
        if !has_full {
            errors.push(FieldError::new(
                format!("names[{}]", i),
                "needs an 'en' or 'ne' rendering with a non-empty full name",
            ));
        }
        for (lang, rendering) in [("en", &name.en), ("ne", &name.ne)] {
            if let Some(parts) = rendering {
                if parts.full.trim().is_empty() {
                    errors.push(FieldError::new(
                        format!("names[{}].{}.full", i, lang),
                        "must not be empty",
                    ));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_primary_ok() {
        let names = vec![Name::primary_en("Ram Chandra Poudel")];
        assert!(validate_names(&names).is_empty());
    }

    #[test]
    fn test_two_primaries_rejected() {
        let names = vec![Name::primary_en("A Name"), Name::primary_en("B Name")];
        let errors = validate_names(&names);
        assert!(errors.has_field("names"));
    }

    #[test]
    fn test_missing_primary_rejected() {
        let names = vec![Name {
            kind: NameKind::Alias,
            en: Some(NameParts::full("Alias")),
            ne: None,
        }];
        assert!(validate_names(&names).has_field("names"));
    }

    #[test]
    fn test_name_without_rendering_rejected() {
        let names = vec![
            Name::primary_en("Ram Chandra Poudel"),
            Name {
                kind: NameKind::Alias,
                en: None,
                ne: None,
            },
        ];
        assert!(validate_names(&names).has_field("names[1]"));
    }

    #[test]
    fn test_match_covers_all_parts_and_languages() {
        let name = Name {
            kind: NameKind::Primary,
            en: Some(NameParts {
                full: "Ram Chandra Poudel".into(),
                given: Some("Ram".into()),
                middle: Some("Chandra".into()),
                family: Some("Poudel".into()),
            }),
            ne: Some(NameParts::full("रामचन्द्र पौडेल")),
        };
        assert!(name.matches("poudel"));
        assert!(name.matches("chandra"));
        assert!(name.matches("पौडेल"));
        assert!(!name.matches("koirala"));
    }
}
