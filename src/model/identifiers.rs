//! External identifiers, contacts and source attributions

use serde::{Deserialize, Serialize};

use super::validation::{is_valid_email, is_valid_phone, is_valid_url, FieldError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierScheme {
    Wikipedia,
    Wikidata,
    Twitter,
    Facebook,
    Website,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentifier {
    pub scheme: IdentifierScheme,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactKind {
    Email,
    Phone,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub kind: ContactKind,
    pub value: String,
}

/// Source citation for the data on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub fn validate_identifiers(identifiers: &[ExternalIdentifier]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for (i, identifier) in identifiers.iter().enumerate() {
        if identifier.value.trim().is_empty() {
            errors.push(FieldError::new(format!("identifiers[{}].value", i), "must not be empty"));
        }
        if let Some(url) = &identifier.url {
            if !is_valid_url(url) {
                errors.push(FieldError::new(
                    format!("identifiers[{}].url", i),
                    "must be an absolute http(s) URL",
                ));
            }
        }
    }
    errors
}

pub fn validate_contacts(contacts: &[Contact]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for (i, contact) in contacts.iter().enumerate() {
        let (ok, expected) = match contact.kind {
            ContactKind::Email => (is_valid_email(&contact.value), "a valid email address"),
            ContactKind::Phone => (
                is_valid_phone(&contact.value),
                "digits, '+', spaces and dashes only",
            ),
            ContactKind::Url => (is_valid_url(&contact.value), "an absolute http(s) URL"),
        };
        if !ok {
            errors.push(FieldError::new(
                format!("contacts[{}].value", i),
                format!("must be {}", expected),
            ));
        }
    }
    errors
}

pub fn validate_attributions(attributions: &[Attribution]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for (i, attribution) in attributions.iter().enumerate() {
        if attribution.title.trim().is_empty() {
            errors.push(FieldError::new(format!("attributions[{}].title", i), "must not be empty"));
        }
    }
    errors
}
