//! Structural diff of JSON documents
//!
//! Objects are compared key by key and recursed into; every other value
//! (arrays included) is compared as a whole. Paths use dotted notation
//! (`attributes.party`), with the empty path meaning the document root.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub change: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// Computes the changes turning `before` into `after`, ordered by path.
pub fn diff_values(before: &Value, after: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    diff_into("", before, after, &mut changes);
    changes
}

/// Diff of two optional documents (a missing side means created or removed).
pub fn diff_documents(before: Option<&Value>, after: Option<&Value>) -> Vec<FieldChange> {
    match (before, after) {
        (Some(b), Some(a)) => diff_values(b, a),
        (None, Some(a)) => vec![FieldChange {
            path: String::new(),
            change: ChangeKind::Added,
            before: None,
            after: Some(a.clone()),
        }],
        (Some(b), None) => vec![FieldChange {
            path: String::new(),
            change: ChangeKind::Removed,
            before: Some(b.clone()),
            after: None,
        }],
        (None, None) => Vec::new(),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_into(path: &str, before: &Value, after: &Value, out: &mut Vec<FieldChange>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            for key in keys {
                let child = join(path, key);
                match (b.get(key), a.get(key)) {
                    (Some(bv), Some(av)) => diff_into(&child, bv, av, out),
                    (None, Some(av)) => out.push(FieldChange {
                        path: child,
                        change: ChangeKind::Added,
                        before: None,
                        after: Some(av.clone()),
                    }),
                    (Some(bv), None) => out.push(FieldChange {
                        path: child,
                        change: ChangeKind::Removed,
                        before: Some(bv.clone()),
                        after: None,
                    }),
                    (None, None) => {}
                }
            }
        }
        _ if before != after => out.push(FieldChange {
            path: path.to_string(),
            change: ChangeKind::Modified,
            before: Some(before.clone()),
            after: Some(after.clone()),
        }),
        _ => {}
    }
}

/// Human-readable rendering, one line per change.
pub fn render(changes: &[FieldChange]) -> String {
    let mut out = String::new();
    for change in changes {
        let path = if change.path.is_empty() { "." } else { change.path.as_str() };
        let line = match change.change {
            ChangeKind::Added => format!("+ {}: {}\n", path, compact(change.after.as_ref())),
            ChangeKind::Removed => format!("- {}: {}\n", path, compact(change.before.as_ref())),
            ChangeKind::Modified => format!(
                "~ {}: {} -> {}\n",
                path,
                compact(change.before.as_ref()),
                compact(change.after.as_ref())
            ),
        };
        out.push_str(&line);
    }
    out
}

fn compact(value: Option<&Value>) -> String {
    match value {
        Some(v) => serde_json::to_string(v).unwrap_or_else(|_| "<unprintable>".to_string()),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents_have_no_changes() {
        let doc = json!({"a": 1, "b": {"c": [1, 2]}});
        assert!(diff_values(&doc, &doc).is_empty());
    }

    #[test]
    fn test_nested_object_changes() {
        let before = json!({"attributes": {"party": "a", "old": true}, "slug": "x"});
        let after = json!({"attributes": {"party": "b", "new": 1}, "slug": "x"});
        let changes = diff_values(&before, &after);
        let paths: Vec<(&str, ChangeKind)> =
            changes.iter().map(|c| (c.path.as_str(), c.change)).collect();
        assert_eq!(
            paths,
            vec![
                ("attributes.new", ChangeKind::Added),
                ("attributes.old", ChangeKind::Removed),
                ("attributes.party", ChangeKind::Modified),
            ]
        );
    }

    #[test]
    fn test_arrays_compared_whole() {
        let changes = diff_values(&json!({"names": [1, 2]}), &json!({"names": [1, 3]}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "names");
        assert_eq!(changes[0].after, Some(json!([1, 3])));
    }

    #[test]
    fn test_document_creation() {
        let changes = diff_documents(None, Some(&json!({"a": 1})));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change, ChangeKind::Added);
        assert_eq!(render(&changes), "+ .: {\"a\":1}\n");
    }

    #[test]
    fn test_render_modified() {
        let changes = diff_values(&json!({"x": "a"}), &json!({"x": "b"}));
        assert_eq!(render(&changes), "~ x: \"a\" -> \"b\"\n");
    }
}
