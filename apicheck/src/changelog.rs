// Copyright 2025 Oxide Computer Company

//! Align the facts of two documents into a changelog

use crate::fact::Fact;
use crate::fact::FactAccumulator;
use crate::fact::FactValue;
use crate::location::FactKind;
use crate::location::Location;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangedValues {
    pub before: FactValue,
    pub after: FactValue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RemovedValue {
    pub before: FactValue,
}

/// One entry of a changelog
///
/// A removal is located at the entity's location in the old document.  Every
/// other change is located in the new document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "changeType", rename_all = "lowercase")]
pub enum Change {
    Added { location: Location, added: FactValue },
    Changed { location: Location, changed: ChangedValues },
    Removed { location: Location, removed: RemovedValue },
}

/// The three flavors of [`Change`], without their payloads
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Changed => "changed",
            ChangeKind::Removed => "removed",
        }
    }
}

impl Change {
    pub fn location(&self) -> &Location {
        match self {
            Change::Added { location, .. }
            | Change::Changed { location, .. }
            | Change::Removed { location, .. } => location,
        }
    }

    pub fn change_kind(&self) -> ChangeKind {
        match self {
            Change::Added { .. } => ChangeKind::Added,
            Change::Changed { .. } => ChangeKind::Changed,
            Change::Removed { .. } => ChangeKind::Removed,
        }
    }

    pub fn kind(&self) -> FactKind {
        self.location().kind
    }

    /// The value of the entity after the change, if it still exists
    pub fn after(&self) -> Option<&FactValue> {
        match self {
            Change::Added { added, .. } => Some(added),
            Change::Changed { changed, .. } => Some(&changed.after),
            Change::Removed { .. } => None,
        }
    }

    /// The value of the entity before the change, if it existed
    pub fn before(&self) -> Option<&FactValue> {
        match self {
            Change::Added { .. } => None,
            Change::Changed { changed, .. } => Some(&changed.before),
            Change::Removed { removed, .. } => Some(&removed.before),
        }
    }
}

/// Compares the facts of two documents.
///
/// Facts are aligned by `(kind, conceptual path)`.  The result lists additions
/// and modifications in the order the new document declares them, followed by
/// removals in the order the old document declared them.  Identical facts
/// produce nothing, so diffing a document against itself yields an empty
/// changelog.
pub fn facts_to_changelog(
    before: &FactAccumulator,
    after: &FactAccumulator,
) -> Vec<Change> {
    let mut changes = Vec::new();

    for fact in after.iter() {
        match before.get(&fact.location.key()) {
            None => changes.push(Change::Added {
                location: fact.location.clone(),
                added: fact.value.clone(),
            }),
            Some(previous) if previous.value != fact.value => {
                changes.push(Change::Changed {
                    location: fact.location.clone(),
                    changed: ChangedValues {
                        before: previous.value.clone(),
                        after: fact.value.clone(),
                    },
                })
            }
            Some(_) => (),
        }
    }

    changes.extend(
        before
            .iter()
            .filter(|fact| after.get(&fact.location.key()).is_none())
            .map(|Fact { location, value }| Change::Removed {
                location: location.clone(),
                removed: RemovedValue { before: value.clone() },
            }),
    );

    changes
}

#[cfg(test)]
mod test {
    use super::facts_to_changelog;
    use super::Change;
    use super::ChangeKind;
    use crate::test_util::test_logger;
    use crate::traverser::traverse;
    use serde_json::json;

    fn pets(properties: serde_json::Value) -> serde_json::Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "pets", "version": "1" },
            "paths": { "/pets": { "get": { "responses": { "200": {
                "description": "ok",
                "content": { "application/json": { "schema": {
                    "type": "object",
                    "properties": properties
                } } }
            } } } } }
        })
    }

    #[test]
    fn test_self_diff_is_empty() {
        let log = test_logger();
        let document = pets(json!({ "id": { "type": "string" } }));
        let facts = traverse(&document, &log);
        assert!(facts_to_changelog(&facts, &facts).is_empty());
    }

    #[test]
    fn test_added_changed_removed() {
        let log = test_logger();
        let before = traverse(
            &pets(json!({
                "id": { "type": "string" },
                "nickname": { "type": "string" }
            })),
            &log,
        );
        let after = traverse(
            &pets(json!({
                "id": { "type": "integer" },
                "name": { "type": "string" }
            })),
            &log,
        );

        let changes = facts_to_changelog(&before, &after);
        let summary: Vec<(ChangeKind, String)> = changes
            .iter()
            .map(|c| {
                let key = c.location().conceptual_path.segments();
                (c.change_kind(), key[key.len() - 1].clone())
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (ChangeKind::Changed, "id".to_string()),
                (ChangeKind::Added, "name".to_string()),
                (ChangeKind::Removed, "nickname".to_string()),
            ]
        );

        let Change::Changed { changed, .. } = &changes[0] else {
            panic!("expected a changed entry, found {:?}", changes[0]);
        };
        assert_eq!(
            serde_json::to_value(&changed.before).unwrap()["flatSchema"],
            json!({ "type": "string" })
        );
        assert_eq!(
            serde_json::to_value(&changed.after).unwrap()["flatSchema"],
            json!({ "type": "integer" })
        );
    }

    #[test]
    fn test_change_serialization() {
        let log = test_logger();
        let before = traverse(&pets(json!({})), &log);
        let after =
            traverse(&pets(json!({ "id": { "type": "string" } })), &log);
        let changes = facts_to_changelog(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(
            serde_json::to_value(&changes[0]).unwrap(),
            json!({
                "changeType": "added",
                "location": {
                    "jsonPath": "/paths/~1pets/get/responses/200/content/\
                                 application~1json/schema/properties/id",
                    "conceptualPath": [
                        "operations", "/pets", "get", "responses", "200",
                        "application/json", "properties", "id"
                    ],
                    "kind": "field",
                    "conceptualLocation": {
                        "path": "/pets",
                        "method": "get",
                        "inResponse": {
                            "statusCode": "200",
                            "contentType": "application/json"
                        }
                    }
                },
                "added": {
                    "key": "id",
                    "required": false,
                    "flatSchema": { "type": "string" }
                }
            })
        );
    }
}
