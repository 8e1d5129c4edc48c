// Copyright 2025 Oxide Computer Company

//! Properties that hold for any pair of documents

use crate::common::create_log_context;
use crate::common::test_comparator;
use apicheck::facts_to_changelog;
use apicheck::test_util::pets_document;
use apicheck::test_util::write_document;
use apicheck::traverse;
use apicheck::ChangeKind;
use apicheck::FactAccumulator;
use apicheck::SpecReference;
use camino::Utf8Path;
use serde_json::json;

#[tokio::test]
async fn test_comparisons_are_deterministic() {
    let logctx = create_log_context("test_comparisons_are_deterministic");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();
    let before = write_document(dir, "before.json", &pets_document());
    let mut after = pets_document();
    after["paths"]["/pets"]["get"]["parameters"][0]["required"] = json!(true);
    after["paths"]["/pets/{id}"]["patch"]["responses"]["404"] =
        json!({ "description": "no such pet" });
    let after = write_document(dir, "after.json", &after);

    let comparator = test_comparator(&logctx.log);
    let mut outputs = Vec::new();
    for _ in 0..3 {
        let output = comparator
            .compare(
                &SpecReference::File(before.clone()),
                &SpecReference::File(after.clone()),
                json!({}),
            )
            .await
            .unwrap();
        outputs.push(serde_json::to_string(&output).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);

    logctx.cleanup_successful();
}

#[test]
fn test_self_diff_is_empty() {
    let logctx = create_log_context("test_self_diff_is_empty");
    let facts = traverse(&pets_document(), &logctx.log);
    assert!(!facts.is_empty());
    assert!(facts_to_changelog(&facts, &facts).is_empty());
    logctx.cleanup_successful();
}

#[test]
fn test_diff_is_complete() {
    let logctx = create_log_context("test_diff_is_complete");
    let before = traverse(&pets_document(), &logctx.log);
    let mut document = pets_document();
    document["paths"]["/pets"]["get"]["responses"]["200"]["description"] =
        json!("all of the pets");
    document["paths"]["/pets"]["get"]["parameters"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "offset", "in": "query" }));
    document["paths"]
        .as_object_mut()
        .unwrap()
        .remove("/pets/{id}");
    let after = traverse(&document, &logctx.log);

    let changes = facts_to_changelog(&before, &after);

    // Every fact only in `after` is added, every fact only in `before` is
    // removed, and every fact whose value differs is changed.
    let mut expected = Vec::new();
    for fact in after.iter() {
        match before.get(&fact.location.key()) {
            None => expected.push((ChangeKind::Added, fact.location.key())),
            Some(old) if old.value != fact.value => {
                expected.push((ChangeKind::Changed, fact.location.key()))
            }
            Some(_) => (),
        }
    }
    for fact in before.iter() {
        if after.get(&fact.location.key()).is_none() {
            expected.push((ChangeKind::Removed, fact.location.key()));
        }
    }
    let actual: Vec<_> = changes
        .iter()
        .map(|change| (change.change_kind(), change.location().key()))
        .collect();
    assert_eq!(actual, expected);

    let kinds: Vec<_> = actual.iter().map(|(kind, _)| *kind).collect();
    assert!(kinds.contains(&ChangeKind::Added));
    assert!(kinds.contains(&ChangeKind::Changed));
    assert!(kinds.contains(&ChangeKind::Removed));

    // Diffing against nothing adds everything.
    let from_nothing = facts_to_changelog(&FactAccumulator::default(), &after);
    assert_eq!(from_nothing.len(), after.len());

    logctx.cleanup_successful();
}
