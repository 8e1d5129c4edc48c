// Copyright 2025 Oxide Computer Company

//! Tests for bulk comparisons

use crate::common::create_log_context;
use crate::common::test_comparator;
use apicheck::test_util::pets_document;
use apicheck::test_util::write_document;
use apicheck::ComparisonState;
use apicheck::CompareError;
use apicheck::LoadError;
use camino::Utf8Path;
use serde_json::json;
use serde_json::Value;

#[tokio::test]
async fn test_bulk_compare_isolates_failures() {
    let logctx = create_log_context("test_bulk_compare_isolates_failures");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();
    write_document(dir, "pets.json", &pets_document());
    let input = write_document(
        dir,
        "input.json",
        &json!({
            "comparisons": [
                { "to": "pets.json", "context": { "pr": 1 } },
                { "from": "pets.json", "to": "missing.json", "context": {} },
                { "from": "pets.json", "to": "pets.json" }
            ]
        }),
    );
    let output = dir.join("out.json");

    let comparator =
        test_comparator(&logctx.log).with_root_dir(dir.to_owned());
    let summary =
        comparator.run_bulk_compare(&input, Some(&output)).await.unwrap();

    assert!(summary.skipped_parsing);
    assert!(!summary.bulk_succeeded);
    assert!(summary.has_failures);
    assert_eq!(summary.comparisons.len(), 2);
    let states: Vec<_> =
        summary.comparisons.values().map(|status| &status.state).collect();
    match states[0] {
        ComparisonState::Done(output) => {
            assert!(!output.changes.is_empty());
            assert!(!output.has_blocking_failures());
        }
        other => panic!("unexpected state: {:?}", other),
    }
    match states[1] {
        ComparisonState::Failed(CompareError::Load {
            reference,
            err: LoadError::Io { .. },
        }) => {
            assert!(reference.ends_with("missing.json"));
        }
        other => panic!("unexpected state: {:?}", other),
    }

    // Only the comparison that ran is written out.
    let written: Value =
        serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    let comparisons = written["comparisons"].as_array().unwrap();
    assert_eq!(comparisons.len(), 1);
    assert_eq!(comparisons[0]["inputs"], json!({ "to": "pets.json" }));
    assert_eq!(comparisons[0]["results"], json!([]));
    let changes = comparisons[0]["changes"].as_array().unwrap();
    assert!(!changes.is_empty());
    assert!(changes.iter().all(|change| change["changeType"] == "added"));
    assert_eq!(changes[0]["location"]["kind"], "specification");

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_bulk_compare_blocking_failures() {
    let logctx = create_log_context("test_bulk_compare_blocking_failures");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();
    write_document(dir, "pets.json", &pets_document());
    let mut fewer = pets_document();
    fewer["paths"].as_object_mut().unwrap().remove("/pets");
    write_document(dir, "fewer.json", &fewer);

    let comparator =
        test_comparator(&logctx.log).with_root_dir(dir.to_owned());

    let clean = write_document(
        dir,
        "clean.json",
        &json!({
            "comparisons": [
                { "from": "pets.json", "to": "pets.json", "context": {} }
            ]
        }),
    );
    let summary = comparator.run_bulk_compare(&clean, None).await.unwrap();
    assert!(summary.bulk_succeeded);
    assert!(!summary.has_failures);

    // Every comparison ran, but one of them removed an operation.
    let input = write_document(
        dir,
        "input.json",
        &json!({
            "comparisons": [
                { "from": "pets.json", "to": "pets.json", "context": {} },
                { "from": "pets.json", "to": "fewer.json", "context": {} }
            ]
        }),
    );
    let summary = comparator.run_bulk_compare(&input, None).await.unwrap();
    assert!(!summary.skipped_parsing);
    assert!(summary.bulk_succeeded);
    assert!(summary.has_failures);
    let json = serde_json::to_value(summary.to_json()).unwrap();
    let comparisons = json["comparisons"].as_array().unwrap();
    assert_eq!(comparisons.len(), 2);
    assert_eq!(comparisons[0]["changes"], json!([]));
    let removal = &comparisons[1]["results"][0];
    assert_eq!(removal["where"], "removed operation: GET /pets");
    assert_eq!(removal["passed"], false);
    assert_eq!(removal["isMust"], true);
    assert_eq!(removal["changeType"], "removed");
    assert_eq!(
        comparisons[1]["inputs"],
        json!({ "from": "pets.json", "to": "fewer.json" })
    );

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_bulk_compare_bad_input() {
    let logctx = create_log_context("test_bulk_compare_bad_input");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();
    let input = dir.join("input.json");
    std::fs::write(&input, "{ not json").unwrap();

    let error = test_comparator(&logctx.log)
        .run_bulk_compare(&input, None)
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("failed to parse bulk input {}", input)
    );

    logctx.cleanup_successful();
}
