// Copyright 2025 Oxide Computer Company

//! The standard rulesets run end to end over small pet store APIs

use apicheck::empty_spec;
use apicheck::test_util::openapi_document;
use apicheck::test_util::pets_document;
use apicheck::test_util::test_logger;
use apicheck::traverse;
use apicheck::Change;
use apicheck::ChangeKind;
use apicheck::CheckResult;
use apicheck::FactKind;
use apicheck::FactValue;
use apicheck_rulesets::breaking_changes::OPERATION_REMOVAL;
use apicheck_rulesets::breaking_changes::REQUEST_PROPERTY_REQUIRED;
use apicheck_rulesets::breaking_changes::RESPONSE_PROPERTY_TYPE_CHANGE;
use apicheck_rulesets::lint::SPECIFICATION_LINT;
use apicheck_rulesets::named_rulesets;
use serde_json::json;
use serde_json::Value;

/// Runs the "breaking-changes" ruleset, returning the changelog and results.
async fn check(before: Value, after: Value) -> (Vec<Change>, Vec<CheckResult>) {
    check_with("breaking-changes", before, after).await
}

async fn check_with(
    ruleset: &str,
    before: Value,
    after: Value,
) -> (Vec<Change>, Vec<CheckResult>) {
    let log = test_logger();
    let service =
        named_rulesets::<()>().check_service(ruleset, &log).unwrap();
    let input = service.rule_input(before, after, ());
    let changes = input.changelog.clone();
    let results = service.run_rules_with_facts(input).await.unwrap();
    (changes, results)
}

fn pets_with_body(name: Value) -> Value {
    openapi_document(json!({
        "/pets": {
            "get": { "responses": { "200": { "description": "ok" } } },
            "post": {
                "requestBody": {
                    "content": {
                        "application/json": {
                            "schema": {
                                "type": "object",
                                "properties": { "name": name }
                            }
                        }
                    }
                },
                "responses": { "201": { "description": "created" } }
            }
        }
    }))
}

#[tokio::test]
async fn test_request_property_made_required() {
    let before = pets_with_body(json!({ "type": "string" }));
    let mut after = before.clone();
    after["paths"]["/pets"]["post"]["requestBody"]["content"]
        ["application/json"]["schema"]["required"] = json!(["name"]);

    let (changes, results) = check(before, after).await;

    assert_eq!(changes.len(), 1);
    let Change::Changed { location, changed } = &changes[0] else {
        panic!("unexpected change: {:?}", changes[0]);
    };
    assert_eq!(location.kind, FactKind::Field);
    match (&changed.before, &changed.after) {
        (FactValue::Field(before), FactValue::Field(after)) => {
            assert_eq!(before.key, "name");
            assert!(!before.required);
            assert!(after.required);
        }
        other => panic!("unexpected values: {:?}", other),
    }

    let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name.as_deref(), Some(REQUEST_PROPERTY_REQUIRED));
    assert!(failed[0].is_blocking());
}

#[tokio::test]
async fn test_new_operation() {
    let before = openapi_document(json!({
        "/pets": {
            "get": { "responses": { "200": { "description": "ok" } } }
        }
    }));
    let after = pets_with_body(json!({ "type": "string" }));

    let (changes, results) = check(before, after).await;

    assert!(changes.iter().all(|c| c.change_kind() == ChangeKind::Added));
    let added: Vec<_> = changes
        .iter()
        .map(|c| (c.kind(), c.location().json_path.to_string()))
        .collect();
    let body = "/paths/~1pets/post/requestBody";
    assert_eq!(
        added,
        vec![
            (FactKind::Operation, String::from("/paths/~1pets/post")),
            (FactKind::RequestBody, String::from(body)),
            (
                FactKind::Body,
                format!("{}/content/application~1json", body)
            ),
            (
                FactKind::Field,
                format!(
                    "{}/content/application~1json/schema/properties/name",
                    body
                )
            ),
            (
                FactKind::Response,
                String::from("/paths/~1pets/post/responses/201")
            ),
        ]
    );
    assert!(results.iter().all(|r| r.passed));
    assert!(results
        .iter()
        .all(|r| r.name.as_deref() != Some(OPERATION_REMOVAL)));
}

#[tokio::test]
async fn test_response_property_type_change() {
    let before = pets_document();
    let mut after = pets_document();
    after["paths"]["/pets/{id}"]["patch"]["responses"]["200"]["content"]
        ["application/json"]["schema"]["properties"]["id"] =
        json!({ "type": "integer" });

    let (changes, results) = check(before, after).await;

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_kind(), ChangeKind::Changed);
    assert_eq!(changes[0].kind(), FactKind::Field);
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.name.as_deref(), Some(RESPONSE_PROPERTY_TYPE_CHANGE));
    assert!(!result.passed);
    assert!(result.error.as_deref().unwrap().contains("'id'"));
}

#[tokio::test]
async fn test_empty_to_populated() {
    let document = pets_document();
    let (changes, results) = check(empty_spec(), document.clone()).await;

    let facts = traverse(&document, &test_logger());
    assert_eq!(changes.len(), facts.len());
    assert!(changes.iter().all(|c| c.change_kind() == ChangeKind::Added));
    let change_keys: Vec<_> =
        changes.iter().map(|c| c.location().key()).collect();
    let fact_keys: Vec<_> = facts.keys().cloned().collect();
    assert_eq!(change_keys, fact_keys);

    // The only assertions about added things are on request properties, and
    // every operation is new.
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.passed));

    // And back again: everything is removed.
    let (changes, results) = check(document, empty_spec()).await;
    assert_eq!(changes.len(), facts.len());
    assert!(changes.iter().all(|c| c.change_kind() == ChangeKind::Removed));
    let removals: Vec<_> =
        results.iter().filter(|r| r.is_blocking()).collect();
    assert_eq!(removals.len(), 2);
}

#[tokio::test]
async fn test_default_ruleset_lints_new_document() {
    // A copied operation keeps the original's operationId.
    let before = pets_document();
    let mut after = pets_document();
    let patch = after["paths"]["/pets/{id}"]["patch"].clone();
    after["paths"]["/pets/{id}"]["put"] = patch;
    after["info"]["version"] = json!("");

    let (_, strict) =
        check_with("breaking-changes", before.clone(), after.clone()).await;
    assert!(strict
        .iter()
        .all(|r| r.name.as_deref() != Some(SPECIFICATION_LINT)));

    let (changes, results) = check_with("default", before, after).await;
    let put = "/paths/~1pets~1{id}/put";
    assert!(changes
        .iter()
        .any(|c| c.location().json_path.to_string() == put));

    // The lint runs after the per-entity rules.
    let (entity, lint) = results.split_at(strict.len());
    assert_eq!(entity, &strict[..]);
    let summary: Vec<_> = lint
        .iter()
        .map(|r| (r.name.as_deref(), r.condition.as_str(), r.where_.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                Some(SPECIFICATION_LINT),
                "have an info.version",
                "specification: pets"
            ),
            (
                Some(SPECIFICATION_LINT),
                "have a unique operationId",
                "operation: PATCH /pets/{id}"
            ),
            (
                Some(SPECIFICATION_LINT),
                "have a unique operationId",
                "operation: PUT /pets/{id}"
            ),
        ]
    );
    assert!(lint.iter().all(CheckResult::is_blocking));
}
