// Copyright 2025 Oxide Computer Company

//! Tests for comparing one pair of specs

use crate::common::create_log_context;
use crate::common::test_comparator;
use crate::common::test_rulesets;
use crate::common::OPERATION_REMOVAL_RULE;
use crate::common::REQUIRED_PROPERTY_RULE;
use apicheck::test_util::pets_document;
use apicheck::test_util::write_document;
use apicheck::ChangeKind;
use apicheck::Comparator;
use apicheck::ConfigApiCheck;
use apicheck::ConfigError;
use apicheck::ConfigLogging;
use apicheck::ConfigLoggingIfExists;
use apicheck::ConfigLoggingLevel;
use apicheck::SourceSpan;
use apicheck::SpecReference;
use camino::Utf8Path;
use serde_json::json;
use serde_json::Value;

const PATCH_BODY_SCHEMA: &str =
    "/paths/~1pets~1{id}/patch/requestBody/content/application~1json/schema";

/// Adds a required `tag` property to the body of `PATCH /pets/{id}`.
fn require_tag(document: &mut Value) {
    let schema = document.pointer_mut(PATCH_BODY_SCHEMA).unwrap();
    schema["properties"]["tag"] = json!({ "type": "string" });
    schema["required"].as_array_mut().unwrap().push(json!("tag"));
}

#[tokio::test]
async fn test_compare_required_property_added() {
    let logctx = create_log_context("test_compare_required_property_added");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    let before = write_document(dir, "before.json", &pets_document());
    let mut after = pets_document();
    require_tag(&mut after);
    let after = write_document(dir, "after.json", &after);

    let output = test_comparator(&logctx.log)
        .compare(
            &SpecReference::File(before),
            &SpecReference::File(after.clone()),
            json!({}),
        )
        .await
        .unwrap();

    assert_eq!(output.results.len(), 1);
    let result = &output.results[0];
    assert_eq!(result.name.as_deref(), Some(REQUIRED_PROPERTY_RULE));
    assert_eq!(result.where_, "added field: tag");
    assert_eq!(result.change_type, Some(ChangeKind::Added));
    assert!(!result.passed);
    assert!(result.is_blocking());
    assert_eq!(
        result.error.as_deref(),
        Some("required property \"tag\" was added")
    );
    assert_eq!(
        result.docs_link.as_deref(),
        Some("https://example.com/required-properties")
    );
    let position = result.source_position.as_ref().unwrap();
    assert_eq!(position.file_path, after.as_str());
    assert_eq!(
        position.starts_at.to_string(),
        format!("{}/properties/tag", PATCH_BODY_SCHEMA)
    );

    let added_fields: Vec<_> = output
        .changes
        .iter()
        .filter(|change| change.change_kind() == ChangeKind::Added)
        .map(|change| change.location().json_path.to_string())
        .collect();
    assert_eq!(added_fields, [format!("{}/properties/tag", PATCH_BODY_SCHEMA)]);

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_compare_new_operation_may_require_properties() {
    let logctx =
        create_log_context("test_compare_new_operation_may_require_properties");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    let before = write_document(dir, "before.json", &pets_document());
    let mut after = pets_document();
    after["paths"]["/pets"]["post"] = json!({
        "operationId": "createPet",
        "requestBody": {
            "content": {
                "application/json": {
                    "schema": {
                        "type": "object",
                        "required": ["name"],
                        "properties": { "name": { "type": "string" } }
                    }
                }
            }
        },
        "responses": { "201": { "description": "created" } }
    });
    let after = write_document(dir, "after.json", &after);

    let output = test_comparator(&logctx.log)
        .compare(
            &SpecReference::File(before),
            &SpecReference::File(after),
            json!({}),
        )
        .await
        .unwrap();

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].where_, "added field: name");
    assert!(output.results[0].passed);
    assert!(!output.has_blocking_failures());
    assert!(output.changes.iter().any(|change| {
        change.change_kind() == ChangeKind::Added
            && change.location().json_path.to_string() == "/paths/~1pets/post"
    }));

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_compare_exempted_operation() {
    let logctx = create_log_context("test_compare_exempted_operation");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    // An exemption on the new version of an operation covers changes within
    // it.
    let before = write_document(dir, "before.json", &pets_document());
    let mut after = pets_document();
    require_tag(&mut after);
    after["paths"]["/pets/{id}"]["patch"]["x-apicheck-exemptions"] =
        json!([REQUIRED_PROPERTY_RULE]);
    let after_path = write_document(dir, "after.json", &after);

    let comparator = test_comparator(&logctx.log);
    let output = comparator
        .compare(
            &SpecReference::File(before.clone()),
            &SpecReference::File(after_path),
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(output.results.len(), 1);
    let result = &output.results[0];
    assert!(!result.passed);
    assert!(result.exempted);
    assert!(!result.is_blocking());

    // A removed operation is looked up in the old document, so an exemption
    // added alongside the removal doesn't count.
    let mut removed = pets_document();
    removed["paths"].as_object_mut().unwrap().remove("/pets/{id}");
    let removed = write_document(dir, "removed.json", &removed);
    let output = comparator
        .compare(
            &SpecReference::File(before),
            &SpecReference::File(removed.clone()),
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].name.as_deref(), Some(OPERATION_REMOVAL_RULE));
    assert!(output.results[0].is_blocking());

    let mut exempt_before = pets_document();
    exempt_before["paths"]["/pets/{id}"]["patch"]["x-apicheck-exemptions"] =
        json!([OPERATION_REMOVAL_RULE]);
    let exempt_before =
        write_document(dir, "exempt_before.json", &exempt_before);
    let output = comparator
        .compare(
            &SpecReference::File(exempt_before),
            &SpecReference::File(removed),
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(output.results.len(), 1);
    assert!(output.results[0].exempted);
    assert!(!output.has_blocking_failures());

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_compare_yaml_references() {
    let logctx = create_log_context("test_compare_yaml_references");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    let document = |pet: &str| {
        format!(
            "openapi: 3.0.3\n\
             info:\n  title: pets\n  version: 1.0.0\n\
             paths:\n  /pets/{{id}}:\n    patch:\n      requestBody:\n        \
             content:\n          application/json:\n            schema:\n              \
             $ref: '#/components/schemas/Pet'\n      responses:\n        \
             '204':\n          description: updated\n\
             components:\n  schemas:\n    Pet:\n{}",
            pet
        )
    };
    let before = dir.join("before.yaml");
    std::fs::write(
        &before,
        document(
            "      type: object\n      properties:\n        \
             name:\n          type: string\n",
        ),
    )
    .unwrap();
    let after = dir.join("after.yaml");
    std::fs::write(
        &after,
        document(
            "      type: object\n      required: [tag]\n      properties:\n        \
             name:\n          type: string\n        tag:\n          type: string\n",
        ),
    )
    .unwrap();

    let output = test_comparator(&logctx.log)
        .compare(
            &SpecReference::File(before),
            &SpecReference::File(after.clone()),
            json!({}),
        )
        .await
        .unwrap();

    assert_eq!(output.results.len(), 1);
    let result = &output.results[0];
    assert!(!result.passed);
    assert_eq!(
        result.location.json_path.to_string(),
        "/paths/~1pets~1{id}/patch/requestBody/content/application~1json\
         /schema/properties/tag"
    );
    // The field was written down in the component, not in the operation.
    let position = result.source_position.as_ref().unwrap();
    assert_eq!(position.file_path, after.as_str());
    assert_eq!(
        position.starts_at.to_string(),
        "/components/schemas/Pet/properties/tag"
    );
    assert_eq!(
        position.span,
        Some(SourceSpan {
            start_line: 24,
            start_column: 9,
            end_line: 25,
            end_column: 22,
        })
    );
    let reported = serde_json::to_value(position).unwrap();
    assert_eq!(reported["startLine"], 24);
    assert_eq!(reported["endColumn"], 22);

    logctx.cleanup_successful();
}

const PETS_WITH_SHARED_SCHEMA: &str = "\
openapi: 3.0.3
info:
  title: pets
  version: 1.0.0
paths:
  /pets/{id}:
    patch:
      requestBody:
        content:
          application/json:
            schema:
              $ref: 'schemas/pet.yaml#/Pet'
      responses:
        '204':
          description: updated
";

#[tokio::test]
async fn test_compare_references_across_files() {
    let logctx = create_log_context("test_compare_references_across_files");
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    let write_spec = |version: &str, pet: &str| {
        let root = dir.join(version).join("openapi.yaml");
        let schemas = dir.join(version).join("schemas");
        std::fs::create_dir_all(&schemas).unwrap();
        std::fs::write(&root, PETS_WITH_SHARED_SCHEMA).unwrap();
        std::fs::write(schemas.join("pet.yaml"), pet).unwrap();
        (root, schemas.join("pet.yaml"))
    };
    let (before, _) = write_spec(
        "before",
        "\
Pet:
  type: object
  properties:
    name:
      type: string
",
    );
    let (after, after_pet) = write_spec(
        "after",
        "\
Pet:
  type: object
  required: [tag]
  properties:
    name:
      type: string
    tag:
      type: string
",
    );

    let output = test_comparator(&logctx.log)
        .compare(
            &SpecReference::File(before),
            &SpecReference::File(after),
            json!({}),
        )
        .await
        .unwrap();

    assert_eq!(output.results.len(), 1);
    let result = &output.results[0];
    assert!(!result.passed);
    assert_eq!(result.name.as_deref(), Some(REQUIRED_PROPERTY_RULE));
    assert_eq!(
        result.location.json_path.to_string(),
        format!("{}/properties/tag", PATCH_BODY_SCHEMA)
    );
    // The property lives in the schema file, not in the spec that was named.
    let position = result.source_position.as_ref().unwrap();
    assert_eq!(position.file_path, after_pet.as_str());
    assert_eq!(position.starts_at.to_string(), "/Pet/properties/tag");
    assert_eq!(
        position.span,
        Some(SourceSpan {
            start_line: 7,
            start_column: 5,
            end_line: 8,
            end_column: 18,
        })
    );

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_compare_git_revision_failure() {
    let logctx = create_log_context("test_compare_git_revision_failure");
    // There's no such revision (and maybe no repository at all), so loading
    // has to fail.  It must fail as a load error for this one comparison.
    let error = test_comparator(&logctx.log)
        .compare(
            &SpecReference::Empty,
            &SpecReference::parse(Some(
                "apicheck-no-such-revision:openapi.json",
            )),
            json!({}),
        )
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "failed to load apicheck-no-such-revision:openapi.json"
    );
    info!(logctx.log, "load failed as expected"; "error" => %error);

    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_compare_logs_where_config_says() {
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();
    let pets = write_document(dir, "pets.json", &pets_document());
    let log_path = dir.join("logs").join("apicheck.log");
    let config = ConfigApiCheck {
        log: ConfigLogging::File {
            level: ConfigLoggingLevel::Info,
            path: log_path.clone(),
            if_exists: ConfigLoggingIfExists::Fail,
        },
        ..ConfigApiCheck::default()
    };

    let comparator =
        Comparator::from_config(&config, &test_rulesets()).unwrap();
    comparator
        .compare(
            &SpecReference::File(pets.clone()),
            &SpecReference::File(pets),
            json!({}),
        )
        .await
        .unwrap();
    // Dropping the comparator drops the last logger, which flushes it.
    drop(comparator);

    let records: Vec<Value> = std::fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let compared = records
        .iter()
        .find(|record| record["msg"] == "comparing specs")
        .unwrap();
    assert_eq!(compared["name"], "apicheck");
    assert_eq!(compared["component"], "comparator");
    // The config asked for info, so debug records were filtered out.
    assert!(records
        .iter()
        .all(|record| record["level"].as_u64().unwrap() >= 30));

    // The log file exists now and the config says not to reuse it.
    let error = Comparator::from_config(&config, &test_rulesets())
        .err()
        .unwrap();
    match error {
        ConfigError::Log(err) => {
            assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists)
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let config = ConfigApiCheck {
        ruleset: String::from("nonexistent"),
        ..ConfigApiCheck::default()
    };
    let error = Comparator::from_config(&config, &test_rulesets())
        .err()
        .unwrap();
    assert_eq!(
        error.to_string(),
        "unknown ruleset \"nonexistent\" (expected one of: default)"
    );
}
