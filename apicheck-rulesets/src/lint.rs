// Copyright 2025 Oxide Computer Company

//! Rules about the new document as a whole, regardless of what changed

use apicheck::describe_entity;
use apicheck::is_exempt;
use apicheck::BatchRule;
use apicheck::ChangeKind;
use apicheck::CheckResult;
use apicheck::DocsLinkHelper;
use apicheck::Fact;
use apicheck::FactValue;
use apicheck::Location;
use apicheck::RuleError;
use apicheck::RuleInput;
use apicheck::Severity;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SPECIFICATION_LINT: &str = "specification-lint";

/// `info` fields every document must fill in
const REQUIRED_INFO_FIELDS: [&str; 2] = ["title", "version"];

/// Lints the new document: every `operationId` is used once, and `info`
/// carries a title and a version.
///
/// Only problems are reported.  A document with none produces no results, and
/// neither does the empty document a deleted spec is compared against.
pub fn specification_lint<C: Send + Sync + 'static>() -> BatchRule<C> {
    BatchRule::new(SPECIFICATION_LINT, |input: Arc<RuleInput<C>>| {
        async move {
            let mut results = info_results(&input);
            results.extend(operation_id_results(&input));
            Ok::<_, RuleError>(results)
        }
        .boxed()
    })
}

fn info_results<C>(input: &RuleInput<C>) -> Vec<CheckResult> {
    let Some(fact) = input
        .next_facts
        .iter()
        .find(|fact| matches!(fact.value, FactValue::Specification(_)))
    else {
        return Vec::new();
    };
    let FactValue::Specification(spec) = &fact.value else {
        return Vec::new();
    };

    let info = spec.metadata.get("info");
    REQUIRED_INFO_FIELDS
        .iter()
        .filter(|field| {
            info.and_then(|info| info.get(**field))
                .and_then(Value::as_str)
                .map_or(true, |value| value.trim().is_empty())
        })
        .map(|field| {
            lint_failure(
                input,
                fact,
                &format!("have an info.{}", field),
                Severity::Must,
                format!("info.{} is missing or empty", field),
            )
        })
        .collect()
}

fn operation_id_results<C>(input: &RuleInput<C>) -> Vec<CheckResult> {
    let mut by_id: BTreeMap<&str, Vec<&Fact>> = BTreeMap::new();
    for fact in input.next_facts.iter() {
        if let FactValue::Operation(operation) = &fact.value {
            if let Some(id) = operation.operation_id() {
                by_id.entry(id).or_default().push(fact);
            }
        }
    }

    // Report in document order.
    let mut results = Vec::new();
    for fact in input.next_facts.iter() {
        let FactValue::Operation(operation) = &fact.value else {
            continue;
        };
        let Some(id) = operation.operation_id() else {
            continue;
        };
        let sharing = &by_id[id];
        if sharing.len() < 2 {
            continue;
        }
        let others: Vec<String> = sharing
            .iter()
            .filter(|other| !std::ptr::eq(**other, fact))
            .map(|other| describe_entity(&other.value))
            .collect();
        let mut result = lint_failure(
            input,
            fact,
            "have a unique operationId",
            Severity::Must,
            format!(
                "operationId {:?} is also used by {}",
                id,
                others.join(", ")
            ),
        );
        result.exempted = is_exempt(operation, SPECIFICATION_LINT);
        results.push(result);
    }
    results
}

fn lint_failure<C>(
    input: &RuleInput<C>,
    fact: &Fact,
    condition: &str,
    severity: Severity,
    error: String,
) -> CheckResult {
    CheckResult::from_outcome(
        condition,
        format!("{}: {}", fact.kind(), describe_entity(&fact.value)),
        severity,
        fact.location.clone(),
        change_kind(input, &fact.location),
        Err(RuleError::new(error)),
        DocsLinkHelper::default(),
    )
}

/// How the entity at `location` changed in this comparison, if it did
fn change_kind<C>(
    input: &RuleInput<C>,
    location: &Location,
) -> Option<ChangeKind> {
    let key = location.key();
    input
        .changelog
        .iter()
        .find(|change| change.location().key() == key)
        .map(|change| change.change_kind())
}

#[cfg(test)]
mod test {
    use super::specification_lint;
    use super::SPECIFICATION_LINT;
    use apicheck::test_util::pets_document;
    use apicheck::test_util::test_logger;
    use apicheck::ChangeKind;
    use apicheck::CheckService;
    use apicheck::CheckResult;
    use apicheck::Ruleset;
    use serde_json::json;
    use serde_json::Value;

    async fn lint(before: Value, after: Value) -> Vec<CheckResult> {
        let log = test_logger();
        let ruleset =
            Ruleset::new("lint", vec![]).with_batch_rule(specification_lint());
        let mut service = CheckService::new(&log);
        service.use_ruleset(&ruleset);
        service.run_rules(before, after, ()).await.unwrap()
    }

    #[tokio::test]
    async fn test_clean_document() {
        let results = lint(pets_document(), pets_document()).await;
        assert!(results.is_empty(), "results: {:?}", results);
    }

    #[tokio::test]
    async fn test_duplicate_operation_ids() {
        let mut after = pets_document();
        after["paths"]["/pets"]["post"] = json!({
            "operationId": "listPets",
            "responses": {}
        });

        let results = lint(pets_document(), after).await;
        let summary: Vec<_> = results
            .iter()
            .map(|r| {
                (r.where_.as_str(), r.error.as_deref(), r.change_type)
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    "operation: GET /pets",
                    Some("operationId \"listPets\" is also used by POST /pets"),
                    None
                ),
                (
                    "operation: POST /pets",
                    Some("operationId \"listPets\" is also used by GET /pets"),
                    Some(ChangeKind::Added)
                ),
            ]
        );
        assert!(results.iter().all(|r| r.is_blocking()));
        assert!(results
            .iter()
            .all(|r| r.name.as_deref() == Some(SPECIFICATION_LINT)));
    }

    #[tokio::test]
    async fn test_exempted_duplicate() {
        let mut after = pets_document();
        after["paths"]["/pets"]["post"] = json!({
            "operationId": "listPets",
            "x-apicheck-exemptions": [SPECIFICATION_LINT],
            "responses": {}
        });

        let results = lint(pets_document(), after).await;
        let exempted: Vec<bool> = results.iter().map(|r| r.exempted).collect();
        assert_eq!(exempted, [false, true]);
    }

    #[tokio::test]
    async fn test_missing_info_fields() {
        let mut after = pets_document();
        after["info"] = json!({ "version": "  " });

        let results = lint(pets_document(), after).await;
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.condition.as_str(), r.where_.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("have an info.title", "specification: api"),
                ("have an info.version", "specification: api"),
            ]
        );
        assert_eq!(results[0].change_type, Some(ChangeKind::Changed));
    }

    #[tokio::test]
    async fn test_empty_document_is_not_linted() {
        let results = lint(pets_document(), apicheck::empty_spec()).await;
        assert!(results.is_empty(), "results: {:?}", results);
    }
}
