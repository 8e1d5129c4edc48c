// Copyright 2025 Oxide Computer Company

//! Common facilities for automated testing.

use apicheck::test_util::LogContext;
use apicheck::ChangeKind;
use apicheck::Comparator;
use apicheck::ConfigApiCheck;
use apicheck::ConfigLogging;
use apicheck::ConfigLoggingIfExists;
use apicheck::ConfigLoggingLevel;
use apicheck::NamedRulesets;
use apicheck::Rule;
use apicheck::RuleError;
use apicheck::Ruleset;
use serde_json::Value;

pub const REQUIRED_PROPERTY_RULE: &str = "no-new-required-request-properties";
pub const OPERATION_REMOVAL_RULE: &str = "no-operation-removal";

pub fn create_log_context(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Debug,
        path: "UNUSED".into(),
        if_exists: ConfigLoggingIfExists::Fail,
    };
    LogContext::new(test_name, &log_config)
}

/// A small ruleset standing in for the standard one
pub fn test_ruleset() -> Ruleset<Value> {
    Ruleset::new(
        "test",
        vec![
            Rule::new(REQUIRED_PROPERTY_RULE, |dsl| {
                dsl.request_properties().added().must(
                    "not be required on existing operations",
                    |field, context, _| {
                        let new_operation = context
                            .operation
                            .as_ref()
                            .and_then(|operation| operation.change)
                            == Some(ChangeKind::Added);
                        if field.required && !new_operation {
                            return Err(RuleError::new(format!(
                                "required property {:?} was added",
                                field.key
                            )));
                        }
                        Ok(())
                    },
                );
                Ok(())
            })
            .with_docs_link("https://example.com/required-properties"),
            Rule::new(OPERATION_REMOVAL_RULE, |dsl| {
                dsl.operations().removed().must(
                    "not be removed",
                    |_, _, _| Err(RuleError::new("operation was removed")),
                );
                Ok(())
            }),
        ],
    )
}

pub fn test_rulesets() -> NamedRulesets<Value> {
    let mut rulesets = NamedRulesets::new();
    rulesets.insert("default", test_ruleset());
    rulesets
}

pub fn test_comparator(log: &slog::Logger) -> Comparator<Value> {
    Comparator::from_config_with_log(
        &ConfigApiCheck::default(),
        &test_rulesets(),
        log,
    )
    .unwrap()
}
