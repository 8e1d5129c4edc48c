// Copyright 2025 Oxide Computer Company

use apicheck::Rule;
use apicheck::RuleError;

pub const OPERATION_REMOVAL: &str = "operation-removal";

/// Operations can't be removed; clients may still be calling them.
pub fn prevent_operation_removal<C: 'static>() -> Rule<C> {
    Rule::new(OPERATION_REMOVAL, |dsl| {
        dsl.operations().removed().must(
            "not remove an operation",
            |operation, _, _| {
                Err(RuleError::new(format!(
                    "cannot remove operation {} {}",
                    operation.method.to_uppercase(),
                    operation.path_pattern
                )))
            },
        );
        Ok(())
    })
}
