// Copyright 2025 Oxide Computer Company

//! Standard rulesets for apicheck
//!
//! [`named_rulesets`] registers every ruleset in this crate under the name a
//! config file selects it by:
//!
//! * `"breaking-changes"`: the breaking-change rules
//! * `"default"`: the breaking-change rules plus [`specification_lint`] over
//!   the new document

pub mod breaking_changes;
pub mod lint;

use apicheck::NamedRulesets;
use apicheck::Ruleset;

pub use breaking_changes::breaking_change_rules;
pub use breaking_changes::breaking_changes_ruleset;
pub use lint::specification_lint;

/// Name of the ruleset used when a config file doesn't pick one
pub const DEFAULT_RULESET: &str = "default";
pub const BREAKING_CHANGES_RULESET: &str = "breaking-changes";

pub fn default_ruleset<C: Send + Sync + 'static>() -> Ruleset<C> {
    Ruleset::new(DEFAULT_RULESET, breaking_change_rules())
        .with_batch_rule(specification_lint())
}

/// Returns the standard rulesets, keyed by name.
pub fn named_rulesets<C: Send + Sync + 'static>() -> NamedRulesets<C> {
    let mut rulesets = NamedRulesets::new();
    rulesets.insert(DEFAULT_RULESET, default_ruleset());
    rulesets.insert(BREAKING_CHANGES_RULESET, breaking_changes_ruleset());
    rulesets
}


#[cfg(test)]
mod test {
    use super::named_rulesets;
    use crate::lint::SPECIFICATION_LINT;

    #[test]
    fn test_named_rulesets() {
        let rulesets = named_rulesets::<()>();
        assert_eq!(
            rulesets.names().collect::<Vec<_>>(),
            ["default", "breaking-changes"]
        );
        let default: Vec<_> =
            rulesets.get("default").unwrap().rule_names().collect();
        let breaking: Vec<_> =
            rulesets.get("breaking-changes").unwrap().rule_names().collect();
        assert_eq!(default.len(), breaking.len() + 1);
        assert_eq!(default[..breaking.len()], breaking[..]);
        assert_eq!(default.last(), Some(&SPECIFICATION_LINT));

        let error = rulesets.get("lenient").unwrap_err();
        assert_eq!(
            error.to_string(),
            "unknown ruleset \"lenient\" (expected one of: default, \
             breaking-changes)"
        );
    }
}
