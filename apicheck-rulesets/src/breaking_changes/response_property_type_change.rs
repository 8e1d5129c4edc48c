// Copyright 2025 Oxide Computer Company

use apicheck::Rule;
use apicheck::RuleError;
use serde_json::Value;
use std::collections::BTreeSet;

pub const RESPONSE_PROPERTY_TYPE_CHANGE: &str =
    "response-property-type-change";

/// Returns true if a schema's `type` changed from `before` to `after`.
///
/// `type` may be a single name or a list of names; the order of a list doesn't
/// matter.  A schema without a `type` only matches another schema without
/// one.
pub fn did_type_change(before: Option<&Value>, after: Option<&Value>) -> bool {
    fn type_names(value: Option<&Value>) -> Option<BTreeSet<String>> {
        match value? {
            Value::Array(items) => {
                Some(items.iter().map(|item| item.to_string()).collect())
            }
            other => Some(BTreeSet::from([other.to_string()])),
        }
    }

    type_names(before) != type_names(after)
}

fn schema_type(flat_schema: Option<&Value>) -> Option<&Value> {
    flat_schema?.get("type")
}

/// Clients parse responses by their shape, so neither the root type of a
/// response body nor the type of any response property may change.
pub fn prevent_response_property_type_change<C: 'static>() -> Rule<C> {
    Rule::new(RESPONSE_PROPERTY_TYPE_CHANGE, |dsl| {
        dsl.response_bodies().changed().must(
            "not change response body type",
            |before, after, _, _| {
                if did_type_change(
                    schema_type(before.flat_schema.as_ref()),
                    schema_type(after.flat_schema.as_ref()),
                ) {
                    return Err(RuleError::new(format!(
                        "expected response body {} root shape to not change \
                         type",
                        after.content_type
                    )));
                }
                Ok(())
            },
        );

        dsl.response_properties().changed().must(
            "not change response property type",
            |before, after, _, _| {
                if did_type_change(
                    schema_type(Some(&before.flat_schema)),
                    schema_type(Some(&after.flat_schema)),
                ) {
                    return Err(RuleError::new(format!(
                        "expected response body property '{}' to not change \
                         type",
                        after.key
                    )));
                }
                Ok(())
            },
        );

        Ok(())
    })
}
