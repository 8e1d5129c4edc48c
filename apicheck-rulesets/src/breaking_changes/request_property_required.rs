// Copyright 2025 Oxide Computer Company

use apicheck::ChangeKind;
use apicheck::Rule;
use apicheck::RuleError;

pub const REQUEST_PROPERTY_REQUIRED: &str = "request-property-required";

/// Existing operations can't start requiring request properties that clients
/// don't send yet, whether the property is new or was optional before.
///
/// A required property on a brand new operation is fine.  So is making a
/// required property optional.
pub fn prevent_request_property_required<C: 'static>() -> Rule<C> {
    Rule::new(REQUEST_PROPERTY_REQUIRED, |dsl| {
        let properties = dsl.request_properties();

        properties.added().must(
            "not add required request property",
            |property, context, _| {
                let new_operation = context
                    .operation
                    .as_ref()
                    .and_then(|operation| operation.change)
                    == Some(ChangeKind::Added);
                if property.required && !new_operation {
                    return Err(RuleError::new(format!(
                        "cannot add a required request property '{}' to an \
                         existing operation",
                        property.key
                    )));
                }
                Ok(())
            },
        );

        properties.changed().must(
            "not make an optional request property required",
            |before, after, _, _| {
                if !before.required && after.required {
                    return Err(RuleError::new(format!(
                        "cannot make request property '{}' required",
                        after.key
                    )));
                }
                Ok(())
            },
        );

        Ok(())
    })
}
