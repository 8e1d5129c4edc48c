// Copyright 2025 Oxide Computer Company

//! Rules that catch changes which break existing clients

mod operation_removal;
mod request_property_required;
mod require_existing_parameter;
mod response_property_type_change;

use apicheck::Rule;
use apicheck::Ruleset;

pub use operation_removal::prevent_operation_removal;
pub use operation_removal::OPERATION_REMOVAL;
pub use request_property_required::prevent_request_property_required;
pub use request_property_required::REQUEST_PROPERTY_REQUIRED;
pub use require_existing_parameter::prevent_require_existing_parameter;
pub use require_existing_parameter::ParameterIn;
pub use response_property_type_change::did_type_change;
pub use response_property_type_change::prevent_response_property_type_change;
pub use response_property_type_change::RESPONSE_PROPERTY_TYPE_CHANGE;

/// Every rule in this module
pub fn breaking_change_rules<C: 'static>() -> Vec<Rule<C>> {
    vec![
        prevent_operation_removal(),
        prevent_request_property_required(),
        prevent_response_property_type_change(),
        prevent_require_existing_parameter(ParameterIn::Query),
        prevent_require_existing_parameter(ParameterIn::Header),
        prevent_require_existing_parameter(ParameterIn::Path),
        prevent_require_existing_parameter(ParameterIn::Cookie),
    ]
}

pub fn breaking_changes_ruleset<C: 'static>() -> Ruleset<C> {
    Ruleset::new(crate::BREAKING_CHANGES_RULESET, breaking_change_rules())
}
