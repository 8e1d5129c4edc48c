// Copyright 2025 Oxide Computer Company

use apicheck::ApiChangeDsl;
use apicheck::EntityRule;
use apicheck::RequestParameterFact;
use apicheck::Rule;
use apicheck::RuleError;
use std::fmt;

/// Where a request parameter is sent
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParameterIn {
    Query,
    Header,
    Path,
    Cookie,
}

impl ParameterIn {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterIn::Query => "query",
            ParameterIn::Header => "header",
            ParameterIn::Path => "path",
            ParameterIn::Cookie => "cookie",
        }
    }

    fn parameters<'d, 'a, C>(
        &self,
        dsl: &'d ApiChangeDsl<'a, C>,
    ) -> EntityRule<'d, 'a, RequestParameterFact, C> {
        match self {
            ParameterIn::Query => dsl.request_query_parameters(),
            ParameterIn::Header => dsl.request_header_parameters(),
            ParameterIn::Path => dsl.request_path_parameters(),
            ParameterIn::Cookie => dsl.request_cookie_parameters(),
        }
    }
}

impl fmt::Display for ParameterIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional `parameter_in` parameters of existing operations can't become
/// required.
pub fn prevent_require_existing_parameter<C: 'static>(
    parameter_in: ParameterIn,
) -> Rule<C> {
    let name = format!("require-existing-{}-parameter", parameter_in);
    Rule::new(name, move |dsl| {
        parameter_in.parameters(dsl).changed().must(
            "not make an optional parameter required",
            |before, after, _, _| {
                if !before.required() && after.required() {
                    return Err(RuleError::new(format!(
                        "cannot make optional {} parameter '{}' required",
                        parameter_in,
                        after.name()
                    )));
                }
                Ok(())
            },
        );
        Ok(())
    })
}
