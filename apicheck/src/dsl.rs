// Copyright 2025 Oxide Computer Company

//! The rule-authoring surface handed to each rule
//!
//! A rule receives an [`ApiChangeDsl`] and registers assertions through the
//! entity rules it hands out:
//!
//! ```ignore
//! dsl.request_properties().added().must("not be required", |field, ctx, _| {
//!     if field.required && ctx.operation.as_ref().and_then(|o| o.change)
//!         != Some(ChangeKind::Added)
//!     {
//!         return Err(RuleError::new("cannot add a required property"));
//!     }
//!     Ok(())
//! });
//! ```
//!
//! Assertions run as they are registered.  Their results are collected as
//! futures and handed to the check service with [`ApiChangeDsl::into_checks`].

use crate::changelog::Change;
use crate::changelog::ChangeKind;
use crate::check::CheckResult;
use crate::check::DocsLinkHelper;
use crate::check::RuleError;
use crate::check::Severity;
use crate::check_service::CheckFuture;
use crate::check_service::RuleInput;
use crate::entity_rule::EntityContext;
use crate::entity_rule::EntityRule;
use crate::entity_rule::OperationContext;
use crate::entity_rule::Side;
use crate::fact::BodyFact;
use crate::fact::ExampleFact;
use crate::fact::FactAccumulator;
use crate::fact::FactPayload;
use crate::fact::FieldFact;
use crate::fact::HeaderFact;
use crate::fact::OperationFact;
use crate::fact::RequestBodyFact;
use crate::fact::RequestParameterFact;
use crate::fact::ResponseFact;
use crate::fact::SpecificationFact;
use crate::location::ConceptualPath;
use crate::location::FactKind;
use crate::location::Location;
use crate::location::LocationKey;
use chrono::DateTime;
use chrono::Utc;
use futures::future;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic;
use std::panic::AssertUnwindSafe;

/// Operation extension listing the names of rules that don't apply to it
pub const EXEMPTIONS_EXTENSION: &str = "x-apicheck-exemptions";

/// Metadata about the rule that's registering assertions
#[derive(Clone, Debug, Default)]
pub struct RuleMetadata {
    pub name: Option<String>,
    pub docs_link: Option<String>,
    pub effective_on: Option<DateTime<Utc>>,
}

pub struct ApiChangeDsl<'a, C> {
    input: &'a RuleInput<C>,
    rule: RuleMetadata,
    operation_changes: HashMap<&'a ConceptualPath, ChangeKind>,
    checks: RefCell<Vec<CheckFuture>>,
}

impl<'a, C> ApiChangeDsl<'a, C> {
    pub fn new(input: &'a RuleInput<C>, rule: RuleMetadata) -> Self {
        let operation_changes = input
            .changelog
            .iter()
            .filter(|change| change.kind() == FactKind::Operation)
            .map(|change| {
                (&change.location().conceptual_path, change.change_kind())
            })
            .collect();
        ApiChangeDsl {
            input,
            rule,
            operation_changes,
            checks: RefCell::new(Vec::new()),
        }
    }

    pub fn rule(&self) -> &RuleMetadata {
        &self.rule
    }

    pub fn context(&self) -> &'a C {
        &self.input.context
    }

    pub fn changelog(&self) -> &'a [Change] {
        &self.input.changelog
    }

    pub fn next_facts(&self) -> &'a FactAccumulator {
        &self.input.next_facts
    }

    pub fn current_facts(&self) -> &'a FactAccumulator {
        &self.input.current_facts
    }

    pub fn next_document(&self) -> &'a Value {
        &self.input.next_document
    }

    pub fn current_document(&self) -> &'a Value {
        &self.input.current_document
    }

    fn entity<T: FactPayload>(
        &self,
        kind: FactKind,
        side: Side,
    ) -> EntityRule<'_, 'a, T, C> {
        EntityRule::new(self, kind, side)
    }

    pub fn specification(&self) -> EntityRule<'_, 'a, SpecificationFact, C> {
        self.entity(FactKind::Specification, Side::Any)
    }

    pub fn operations(&self) -> EntityRule<'_, 'a, OperationFact, C> {
        self.entity(FactKind::Operation, Side::Any)
    }

    pub fn request_query_parameters(
        &self,
    ) -> EntityRule<'_, 'a, RequestParameterFact, C> {
        self.entity(FactKind::RequestQuery, Side::Any)
    }

    pub fn request_header_parameters(
        &self,
    ) -> EntityRule<'_, 'a, RequestParameterFact, C> {
        self.entity(FactKind::RequestHeader, Side::Any)
    }

    pub fn request_path_parameters(
        &self,
    ) -> EntityRule<'_, 'a, RequestParameterFact, C> {
        self.entity(FactKind::RequestPath, Side::Any)
    }

    pub fn request_cookie_parameters(
        &self,
    ) -> EntityRule<'_, 'a, RequestParameterFact, C> {
        self.entity(FactKind::RequestCookie, Side::Any)
    }

    /// the `requestBody` object of each operation
    pub fn request_body(&self) -> EntityRule<'_, 'a, RequestBodyFact, C> {
        self.entity(FactKind::RequestBody, Side::Any)
    }

    /// each content type of each request body
    pub fn request_bodies(&self) -> EntityRule<'_, 'a, BodyFact, C> {
        self.entity(FactKind::Body, Side::Request)
    }

    pub fn request_properties(&self) -> EntityRule<'_, 'a, FieldFact, C> {
        self.entity(FactKind::Field, Side::Request)
    }

    pub fn responses(&self) -> EntityRule<'_, 'a, ResponseFact, C> {
        self.entity(FactKind::Response, Side::Any)
    }

    pub fn response_headers(&self) -> EntityRule<'_, 'a, HeaderFact, C> {
        self.entity(FactKind::ResponseHeader, Side::Any)
    }

    /// each content type of each response
    pub fn response_bodies(&self) -> EntityRule<'_, 'a, BodyFact, C> {
        self.entity(FactKind::Body, Side::Response)
    }

    pub fn response_properties(&self) -> EntityRule<'_, 'a, FieldFact, C> {
        self.entity(FactKind::Field, Side::Response)
    }

    pub fn body_examples(&self) -> EntityRule<'_, 'a, ExampleFact, C> {
        self.entity(FactKind::BodyExample, Side::Any)
    }

    pub fn component_schema_examples(
        &self,
    ) -> EntityRule<'_, 'a, ExampleFact, C> {
        self.entity(FactKind::ComponentSchemaExample, Side::Any)
    }

    /// Adds a check computed outside the entity rules.
    pub fn push_check(&self, check: CheckFuture) {
        self.checks.borrow_mut().push(check);
    }

    /// Returns the checks registered so far, in registration order.
    pub fn into_checks(self) -> Vec<CheckFuture> {
        self.checks.into_inner()
    }

    /// Finds the operation that contains the entity at `location`.  Removed
    /// entities are looked up in the current document, all others in the next
    /// one.
    pub(crate) fn operation_context(
        &self,
        location: &'a Location,
        removed: bool,
    ) -> Option<OperationContext<'a>> {
        let path = location.conceptual_location.path.as_deref()?;
        let method = location.conceptual_location.method.as_deref()?;
        let conceptual_path =
            ConceptualPath::from_segments(["operations", path, method]);
        let facts =
            if removed { self.current_facts() } else { self.next_facts() };
        let fact = facts
            .get(&LocationKey {
                kind: FactKind::Operation,
                conceptual_path: conceptual_path.clone(),
            })
            .and_then(|fact| OperationFact::from_value(&fact.value));
        Some(OperationContext {
            path,
            method,
            change: self.operation_changes.get(&conceptual_path).copied(),
            fact,
        })
    }

    /// Runs one assertion and records its result.
    pub(crate) fn run_check<F>(
        &self,
        condition: &str,
        severity: Severity,
        context: &EntityContext<'_, C>,
        change_type: Option<ChangeKind>,
        where_: String,
        assertion: F,
    ) where
        F: FnOnce(&mut DocsLinkHelper) -> Result<(), RuleError>,
    {
        let mut docs = DocsLinkHelper::new(
            self.rule.docs_link.clone(),
            self.rule.effective_on,
        );
        // A handler that panics has failed its assertion.  The rest of the
        // run goes on.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            assertion(&mut docs)
        }))
        .unwrap_or_else(|payload| {
            Err(RuleError::new(format!(
                "rule handler panicked: {}",
                panic_message(payload.as_ref())
            )))
        });
        let mut result = CheckResult::from_outcome(
            condition,
            where_,
            severity,
            context.location.clone(),
            change_type,
            outcome,
            docs,
        );
        result.name = self.rule.name.clone();
        result.exempted = match (&self.rule.name, &context.operation) {
            (Some(name), Some(OperationContext { fact: Some(fact), .. })) => {
                is_exempt(fact, name)
            }
            _ => false,
        };
        self.push_check(future::ready(result).boxed());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}

/// Returns true if `operation` lists `rule_name` among its exemptions.
pub fn is_exempt(operation: &OperationFact, rule_name: &str) -> bool {
    operation
        .operation
        .get(EXEMPTIONS_EXTENSION)
        .and_then(Value::as_array)
        .is_some_and(|exemptions| {
            exemptions.iter().any(|e| e.as_str() == Some(rule_name))
        })
}
