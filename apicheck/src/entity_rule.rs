// Copyright 2025 Oxide Computer Company

//! Per-entity rule surfaces
//!
//! An [`EntityRule`] narrows a run's changelog and next-state facts down to
//! one kind of entity and offers four ways to assert things about them:
//!
//! * [`EntityRule::added`]: each entity that is new in the next document
//! * [`EntityRule::removed`]: each entity that the next document dropped
//! * [`EntityRule::changed`]: each entity whose value differs
//! * [`EntityRule::requirement`]: each entity in the next document, changed
//!   or not
//!
//! Each of these takes assertions with either `must` (a failure blocks the
//! change) or `should` (a failure is advisory).  A handler that returns an
//! error produces a failed [`CheckResult`]; it never aborts the run.
//!
//! [`CheckResult`]: crate::check::CheckResult

use crate::changelog::Change;
use crate::changelog::ChangeKind;
use crate::check::DocsLinkHelper;
use crate::check::RuleError;
use crate::check::Severity;
use crate::dsl::ApiChangeDsl;
use crate::fact::FactPayload;
use crate::fact::FactValue;
use crate::fact::OperationFact;
use crate::location::FactKind;
use crate::location::Location;
use serde_json::Value;
use std::marker::PhantomData;

/// Which side of the exchange an entity must be on to be considered
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    Any,
    Request,
    Response,
}

impl Side {
    fn admits(&self, location: &Location) -> bool {
        match self {
            Side::Any => true,
            Side::Request => location.conceptual_location.is_request(),
            Side::Response => location.conceptual_location.is_response(),
        }
    }
}

/// The operation containing an entity
#[derive(Clone, Debug)]
pub struct OperationContext<'e> {
    pub path: &'e str,
    pub method: &'e str,
    /// how the operation itself changed, if it changed at all
    pub change: Option<ChangeKind>,
    /// the operation, taken from the same document as the entity
    pub fact: Option<&'e OperationFact>,
}

/// What a handler knows about the entity it's looking at
#[derive(Clone, Debug)]
pub struct EntityContext<'e, C> {
    pub location: &'e Location,
    pub operation: Option<OperationContext<'e>>,
    pub custom: &'e C,
}

/// Rule surface for one kind of entity
pub struct EntityRule<'d, 'a, T, C> {
    dsl: &'d ApiChangeDsl<'a, C>,
    kind: FactKind,
    side: Side,
    _payload: PhantomData<fn() -> T>,
}

impl<'d, 'a, T, C> Clone for EntityRule<'d, 'a, T, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'d, 'a, T, C> Copy for EntityRule<'d, 'a, T, C> {}

impl<'d, 'a, T: FactPayload, C> EntityRule<'d, 'a, T, C> {
    pub(crate) fn new(
        dsl: &'d ApiChangeDsl<'a, C>,
        kind: FactKind,
        side: Side,
    ) -> Self {
        EntityRule { dsl, kind, side, _payload: PhantomData }
    }

    pub fn kind(&self) -> FactKind {
        self.kind
    }

    pub fn added(self) -> ValueRule<'d, 'a, T, C> {
        ValueRule { entity: self, source: ValueSource::Added }
    }

    pub fn removed(self) -> ValueRule<'d, 'a, T, C> {
        ValueRule { entity: self, source: ValueSource::Removed }
    }

    pub fn changed(self) -> ChangedRule<'d, 'a, T, C> {
        ChangedRule { entity: self }
    }

    pub fn requirement(self) -> ValueRule<'d, 'a, T, C> {
        ValueRule { entity: self, source: ValueSource::Requirement }
    }

    fn changes(&self) -> impl Iterator<Item = &'a Change> {
        let (kind, side) = (self.kind, self.side);
        self.dsl.changelog().iter().filter(move |change| {
            change.kind() == kind && side.admits(change.location())
        })
    }

    /// Builds the context for an entity and runs one assertion against it.
    fn check<F>(
        &self,
        condition: &str,
        severity: Severity,
        location: &'a Location,
        change_type: Option<ChangeKind>,
        where_: String,
        assertion: F,
    ) where
        F: FnOnce(
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        let operation = self.dsl.operation_context(
            location,
            change_type == Some(ChangeKind::Removed),
        );
        let context = EntityContext {
            location,
            operation,
            custom: self.dsl.context(),
        };
        self.dsl.run_check(
            condition,
            severity,
            &context,
            change_type,
            where_,
            |docs| assertion(&context, docs),
        );
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ValueSource {
    Added,
    Removed,
    Requirement,
}

/// Assertions about single values: added entities, removed entities, or
/// every entity in the next document
pub struct ValueRule<'d, 'a, T, C> {
    entity: EntityRule<'d, 'a, T, C>,
    source: ValueSource,
}

impl<'d, 'a, T: FactPayload, C> ValueRule<'d, 'a, T, C> {
    pub fn must<F>(&self, condition: &str, handler: F)
    where
        F: Fn(
            &T,
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        self.assert(condition, Severity::Must, handler)
    }

    pub fn should<F>(&self, condition: &str, handler: F)
    where
        F: Fn(
            &T,
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        self.assert(condition, Severity::Should, handler)
    }

    fn assert<F>(&self, condition: &str, severity: Severity, handler: F)
    where
        F: Fn(
            &T,
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        let entity = &self.entity;
        let kind = entity.kind;
        let subjects: Vec<(&'a Location, &'a FactValue, Option<ChangeKind>)> =
            match self.source {
                ValueSource::Added => entity
                    .changes()
                    .filter_map(|change| match change {
                        Change::Added { location, added } => {
                            Some((location, added, Some(ChangeKind::Added)))
                        }
                        _ => None,
                    })
                    .collect(),
                ValueSource::Removed => entity
                    .changes()
                    .filter_map(|change| match change {
                        Change::Removed { location, removed } => Some((
                            location,
                            &removed.before,
                            Some(ChangeKind::Removed),
                        )),
                        _ => None,
                    })
                    .collect(),
                ValueSource::Requirement => entity
                    .dsl
                    .next_facts()
                    .iter()
                    .filter(|fact| {
                        fact.location.kind == kind
                            && entity.side.admits(&fact.location)
                    })
                    .map(|fact| (&fact.location, &fact.value, None))
                    .collect(),
            };

        let verb = match self.source {
            ValueSource::Added => "added",
            ValueSource::Removed => "removed",
            ValueSource::Requirement => "requirement for",
        };

        for (location, value, change_type) in subjects {
            let Some(payload) = T::from_value(value) else {
                continue;
            };
            let where_ =
                format!("{} {}: {}", verb, kind, describe_entity(value));
            entity.check(
                condition,
                severity,
                location,
                change_type,
                where_,
                |context, docs| handler(payload, context, docs),
            );
        }
    }
}

/// Assertions about entities whose value changed, given both values
pub struct ChangedRule<'d, 'a, T, C> {
    entity: EntityRule<'d, 'a, T, C>,
}

impl<'d, 'a, T: FactPayload, C> ChangedRule<'d, 'a, T, C> {
    pub fn must<F>(&self, condition: &str, handler: F)
    where
        F: Fn(
            &T,
            &T,
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        self.assert(condition, Severity::Must, handler)
    }

    pub fn should<F>(&self, condition: &str, handler: F)
    where
        F: Fn(
            &T,
            &T,
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        self.assert(condition, Severity::Should, handler)
    }

    fn assert<F>(&self, condition: &str, severity: Severity, handler: F)
    where
        F: Fn(
            &T,
            &T,
            &EntityContext<'_, C>,
            &mut DocsLinkHelper,
        ) -> Result<(), RuleError>,
    {
        let entity = &self.entity;
        let changed: Vec<(&'a Location, &'a FactValue, &'a FactValue)> = entity
            .changes()
            .filter_map(|change| match change {
                Change::Changed { location, changed } => {
                    Some((location, &changed.before, &changed.after))
                }
                _ => None,
            })
            .collect();

        for (location, before, after) in changed {
            let (Some(before), Some(after_payload)) =
                (T::from_value(before), T::from_value(after))
            else {
                continue;
            };
            let where_ = format!(
                "updated {}: {}",
                entity.kind,
                describe_entity(after)
            );
            entity.check(
                condition,
                severity,
                location,
                Some(ChangeKind::Changed),
                where_,
                |context, docs| handler(before, after_payload, context, docs),
            );
        }
    }
}

/// Short human-readable name for an entity, used in a result's `where`
pub fn describe_entity(value: &FactValue) -> String {
    match value {
        FactValue::Specification(spec) => spec
            .metadata
            .get("info")
            .and_then(|info| info.get("title"))
            .and_then(Value::as_str)
            .unwrap_or("api")
            .to_string(),
        FactValue::Operation(operation) => format!(
            "{} {}",
            operation.method.to_uppercase(),
            operation.path_pattern
        ),
        FactValue::RequestParameter(parameter) => parameter.name().to_string(),
        FactValue::RequestBody(_) => String::from("request body"),
        FactValue::Body(body) => body.content_type.clone(),
        FactValue::Field(field) => field.key.clone(),
        FactValue::Response(response) => response.status_code.clone(),
        FactValue::ResponseHeader(header) => header.name.clone(),
        FactValue::Example(example) => {
            example.name.clone().unwrap_or_else(|| String::from("example"))
        }
    }
}
