// Copyright 2025 Oxide Computer Company

//! Results of rule assertions

use crate::changelog::ChangeKind;
use crate::location::Location;
use crate::sourcemap::SourcePosition;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

/// Error produced by a rule
///
/// Returned from an assertion handler, this is a failed assertion and becomes
/// a failed [`CheckResult`].  Returned from a rule runner itself, it means the
/// rule is broken and the whole run fails.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RuleError {
    message: String,
}

impl RuleError {
    pub fn new<S: Into<String>>(message: S) -> RuleError {
        RuleError { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Whether a failed assertion blocks the change or is only advisory
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Must,
    Should,
}

/// Documentation metadata that a handler may attach to its own result
#[derive(Clone, Debug, Default)]
pub struct DocsLinkHelper {
    docs_link: Option<String>,
    effective_on: Option<DateTime<Utc>>,
}

impl DocsLinkHelper {
    pub fn new(
        docs_link: Option<String>,
        effective_on: Option<DateTime<Utc>>,
    ) -> DocsLinkHelper {
        DocsLinkHelper { docs_link, effective_on }
    }

    /// Points users at documentation explaining the rule.
    pub fn include_link<S: Into<String>>(&mut self, url: S) {
        self.docs_link = Some(url.into());
    }

    /// Schedules the result to take effect only after `date`.
    pub fn becomes_effective_on(&mut self, date: DateTime<Utc>) {
        self.effective_on = Some(date);
    }

    pub fn docs_link(&self) -> Option<&str> {
        self.docs_link.as_deref()
    }

    pub fn effective_on(&self) -> Option<DateTime<Utc>> {
        self.effective_on
    }
}

/// Outcome of one rule assertion against one entity
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub condition: String,
    #[serde(rename = "where")]
    pub where_: String,
    pub passed: bool,
    pub exempted: bool,
    pub is_must: bool,
    pub is_should: bool,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_on_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_position: Option<SourcePosition>,
}

impl CheckResult {
    /// Builds the result of running an assertion.
    pub fn from_outcome(
        condition: &str,
        where_: String,
        severity: Severity,
        location: Location,
        change_type: Option<ChangeKind>,
        outcome: Result<(), RuleError>,
        docs: DocsLinkHelper,
    ) -> CheckResult {
        CheckResult {
            condition: condition.to_string(),
            where_,
            passed: outcome.is_ok(),
            exempted: false,
            is_must: severity == Severity::Must,
            is_should: severity == Severity::Should,
            location,
            change_type,
            name: None,
            error: outcome.err().map(|e| e.message),
            docs_link: docs.docs_link,
            effective_on_date: docs.effective_on,
            source_position: None,
        }
    }

    pub fn severity(&self) -> Severity {
        if self.is_must {
            Severity::Must
        } else {
            Severity::Should
        }
    }

    /// Returns true if this result should stop the change from going in.
    pub fn is_blocking(&self) -> bool {
        !self.passed && !self.exempted && self.is_must
    }
}
