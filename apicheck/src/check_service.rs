// Copyright 2025 Oxide Computer Company

//! Register rules and run them against a pair of documents

use crate::changelog::facts_to_changelog;
use crate::changelog::Change;
use crate::check::CheckResult;
use crate::check::RuleError;
use crate::dsl::ApiChangeDsl;
use crate::dsl::RuleMetadata;
use crate::fact::FactAccumulator;
use crate::ruleset::Rule;
use crate::ruleset::Ruleset;
use crate::traverser::traverse;
use chrono::DateTime;
use chrono::Utc;
use futures::future::join_all;
use futures::future::try_join_all;
use futures::future::BoxFuture;
use serde_json::Value;
use slog::Logger;
use std::fmt;
use std::sync::Arc;

/// Everything a rule gets to look at
#[derive(Debug)]
pub struct RuleInput<C> {
    pub context: C,
    pub next_facts: FactAccumulator,
    pub current_facts: FactAccumulator,
    pub changelog: Vec<Change>,
    pub next_document: Value,
    pub current_document: Value,
}

/// A pending result produced by an immediate runner
pub type CheckFuture = BoxFuture<'static, CheckResult>;

pub type ImmediateRunnerFn<C> =
    dyn Fn(&RuleInput<C>) -> RunnerOutput + Send + Sync;

pub type BatchRunnerFn<C> = dyn Fn(
        Arc<RuleInput<C>>,
    ) -> BoxFuture<'static, Result<Vec<CheckResult>, RuleError>>
    + Send
    + Sync;

/// A registered rule function
///
/// Immediate runners evaluate their assertions on the spot and hand back one
/// future per result.  This is how the entity rule DSL runs.  Batch runners
/// produce all of their results from a single future, for rules that work on
/// the whole document at once.
pub enum RuleRunner<C> {
    Immediate(Arc<ImmediateRunnerFn<C>>),
    Batch(Arc<BatchRunnerFn<C>>),
}

impl<C> Clone for RuleRunner<C> {
    fn clone(&self) -> Self {
        match self {
            RuleRunner::Immediate(f) => RuleRunner::Immediate(Arc::clone(f)),
            RuleRunner::Batch(f) => RuleRunner::Batch(Arc::clone(f)),
        }
    }
}

impl<C> fmt::Debug for RuleRunner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleRunner::Immediate(_) => f.write_str("RuleRunner::Immediate"),
            RuleRunner::Batch(_) => f.write_str("RuleRunner::Batch"),
        }
    }
}

/// What an immediate runner returns
pub type RunnerOutput = Result<Vec<CheckFuture>, RuleError>;

type ExecutionDateFn<C> = dyn Fn(&C) -> DateTime<Utc> + Send + Sync;

/// Facts for both documents being compared
#[derive(Clone, Debug)]
pub struct GeneratedFacts {
    pub current_facts: FactAccumulator,
    pub next_facts: FactAccumulator,
}

/// Holds an ordered list of rule runners and runs them
pub struct CheckService<C> {
    runners: Vec<RuleRunner<C>>,
    execution_date: Option<Arc<ExecutionDateFn<C>>>,
    log: Logger,
}

impl<C> Clone for CheckService<C> {
    fn clone(&self) -> Self {
        CheckService {
            runners: self.runners.clone(),
            execution_date: self.execution_date.clone(),
            log: self.log.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> CheckService<C> {
    pub fn new(log: &Logger) -> CheckService<C> {
        CheckService {
            runners: Vec::new(),
            execution_date: None,
            log: log.new(o!("component" => "check_service")),
        }
    }

    /// Configures the date that results with an `effectiveOnDate` are
    /// compared against.  Without this, such results are always kept.
    pub fn with_execution_date<F>(mut self, execution_date: F) -> Self
    where
        F: Fn(&C) -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.execution_date = Some(Arc::new(execution_date));
        self
    }

    pub fn runners(&self) -> &[RuleRunner<C>] {
        &self.runners
    }

    pub fn register(&mut self, runner: RuleRunner<C>) -> &mut Self {
        self.runners.push(runner);
        self
    }

    /// Registers an anonymous rule written against the DSL.
    pub fn use_dsl<F>(&mut self, rule: F) -> &mut Self
    where
        F: Fn(&ApiChangeDsl<'_, C>) -> Result<(), RuleError>
            + Send
            + Sync
            + 'static,
    {
        let runner = move |input: &RuleInput<C>| -> RunnerOutput {
            let dsl = ApiChangeDsl::new(input, RuleMetadata::default());
            rule(&dsl)?;
            Ok(dsl.into_checks())
        };
        self.register(RuleRunner::Immediate(Arc::new(runner)))
    }

    /// Registers named rules.  They share one runner and their results come
    /// out in the order the rules are given.
    pub fn use_rules(&mut self, rules: Vec<Rule<C>>) -> &mut Self {
        let runner = move |input: &RuleInput<C>| -> RunnerOutput {
            let mut checks = Vec::new();
            for rule in &rules {
                let dsl = ApiChangeDsl::new(input, rule.metadata());
                rule.apply(&dsl)?;
                checks.extend(dsl.into_checks());
            }
            Ok(checks)
        };
        self.register(RuleRunner::Immediate(Arc::new(runner)))
    }

    pub fn use_ruleset(&mut self, ruleset: &Ruleset<C>) -> &mut Self {
        debug!(self.log, "using ruleset";
            "ruleset" => &ruleset.name,
            "rules" => ruleset.rules.len(),
            "batch_rules" => ruleset.batch_rules.len(),
        );
        self.use_rules(ruleset.rules.clone());
        for batch_rule in &ruleset.batch_rules {
            let batch_rule = batch_rule.clone();
            self.use_batch(move |input| batch_rule.run(input));
        }
        self
    }

    /// Registers a rule that produces all of its results at once.
    pub fn use_batch<F>(&mut self, runner: F) -> &mut Self
    where
        F: Fn(
                Arc<RuleInput<C>>,
            ) -> BoxFuture<'static, Result<Vec<CheckResult>, RuleError>>
            + Send
            + Sync
            + 'static,
    {
        self.register(RuleRunner::Batch(Arc::new(runner)))
    }

    /// Appends all of `other`'s runners after this service's own.
    pub fn merge_with(&mut self, other: &CheckService<C>) -> &mut Self {
        self.runners.extend(other.runners.iter().cloned());
        self
    }

    pub fn generate_facts(
        &self,
        current_document: &Value,
        next_document: &Value,
    ) -> GeneratedFacts {
        GeneratedFacts {
            current_facts: traverse(current_document, &self.log),
            next_facts: traverse(next_document, &self.log),
        }
    }

    /// Runs every registered rule over an already-assembled input.
    ///
    /// All checks are awaited together.  Results from immediate runners come
    /// first, then results from batch runners, each in registration order.
    /// An error from a runner itself fails the whole run.
    pub async fn run_rules_with_facts(
        &self,
        input: RuleInput<C>,
    ) -> Result<Vec<CheckResult>, RuleError> {
        let input = Arc::new(input);
        let mut checks = Vec::new();
        let mut batches = Vec::new();
        for runner in &self.runners {
            match runner {
                RuleRunner::Immediate(f) => checks.extend(f(&input)?),
                RuleRunner::Batch(f) => batches.push(f(Arc::clone(&input))),
            }
        }

        let (immediate, batched) =
            futures::join!(join_all(checks), try_join_all(batches));
        let mut results = immediate;
        results.extend(batched?.into_iter().flatten());

        if let Some(execution_date) = &self.execution_date {
            let now = execution_date(&input.context);
            results.retain(|result| match result.effective_on_date {
                Some(effective_on) => now > effective_on,
                None => true,
            });
        }

        debug!(self.log, "ran rules";
            "runners" => self.runners.len(),
            "results" => results.len(),
        );
        Ok(results)
    }

    /// Traverses both documents, diffs them, and runs every registered rule.
    pub async fn run_rules(
        &self,
        current_document: Value,
        next_document: Value,
        context: C,
    ) -> Result<Vec<CheckResult>, RuleError> {
        let input = self.rule_input(current_document, next_document, context);
        self.run_rules_with_facts(input).await
    }

    /// Builds the input for a run: facts for both documents and the
    /// changelog between them.
    pub fn rule_input(
        &self,
        current_document: Value,
        next_document: Value,
        context: C,
    ) -> RuleInput<C> {
        let GeneratedFacts { current_facts, next_facts } =
            self.generate_facts(&current_document, &next_document);
        let changelog = facts_to_changelog(&current_facts, &next_facts);
        debug!(self.log, "computed changelog";
            "current_facts" => current_facts.len(),
            "next_facts" => next_facts.len(),
            "changes" => changelog.len(),
        );
        RuleInput {
            context,
            next_facts,
            current_facts,
            changelog,
            next_document,
            current_document,
        }
    }
}
