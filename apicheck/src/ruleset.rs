// Copyright 2025 Oxide Computer Company

//! Named rules, rulesets, and the registry of rulesets

use crate::check::CheckResult;
use crate::check::RuleError;
use crate::check_service::BatchRunnerFn;
use crate::check_service::CheckService;
use crate::check_service::RuleInput;
use crate::dsl::ApiChangeDsl;
use crate::dsl::RuleMetadata;
use crate::error::UnknownRuleset;
use chrono::DateTime;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use slog::Logger;
use std::fmt;
use std::sync::Arc;

pub type RuleFn<C> =
    dyn Fn(&ApiChangeDsl<'_, C>) -> Result<(), RuleError> + Send + Sync;

/// A rule: a name, optional documentation metadata, and the function that
/// registers its assertions
pub struct Rule<C> {
    pub name: String,
    pub docs_link: Option<String>,
    /// results from this rule are dropped unless the run's execution date is
    /// after this
    pub effective_on: Option<DateTime<Utc>>,
    rule: Arc<RuleFn<C>>,
}

impl<C> Clone for Rule<C> {
    fn clone(&self) -> Self {
        Rule {
            name: self.name.clone(),
            docs_link: self.docs_link.clone(),
            effective_on: self.effective_on,
            rule: Arc::clone(&self.rule),
        }
    }
}

impl<C> fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("docs_link", &self.docs_link)
            .field("effective_on", &self.effective_on)
            .finish_non_exhaustive()
    }
}

impl<C> Rule<C> {
    pub fn new<S, F>(name: S, rule: F) -> Rule<C>
    where
        S: Into<String>,
        F: Fn(&ApiChangeDsl<'_, C>) -> Result<(), RuleError>
            + Send
            + Sync
            + 'static,
    {
        Rule {
            name: name.into(),
            docs_link: None,
            effective_on: None,
            rule: Arc::new(rule),
        }
    }

    pub fn with_docs_link<S: Into<String>>(mut self, docs_link: S) -> Self {
        self.docs_link = Some(docs_link.into());
        self
    }

    pub fn with_effective_on(mut self, effective_on: DateTime<Utc>) -> Self {
        self.effective_on = Some(effective_on);
        self
    }

    pub fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            name: Some(self.name.clone()),
            docs_link: self.docs_link.clone(),
            effective_on: self.effective_on,
        }
    }

    /// Registers this rule's assertions with `dsl`.
    pub fn apply(&self, dsl: &ApiChangeDsl<'_, C>) -> Result<(), RuleError> {
        (self.rule)(dsl)
    }
}

/// A rule that looks at a whole comparison at once rather than one entity at
/// a time (e.g., to lint the new document)
///
/// Its results are stamped with the rule's name and docs link unless the
/// runner set them.
pub struct BatchRule<C> {
    pub name: String,
    pub docs_link: Option<String>,
    runner: Arc<BatchRunnerFn<C>>,
}

impl<C> Clone for BatchRule<C> {
    fn clone(&self) -> Self {
        BatchRule {
            name: self.name.clone(),
            docs_link: self.docs_link.clone(),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<C> fmt::Debug for BatchRule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRule")
            .field("name", &self.name)
            .field("docs_link", &self.docs_link)
            .finish_non_exhaustive()
    }
}

impl<C: Send + Sync + 'static> BatchRule<C> {
    pub fn new<S, F>(name: S, runner: F) -> BatchRule<C>
    where
        S: Into<String>,
        F: Fn(
                Arc<RuleInput<C>>,
            ) -> BoxFuture<'static, Result<Vec<CheckResult>, RuleError>>
            + Send
            + Sync
            + 'static,
    {
        BatchRule {
            name: name.into(),
            docs_link: None,
            runner: Arc::new(runner),
        }
    }

    pub fn with_docs_link<S: Into<String>>(mut self, docs_link: S) -> Self {
        self.docs_link = Some(docs_link.into());
        self
    }

    pub fn run(
        &self,
        input: Arc<RuleInput<C>>,
    ) -> BoxFuture<'static, Result<Vec<CheckResult>, RuleError>> {
        let name = self.name.clone();
        let docs_link = self.docs_link.clone();
        let results = (self.runner)(input);
        async move {
            let mut results = results.await?;
            for result in &mut results {
                result.name.get_or_insert_with(|| name.clone());
                if result.docs_link.is_none() {
                    result.docs_link = docs_link.clone();
                }
            }
            Ok(results)
        }
        .boxed()
    }
}

/// An ordered list of rules under one name
pub struct Ruleset<C> {
    pub name: String,
    pub rules: Vec<Rule<C>>,
    /// run after `rules`, with their results following those of `rules`
    pub batch_rules: Vec<BatchRule<C>>,
}

impl<C> Clone for Ruleset<C> {
    fn clone(&self) -> Self {
        Ruleset {
            name: self.name.clone(),
            rules: self.rules.clone(),
            batch_rules: self.batch_rules.clone(),
        }
    }
}

impl<C> fmt::Debug for Ruleset<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ruleset")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .field("batch_rules", &self.batch_rules)
            .finish()
    }
}

impl<C> Ruleset<C> {
    pub fn new<S: Into<String>>(name: S, rules: Vec<Rule<C>>) -> Ruleset<C> {
        Ruleset { name: name.into(), rules, batch_rules: Vec::new() }
    }

    pub fn with_batch_rule(mut self, batch_rule: BatchRule<C>) -> Self {
        self.batch_rules.push(batch_rule);
        self
    }

    /// Names of every rule, the batch rules last
    pub fn rule_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.batch_rules.iter().map(|r| r.name.as_str()))
    }
}

/// Rulesets that can be selected by name (e.g., from a config file)
pub struct NamedRulesets<C> {
    rulesets: IndexMap<String, Ruleset<C>>,
}

impl<C> Default for NamedRulesets<C> {
    fn default() -> Self {
        NamedRulesets { rulesets: IndexMap::new() }
    }
}

impl<C> NamedRulesets<C> {
    pub fn new() -> NamedRulesets<C> {
        NamedRulesets::default()
    }

    /// Registers `ruleset` under `name`, replacing any ruleset already
    /// registered under that name.
    pub fn insert<S: Into<String>>(&mut self, name: S, ruleset: Ruleset<C>) {
        self.rulesets.insert(name.into(), ruleset);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.rulesets.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<&Ruleset<C>, UnknownRuleset> {
        self.rulesets.get(name).ok_or_else(|| UnknownRuleset {
            name: name.to_string(),
            valid: self.names().map(str::to_string).collect(),
        })
    }
}

impl<C: Send + Sync + 'static> NamedRulesets<C> {
    /// Returns a check service that runs the ruleset registered as `name`.
    pub fn check_service(
        &self,
        name: &str,
        log: &Logger,
    ) -> Result<CheckService<C>, UnknownRuleset> {
        let ruleset = self.get(name)?;
        let mut service = CheckService::new(log);
        service.use_ruleset(ruleset);
        Ok(service)
    }
}
