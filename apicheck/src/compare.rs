// Copyright 2025 Oxide Computer Company

//! Compare two specs end to end, one pair at a time or in bulk
//!
//! A [`Comparator`] loads both sides of a comparison, checks that they look
//! like OpenAPI 3 documents, runs its [`CheckService`] over them, and points
//! each result back at the file it came from.  [`Comparator::compare_many`]
//! runs many comparisons with a bounded number in flight, and
//! [`Comparator::run_bulk_compare`] drives that from a bulk input file.

use crate::changelog::Change;
use crate::changelog::ChangeKind;
use crate::check::CheckResult;
use crate::check_service::CheckService;
use crate::config::ConfigApiCheck;
use crate::config::DEFAULT_BULK_PARALLELISM;
use crate::error::BulkInputError;
use crate::error::CompareError;
use crate::error::LoadError;
use crate::error::ConfigError;
use crate::error::UnknownRuleset;
use crate::loader::validate_openapi_v3_document;
use crate::loader::FsSpecLoader;
use crate::loader::ParsedSpec;
use crate::loader::SpecLoader;
use crate::loader::SpecReference;
use crate::ruleset::NamedRulesets;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use futures::StreamExt;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use slog::Logger;
use std::sync::Arc;
use uuid::Uuid;

/// What one comparison produced
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonOutput {
    pub results: Vec<CheckResult>,
    pub changes: Vec<Change>,
}

impl ComparisonOutput {
    /// Returns true if any result should stop the change from going in.
    pub fn has_blocking_failures(&self) -> bool {
        self.results.iter().any(CheckResult::is_blocking)
    }

    /// Returns true if any result failed and wasn't exempted, whether or not
    /// it blocks.
    pub fn has_failed_checks(&self) -> bool {
        self.results.iter().any(|r| !r.passed && !r.exempted)
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &CheckResult> + '_ {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Callbacks for observing comparisons as they run
///
/// Every method does nothing by default.
pub trait ComparisonHooks: Send + Sync {
    fn comparison_started(&self, _from: &SpecReference, _to: &SpecReference) {}
    fn rules_started(&self, _changes: &[Change]) {}
    fn rules_finished(&self, _results: &[CheckResult]) {}
    fn comparison_finished(&self, _output: &ComparisonOutput) {}
}

/// Hooks that observe nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ComparisonHooks for NoHooks {}

/// One comparison in a batch
#[derive(Clone, Debug)]
pub struct Comparison<C> {
    pub id: String,
    pub from: SpecReference,
    pub to: SpecReference,
    pub context: C,
}

pub struct Comparator<C> {
    check_service: CheckService<C>,
    loader: Arc<dyn SpecLoader>,
    hooks: Arc<dyn ComparisonHooks>,
    bulk_parallelism: usize,
    root_dir: Option<Utf8PathBuf>,
    log: Logger,
}

impl<C: Send + Sync + 'static> Comparator<C> {
    pub fn new(
        check_service: CheckService<C>,
        loader: Arc<dyn SpecLoader>,
        log: &Logger,
    ) -> Comparator<C> {
        Comparator {
            check_service,
            loader,
            hooks: Arc::new(NoHooks),
            bulk_parallelism: DEFAULT_BULK_PARALLELISM,
            root_dir: None,
            log: log.new(o!("component" => "comparator")),
        }
    }

    /// Builds a comparator that reads specs from disk and git, runs the
    /// ruleset named in `config`, and logs where `config.log` says.
    pub fn from_config(
        config: &ConfigApiCheck,
        rulesets: &NamedRulesets<C>,
    ) -> Result<Comparator<C>, ConfigError> {
        let log = config.log.to_logger("apicheck").map_err(ConfigError::Log)?;
        Ok(Comparator::from_config_with_log(config, rulesets, &log)?)
    }

    /// Like [`Comparator::from_config`], but logs to `log` instead of the
    /// logger `config.log` describes.
    pub fn from_config_with_log(
        config: &ConfigApiCheck,
        rulesets: &NamedRulesets<C>,
        log: &Logger,
    ) -> Result<Comparator<C>, UnknownRuleset> {
        let check_service = rulesets.check_service(&config.ruleset, log)?;
        let loader = FsSpecLoader::new(log, config.max_concurrent_loads);
        let mut comparator =
            Comparator::new(check_service, Arc::new(loader), log)
                .with_bulk_parallelism(config.bulk_parallelism);
        comparator.root_dir = config.root_dir.clone();
        Ok(comparator)
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ComparisonHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the maximum number of comparisons that
    /// [`Comparator::compare_many`] keeps in flight.
    pub fn with_bulk_parallelism(mut self, bulk_parallelism: usize) -> Self {
        self.bulk_parallelism = bulk_parallelism.max(1);
        self
    }

    /// Sets the directory that relative file references in bulk input are
    /// resolved against.
    pub fn with_root_dir(mut self, root_dir: Utf8PathBuf) -> Self {
        self.root_dir = Some(root_dir);
        self
    }

    pub fn check_service(&self) -> &CheckService<C> {
        &self.check_service
    }

    /// Loads `from` and `to` and checks the changes between them.
    ///
    /// The two specs are loaded concurrently.  If either can't be loaded or
    /// isn't an OpenAPI 3 document, the comparison fails with that error and
    /// no results.
    pub async fn compare(
        &self,
        from: &SpecReference,
        to: &SpecReference,
        context: C,
    ) -> Result<ComparisonOutput, CompareError> {
        self.hooks.comparison_started(from, to);
        info!(self.log, "comparing specs"; "from" => %from, "to" => %to);

        let (current, next) =
            futures::try_join!(self.load(from), self.load(to))?;

        let input = self.check_service.rule_input(
            current.document.clone(),
            next.document.clone(),
            context,
        );
        let changes = input.changelog.clone();
        self.hooks.rules_started(&changes);
        let mut results =
            self.check_service.run_rules_with_facts(input).await?;
        self.hooks.rules_finished(&results);

        for result in &mut results {
            // Removed entities only exist in the old document.
            let sourcemap = match result.change_type {
                Some(ChangeKind::Removed) => &current.sourcemap,
                _ => &next.sourcemap,
            };
            result.source_position =
                sourcemap.lookup(&result.location.json_path);
        }

        let output = ComparisonOutput { results, changes };
        debug!(self.log, "compared specs";
            "from" => %from,
            "to" => %to,
            "changes" => output.changes.len(),
            "results" => output.results.len(),
        );
        self.hooks.comparison_finished(&output);
        Ok(output)
    }

    async fn load(
        &self,
        reference: &SpecReference,
    ) -> Result<ParsedSpec, CompareError> {
        let load_error = |err: LoadError| {
            error!(self.log, "failed to load spec";
                "reference" => %reference,
                "error" => %err,
            );
            CompareError::Load { reference: reference.to_string(), err }
        };

        let spec = self.loader.load(reference).await.map_err(load_error)?;
        validate_openapi_v3_document(&spec.document).map_err(|err| {
            load_error(LoadError::Validation {
                path: reference.to_string(),
                err,
            })
        })?;
        Ok(spec)
    }

    /// Runs `comparisons` with at most `bulk_parallelism` of them in flight,
    /// reporting each outcome as it finishes.
    ///
    /// A comparison that fails doesn't affect the others.  Outcomes are
    /// reported in completion order, not input order.
    pub async fn compare_many<I, F, E>(
        &self,
        comparisons: I,
        mut on_complete: F,
        mut on_error: E,
    ) where
        I: IntoIterator<Item = Comparison<C>>,
        F: FnMut(String, ComparisonOutput),
        E: FnMut(String, CompareError),
    {
        let mut outcomes = futures::stream::iter(comparisons)
            .map(|comparison| async move {
                let Comparison { id, from, to, context } = comparison;
                let outcome = self.compare(&from, &to, context).await;
                (id, outcome)
            })
            .buffer_unordered(self.bulk_parallelism);

        while let Some((id, outcome)) = outcomes.next().await {
            match outcome {
                Ok(output) => on_complete(id, output),
                Err(error) => {
                    warn!(self.log, "comparison failed";
                        "id" => &id,
                        "error" => %error,
                    );
                    on_error(id, error)
                }
            }
        }
    }

    fn reference(&self, reference: Option<&str>) -> SpecReference {
        let reference = SpecReference::parse(reference);
        match &self.root_dir {
            Some(root_dir) => reference.relative_to(root_dir),
            None => reference,
        }
    }
}

// Bulk comparisons

/// A row of bulk input that parsed
#[derive(Clone, Debug)]
pub struct BulkComparison<C> {
    pub inputs: BulkCompareInputs,
    pub context: C,
}

/// Bulk input: comparisons keyed by a generated id, in input order
#[derive(Clone, Debug)]
pub struct BulkInput<C> {
    pub comparisons: IndexMap<String, BulkComparison<C>>,
    /// true if any row was malformed and left out
    pub skipped_parsing: bool,
}

/// Reads a bulk input file of the form
/// `{"comparisons": [{"from": ..., "to": ..., "context": ...}]}`.
///
/// `from` is optional (no `from` means the empty spec).  Rows without a `to`
/// or a `context`, or whose context isn't a `C`, are skipped and flagged.
pub async fn parse_bulk_input<C: DeserializeOwned>(
    path: &Utf8Path,
    log: &Logger,
) -> Result<BulkInput<C>, BulkInputError> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|err| BulkInputError::Read { path: path.to_owned(), err })?;
    let input: Value = serde_json::from_slice(&contents)
        .map_err(|err| BulkInputError::Parse { path: path.to_owned(), err })?;

    let mut comparisons = IndexMap::new();
    let mut skipped_parsing = false;
    let rows = input
        .get("comparisons")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        match parse_bulk_row(row) {
            Some(comparison) => {
                comparisons.insert(Uuid::new_v4().to_string(), comparison);
            }
            None => {
                warn!(log, "comparison doesn't match expected format";
                    "found" => %row,
                );
                skipped_parsing = true;
            }
        }
    }

    Ok(BulkInput { comparisons, skipped_parsing })
}

fn parse_bulk_row<C: DeserializeOwned>(
    row: &Value,
) -> Option<BulkComparison<C>> {
    let to = row.get("to")?.as_str()?;
    let context = match row.get("context")? {
        Value::Null => return None,
        context => serde_json::from_value(context.clone()).ok()?,
    };
    let from = match row.get("from") {
        None | Some(Value::Null) => None,
        Some(from) => Some(from.as_str()?.to_string()),
    };
    Some(BulkComparison {
        inputs: BulkCompareInputs { from, to: Some(to.to_string()) },
        context,
    })
}

/// Where one comparison's specs came from, as written in the bulk input
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BulkCompareInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// The persisted output of a bulk run
#[derive(Clone, Debug, Serialize)]
pub struct BulkCompareJson {
    pub comparisons: Vec<BulkCompareJsonComparison>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkCompareJsonComparison {
    pub results: Vec<CheckResult>,
    pub changes: Vec<Change>,
    pub inputs: BulkCompareInputs,
}

/// Where one comparison of a bulk run stands
#[derive(Debug)]
pub enum ComparisonState {
    Loading,
    Failed(CompareError),
    Done(ComparisonOutput),
}

#[derive(Debug)]
pub struct BulkComparisonStatus {
    pub inputs: BulkCompareInputs,
    pub state: ComparisonState,
}

/// How a bulk run went
#[derive(Debug)]
pub struct BulkCompareSummary {
    /// every comparison that parsed, by id, in input order
    pub comparisons: IndexMap<String, BulkComparisonStatus>,
    pub skipped_parsing: bool,
    /// true if every row parsed and every comparison ran
    pub bulk_succeeded: bool,
    /// true if the run didn't succeed or any comparison has a failed check
    /// that wasn't exempted
    pub has_failures: bool,
}

impl BulkCompareSummary {
    /// Collects the comparisons that ran into the persisted form.
    pub fn to_json(&self) -> BulkCompareJson {
        let comparisons = self
            .comparisons
            .values()
            .filter_map(|status| match &status.state {
                ComparisonState::Done(output) => {
                    Some(BulkCompareJsonComparison {
                        results: output.results.clone(),
                        changes: output.changes.clone(),
                        inputs: status.inputs.clone(),
                    })
                }
                ComparisonState::Loading | ComparisonState::Failed(_) => None,
            })
            .collect();
        BulkCompareJson { comparisons }
    }
}

impl<C: DeserializeOwned + Send + Sync + 'static> Comparator<C> {
    /// Runs every comparison listed in the bulk input file at `input`.
    ///
    /// If `output` is given, the comparisons that ran are written there as a
    /// [`BulkCompareJson`], even if others failed.
    pub async fn run_bulk_compare(
        &self,
        input: &Utf8Path,
        output: Option<&Utf8Path>,
    ) -> Result<BulkCompareSummary, BulkInputError> {
        info!(self.log, "reading bulk input"; "path" => %input);
        let BulkInput { comparisons, skipped_parsing } =
            parse_bulk_input::<C>(input, &self.log).await?;

        let mut states: IndexMap<String, BulkComparisonStatus> = IndexMap::new();
        let mut queue = Vec::with_capacity(comparisons.len());
        for (id, BulkComparison { inputs, context }) in comparisons {
            queue.push(Comparison {
                id: id.clone(),
                from: self.reference(inputs.from.as_deref()),
                to: self.reference(inputs.to.as_deref()),
                context,
            });
            states.insert(
                id,
                BulkComparisonStatus { inputs, state: ComparisonState::Loading },
            );
        }

        // Both callbacks need to write the state map, but only one runs at a
        // time.
        let states = std::cell::RefCell::new(states);
        self.compare_many(
            queue,
            |id, output| {
                if let Some(status) = states.borrow_mut().get_mut(&id) {
                    status.state = ComparisonState::Done(output);
                }
            },
            |id, error| {
                if let Some(status) = states.borrow_mut().get_mut(&id) {
                    status.state = ComparisonState::Failed(error);
                }
            },
        )
        .await;
        let comparisons = states.into_inner();

        let any_failed = comparisons
            .values()
            .any(|s| !matches!(s.state, ComparisonState::Done(_)));
        let any_failed_check = comparisons.values().any(|s| match &s.state {
            ComparisonState::Done(output) => output.has_failed_checks(),
            ComparisonState::Loading | ComparisonState::Failed(_) => false,
        });
        let bulk_succeeded = !skipped_parsing && !any_failed;
        let summary = BulkCompareSummary {
            comparisons,
            skipped_parsing,
            bulk_succeeded,
            has_failures: !bulk_succeeded || any_failed_check,
        };

        if let Some(output) = output {
            let contents = serde_json::to_vec(&summary.to_json())
                .map_err(BulkInputError::Encode)?;
            tokio::fs::write(output, contents).await.map_err(|err| {
                BulkInputError::Write { path: output.to_owned(), err }
            })?;
            info!(self.log, "wrote bulk comparison results"; "path" => %output);
        }

        info!(self.log, "bulk comparison finished";
            "comparisons" => summary.comparisons.len(),
            "bulk_succeeded" => summary.bulk_succeeded,
            "has_failures" => summary.has_failures,
        );
        Ok(summary)
    }
}
