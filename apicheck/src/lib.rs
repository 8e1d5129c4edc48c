// Copyright 2025 Oxide Computer Company

//! apicheck compares two versions of an OpenAPI document and checks the
//! differences against rules.
//!
//! A comparison runs in stages:
//!
//! 1. Each document is loaded and its `$ref`s, local or into neighboring
//!    files, are replaced by their targets ([`FsSpecLoader`]).  A source map
//!    remembers the file, line, and column where each node was written down.
//! 2. Each document is traversed into an ordered list of facts
//!    ([`traverse`]).  A fact is one entity of the API (an operation, a
//!    parameter, a field of a body, ...) together with its [`Location`].
//! 3. The two fact lists are aligned by each fact's conceptual location and
//!    turned into a changelog of added, changed, and removed entities
//!    ([`facts_to_changelog`]).
//! 4. Rules look at the changelog (and at the facts of the new document) and
//!    produce a [`CheckResult`] for every assertion they make
//!    ([`CheckService`]).
//!
//! [`Comparator`] drives all of this for one pair of documents, or for many
//! pairs at once.
//!
//! ## Writing rules
//!
//! Rules are written against [`ApiChangeDsl`], which offers a surface for
//! each kind of entity.  Each surface can assert something about entities
//! that were `added()`, `removed()`, or `changed()`, or about every entity of
//! that kind in the new document (`requirement()`).  A `must` assertion that
//! fails blocks the change; a failing `should` assertion is advisory.
//!
//! ```
//! use apicheck::CheckService;
//! use apicheck::Rule;
//! use apicheck::RuleError;
//! use apicheck::Ruleset;
//!
//! fn operation_ids() -> Rule<()> {
//!     Rule::new("operation-ids", |dsl| {
//!         dsl.operations().requirement().must(
//!             "have an operationId",
//!             |operation, _context, _docs| match operation.operation_id() {
//!                 Some(_) => Ok(()),
//!                 None => Err(RuleError::new("operationId is missing")),
//!             },
//!         );
//!         Ok(())
//!     })
//!     .with_docs_link("https://example.com/operation-ids")
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let log = slog::Logger::root(slog::Discard, slog::o!());
//! let mut service = CheckService::new(&log);
//! service.use_ruleset(&Ruleset::new("mine", vec![operation_ids()]));
//!
//! let document = apicheck::test_util::pets_document();
//! let results =
//!     service.run_rules(document.clone(), document, ()).await.unwrap();
//! assert_eq!(results.len(), 2);
//! assert!(results.iter().all(|result| result.passed));
//! # }
//! ```
//!
//! Handlers return `Err(RuleError)` when an assertion fails.  That becomes a
//! failed result; it does not stop the run.  An error returned by the rule
//! function itself (outside of any handler) means the rule is broken, and it
//! fails the whole run.
//!
//! ## Exemptions
//!
//! An operation can opt out of named rules by listing them in its
//! `x-apicheck-exemptions` extension.  Results for entities in that operation
//! are still reported, with `exempted` set.
//!
//! ## Logging
//!
//! Everything logs through `slog`.  Callers pass a [`slog::Logger`] to
//! [`CheckService::new`], [`FsSpecLoader::new`], and [`Comparator::new`].
//! [`ConfigLogging`] describes a root logger (for example, as the `[log]`
//! block of an `apicheck.toml` file).

#[macro_use]
extern crate slog;

mod changelog;
mod check;
mod check_service;
mod compare;
mod config;
mod dsl;
mod entity_rule;
mod error;
mod fact;
mod git;
mod loader;
mod location;
mod logging;
mod ruleset;
mod sourcemap;
mod traverser;

pub mod test_util;

pub use changelog::facts_to_changelog;
pub use changelog::Change;
pub use changelog::ChangeKind;
pub use changelog::ChangedValues;
pub use changelog::RemovedValue;
pub use check::CheckResult;
pub use check::DocsLinkHelper;
pub use check::RuleError;
pub use check::Severity;
pub use check_service::BatchRunnerFn;
pub use check_service::CheckFuture;
pub use check_service::CheckService;
pub use check_service::GeneratedFacts;
pub use check_service::ImmediateRunnerFn;
pub use check_service::RuleInput;
pub use check_service::RuleRunner;
pub use check_service::RunnerOutput;
pub use compare::parse_bulk_input;
pub use compare::BulkCompareInputs;
pub use compare::BulkCompareJson;
pub use compare::BulkCompareJsonComparison;
pub use compare::BulkCompareSummary;
pub use compare::BulkComparison;
pub use compare::BulkComparisonStatus;
pub use compare::BulkInput;
pub use compare::Comparator;
pub use compare::Comparison;
pub use compare::ComparisonHooks;
pub use compare::ComparisonOutput;
pub use compare::ComparisonState;
pub use compare::NoHooks;
pub use config::ConfigApiCheck;
pub use config::ConfigFile;
pub use config::CONFIG_FILE_NAME;
pub use config::DEFAULT_BULK_PARALLELISM;
pub use dsl::is_exempt;
pub use dsl::ApiChangeDsl;
pub use dsl::RuleMetadata;
pub use dsl::EXEMPTIONS_EXTENSION;
pub use entity_rule::describe_entity;
pub use entity_rule::ChangedRule;
pub use entity_rule::EntityContext;
pub use entity_rule::EntityRule;
pub use entity_rule::OperationContext;
pub use entity_rule::Side;
pub use entity_rule::ValueRule;
pub use error::BulkInputError;
pub use error::CompareError;
pub use error::ConfigError;
pub use error::LoadError;
pub use error::UnknownRuleset;
pub use error::ValidationError;
pub use fact::flatten_schema;
pub use fact::BodyFact;
pub use fact::ExampleFact;
pub use fact::Fact;
pub use fact::FactAccumulator;
pub use fact::FactPayload;
pub use fact::FactValue;
pub use fact::FieldFact;
pub use fact::HeaderFact;
pub use fact::OperationFact;
pub use fact::RequestBodyFact;
pub use fact::RequestParameterFact;
pub use fact::ResponseFact;
pub use fact::SpecificationFact;
pub use git::git_show_file;
pub use git::git_show_file_with;
pub use git::GitError;
pub use git::GitRevision;
pub use loader::dereference;
pub use loader::empty_spec;
pub use loader::parse_document;
pub use loader::validate_openapi_v3_document;
pub use loader::FsSpecLoader;
pub use loader::ParsedSpec;
pub use loader::SpecFile;
pub use loader::SpecLoader;
pub use loader::SpecReference;
pub use loader::DEFAULT_MAX_CONCURRENT_LOADS;
pub use location::ConceptualLocation;
pub use location::ConceptualPath;
pub use location::FactKind;
pub use location::InRequest;
pub use location::InResponse;
pub use location::InvalidPointer;
pub use location::JsonPath;
pub use location::Location;
pub use location::LocationKey;
pub use logging::ConfigLogging;
pub use logging::ConfigLoggingIfExists;
pub use logging::ConfigLoggingLevel;
pub use ruleset::BatchRule;
pub use ruleset::NamedRulesets;
pub use ruleset::Rule;
pub use ruleset::RuleFn;
pub use ruleset::Ruleset;
pub use sourcemap::FileId;
pub use sourcemap::JsonSourcemap;
pub use sourcemap::NoSourcemap;
pub use sourcemap::SourcePosition;
pub use sourcemap::SourcePositionLookup;
pub use sourcemap::SourceSpan;
pub use sourcemap::SpanIndex;
pub use sourcemap::ROOT_FILE;
pub use traverser::traverse;
pub use traverser::OpenApiTraverser;
pub use traverser::TraverseProblem;
pub use traverser::TraverseWarning;
pub use traverser::EMPTY_SPEC_MARKER;
pub use traverser::METHOD_PRECEDENCE;
