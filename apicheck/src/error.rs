// Copyright 2025 Oxide Computer Company

//! Error types
//!
//! Each stage of a comparison has its own error type:
//!
//! * [`LoadError`]: a spec could not be read, parsed, or validated.  This is
//!   fatal to the one comparison that needed the spec.
//! * [`ValidationError`]: a parsed document doesn't have the shape of an
//!   OpenAPI 3 document.
//! * [`RuleError`](crate::RuleError): a rule assertion failed (which is
//!   reported as a failed result) or a rule is broken (which fails the run).
//! * [`CompareError`]: one comparison failed, either loading or running rules.
//! * [`BulkInputError`]: a bulk comparison's input or output file was
//!   unusable.
//! * [`UnknownRuleset`]: a ruleset was requested by a name nobody registered.
//! * [`ConfigError`]: the config file could not be read, is invalid, or
//!   names a logger or ruleset that can't be set up.

use crate::check::RuleError;
use crate::git::GitError;
use camino::Utf8PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse {path} as JSON")]
    Json {
        path: String,
        #[source]
        err: serde_json::Error,
    },
    #[error("failed to parse {path} as YAML")]
    Yaml {
        path: String,
        #[source]
        err: serde_yaml::Error,
    },
    #[error("failed to read spec from git")]
    Git(#[from] GitError),
    #[error("{path} is not a valid OpenAPI document")]
    Validation {
        path: String,
        #[source]
        err: ValidationError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("document is not an object")]
    NotAnObject,
    #[error("document has no \"openapi\" version")]
    MissingVersion,
    #[error("unsupported OpenAPI version {0:?} (expected 3.x)")]
    UnsupportedVersion(String),
    #[error("document has no \"info\" object")]
    MissingInfo,
    #[error("at {path}: {message}")]
    Schema { path: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("failed to load {reference}")]
    Load {
        reference: String,
        #[source]
        err: LoadError,
    },
    #[error("failed to run rules")]
    Rules(#[from] RuleError),
}

#[derive(Debug, thiserror::Error)]
pub enum BulkInputError {
    #[error("failed to read bulk input {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse bulk input {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("failed to encode bulk comparison output")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write bulk comparison output {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error(
    "unknown ruleset {name:?} (expected one of: {})",
    .valid.join(", ")
)]
pub struct UnknownRuleset {
    pub name: String,
    pub valid: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("config file {path} lists spec id {id:?} more than once")]
    DuplicateId { path: Utf8PathBuf, id: String },
    #[error("failed to set up logging")]
    Log(#[source] std::io::Error),
    #[error(transparent)]
    Ruleset(#[from] UnknownRuleset),
}
