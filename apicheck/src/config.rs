// Copyright 2025 Oxide Computer Company

//! Configuration for apicheck
//!
//! [`ConfigApiCheck`] implements [`serde::Deserialize`] and
//! [`serde::Serialize`], so it can be composed with a consumer's own
//! configuration.  Standalone, it is read from an `apicheck.toml` file:
//!
//! ```
//! use apicheck::ConfigApiCheck;
//!
//! let config: ConfigApiCheck = toml::from_str(
//!     r##"
//!         ruleset = "breaking-changes"
//!         bulk_parallelism = 8
//!
//!         [[files]]
//!         path = "openapi/pets.json"
//!         id = "pets"
//!
//!         [log]
//!         mode = "stderr-terminal"
//!         level = "info"
//!     "##,
//! )
//! .unwrap();
//! assert_eq!(config.files[0].id, "pets");
//! ```

use crate::error::ConfigError;
use crate::loader::DEFAULT_MAX_CONCURRENT_LOADS;
use crate::logging::ConfigLogging;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;

/// Name of the file that [`ConfigApiCheck::detect`] looks for
pub const CONFIG_FILE_NAME: &str = "apicheck.toml";

/// Number of comparisons a bulk run keeps in flight by default
pub const DEFAULT_BULK_PARALLELISM: usize = 4;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigApiCheck {
    /// name of the ruleset to check comparisons against
    pub ruleset: String,
    /// maximum number of bulk comparisons in flight at once
    pub bulk_parallelism: usize,
    /// maximum number of spec files being read and parsed at once
    pub max_concurrent_loads: usize,
    /// directory that relative spec paths are resolved against (defaults to
    /// the directory containing the config file)
    pub root_dir: Option<Utf8PathBuf>,
    /// specs tracked by this project
    pub files: Vec<ConfigFile>,
    pub log: ConfigLogging,
}

impl Default for ConfigApiCheck {
    fn default() -> Self {
        ConfigApiCheck {
            ruleset: String::from("default"),
            bulk_parallelism: DEFAULT_BULK_PARALLELISM,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            root_dir: None,
            files: Vec::new(),
            log: ConfigLogging::default(),
        }
    }
}

/// A tracked spec file
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ConfigFile {
    pub path: Utf8PathBuf,
    /// stable identifier for the spec, unique within one config file
    pub id: String,
}

impl ConfigApiCheck {
    /// Reads and validates the config file at `path`.
    ///
    /// If the file doesn't set `root_dir`, it's set to the directory
    /// containing the file.
    pub fn from_file(path: &Utf8Path) -> Result<ConfigApiCheck, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Read { path: path.to_owned(), err }
        })?;
        let mut config: ConfigApiCheck = toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.to_owned(), err })?;

        let mut seen = BTreeSet::new();
        for file in &config.files {
            if !seen.insert(file.id.as_str()) {
                return Err(ConfigError::DuplicateId {
                    path: path.to_owned(),
                    id: file.id.clone(),
                });
            }
        }

        if config.root_dir.is_none() {
            config.root_dir = path.parent().map(Utf8Path::to_owned);
        }
        Ok(config)
    }

    /// Looks for [`CONFIG_FILE_NAME`] in `start` and each of its ancestors,
    /// returning the nearest one.
    pub fn detect(start: &Utf8Path) -> Option<Utf8PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Returns the tracked spec with identifier `id`.
    pub fn file(&self, id: &str) -> Option<&ConfigFile> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Resolves a tracked spec's path against `root_dir`.
    pub fn resolve(&self, file: &ConfigFile) -> Utf8PathBuf {
        match &self.root_dir {
            Some(root) if file.path.is_relative() => root.join(&file.path),
            _ => file.path.clone(),
        }
    }
}
