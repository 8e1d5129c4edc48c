// Copyright 2025 Oxide Computer Company

//! Automated testing facilities.  These are intended for use both by this
//! crate and dependents of this crate (e.g., crates that package rulesets).

use crate::logging::ConfigLogging;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::de::DeserializeOwned;
use serde_json::json;
use serde_json::Value;
use slog::Drain;
use slog::Logger;
use std::fmt::Debug;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// Returns a synchronous logger that writes warnings and worse to the test
/// harness's captured output.
pub fn test_logger() -> Logger {
    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build();
    let drain = slog::LevelFilter::new(drain, slog::Level::Warning).fuse();
    Logger::root(drain, o!("component" => "test"))
}

/// Constructs a Logger for use by a test suite.  If a file-based logger is
/// requested, the file will be put in a temporary directory and the name will
/// be unique for a given test name and is likely to be unique across multiple
/// runs of this test.  The file will also be deleted if the test succeeds,
/// indicated by invoking [`LogContext::cleanup_successful`].  This way, you
/// can debug a test failure from the failed instance rather than hoping the
/// failure is reproducible.
///
/// ```
/// use apicheck::test_util::LogContext;
/// use apicheck::ConfigLogging;
/// use apicheck::ConfigLoggingIfExists;
/// use apicheck::ConfigLoggingLevel;
///
/// let logctx = LogContext::new("my_test", &ConfigLogging::File {
///     level: ConfigLoggingLevel::Debug,
///     path: "UNUSED".into(),
///     if_exists: ConfigLoggingIfExists::Fail,
/// });
/// slog::info!(logctx.log, "the test is going great");
/// logctx.cleanup_successful();
/// ```
///
/// `cleanup_successful()` is not invoked on `drop` because that would remove
/// the file even if the test failed.
pub struct LogContext {
    /// general-purpose logger
    pub log: Logger,
    log_path: Option<Utf8PathBuf>,
}

impl LogContext {
    /// Sets up a LogContext.  If `initial_config_logging` specifies a
    /// file-based log (i.e., [`ConfigLogging::File`]), then the requested path
    /// _must_ be the string `"UNUSED"` and it will be replaced with a file
    /// name (in a temporary directory) containing `test_name` and other
    /// information to make the filename likely to be unique across multiple
    /// runs (e.g., process id).
    pub fn new(
        test_name: &str,
        initial_config_logging: &ConfigLogging,
    ) -> LogContext {
        let (log_path, log_config) = match initial_config_logging {
            ConfigLogging::File { level, path: dummy_path, if_exists } => {
                assert_eq!(
                    dummy_path, "UNUSED",
                    "for test suite logging configuration, when mode = \
                     \"file\" is used, the path MUST be the sentinel string \
                     \"UNUSED\".  It will be replaced with a unique path for \
                     each test."
                );
                let new_path = log_file_for_test(test_name);
                eprintln!("log file: {:?}", new_path);
                (
                    Some(new_path.clone()),
                    ConfigLogging::File {
                        level: *level,
                        path: new_path,
                        if_exists: *if_exists,
                    },
                )
            }
            other_config => (None, other_config.clone()),
        };

        let log = log_config
            .to_logger(test_name)
            .expect("failed to build test logger");
        LogContext { log, log_path }
    }

    pub fn log_path(&self) -> Option<&Utf8Path> {
        self.log_path.as_deref()
    }

    /// Removes the log file, if this was a file-based logger.
    pub fn cleanup_successful(self) {
        if let Some(log_path) = &self.log_path {
            std::fs::remove_file(log_path)
                .expect("failed to remove test log file");
        }
    }
}

static TEST_SUITE_LOGGER_ID: AtomicU32 = AtomicU32::new(0);

/// Returns a unique path name in a temporary directory that includes the
/// given `test_name`.
pub fn log_file_for_test(test_name: &str) -> Utf8PathBuf {
    let arg0 = std::env::args()
        .next()
        .and_then(|arg0| {
            Utf8Path::new(&arg0).file_name().map(str::to_string)
        })
        .unwrap_or_else(|| String::from("apicheck-test"));

    let temp_dir = Utf8PathBuf::try_from(std::env::temp_dir())
        .expect("temporary directory is not valid UTF-8");
    let id = TEST_SUITE_LOGGER_ID.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    temp_dir.join(format!("{}-{}.{}.{}.log", arg0, test_name, pid, id))
}

/// Load an object of type `T` (usually a hunk of configuration) from the
/// string `contents`.  `label` is used as an identifying string in a log
/// message.  It should be unique for each test.
pub fn read_config<T: DeserializeOwned + Debug>(
    label: &str,
    contents: &str,
) -> Result<T, toml::de::Error> {
    let result = toml::from_str(contents);
    eprintln!("config \"{}\": {:?}", label, result);
    result
}

// Document builders

/// Returns an OpenAPI 3.0 document titled "pets" with the given `paths`.
pub fn openapi_document(paths: Value) -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "pets", "version": "1.0.0" },
        "paths": paths,
    })
}

/// Returns a small pet store API: `GET /pets` (with a `limit` query
/// parameter and a list of `Pet` in the response) and `PATCH /pets/{id}`
/// (with a `Pet` request body).
///
/// Tests typically start from this and edit it with
/// [`serde_json::Value::pointer_mut`].
pub fn pets_document() -> Value {
    let pet = json!({
        "type": "object",
        "required": ["id"],
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" },
            "age": { "type": "integer" }
        }
    });
    openapi_document(json!({
        "/pets": {
            "get": {
                "operationId": "listPets",
                "parameters": [{
                    "name": "limit",
                    "in": "query",
                    "required": false,
                    "schema": { "type": "integer" }
                }],
                "responses": {
                    "200": {
                        "description": "the pets",
                        "content": {
                            "application/json": {
                                "schema": { "type": "array", "items": pet }
                            }
                        }
                    }
                }
            }
        },
        "/pets/{id}": {
            "patch": {
                "operationId": "updatePet",
                "parameters": [{
                    "name": "id",
                    "in": "path",
                    "required": true,
                    "schema": { "type": "string" }
                }],
                "requestBody": {
                    "content": {
                        "application/json": { "schema": pet }
                    }
                },
                "responses": {
                    "200": {
                        "description": "the updated pet",
                        "content": {
                            "application/json": { "schema": pet }
                        }
                    }
                }
            }
        }
    }))
}

/// Writes `document` as pretty-printed JSON to `dir/name`, returning the
/// path.
pub fn write_document(
    dir: &Utf8Path,
    name: &str,
    document: &Value,
) -> Utf8PathBuf {
    let path = dir.join(name);
    let contents = serde_json::to_string_pretty(document)
        .expect("failed to serialize test document");
    std::fs::write(&path, contents).expect("failed to write test document");
    path
}
