// Copyright 2025 Oxide Computer Company

//! Load specs from files, git, or nowhere at all
//!
//! A spec is named by a [`SpecReference`] and loaded by a [`SpecLoader`].  The
//! loader produces a [`ParsedSpec`]: the document with its references replaced
//! by their targets, plus a source map that can say where each node of the
//! dereferenced document was written down.
//!
//! References may point into other files by relative path (e.g.,
//! `schemas/pet.yaml#/Pet`).  [`FsSpecLoader`] reads those files from the same
//! place as the spec itself: the filesystem, or the same git revision.
//! References to URLs are left in place.

use crate::error::LoadError;
use crate::error::ValidationError;
use crate::git::git_show_file;
use crate::git::GitRevision;
use crate::location::JsonPath;
use crate::sourcemap::FileId;
use crate::sourcemap::JsonSourcemap;
use crate::sourcemap::NoSourcemap;
use crate::sourcemap::SourcePositionLookup;
use crate::sourcemap::SpanIndex;
use crate::sourcemap::ROOT_FILE;
use crate::traverser::EMPTY_SPEC_MARKER;
use async_trait::async_trait;
use camino::Utf8Component;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use slog::Logger;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default limit on the number of specs being read at once
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 20;

/// The document used when there's no spec on one side of a comparison
pub fn empty_spec() -> Value {
    json!({
        "openapi": "3.0.1",
        "paths": {},
        "info": { "version": "0.0.0", "title": "Empty" },
        EMPTY_SPEC_MARKER: true,
    })
}

/// Where to find a spec
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SpecReference {
    /// no spec: compare against an empty document
    Empty,
    File(Utf8PathBuf),
    /// a file as of some revision in the enclosing git repository
    GitRevision { revision: GitRevision, path: Utf8PathBuf },
}

impl SpecReference {
    /// Interprets a reference as given by a user.
    ///
    /// No reference means the empty spec.  `revision:path` refers to a file in
    /// git, unless there is a file by that literal name.  Anything else is a
    /// file path.
    pub fn parse(reference: Option<&str>) -> SpecReference {
        let Some(reference) = reference else {
            return SpecReference::Empty;
        };
        if Utf8Path::new(reference).is_file() {
            return SpecReference::File(Utf8PathBuf::from(reference));
        }
        match reference.split_once(':') {
            Some((revision, path))
                if !revision.is_empty() && !path.is_empty() =>
            {
                SpecReference::GitRevision {
                    revision: GitRevision::from(revision),
                    path: Utf8PathBuf::from(path),
                }
            }
            _ => SpecReference::File(Utf8PathBuf::from(reference)),
        }
    }

    /// Makes a relative file reference relative to `root` instead of the
    /// current directory.  Git paths are always relative to the repository
    /// root and are left alone.
    pub fn relative_to(self, root: &Utf8Path) -> SpecReference {
        match self {
            SpecReference::File(path) if path.is_relative() => {
                SpecReference::File(root.join(path))
            }
            other => other,
        }
    }
}

impl fmt::Display for SpecReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecReference::Empty => f.write_str("empty spec"),
            SpecReference::File(path) => write!(f, "{}", path),
            SpecReference::GitRevision { revision, path } => {
                write!(f, "{}:{}", revision, path)
            }
        }
    }
}

/// A loaded, dereferenced document and its source map
#[derive(Clone)]
pub struct ParsedSpec {
    pub document: Value,
    pub sourcemap: Arc<dyn SourcePositionLookup>,
}

impl fmt::Debug for ParsedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedSpec")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl ParsedSpec {
    pub fn empty() -> ParsedSpec {
        ParsedSpec { document: empty_spec(), sourcemap: Arc::new(NoSourcemap) }
    }

    /// Dereferences `document`, which was read from `file_path`.  Only its
    /// local references are replaced.
    pub fn from_document(mut document: Value, file_path: &str) -> ParsedSpec {
        let mut sourcemap = JsonSourcemap::new(file_path);
        dereference(&mut document, &mut sourcemap);
        ParsedSpec { document, sourcemap: Arc::new(sourcemap) }
    }

    /// Dereferences the document in `root`, following references into any
    /// of the `referenced` files.
    pub fn from_files(
        mut root: SpecFile,
        mut referenced: Vec<SpecFile>,
    ) -> ParsedSpec {
        let mut sourcemap = JsonSourcemap::new(root.name.clone())
            .with_spans(std::mem::take(&mut root.spans));
        for file in &mut referenced {
            let spans = std::mem::take(&mut file.spans);
            sourcemap.add_file(file.name.clone(), spans);
        }

        let mut document = root.document.clone();
        let mut files = vec![root];
        files.append(&mut referenced);
        dereference_files(&mut document, &files, &mut sourcemap);
        ParsedSpec { document, sourcemap: Arc::new(sourcemap) }
    }
}

/// One file of a spec: the file that was named, or one its references point
/// into
#[derive(Clone, Debug)]
pub struct SpecFile {
    /// where the file is, for resolving the relative references in it
    pub path: Utf8PathBuf,
    /// how results name the file (e.g., `main:openapi.yaml` for git)
    pub name: String,
    pub document: Value,
    pub spans: SpanIndex,
}

impl SpecFile {
    pub fn parse(
        path: Utf8PathBuf,
        name: String,
        contents: &[u8],
    ) -> Result<SpecFile, LoadError> {
        let document = parse_document(&name, path.extension(), contents)?;
        let spans = std::str::from_utf8(contents)
            .map(SpanIndex::parse)
            .unwrap_or_default();
        Ok(SpecFile { path, name, document, spans })
    }

    /// Returns the paths of the other files that this file's references
    /// point into, in the order they're first referenced.
    pub fn referenced_files(&self) -> Vec<Utf8PathBuf> {
        let mut paths = Vec::new();
        let mut stack = vec![&self.document];
        while let Some(node) = stack.pop() {
            match node {
                Value::Object(object) => {
                    if let Some((Some(file), _)) = object
                        .get("$ref")
                        .and_then(Value::as_str)
                        .and_then(split_reference)
                    {
                        let path = resolve_relative(&self.path, file);
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                    stack.extend(object.values().rev());
                }
                Value::Array(items) => stack.extend(items.iter().rev()),
                _ => (),
            }
        }
        paths
    }
}

#[async_trait]
pub trait SpecLoader: Send + Sync {
    async fn load(
        &self,
        reference: &SpecReference,
    ) -> Result<ParsedSpec, LoadError>;
}

/// Loads specs from the local filesystem and git
pub struct FsSpecLoader {
    log: Logger,
    limiter: Arc<Semaphore>,
}

impl FsSpecLoader {
    pub fn new(log: &Logger, max_concurrent_loads: usize) -> FsSpecLoader {
        FsSpecLoader {
            log: log.new(o!("component" => "loader")),
            limiter: Arc::new(Semaphore::new(max_concurrent_loads.max(1))),
        }
    }
}

#[async_trait]
impl SpecLoader for FsSpecLoader {
    async fn load(
        &self,
        reference: &SpecReference,
    ) -> Result<ParsedSpec, LoadError> {
        // The semaphore is never closed.  One permit covers the spec and
        // every file it references.
        let _permit = self.limiter.acquire().await.ok();
        debug!(self.log, "loading spec"; "reference" => %reference);

        let (path, revision) = match reference {
            SpecReference::Empty => return Ok(ParsedSpec::empty()),
            SpecReference::File(path) => (path, None),
            SpecReference::GitRevision { revision, path } => {
                (path, Some(revision))
            }
        };

        let root = read_spec_file(revision, path).await?;
        let mut referenced: Vec<SpecFile> = Vec::new();
        let mut pending = root.referenced_files();
        while let Some(path) = pending.pop() {
            let known = path == root.path
                || referenced.iter().any(|file| file.path == path);
            if known {
                continue;
            }
            debug!(self.log, "loading referenced file";
                "reference" => %reference,
                "path" => %path,
            );
            let file = read_spec_file(revision, &path).await?;
            pending.extend(file.referenced_files().into_iter().rev());
            referenced.push(file);
        }

        let spec = ParsedSpec::from_files(root, referenced);
        debug!(self.log, "loaded spec"; "reference" => %reference);
        Ok(spec)
    }
}

async fn read_spec_file(
    revision: Option<&GitRevision>,
    path: &Utf8Path,
) -> Result<SpecFile, LoadError> {
    let (name, contents) = match revision {
        None => {
            let contents = tokio::fs::read(path)
                .await
                .map_err(|err| LoadError::Io { path: path.to_owned(), err })?;
            (path.to_string(), contents)
        }
        Some(revision) => {
            let contents = git_show_file(revision, path).await?;
            (format!("{}:{}", revision, path), contents)
        }
    };
    SpecFile::parse(path.to_owned(), name, &contents)
}

/// Parses a document as JSON or YAML, based on its file extension.  With no
/// recognized extension, JSON is tried first, then YAML.
pub fn parse_document(
    name: &str,
    extension: Option<&str>,
    contents: &[u8],
) -> Result<Value, LoadError> {
    let parse_json = || {
        serde_json::from_slice::<Value>(contents)
            .map_err(|err| LoadError::Json { path: name.to_string(), err })
    };
    let parse_yaml = || {
        serde_yaml::from_slice::<serde_yaml::Value>(contents)
            .map(yaml_to_json)
            .map_err(|err| LoadError::Yaml { path: name.to_string(), err })
    };

    match extension {
        Some("json") => parse_json(),
        Some("yaml" | "yml") => parse_yaml(),
        _ => parse_json().or_else(|_| parse_yaml()),
    }
}

/// Converts a YAML value to JSON.  Mapping keys that aren't strings (like
/// unquoted status codes) are converted to their string form.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::from("null"),
        other => yaml_to_json(other).to_string(),
    }
}

/// Replaces local references (`#/...`) in `document` with copies of their
/// targets, recording each replacement in `sourcemap`.
///
/// References to other files, references that don't resolve, and references
/// that would expand into themselves are left in place.
pub fn dereference(document: &mut Value, sourcemap: &mut JsonSourcemap) {
    let root = SpecFile {
        path: Utf8PathBuf::from(sourcemap.file_path()),
        name: sourcemap.file_path().to_string(),
        document: document.clone(),
        spans: SpanIndex::default(),
    };
    dereference_files(document, &[root], sourcemap);
}

/// Replaces references in `document`, which is `files[ROOT_FILE]`, with
/// copies of their targets in any of `files`.  File ids in `sourcemap` match
/// indexes into `files`.
fn dereference_files(
    document: &mut Value,
    files: &[SpecFile],
    sourcemap: &mut JsonSourcemap,
) {
    let mut chain = Vec::new();
    dereference_node(
        document,
        files,
        ROOT_FILE,
        JsonPath::root(),
        &mut chain,
        sourcemap,
    );
}

/// `file` is the file `node` was copied from, which is where its relative
/// references are resolved.  `chain` holds the targets being expanded above
/// `node`.
fn dereference_node(
    node: &mut Value,
    files: &[SpecFile],
    mut file: FileId,
    path: JsonPath,
    chain: &mut Vec<(FileId, JsonPath)>,
    sourcemap: &mut JsonSourcemap,
) {
    let chain_depth = chain.len();
    while let Some((target_file, target)) = reference_target(node, files, file)
    {
        if chain.iter().any(|(f, t)| *f == target_file && *t == target) {
            break;
        }
        let Some(replacement) = target.resolve(&files[target_file].document)
        else {
            break;
        };
        *node = replacement.clone();
        sourcemap.record(path.clone(), target_file, target.clone());
        chain.push((target_file, target));
        file = target_file;
    }

    match node {
        Value::Object(object) => {
            for (key, child) in object.iter_mut() {
                dereference_node(
                    child,
                    files,
                    file,
                    path.append([key.as_str()]),
                    chain,
                    sourcemap,
                );
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                dereference_node(
                    child,
                    files,
                    file,
                    path.append([index.to_string()]),
                    chain,
                    sourcemap,
                );
            }
        }
        _ => (),
    }
    chain.truncate(chain_depth);
}

/// Returns the file and pointer that the reference object `node` points to,
/// if it is one and the file is among `files`.
fn reference_target(
    node: &Value,
    files: &[SpecFile],
    file: FileId,
) -> Option<(FileId, JsonPath)> {
    let reference = node.as_object()?.get("$ref")?.as_str()?;
    let (other, pointer) = split_reference(reference)?;
    let target_file = match other {
        None => file,
        Some(other) => {
            let path = resolve_relative(&files[file].path, other);
            files.iter().position(|f| f.path == path)?
        }
    };
    Some((target_file, pointer))
}

/// Splits a `$ref` into the file it names, if it names one, and the pointer
/// within that file.  URLs aren't understood.
fn split_reference(reference: &str) -> Option<(Option<&str>, JsonPath)> {
    if reference.contains("://") {
        return None;
    }
    let (file, pointer) = reference.split_once('#').unwrap_or((reference, ""));
    let pointer = JsonPath::parse_pointer(pointer).ok()?;
    Some(((!file.is_empty()).then_some(file), pointer))
}

/// Resolves `reference` against the directory containing `from`, without
/// touching the filesystem.
fn resolve_relative(from: &Utf8Path, reference: &str) -> Utf8PathBuf {
    let base = from.parent().unwrap_or_else(|| Utf8Path::new(""));
    let mut resolved = Utf8PathBuf::new();
    for component in base.join(reference).components() {
        match component {
            Utf8Component::CurDir => (),
            Utf8Component::ParentDir => {
                if matches!(
                    resolved.components().next_back(),
                    Some(Utf8Component::Normal(_))
                ) {
                    resolved.pop();
                } else {
                    resolved.push("..");
                }
            }
            other => resolved.push(other.as_str()),
        }
    }
    resolved
}

/// Checks that `document` looks enough like an OpenAPI 3 document to be
/// traversed.  3.0 documents must deserialize as one.
pub fn validate_openapi_v3_document(
    document: &Value,
) -> Result<(), ValidationError> {
    let object = document.as_object().ok_or(ValidationError::NotAnObject)?;
    let version = object
        .get("openapi")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingVersion)?;
    if version.starts_with("3.0") {
        serde_path_to_error::deserialize::<_, openapiv3::OpenAPI>(document)
            .map_err(|err| ValidationError::Schema {
                path: err.path().to_string(),
                message: err.inner().to_string(),
            })?;
        Ok(())
    } else if version.starts_with("3.") {
        match object.get("info") {
            Some(Value::Object(_)) => Ok(()),
            _ => Err(ValidationError::MissingInfo),
        }
    } else {
        Err(ValidationError::UnsupportedVersion(version.to_string()))
    }
}
