// Copyright 2025 Oxide Computer Company

//! Map locations in a dereferenced document back to the source files
//!
//! A loaded spec may have been assembled from several files: the one that was
//! named, plus any files its `$ref`s point into.  [`JsonSourcemap`] records,
//! for each replaced reference, which file and which node the replacement was
//! copied from.  [`SpanIndex`] records where each node of one file sits in its
//! text, so that a result can name a line and column.

use crate::location::JsonPath;
use indexmap::IndexMap;
use serde::Serialize;
use yaml_rust2::parser::Event;
use yaml_rust2::parser::MarkedEventReceiver;
use yaml_rust2::parser::Parser;
use yaml_rust2::scanner::Marker;
use yaml_rust2::scanner::TScalarStyle;

/// Lines and columns of a node in its source file
///
/// Lines and columns count from 1, and the end is the last character of the
/// node.  A mapping entry's span starts at its key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

/// Where a node of a dereferenced document was written down
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePosition {
    pub file_path: String,
    /// path of the node within the file as written, before any references
    /// were replaced
    pub starts_at: JsonPath,
    /// absent when the file's text couldn't be indexed
    #[serde(flatten)]
    pub span: Option<SourceSpan>,
}

/// Something that can say where a node of a loaded document came from
pub trait SourcePositionLookup: Send + Sync {
    fn lookup(&self, json_path: &JsonPath) -> Option<SourcePosition>;
}

/// Index of the files that make up one source map
pub type FileId = usize;

/// The file a source map was created for
pub const ROOT_FILE: FileId = 0;

#[derive(Clone, Debug, Default)]
struct SourceFile {
    path: String,
    spans: SpanIndex,
}

/// Source map for a document whose references have been replaced by their
/// targets
///
/// Each replaced reference is recorded as the path where the reference sat in
/// the dereferenced document, and the file and pointer it referred to.  A path
/// is mapped back by rewriting its longest recorded prefix.
#[derive(Clone, Debug, Default)]
pub struct JsonSourcemap {
    files: Vec<SourceFile>,
    provenance: IndexMap<JsonPath, (FileId, JsonPath)>,
}

impl JsonSourcemap {
    pub fn new<S: Into<String>>(file_path: S) -> JsonSourcemap {
        JsonSourcemap {
            files: vec![SourceFile {
                path: file_path.into(),
                spans: SpanIndex::default(),
            }],
            provenance: IndexMap::new(),
        }
    }

    /// Sets the spans of the root file.
    pub fn with_spans(mut self, spans: SpanIndex) -> JsonSourcemap {
        self.files[ROOT_FILE].spans = spans;
        self
    }

    /// Adds another file that references may point into.
    pub fn add_file<S: Into<String>>(
        &mut self,
        file_path: S,
        spans: SpanIndex,
    ) -> FileId {
        self.files.push(SourceFile { path: file_path.into(), spans });
        self.files.len() - 1
    }

    pub fn file_path(&self) -> &str {
        &self.files[ROOT_FILE].path
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Records that the node at `resolved` was copied from `target` in
    /// `file`.
    pub fn record(
        &mut self,
        resolved: JsonPath,
        file: FileId,
        target: JsonPath,
    ) {
        self.provenance.insert(resolved, (file, target));
    }

    pub fn len(&self) -> usize {
        self.provenance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provenance.is_empty()
    }

    /// Returns the file and the path within it where the node found at
    /// `json_path` in the dereferenced document was written down.
    pub fn original(&self, json_path: &JsonPath) -> (FileId, JsonPath) {
        let segments = json_path.segments();
        for prefix_len in (1..=segments.len()).rev() {
            let prefix = JsonPath::from_segments(&segments[..prefix_len]);
            if let Some((file, target)) = self.provenance.get(&prefix) {
                return (*file, target.append(&segments[prefix_len..]));
            }
        }
        (ROOT_FILE, json_path.clone())
    }

    pub fn original_path(&self, json_path: &JsonPath) -> JsonPath {
        self.original(json_path).1
    }
}

impl SourcePositionLookup for JsonSourcemap {
    fn lookup(&self, json_path: &JsonPath) -> Option<SourcePosition> {
        let (file, starts_at) = self.original(json_path);
        let file = self.files.get(file)?;
        Some(SourcePosition {
            file_path: file.path.clone(),
            span: file.spans.enclosing(&starts_at),
            starts_at,
        })
    }
}

/// Lookup for documents that have no backing file, like the empty spec
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSourcemap;

impl SourcePositionLookup for NoSourcemap {
    fn lookup(&self, _json_path: &JsonPath) -> Option<SourcePosition> {
        None
    }
}

/// Where each node of one JSON or YAML text sits, by path
#[derive(Clone, Debug, Default)]
pub struct SpanIndex {
    spans: IndexMap<JsonPath, SourceSpan>,
}

impl SpanIndex {
    /// Indexes `text`, which may be JSON or YAML.  Only the first YAML
    /// document is indexed.  Text that doesn't parse yields an empty index.
    pub fn parse(text: &str) -> SpanIndex {
        let mut collector = SpanCollector::new(text);
        let mut parser = Parser::new(text.chars());
        match parser.load(&mut collector, false) {
            Ok(()) => SpanIndex { spans: collector.spans },
            Err(_) => SpanIndex::default(),
        }
    }

    pub fn get(&self, json_path: &JsonPath) -> Option<SourceSpan> {
        self.spans.get(json_path).copied()
    }

    /// Returns the span of the node at `json_path`, or of its nearest
    /// ancestor that has one.
    pub fn enclosing(&self, json_path: &JsonPath) -> Option<SourceSpan> {
        let segments = json_path.segments();
        (0..=segments.len()).rev().find_map(|len| {
            self.spans.get(&JsonPath::from_segments(&segments[..len])).copied()
        })
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct Point {
    line: usize,
    column: usize,
}

impl Point {
    fn at(mark: &Marker) -> Point {
        Point { line: mark.line(), column: mark.col() + 1 }
    }

    fn to(self, end: Point) -> SourceSpan {
        SourceSpan {
            start_line: self.line,
            start_column: self.column,
            end_line: end.line,
            end_column: end.column,
        }
    }
}

enum Container {
    /// the key just read, waiting for its value
    Mapping { key: Option<(String, Point)> },
    Sequence { next_index: usize },
}

struct Frame {
    path: JsonPath,
    start: Point,
    /// end of the last child seen so far
    end: Point,
    flow: bool,
    /// this collection is itself a mapping key
    is_key: bool,
    container: Container,
}

/// Where the next node goes
enum Slot {
    Key,
    Node { path: JsonPath, entry_start: Option<Point> },
}

struct SpanCollector {
    chars: Vec<char>,
    line_lengths: Vec<usize>,
    frames: Vec<Frame>,
    spans: IndexMap<JsonPath, SourceSpan>,
}

impl SpanCollector {
    fn new(text: &str) -> SpanCollector {
        SpanCollector {
            chars: text.chars().collect(),
            line_lengths: text.lines().map(|l| l.chars().count()).collect(),
            frames: Vec::new(),
            spans: IndexMap::new(),
        }
    }

    fn slot(&mut self) -> Slot {
        let Some(frame) = self.frames.last_mut() else {
            return Slot::Node { path: JsonPath::root(), entry_start: None };
        };
        match &mut frame.container {
            Container::Mapping { key } => match key.take() {
                None => Slot::Key,
                Some((key, start)) => Slot::Node {
                    path: frame.path.append([key]),
                    entry_start: Some(start),
                },
            },
            Container::Sequence { next_index } => {
                let path = frame.path.append([next_index.to_string()]);
                *next_index += 1;
                Slot::Node { path, entry_start: None }
            }
        }
    }

    fn set_key(&mut self, key: String, start: Point) {
        if let Some(Frame {
            container: Container::Mapping { key: slot }, ..
        }) = self.frames.last_mut()
        {
            *slot = Some((key, start));
        }
    }

    fn finish_node(&mut self, path: JsonPath, span: SourceSpan) {
        if let Some(parent) = self.frames.last_mut() {
            parent.end = Point { line: span.end_line, column: span.end_column };
        }
        self.spans.insert(path, span);
    }

    fn start_collection(&mut self, mark: &Marker, container: Container) {
        let start = Point::at(mark);
        let flow = matches!(self.chars.get(mark.index()), Some('{' | '['));
        let (path, entry_start, is_key) = match self.slot() {
            Slot::Key => (JsonPath::root(), None, true),
            Slot::Node { path, entry_start } => (path, entry_start, false),
        };
        self.frames.push(Frame {
            path,
            start: entry_start.unwrap_or(start),
            end: start,
            flow,
            is_key,
            container,
        });
    }

    fn end_collection(&mut self, mark: &Marker) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        // A flow collection ends at its closing bracket.  A block collection
        // ends with its last child.
        let end = if frame.flow { Point::at(mark) } else { frame.end };
        if frame.is_key {
            // Complex keys have no useful path.  Its value is still indexed,
            // under an empty key.
            self.set_key(String::new(), frame.start);
        } else {
            self.finish_node(frame.path, frame.start.to(end));
        }
    }

    fn scalar(&mut self, mark: &Marker, value: &str, style: TScalarStyle) {
        let start = Point::at(mark);
        match self.slot() {
            Slot::Key => self.set_key(value.to_string(), start),
            Slot::Node { path, entry_start } => {
                let end = self.scalar_end(mark, value, style);
                self.finish_node(path, entry_start.unwrap_or(start).to(end));
            }
        }
    }

    fn scalar_end(
        &self,
        mark: &Marker,
        value: &str,
        style: TScalarStyle,
    ) -> Point {
        let start = Point::at(mark);
        match style {
            TScalarStyle::DoubleQuoted | TScalarStyle::SingleQuoted => {
                self.closing_quote(mark).unwrap_or(start)
            }
            TScalarStyle::Literal | TScalarStyle::Folded => {
                // The indicator line is followed by the content lines.
                let lines = value.trim_end_matches('\n').lines().count();
                let line = start.line + lines;
                let column = self
                    .line_lengths
                    .get(line - 1)
                    .copied()
                    .unwrap_or(start.column);
                Point { line, column }
            }
            _ => Point {
                line: start.line,
                column: start.column
                    + value.chars().count().saturating_sub(1),
            },
        }
    }

    /// Finds the quote that closes the quoted scalar starting at `mark`.
    fn closing_quote(&self, mark: &Marker) -> Option<Point> {
        let quote = *self.chars.get(mark.index())?;
        let mut point = Point::at(mark);
        let mut index = mark.index() + 1;
        while let Some(&c) = self.chars.get(index) {
            index += 1;
            if c == '\n' {
                point = Point { line: point.line + 1, column: 0 };
                continue;
            }
            point.column += 1;
            let escaped = match quote {
                '"' => c == '\\',
                _ => c == '\'' && self.chars.get(index) == Some(&'\''),
            };
            if escaped {
                // Skip the escaped character.
                index += 1;
                point.column += 1;
            } else if c == quote {
                return Some(point);
            }
        }
        None
    }
}

impl MarkedEventReceiver for SpanCollector {
    fn on_event(&mut self, event: Event, mark: Marker) {
        match event {
            Event::Scalar(value, style, ..) => {
                self.scalar(&mark, &value, style)
            }
            Event::Alias(..) => self.scalar(&mark, "*", TScalarStyle::Plain),
            Event::MappingStart(..) => {
                self.start_collection(&mark, Container::Mapping { key: None })
            }
            Event::SequenceStart(..) => self.start_collection(
                &mark,
                Container::Sequence { next_index: 0 },
            ),
            Event::MappingEnd | Event::SequenceEnd => {
                self.end_collection(&mark)
            }
            _ => (),
        }
    }
}
