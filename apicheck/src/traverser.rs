// Copyright 2025 Oxide Computer Company

//! Walk a resolved OpenAPI document and produce its facts
//!
//! [`OpenApiTraverser`] is a lazy iterator.  It keeps an explicit stack of
//! pending work rather than recursing, so each call to `next()` does only as
//! much work as it takes to find the next fact.  Facts come out in a fixed
//! order:
//!
//! * the `specification` fact
//! * for each path (in declaration order), for each method in the order GET,
//!   PATCH, POST, PUT, DELETE, HEAD, OPTIONS: the operation, its parameters
//!   (operation-level, then path-level ones that the operation doesn't
//!   override), its request body, then its responses (numeric status codes
//!   ascending, then the rest in declaration order)
//! * within a response: the response, its headers, then its bodies
//! * within a body: the body, its schema fields depth-first (`oneOf`, `anyOf`
//!   and `allOf` branches, then properties in declaration order or array
//!   items), then its examples
//! * examples attached to `components.schemas`
//!
//! The input must already be dereferenced.  A `$ref` (or a non-object) found
//! where an object is expected is reported as a [`TraverseWarning`] and the
//! subtree beneath it is skipped.

use crate::fact::flatten_schema;
use crate::fact::without_keys;
use crate::fact::BodyFact;
use crate::fact::ExampleFact;
use crate::fact::Fact;
use crate::fact::FactAccumulator;
use crate::fact::FactValue;
use crate::fact::FieldFact;
use crate::fact::HeaderFact;
use crate::fact::OperationFact;
use crate::fact::RequestBodyFact;
use crate::fact::RequestParameterFact;
use crate::fact::ResponseFact;
use crate::fact::SpecificationFact;
use crate::location::ConceptualLocation;
use crate::location::ConceptualPath;
use crate::location::FactKind;
use crate::location::InRequest;
use crate::location::InResponse;
use crate::location::JsonPath;
use crate::location::Location;
use serde_json::Map;
use serde_json::Value;
use slog::Logger;
use std::fmt;

/// Extension that marks a document as the "no spec" placeholder.  Such a
/// document produces no facts at all.
pub const EMPTY_SPEC_MARKER: &str = "x-apicheck-empty-spec";

/// Order in which the methods of a path item are visited
pub const METHOD_PRECEDENCE: [&str; 7] =
    ["get", "patch", "post", "put", "delete", "head", "options"];

const SCHEMA_BRANCHES: [&str; 3] = ["oneOf", "anyOf", "allOf"];

/// A node that the traverser had to skip
#[derive(Clone, Debug, PartialEq)]
pub struct TraverseWarning {
    pub json_path: JsonPath,
    pub problem: TraverseProblem,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TraverseProblem {
    /// something other than an object was found where an object is required
    NotAnObject { found: String },
    /// a reference object was found where a flattened node is required
    Reference { reference: String },
    /// a parameter's `in` is missing or isn't query, header, path, or cookie
    UnknownParameterLocation { found: String },
    /// a parameter has no `name`
    MissingParameterName,
}

impl fmt::Display for TraverseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            TraverseProblem::NotAnObject { found } => write!(
                f,
                "expected an object at: {}, found {}",
                self.json_path.readable(),
                found
            ),
            TraverseProblem::Reference { reference } => write!(
                f,
                "expected a flattened spec, found a reference to {:?} at: {}",
                reference,
                self.json_path.readable()
            ),
            TraverseProblem::UnknownParameterLocation { found } => write!(
                f,
                "expected a parameter location at: {}, found {}",
                self.json_path.readable(),
                found
            ),
            TraverseProblem::MissingParameterName => write!(
                f,
                "expected a parameter name at: {}",
                self.json_path.readable()
            ),
        }
    }
}

/// Both addresses of the node being visited, plus the structured form of the
/// conceptual path
#[derive(Clone, Debug)]
struct Anchor {
    json_path: JsonPath,
    conceptual_path: ConceptualPath,
    conceptual_location: ConceptualLocation,
}

impl Anchor {
    fn child<'s, J, C>(&self, json: J, conceptual: C) -> Anchor
    where
        J: IntoIterator<Item = &'s str>,
        C: IntoIterator<Item = &'s str>,
    {
        Anchor {
            json_path: self.json_path.append(json),
            conceptual_path: self.conceptual_path.append(conceptual),
            conceptual_location: self.conceptual_location.clone(),
        }
    }

    fn located(mut self, conceptual_location: ConceptualLocation) -> Anchor {
        self.conceptual_location = conceptual_location;
        self
    }

    fn fact(&self, kind: FactKind, value: FactValue) -> Fact {
        Fact {
            location: Location {
                json_path: self.json_path.clone(),
                conceptual_path: self.conceptual_path.clone(),
                kind,
                conceptual_location: self.conceptual_location.clone(),
            },
            value,
        }
    }
}

/// Pending unit of traversal
enum Work<'a> {
    Document,
    Operation {
        path_pattern: &'a str,
        method: &'static str,
        operation: &'a Map<String, Value>,
        path_item: &'a Map<String, Value>,
    },
    RequestBody { request_body: &'a Map<String, Value>, anchor: Anchor },
    Response {
        status_code: &'a str,
        response: &'a Map<String, Value>,
        anchor: Anchor,
    },
    Body { content_type: &'a str, media_type: &'a Value, anchor: Anchor },
    Schema { schema: &'a Map<String, Value>, anchor: Anchor },
    Field {
        key: &'a str,
        schema: &'a Map<String, Value>,
        required: bool,
        anchor: Anchor,
    },
    Emit(Fact),
}

/// Lazy iterator over the facts of one document
pub struct OpenApiTraverser<'a> {
    document: &'a Value,
    log: Logger,
    stack: Vec<Work<'a>>,
    warnings: Vec<TraverseWarning>,
}

impl<'a> OpenApiTraverser<'a> {
    pub fn new(document: &'a Value, log: &Logger) -> OpenApiTraverser<'a> {
        OpenApiTraverser {
            document,
            log: log.new(o!("component" => "traverser")),
            stack: vec![Work::Document],
            warnings: Vec::new(),
        }
    }

    /// Nodes skipped so far.  This is complete once the iterator is exhausted.
    pub fn warnings(&self) -> &[TraverseWarning] {
        &self.warnings
    }

    /// Runs the traversal to completion, collecting every fact.
    pub fn accumulate(&mut self) -> FactAccumulator {
        self.by_ref().collect()
    }

    fn warn(&mut self, json_path: JsonPath, problem: TraverseProblem) {
        let warning = TraverseWarning { json_path, problem };
        warn!(self.log, "skipping node";
            "json_path" => %warning.json_path,
            "problem" => %warning,
        );
        self.warnings.push(warning);
    }

    /// Returns `node` as an object if it is one and is not a reference.
    /// Otherwise, records a warning and returns `None`.
    fn expect_object(
        &mut self,
        node: &'a Value,
        json_path: &JsonPath,
    ) -> Option<&'a Map<String, Value>> {
        match node {
            Value::Object(object) => match object.get("$ref") {
                Some(reference) => {
                    let reference = match reference {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    self.warn(
                        json_path.clone(),
                        TraverseProblem::Reference { reference },
                    );
                    None
                }
                None => Some(object),
            },
            other => {
                self.warn(
                    json_path.clone(),
                    TraverseProblem::NotAnObject { found: describe(other) },
                );
                None
            }
        }
    }

    /// Like `expect_object`, but an absent or `null` node is silently
    /// treated as missing.
    fn optional_object(
        &mut self,
        parent: &'a Map<String, Value>,
        key: &str,
        json_path: &JsonPath,
    ) -> Option<&'a Map<String, Value>> {
        match parent.get(key) {
            None | Some(Value::Null) => None,
            Some(node) => self.expect_object(node, &json_path.append([key])),
        }
    }

    fn push_all(&mut self, mut work: Vec<Work<'a>>) {
        work.reverse();
        self.stack.extend(work);
    }

    fn visit(&mut self, work: Work<'a>) -> Option<Fact> {
        match work {
            Work::Emit(fact) => Some(fact),
            Work::Document => self.visit_document(),
            Work::Operation { path_pattern, method, operation, path_item } => {
                Some(self.visit_operation(
                    path_pattern,
                    method,
                    operation,
                    path_item,
                ))
            }
            Work::RequestBody { request_body, anchor } => {
                Some(self.visit_request_body(request_body, anchor))
            }
            Work::Response { status_code, response, anchor } => {
                Some(self.visit_response(status_code, response, anchor))
            }
            Work::Body { content_type, media_type, anchor } => {
                self.visit_body(content_type, media_type, anchor)
            }
            Work::Schema { schema, anchor } => {
                self.visit_schema(schema, anchor);
                None
            }
            Work::Field { key, schema, required, anchor } => {
                let fact = anchor.fact(
                    FactKind::Field,
                    FactValue::Field(FieldFact {
                        key: key.to_string(),
                        required,
                        flat_schema: flatten_schema(schema),
                    }),
                );
                self.stack.push(Work::Schema { schema, anchor });
                Some(fact)
            }
        }
    }

    fn visit_document(&mut self) -> Option<Fact> {
        let root = JsonPath::root();
        let document = self.expect_object(self.document, &root)?;
        if document.get(EMPTY_SPEC_MARKER).and_then(Value::as_bool) == Some(true)
        {
            return None;
        }

        let mut work = Vec::new();
        let paths_path = root.append(["paths"]);
        if let Some(paths) = self.optional_object(document, "paths", &root) {
            for (path_pattern, path_item) in paths {
                let item_path = paths_path.append([path_pattern.as_str()]);
                let Some(path_item) = self.expect_object(path_item, &item_path)
                else {
                    continue;
                };
                for method in METHOD_PRECEDENCE {
                    let Some(operation) = path_item.get(method) else {
                        continue;
                    };
                    let Some(operation) = self
                        .expect_object(operation, &item_path.append([method]))
                    else {
                        continue;
                    };
                    work.push(Work::Operation {
                        path_pattern,
                        method,
                        operation,
                        path_item,
                    });
                }
            }
        }

        let schemas_path = root.append(["components", "schemas"]);
        let schemas = document
            .get("components")
            .and_then(Value::as_object)
            .and_then(|components| components.get("schemas"))
            .and_then(Value::as_object);
        for (name, schema) in schemas.into_iter().flatten() {
            let schema_path = schemas_path.append([name.as_str()]);
            let Some(schema) = self.expect_object(schema, &schema_path) else {
                continue;
            };
            if let Some(example) = schema.get("example") {
                let anchor = Anchor {
                    json_path: schema_path.append(["example"]),
                    conceptual_path: ConceptualPath::from_segments([
                        "components",
                        "schemas",
                        name.as_str(),
                        "example",
                    ]),
                    conceptual_location: ConceptualLocation::default(),
                };
                work.push(Work::Emit(anchor.fact(
                    FactKind::ComponentSchemaExample,
                    FactValue::Example(ExampleFact {
                        name: Some(name.clone()),
                        value: example.clone(),
                    }),
                )));
            }
        }

        self.push_all(work);

        let anchor = Anchor {
            json_path: root,
            conceptual_path: ConceptualPath::root(),
            conceptual_location: ConceptualLocation::default(),
        };
        Some(anchor.fact(
            FactKind::Specification,
            FactValue::Specification(SpecificationFact {
                metadata: without_keys(document, &["paths", "components"]),
            }),
        ))
    }

    fn visit_operation(
        &mut self,
        path_pattern: &'a str,
        method: &'static str,
        operation: &'a Map<String, Value>,
        path_item: &'a Map<String, Value>,
    ) -> Fact {
        let item_path = JsonPath::from_segments(["paths", path_pattern]);
        let anchor = Anchor {
            json_path: item_path.append([method]),
            conceptual_path: ConceptualPath::from_segments([
                "operations",
                path_pattern,
                method,
            ]),
            conceptual_location: ConceptualLocation::for_operation(
                path_pattern,
                method,
            ),
        };

        let mut work = Vec::new();

        // Operation-level parameters, then shared path-level ones.  An
        // operation-level parameter overrides a path-level parameter with the
        // same location and name.
        let mut declared: Vec<(String, String)> = Vec::new();
        let operation_parameters = self.parameters(
            operation,
            &anchor.json_path.append(["parameters"]),
            &anchor,
        );
        for (identity, fact) in operation_parameters {
            declared.push(identity);
            work.push(Work::Emit(fact));
        }
        let shared_parameters = self.parameters(
            path_item,
            &item_path.append(["parameters"]),
            &anchor,
        );
        for (identity, fact) in shared_parameters {
            if !declared.contains(&identity) {
                work.push(Work::Emit(fact));
            }
        }

        if let Some(request_body) =
            self.optional_object(operation, "requestBody", &anchor.json_path)
        {
            let body_anchor = anchor
                .child(["requestBody"], ["requestBody"])
                .located(
                    anchor.conceptual_location.in_request(InRequest::RequestBody),
                );
            work.push(Work::RequestBody { request_body, anchor: body_anchor });
        }

        if let Some(responses) =
            self.optional_object(operation, "responses", &anchor.json_path)
        {
            for (status_code, response) in ordered_responses(responses) {
                let response_anchor = anchor
                    .child(["responses", status_code], ["responses", status_code])
                    .located(anchor.conceptual_location.in_response(
                        InResponse {
                            status_code: status_code.to_string(),
                            header: None,
                            content_type: None,
                        },
                    ));
                let Some(response) = self
                    .expect_object(response, &response_anchor.json_path)
                else {
                    continue;
                };
                work.push(Work::Response {
                    status_code,
                    response,
                    anchor: response_anchor,
                });
            }
        }

        self.push_all(work);

        anchor.fact(
            FactKind::Operation,
            FactValue::Operation(OperationFact {
                method: method.to_string(),
                path_pattern: path_pattern.to_string(),
                operation: without_keys(
                    operation,
                    &["parameters", "requestBody", "responses"],
                ),
            }),
        )
    }

    /// Returns the facts for the parameters declared on `container` (an
    /// operation or a path item), each with its `(in, name)` identity.
    fn parameters(
        &mut self,
        container: &'a Map<String, Value>,
        json_path: &JsonPath,
        operation: &Anchor,
    ) -> Vec<((String, String), Fact)> {
        let Some(parameters) = container.get("parameters") else {
            return Vec::new();
        };
        let Value::Array(parameters) = parameters else {
            self.warn(
                json_path.clone(),
                TraverseProblem::NotAnObject { found: describe(parameters) },
            );
            return Vec::new();
        };

        let mut facts = Vec::new();
        for (index, parameter) in parameters.iter().enumerate() {
            let parameter_path = json_path.append([index.to_string()]);
            let Some(parameter) =
                self.expect_object(parameter, &parameter_path)
            else {
                continue;
            };
            let declared_in = parameter.get("in");
            let Some((location, kind)) =
                declared_in.and_then(Value::as_str).and_then(|location| {
                    FactKind::for_parameter_location(location)
                        .map(|kind| (location, kind))
                })
            else {
                let found = declared_in
                    .map(describe)
                    .unwrap_or_else(|| String::from("nothing"));
                self.warn(
                    parameter_path,
                    TraverseProblem::UnknownParameterLocation { found },
                );
                continue;
            };
            // Without a name, the parameter has no identity to diff by.
            let Some(name) = parameter.get("name").and_then(Value::as_str)
            else {
                self.warn(parameter_path, TraverseProblem::MissingParameterName);
                continue;
            };
            let in_request = match kind {
                FactKind::RequestQuery => {
                    InRequest::Query { name: name.to_string() }
                }
                FactKind::RequestHeader => {
                    InRequest::Header { name: name.to_string() }
                }
                FactKind::RequestPath => {
                    InRequest::Path { name: name.to_string() }
                }
                _ => InRequest::Cookie { name: name.to_string() },
            };
            let anchor = Anchor {
                json_path: parameter_path,
                conceptual_path: operation
                    .conceptual_path
                    .append(["parameters", location, name]),
                conceptual_location: operation
                    .conceptual_location
                    .in_request(in_request),
            };
            let fact = anchor.fact(
                kind,
                FactValue::RequestParameter(RequestParameterFact {
                    parameter: parameter.clone(),
                }),
            );
            facts.push(((location.to_string(), name.to_string()), fact));
        }
        facts
    }

    fn visit_request_body(
        &mut self,
        request_body: &'a Map<String, Value>,
        anchor: Anchor,
    ) -> Fact {
        let mut work = Vec::new();
        if let Some(content) =
            self.optional_object(request_body, "content", &anchor.json_path)
        {
            for (content_type, media_type) in content {
                let body_anchor = Anchor {
                    json_path: anchor
                        .json_path
                        .append(["content", content_type.as_str()]),
                    conceptual_path: anchor
                        .conceptual_path
                        .append([content_type.as_str()]),
                    conceptual_location: anchor.conceptual_location.in_request(
                        InRequest::Body { content_type: content_type.clone() },
                    ),
                };
                work.push(Work::Body {
                    content_type,
                    media_type,
                    anchor: body_anchor,
                });
            }
        }
        self.push_all(work);

        anchor.fact(
            FactKind::RequestBody,
            FactValue::RequestBody(RequestBodyFact {
                request_body: without_keys(request_body, &["content"]),
            }),
        )
    }

    fn visit_response(
        &mut self,
        status_code: &'a str,
        response: &'a Map<String, Value>,
        anchor: Anchor,
    ) -> Fact {
        let mut work = Vec::new();
        let in_response = |header: Option<&str>, content_type: Option<&str>| {
            anchor.conceptual_location.in_response(InResponse {
                status_code: status_code.to_string(),
                header: header.map(str::to_string),
                content_type: content_type.map(str::to_string),
            })
        };

        if let Some(headers) =
            self.optional_object(response, "headers", &anchor.json_path)
        {
            for (name, header) in headers {
                let header_anchor = anchor
                    .child(["headers", name.as_str()], ["headers", name.as_str()])
                    .located(in_response(Some(name), None));
                let Some(header) =
                    self.expect_object(header, &header_anchor.json_path)
                else {
                    continue;
                };
                work.push(Work::Emit(header_anchor.fact(
                    FactKind::ResponseHeader,
                    FactValue::ResponseHeader(HeaderFact {
                        name: name.clone(),
                        header: header.clone(),
                    }),
                )));
            }
        }

        if let Some(content) =
            self.optional_object(response, "content", &anchor.json_path)
        {
            for (content_type, media_type) in content {
                let body_anchor = anchor
                    .child(
                        ["content", content_type.as_str()],
                        [content_type.as_str()],
                    )
                    .located(in_response(None, Some(content_type)));
                work.push(Work::Body {
                    content_type,
                    media_type,
                    anchor: body_anchor,
                });
            }
        }
        self.push_all(work);

        anchor.fact(
            FactKind::Response,
            FactValue::Response(ResponseFact {
                status_code: status_code.to_string(),
                response: without_keys(response, &["headers", "content"]),
            }),
        )
    }

    fn visit_body(
        &mut self,
        content_type: &'a str,
        media_type: &'a Value,
        anchor: Anchor,
    ) -> Option<Fact> {
        let media_type = self.expect_object(media_type, &anchor.json_path)?;
        let mut work = Vec::new();

        let schema =
            self.optional_object(media_type, "schema", &anchor.json_path);
        if let Some(schema) = schema {
            let schema_anchor = Anchor {
                json_path: anchor.json_path.append(["schema"]),
                ..anchor.clone()
            };
            work.push(Work::Schema { schema, anchor: schema_anchor });
        }

        if let Some(examples) =
            self.optional_object(media_type, "examples", &anchor.json_path)
        {
            for (name, example) in examples {
                let example_anchor = anchor.child(
                    ["examples", name.as_str()],
                    ["examples", name.as_str()],
                );
                let Some(example) =
                    self.expect_object(example, &example_anchor.json_path)
                else {
                    continue;
                };
                work.push(Work::Emit(example_anchor.fact(
                    FactKind::BodyExample,
                    FactValue::Example(ExampleFact {
                        name: Some(name.clone()),
                        value: Value::Object(example.clone()),
                    }),
                )));
            }
        }

        if let Some(example) = media_type.get("example") {
            let example_anchor = anchor.child(["example"], ["example"]);
            work.push(Work::Emit(example_anchor.fact(
                FactKind::BodyExample,
                FactValue::Example(ExampleFact {
                    name: None,
                    value: example.clone(),
                }),
            )));
        }
        self.push_all(work);

        Some(anchor.fact(
            FactKind::Body,
            FactValue::Body(BodyFact {
                content_type: content_type.to_string(),
                flat_schema: schema.map(flatten_schema),
            }),
        ))
    }

    fn visit_schema(&mut self, schema: &'a Map<String, Value>, anchor: Anchor) {
        let mut work = Vec::new();

        for branch in SCHEMA_BRANCHES {
            let Some(branches) = schema.get(branch) else {
                continue;
            };
            let Value::Array(branches) = branches else {
                self.warn(
                    anchor.json_path.append([branch]),
                    TraverseProblem::NotAnObject { found: describe(branches) },
                );
                continue;
            };
            for (index, branch_schema) in branches.iter().enumerate() {
                let index = index.to_string();
                let branch_anchor = anchor
                    .child([branch, index.as_str()], [branch, index.as_str()]);
                let Some(branch_schema) =
                    self.expect_object(branch_schema, &branch_anchor.json_path)
                else {
                    continue;
                };
                work.push(Work::Schema {
                    schema: branch_schema,
                    anchor: branch_anchor,
                });
            }
        }

        if schema_has_type(schema, "object") {
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if let Some(properties) =
                self.optional_object(schema, "properties", &anchor.json_path)
            {
                for (key, field_schema) in properties {
                    let field_anchor = anchor.child(
                        ["properties", key.as_str()],
                        ["properties", key.as_str()],
                    );
                    let Some(field_schema) = self
                        .expect_object(field_schema, &field_anchor.json_path)
                    else {
                        continue;
                    };
                    work.push(Work::Field {
                        key,
                        schema: field_schema,
                        required: required.contains(&key.as_str()),
                        anchor: field_anchor,
                    });
                }
            }
        } else if schema_has_type(schema, "array") {
            if let Some(items) =
                self.optional_object(schema, "items", &anchor.json_path)
            {
                let items_anchor = anchor.child(["items"], ["items"]);
                work.push(Work::Schema { schema: items, anchor: items_anchor });
            }
        }

        self.push_all(work);
    }
}

impl<'a> Iterator for OpenApiTraverser<'a> {
    type Item = Fact;

    fn next(&mut self) -> Option<Fact> {
        while let Some(work) = self.stack.pop() {
            if let Some(fact) = self.visit(work) {
                return Some(fact);
            }
        }
        None
    }
}

/// Traverses `document` and collects its facts.
pub fn traverse(document: &Value, log: &Logger) -> FactAccumulator {
    OpenApiTraverser::new(document, log).accumulate()
}

/// Returns true if `schema` declares type `ty`.  OpenAPI 3.1 type arrays are
/// matched by membership.  A schema with no type is treated as an object if it
/// has `properties` and as an array if it has `items`.
fn schema_has_type(schema: &Map<String, Value>, ty: &str) -> bool {
    match schema.get("type") {
        Some(Value::String(declared)) => declared == ty,
        Some(Value::Array(declared)) => {
            declared.iter().any(|t| t.as_str() == Some(ty))
        }
        None => match ty {
            "object" => schema.contains_key("properties"),
            "array" => schema.contains_key("items"),
            _ => false,
        },
        Some(_) => false,
    }
}

/// Orders the entries of a responses object: numeric status codes ascending,
/// then everything else (`default`, `2XX`, ...) in declaration order.
fn ordered_responses(
    responses: &Map<String, Value>,
) -> Vec<(&str, &Value)> {
    let (mut numeric, other): (Vec<_>, Vec<_>) = responses
        .iter()
        .map(|(code, response)| (code.as_str(), response))
        .partition(|(code, _)| code.parse::<u32>().is_ok());
    numeric.sort_by_key(|(code, _)| code.parse::<u32>().ok());
    numeric.extend(other);
    numeric
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}
