// Copyright 2025 Oxide Computer Company

//! Addresses for facts
//!
//! Every fact produced by the traverser carries a [`Location`] with two paths:
//!
//! * a [`JsonPath`], which addresses the node in one particular document
//!   snapshot.  This is what source maps understand, but it is not stable
//!   across edits: inserting a parameter shifts array indices, and
//!   dereferencing changes where a schema appears.
//! * a [`ConceptualPath`], built from semantic keys (path pattern, method,
//!   parameter location and name, status code, content type, property names).
//!   Two snapshots of the same entity share a conceptual path, and that is what
//!   the differ uses to line them up.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use std::fmt;

/// Path of a node from the root of one document, as a sequence of unescaped
/// segments.  Serialized as an RFC 6901 JSON pointer.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JsonPath(Vec<String>);

impl JsonPath {
    /// The path of the document root (the empty pointer).
    pub fn root() -> JsonPath {
        JsonPath(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> JsonPath
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JsonPath(segments.into_iter().map(Into::into).collect())
    }

    /// Returns a new path with `segments` appended to this one.
    pub fn append<I, S>(&self, segments: I) -> JsonPath
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = self.0.clone();
        path.extend(segments.into_iter().map(Into::into));
        JsonPath(path)
    }

    pub fn push<S: Into<String>>(&mut self, segment: S) {
        self.0.push(segment.into());
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses an RFC 6901 pointer (e.g., `/paths/~1pets/get`).  A leading `#`
    /// (URI fragment form, as found in `$ref` values) is accepted.
    pub fn parse_pointer(pointer: &str) -> Result<JsonPath, InvalidPointer> {
        let pointer = pointer.strip_prefix('#').unwrap_or(pointer);
        if pointer.is_empty() {
            return Ok(JsonPath::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(InvalidPointer(pointer.to_string()));
        };
        Ok(JsonPath(
            rest.split('/')
                .map(|s| s.replace("~1", "/").replace("~0", "~"))
                .collect(),
        ))
    }

    /// Renders this path for humans: `paths > /pets > get`.
    pub fn readable(&self) -> String {
        self.0.join(" > ")
    }

    /// Looks up the node at this path in `document`.
    pub fn resolve<'a>(
        &self,
        document: &'a serde_json::Value,
    ) -> Option<&'a serde_json::Value> {
        self.0.iter().try_fold(document, |node, segment| match node {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        })
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

impl Serialize for JsonPath {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsonPath {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let pointer = String::deserialize(deserializer)?;
        JsonPath::parse_pointer(&pointer).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid JSON pointer {0:?}: must be empty or start with '/'")]
pub struct InvalidPointer(String);

/// Path that identifies the same conceptual entity across two documents
#[derive(
    Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct ConceptualPath(Vec<String>);

impl ConceptualPath {
    pub fn root() -> ConceptualPath {
        ConceptualPath(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> ConceptualPath
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConceptualPath(segments.into_iter().map(Into::into).collect())
    }

    pub fn append<I, S>(&self, segments: I) -> ConceptualPath
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = self.0.clone();
        path.extend(segments.into_iter().map(Into::into));
        ConceptualPath(path)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ConceptualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" > "))
    }
}

/// The kind of entity a fact describes
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub enum FactKind {
    #[serde(rename = "specification")]
    Specification,
    #[serde(rename = "operation")]
    Operation,
    #[serde(rename = "request-header")]
    RequestHeader,
    #[serde(rename = "request-query")]
    RequestQuery,
    #[serde(rename = "request-cookie")]
    RequestCookie,
    #[serde(rename = "request-path")]
    RequestPath,
    #[serde(rename = "body")]
    Body,
    #[serde(rename = "requestBody")]
    RequestBody,
    #[serde(rename = "field")]
    Field,
    #[serde(rename = "response")]
    Response,
    #[serde(rename = "response-header")]
    ResponseHeader,
    #[serde(rename = "body-example")]
    BodyExample,
    #[serde(rename = "component-schema-example")]
    ComponentSchemaExample,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Specification => "specification",
            FactKind::Operation => "operation",
            FactKind::RequestHeader => "request-header",
            FactKind::RequestQuery => "request-query",
            FactKind::RequestCookie => "request-cookie",
            FactKind::RequestPath => "request-path",
            FactKind::Body => "body",
            FactKind::RequestBody => "requestBody",
            FactKind::Field => "field",
            FactKind::Response => "response",
            FactKind::ResponseHeader => "response-header",
            FactKind::BodyExample => "body-example",
            FactKind::ComponentSchemaExample => "component-schema-example",
        }
    }

    /// Returns the kind of fact emitted for a parameter with the given `in`
    /// value, if that value is one we track.
    pub fn for_parameter_location(location: &str) -> Option<FactKind> {
        match location {
            "query" => Some(FactKind::RequestQuery),
            "header" => Some(FactKind::RequestHeader),
            "path" => Some(FactKind::RequestPath),
            "cookie" => Some(FactKind::RequestCookie),
            _ => None,
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in a request an entity lives
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InRequest {
    Query { name: String },
    Header { name: String },
    Path { name: String },
    Cookie { name: String },
    RequestBody,
    #[serde(rename_all = "camelCase")]
    Body { content_type: String },
}

/// Where in a response an entity lives
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InResponse {
    pub status_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Structured form of the conceptual path: which operation an entity belongs
/// to and which side of the exchange it's on
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptualLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_request: Option<InRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response: Option<InResponse>,
}

impl ConceptualLocation {
    pub fn for_operation(path: &str, method: &str) -> ConceptualLocation {
        ConceptualLocation {
            path: Some(path.to_string()),
            method: Some(method.to_string()),
            ..Default::default()
        }
    }

    pub fn in_request(&self, in_request: InRequest) -> ConceptualLocation {
        ConceptualLocation { in_request: Some(in_request), ..self.clone() }
    }

    pub fn in_response(&self, in_response: InResponse) -> ConceptualLocation {
        ConceptualLocation { in_response: Some(in_response), ..self.clone() }
    }

    pub fn is_request(&self) -> bool {
        self.in_request.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.in_response.is_some()
    }
}

/// Typed address of a fact
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub json_path: JsonPath,
    pub conceptual_path: ConceptualPath,
    pub kind: FactKind,
    #[serde(default)]
    pub conceptual_location: ConceptualLocation,
}

impl Location {
    /// Returns the identity used to align this entity across two documents.
    pub fn key(&self) -> LocationKey {
        LocationKey {
            kind: self.kind,
            conceptual_path: self.conceptual_path.clone(),
        }
    }
}

/// Identity of an entity for diffing purposes
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LocationKey {
    pub kind: FactKind,
    pub conceptual_path: ConceptualPath,
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.conceptual_path)
    }
}

#[cfg(test)]
mod test {
    use super::ConceptualPath;
    use super::FactKind;
    use super::JsonPath;
    use serde_json::json;

    #[test]
    fn test_pointer_escaping() {
        let path = JsonPath::root().append(["paths", "/pets/{id}", "get"]);
        assert_eq!(path.to_string(), "/paths/~1pets~1{id}/get");
        assert_eq!(
            JsonPath::parse_pointer("/paths/~1pets~1{id}/get").unwrap(),
            path
        );

        let tilde = JsonPath::from_segments(["a~b"]);
        assert_eq!(tilde.to_string(), "/a~0b");
        assert_eq!(JsonPath::parse_pointer("/a~0b").unwrap(), tilde);
    }

    #[test]
    fn test_pointer_root_and_fragment() {
        assert!(JsonPath::parse_pointer("").unwrap().is_root());
        assert!(JsonPath::parse_pointer("#").unwrap().is_root());
        assert_eq!(
            JsonPath::parse_pointer("#/components/schemas/Pet")
                .unwrap()
                .segments(),
            ["components", "schemas", "Pet"]
        );
        let error = JsonPath::parse_pointer("components").unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid JSON pointer \"components\": must be empty or start with \
             '/'"
        );
    }

    #[test]
    fn test_resolve() {
        let document = json!({
            "paths": { "/pets": { "get": { "parameters": [
                { "name": "limit", "in": "query" }
            ] } } }
        });
        let path = JsonPath::from_segments([
            "paths",
            "/pets",
            "get",
            "parameters",
            "0",
            "name",
        ]);
        assert_eq!(path.resolve(&document), Some(&json!("limit")));
        assert_eq!(path.append(["nope"]).resolve(&document), None);
        assert_eq!(
            JsonPath::from_segments(["paths", "/pets", "get", "parameters", "x"])
                .resolve(&document),
            None
        );
    }

    #[test]
    fn test_serialized_forms() {
        let path = JsonPath::from_segments(["paths", "/pets"]);
        assert_eq!(serde_json::to_value(&path).unwrap(), json!("/paths/~1pets"));
        assert_eq!(
            serde_json::to_value(ConceptualPath::from_segments([
                "operations",
                "/pets",
                "get"
            ]))
            .unwrap(),
            json!(["operations", "/pets", "get"])
        );
        assert_eq!(
            serde_json::to_value(FactKind::RequestBody).unwrap(),
            json!("requestBody")
        );
        assert_eq!(
            serde_json::to_value(FactKind::ComponentSchemaExample).unwrap(),
            json!("component-schema-example")
        );
        assert_eq!(FactKind::ResponseHeader.to_string(), "response-header");
    }
}
