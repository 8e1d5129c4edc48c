// Copyright 2025 Oxide Computer Company

//! Facts: normalized observations about one node of an OpenAPI document

use crate::location::FactKind;
use crate::location::Location;
use crate::location::LocationKey;
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Schema keywords that describe nested structure.  These are removed from the
/// schema carried by a body or field fact, since the nested entities are facts
/// of their own.
const NESTED_SCHEMA_KEYWORDS: [&str; 6] =
    ["properties", "items", "required", "oneOf", "anyOf", "allOf"];

/// Returns a copy of `schema` without the keywords that describe nested
/// structure.
pub fn flatten_schema(schema: &Map<String, Value>) -> Value {
    Value::Object(without_keys(schema, &NESTED_SCHEMA_KEYWORDS))
}

pub(crate) fn without_keys(
    object: &Map<String, Value>,
    keys: &[&str],
) -> Map<String, Value> {
    object
        .iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Top-level document metadata, without `paths` and `components`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpecificationFact {
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFact {
    pub method: String,
    pub path_pattern: String,
    /// the operation object, without `parameters`, `requestBody` and
    /// `responses`
    #[serde(flatten)]
    pub operation: Map<String, Value>,
}

impl OperationFact {
    pub fn operation_id(&self) -> Option<&str> {
        self.operation.get("operationId").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestParameterFact {
    #[serde(flatten)]
    pub parameter: Map<String, Value>,
}

impl RequestParameterFact {
    pub fn name(&self) -> &str {
        self.parameter.get("name").and_then(Value::as_str).unwrap_or("")
    }

    pub fn location(&self) -> &str {
        self.parameter.get("in").and_then(Value::as_str).unwrap_or("")
    }

    pub fn required(&self) -> bool {
        self.parameter.get("required").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestBodyFact {
    /// the request body object, without `content`
    #[serde(flatten)]
    pub request_body: Map<String, Value>,
}

impl RequestBodyFact {
    pub fn required(&self) -> bool {
        self.request_body
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyFact {
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_schema: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFact {
    pub key: String,
    pub required: bool,
    pub flat_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFact {
    pub status_code: String,
    /// the response object, without `headers` and `content`
    #[serde(flatten)]
    pub response: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeaderFact {
    pub name: String,
    #[serde(flatten)]
    pub header: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExampleFact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Value,
}

/// Entity-specific payload of a fact
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    Specification(SpecificationFact),
    Operation(OperationFact),
    RequestParameter(RequestParameterFact),
    RequestBody(RequestBodyFact),
    Body(BodyFact),
    Field(FieldFact),
    Response(ResponseFact),
    ResponseHeader(HeaderFact),
    Example(ExampleFact),
}

/// Conversion from a [`FactValue`] to one of its payload types.  This is how
/// the entity rule adapter hands rule authors a typed value.
pub trait FactPayload: Sized {
    fn from_value(value: &FactValue) -> Option<&Self>;
}

macro_rules! fact_payload {
    ($variant:ident, $payload:ty) => {
        impl FactPayload for $payload {
            fn from_value(value: &FactValue) -> Option<&Self> {
                match value {
                    FactValue::$variant(payload) => Some(payload),
                    _ => None,
                }
            }
        }
    };
}

fact_payload!(Specification, SpecificationFact);
fact_payload!(Operation, OperationFact);
fact_payload!(RequestParameter, RequestParameterFact);
fact_payload!(RequestBody, RequestBodyFact);
fact_payload!(Body, BodyFact);
fact_payload!(Field, FieldFact);
fact_payload!(Response, ResponseFact);
fact_payload!(ResponseHeader, HeaderFact);
fact_payload!(Example, ExampleFact);

/// One observation about a document node
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Fact {
    pub location: Location,
    pub value: FactValue,
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        self.location.kind
    }
}

/// Ordered collection of the facts from one traversal, keyed by conceptual
/// identity
#[derive(Clone, Debug, Default)]
pub struct FactAccumulator {
    facts: IndexMap<LocationKey, Fact>,
}

impl FactAccumulator {
    pub fn new() -> FactAccumulator {
        FactAccumulator::default()
    }

    /// Records a fact.  If a fact with the same identity was already recorded,
    /// the first one is kept and the new one is handed back.
    pub fn log(&mut self, fact: Fact) -> Result<(), Fact> {
        match self.facts.entry(fact.location.key()) {
            Entry::Occupied(_) => Err(fact),
            Entry::Vacant(entry) => {
                entry.insert(fact);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &LocationKey) -> Option<&Fact> {
        self.facts.get(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LocationKey> + '_ {
        self.facts.keys()
    }

    pub fn into_facts(self) -> Vec<Fact> {
        self.facts.into_values().collect()
    }
}

impl FromIterator<Fact> for FactAccumulator {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut accumulator = FactAccumulator::new();
        for fact in iter {
            // Duplicate identities only arise from documents that declare the
            // same entity twice (e.g., a repeated parameter).  First one wins.
            let _ = accumulator.log(fact);
        }
        accumulator
    }
}

impl<'a> FromIterator<&'a Fact> for FactAccumulator {
    fn from_iter<I: IntoIterator<Item = &'a Fact>>(iter: I) -> Self {
        iter.into_iter().cloned().collect()
    }
}
