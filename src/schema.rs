//! Declared output shapes for structured provider queries.
//!
//! Each structured contract has a Rust type (deserialized from the provider's
//! reply) and a [`SchemaDescriptor`] sent along with the request so providers
//! that support constrained decoding can honor it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
}

impl FieldKind {
    fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
        }
    }
}

/// A required, typed field of an object schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Provider-facing description of a reply shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDescriptor {
    /// A single object with the given required fields.
    Object(Vec<FieldSpec>),
    /// An array whose items are objects with the given required fields.
    ArrayOf(Vec<FieldSpec>),
}

impl SchemaDescriptor {
    pub fn is_array(&self) -> bool {
        matches!(self, SchemaDescriptor::ArrayOf(_))
    }

    /// JSON Schema rendering (lowercase types, as OpenAPI-style consumers expect).
    pub fn to_json_schema(&self) -> Value {
        match self {
            SchemaDescriptor::Object(fields) => object_schema(fields, str::to_string),
            SchemaDescriptor::ArrayOf(fields) => json!({
                "type": "array",
                "items": object_schema(fields, str::to_string),
            }),
        }
    }

    /// Rendering for the Gemini `responseSchema` dialect (uppercase type names).
    pub fn to_gemini_schema(&self) -> Value {
        match self {
            SchemaDescriptor::Object(fields) => object_schema(fields, str::to_uppercase),
            SchemaDescriptor::ArrayOf(fields) => json!({
                "type": "ARRAY",
                "items": object_schema(fields, str::to_uppercase),
            }),
        }
    }
}

fn object_schema(fields: &[FieldSpec], type_name: fn(&str) -> String) -> Value {
    let mut properties = Map::new();
    for f in fields {
        properties.insert(f.name.to_string(), json!({ "type": type_name(f.kind.json_type()) }));
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name).collect();
    json!({
        "type": type_name("object"),
        "properties": properties,
        "required": required,
    })
}

/// Names the structured contracts the validator knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    BookAnalysis,
    Recommendations,
    Refinement,
}

/// A reply type with a declared schema.
pub trait Contract: DeserializeOwned {
    const KIND: SchemaKind;

    fn schema() -> SchemaDescriptor;

    /// Post-parse adjustment (e.g. clamping) applied to every accepted value.
    fn normalize(self) -> Self {
        self
    }
}

/// Pre-reading assessment of a book against the reader's intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAnalysis {
    pub problem_solved: String,
    pub limitations: String,
    pub audience_fit: String,
    pub recommended_depth: String,
    /// Always within `0..=100` once normalized.
    pub confidence: i64,
}

impl Contract for BookAnalysis {
    const KIND: SchemaKind = SchemaKind::BookAnalysis;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::Object(vec![
            field("problemSolved", FieldKind::String),
            field("limitations", FieldKind::String),
            field("audienceFit", FieldKind::String),
            field("recommendedDepth", FieldKind::String),
            field("confidence", FieldKind::Integer),
        ])
    }

    fn normalize(mut self) -> Self {
        self.confidence = self.confidence.clamp(0, 100);
        self
    }
}

/// One suggested book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub author: String,
    pub match_score: i64,
    pub why_it_matters: String,
    pub utility_type: String,
    pub key_takeaway: String,
    pub price: String,
}

fn recommendation_fields() -> Vec<FieldSpec> {
    vec![
        field("id", FieldKind::String),
        field("title", FieldKind::String),
        field("author", FieldKind::String),
        field("matchScore", FieldKind::Integer),
        field("whyItMatters", FieldKind::String),
        field("utilityType", FieldKind::String),
        field("keyTakeaway", FieldKind::String),
        field("price", FieldKind::String),
    ]
}

impl Contract for Vec<Recommendation> {
    const KIND: SchemaKind = SchemaKind::Recommendations;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::ArrayOf(recommendation_fields())
    }
}

/// The reader's understanding, rewritten against the author's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refinement {
    pub refined: String,
}

impl Contract for Refinement {
    const KIND: SchemaKind = SchemaKind::Refinement;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::Object(vec![field("refined", FieldKind::String)])
    }
}

impl SchemaKind {
    pub fn descriptor(&self) -> SchemaDescriptor {
        match self {
            SchemaKind::BookAnalysis => BookAnalysis::schema(),
            SchemaKind::Recommendations => <Vec<Recommendation>>::schema(),
            SchemaKind::Refinement => Refinement::schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_schema_for_array_contract() {
        let schema = SchemaKind::Recommendations.descriptor().to_gemini_schema();
        assert_eq!(schema["type"], "ARRAY");
        assert_eq!(schema["items"]["type"], "OBJECT");
        assert_eq!(schema["items"]["properties"]["matchScore"]["type"], "INTEGER");
        assert_eq!(schema["items"]["required"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn json_schema_for_object_contract() {
        let schema = BookAnalysis::schema().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["confidence"]["type"], "integer");
        assert!(schema["required"]
            .as_array()
            .unwrap()
            .contains(&json!("problemSolved")));
        assert!(!BookAnalysis::schema().is_array());
    }

    #[test]
    fn confidence_is_clamped() {
        let analysis = BookAnalysis {
            problem_solved: "p".into(),
            limitations: "l".into(),
            audience_fit: "a".into(),
            recommended_depth: "d".into(),
            confidence: 250,
        };
        assert_eq!(analysis.clone().normalize().confidence, 100);
        let negative = BookAnalysis {
            confidence: -3,
            ..analysis
        };
        assert_eq!(negative.normalize().confidence, 0);
    }
}
