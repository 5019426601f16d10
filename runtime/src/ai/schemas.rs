use serde_json::{Value, json};

pub const TYPE_SUGGESTIONS_SCHEMA_NAME: &str = "type_suggestions";

pub const TYPE_SUGGESTIONS_SYSTEM_PROMPT: &str = "You design knowledge-graph ontologies. \
Read the document and propose the custom entity types and edge (relationship) types that \
would best classify its content. Use PascalCase for entity type names and SCREAMING_SNAKE_CASE \
for edge type names. Prefer fewer, broader types over many narrow ones. Every edge type must \
reference entity type names you proposed. Confidence is a number between 0 and 1.";

pub fn type_suggestions_schema(max_entity_types: usize, max_edge_types: usize) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "entityTypes": {
                "type": "array",
                "maxItems": max_entity_types,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "PascalCase name of the entity type, e.g. `Researcher` or `ClinicalTrial`."
                        },
                        "description": {
                            "type": "string",
                            "description": "One sentence describing which things in the document belong to this type."
                        },
                        "examples": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Up to five names taken verbatim from the document that are instances of this type."
                        },
                        "confidence": { "type": "number" }
                    },
                    "required": ["name", "description", "examples", "confidence"]
                }
            },
            "edgeTypes": {
                "type": "array",
                "maxItems": max_edge_types,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "SCREAMING_SNAKE_CASE name of the relationship, e.g. `WORKS_AT`."
                        },
                        "description": { "type": "string" },
                        "sourceTypes": {
                            "type": "array",
                            "items": { "type": "string" }
                        },
                        "targetTypes": {
                            "type": "array",
                            "items": { "type": "string" }
                        },
                        "confidence": { "type": "number" }
                    },
                    "required": ["name", "description", "sourceTypes", "targetTypes", "confidence"]
                }
            }
        },
        "required": ["entityTypes", "edgeTypes"]
    })
}
