//! Typed views of the Airtable tables backing Krypton-Graph.
//!
//! Raw JSON coming back from the REST API is parsed into one of the
//! per-table field structs before anything else touches it.

use std::{fmt, str::FromStr};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Ontologies,
    EntityDefinitions,
    EdgeDefinitions,
    TestDatasets,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Ontologies,
        Table::EntityDefinitions,
        Table::EdgeDefinitions,
        Table::TestDatasets,
    ];

    /// Key used in the `airtable.tables` config mapping and in proxy URLs.
    pub fn logical_name(&self) -> &'static str {
        match self {
            Table::Ontologies => "ontologies",
            Table::EntityDefinitions => "entity_definitions",
            Table::EdgeDefinitions => "edge_definitions",
            Table::TestDatasets => "test_datasets",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

impl FromStr for Table {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Table::ALL
            .into_iter()
            .find(|table| table.logical_name() == normalized)
            .ok_or_else(|| anyhow!("unknown table '{s}'"))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum OntologyStatus {
    #[default]
    Draft,
    Testing,
    Published,
    Deprecated,
}

impl OntologyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OntologyStatus::Draft => "Draft",
            OntologyStatus::Testing => "Testing",
            OntologyStatus::Published => "Published",
            OntologyStatus::Deprecated => "Deprecated",
        }
    }
}

impl FromStr for OntologyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(OntologyStatus::Draft),
            "testing" => Ok(OntologyStatus::Testing),
            "published" => Ok(OntologyStatus::Published),
            "deprecated" => Ok(OntologyStatus::Deprecated),
            other => Err(anyhow!("unknown ontology status '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AirtableRecord<F> {
    pub id: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    pub fields: F,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct OntologyFields {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Domain", default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: OntologyStatus,
    #[serde(rename = "Notes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EntityDefinitionFields {
    #[serde(rename = "Entity Name")]
    pub entity_name: String,
    #[serde(rename = "Entity Class", default, skip_serializing_if = "Option::is_none")]
    pub entity_class: Option<String>,
    #[serde(rename = "Properties JSON", default, skip_serializing_if = "Option::is_none")]
    pub properties_json: Option<String>,
    #[serde(rename = "Examples", default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
    #[serde(rename = "Priority", default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Ontology", default, skip_serializing_if = "Vec::is_empty")]
    pub ontology: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EdgeDefinitionFields {
    #[serde(rename = "Edge Name")]
    pub edge_name: String,
    #[serde(rename = "Edge Class", default, skip_serializing_if = "Option::is_none")]
    pub edge_class: Option<String>,
    #[serde(rename = "Source Entity", default, skip_serializing_if = "Vec::is_empty")]
    pub source_entity: Vec<String>,
    #[serde(rename = "Target Entity", default, skip_serializing_if = "Vec::is_empty")]
    pub target_entity: Vec<String>,
    #[serde(rename = "Cardinality", default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<String>,
    #[serde(rename = "Bidirectional", default)]
    pub bidirectional: bool,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Ontology", default, skip_serializing_if = "Vec::is_empty")]
    pub ontology: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TestDatasetFields {
    #[serde(rename = "Dataset Name")]
    pub dataset_name: String,
    #[serde(rename = "Domain", default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "Content Type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "Sample Data", default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<String>,
    #[serde(rename = "Expected Entities JSON", default, skip_serializing_if = "Option::is_none")]
    pub expected_entities_json: Option<String>,
    #[serde(rename = "Expected Edges JSON", default, skip_serializing_if = "Option::is_none")]
    pub expected_edges_json: Option<String>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// One validated row from any known table.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum TableRecord {
    Ontology(AirtableRecord<OntologyFields>),
    EntityDefinition(AirtableRecord<EntityDefinitionFields>),
    EdgeDefinition(AirtableRecord<EdgeDefinitionFields>),
    TestDataset(AirtableRecord<TestDatasetFields>),
}

impl TableRecord {
    pub fn parse(table: Table, raw: Value) -> Result<Self> {
        Ok(match table {
            Table::Ontologies => TableRecord::Ontology(parse_record(table, raw)?),
            Table::EntityDefinitions => TableRecord::EntityDefinition(parse_record(table, raw)?),
            Table::EdgeDefinitions => TableRecord::EdgeDefinition(parse_record(table, raw)?),
            Table::TestDatasets => TableRecord::TestDataset(parse_record(table, raw)?),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            TableRecord::Ontology(record) => &record.id,
            TableRecord::EntityDefinition(record) => &record.id,
            TableRecord::EdgeDefinition(record) => &record.id,
            TableRecord::TestDataset(record) => &record.id,
        }
    }
}

pub fn parse_record<F: DeserializeOwned>(table: Table, raw: Value) -> Result<AirtableRecord<F>> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<missing id>")
        .to_string();
    serde_json::from_value(raw).with_context(|| format!("malformed {table} record {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_names_parse_loosely() {
        assert_eq!("Entity-Definitions".parse::<Table>().unwrap(), Table::EntityDefinitions);
        assert_eq!("ontologies".parse::<Table>().unwrap(), Table::Ontologies);
        assert!("users".parse::<Table>().is_err());
    }

    #[test]
    fn ontology_record_round_trips_airtable_field_names() {
        let raw = json!({
            "id": "rec123",
            "createdTime": "2025-01-01T00:00:00.000Z",
            "fields": {
                "Name": "Healthcare Knowledge Graph",
                "Domain": "Healthcare",
                "Version": "1.0",
                "Status": "Published"
            }
        });

        let record = TableRecord::parse(Table::Ontologies, raw).unwrap();
        let TableRecord::Ontology(ontology) = &record else {
            panic!("expected ontology record");
        };
        assert_eq!(record.id(), "rec123");
        assert_eq!(ontology.fields.status, OntologyStatus::Published);
        assert_eq!(ontology.fields.domain.as_deref(), Some("Healthcare"));

        let serialized = serde_json::to_value(&record).unwrap();
        assert_eq!(serialized["table"], "ontology");
        assert_eq!(serialized["fields"]["Name"], "Healthcare Knowledge Graph");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let raw = json!({"id": "recX", "fields": {"Domain": "Finance"}});
        let err = TableRecord::parse(Table::Ontologies, raw).unwrap_err();
        assert!(err.to_string().contains("recX"));
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!("deprecated".parse::<OntologyStatus>().unwrap(), OntologyStatus::Deprecated);
        assert!("archived".parse::<OntologyStatus>().is_err());
    }
}
