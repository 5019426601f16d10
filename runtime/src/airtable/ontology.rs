use std::{collections::HashMap, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    client::AirtableClient,
    formula,
    records::{
        AirtableRecord, EdgeDefinitionFields, EntityDefinitionFields, OntologyFields,
        OntologyStatus, Table,
    },
};
use crate::error::{AppError, AppResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ontology {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub version: Option<String>,
    pub status: OntologyStatus,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

impl From<AirtableRecord<OntologyFields>> for Ontology {
    fn from(record: AirtableRecord<OntologyFields>) -> Self {
        Self {
            id: record.id,
            name: record.fields.name,
            domain: record.fields.domain,
            version: record.fields.version,
            status: record.fields.status,
            notes: record.fields.notes,
            created_at: record.created_time,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOntology {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_types: Vec<String>,
    #[serde(default)]
    pub target_types: Vec<String>,
}

#[async_trait]
pub trait OntologyRepository: Send + Sync {
    async fn list(
        &self,
        domain: Option<&str>,
        status: Option<OntologyStatus>,
    ) -> Result<Vec<Ontology>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Ontology>>;

    async fn insert(&self, ontology: NewOntology) -> Result<Ontology>;

    async fn set_status(&self, id: &str, status: OntologyStatus) -> Result<Ontology>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn add_type_definitions(
        &self,
        ontology_id: &str,
        entity_types: &[EntityTypeDefinition],
        edge_types: &[EdgeTypeDefinition],
    ) -> Result<()>;
}

/// Domain operations on ontologies, independent of where they are stored.
#[derive(Clone)]
pub struct OntologyService {
    repo: Arc<dyn OntologyRepository>,
}

impl OntologyService {
    pub fn new(repo: Arc<dyn OntologyRepository>) -> Self {
        Self { repo }
    }

    pub async fn find_by_domain(&self, domain: &str) -> AppResult<Vec<Ontology>> {
        Ok(self.repo.list(Some(domain), None).await?)
    }

    pub async fn find_by_status(&self, status: OntologyStatus) -> AppResult<Vec<Ontology>> {
        Ok(self.repo.list(None, Some(status)).await?)
    }

    pub async fn list(
        &self,
        domain: Option<&str>,
        status: Option<OntologyStatus>,
    ) -> AppResult<Vec<Ontology>> {
        Ok(self.repo.list(domain, status).await?)
    }

    pub async fn create(&self, mut new: NewOntology) -> AppResult<Ontology> {
        new.name = new.name.trim().to_string();
        if new.name.is_empty() {
            return Err(AppError::validation("Ontology name is required"));
        }

        if self.repo.find_by_name(&new.name).await?.is_some() {
            return Err(AppError::Duplicate(format!(
                "An ontology named '{}' already exists",
                new.name
            )));
        }

        let ontology = self.repo.insert(new).await?;
        info!(ontology_id = %ontology.id, name = %ontology.name, "ontology created");
        Ok(ontology)
    }

    pub async fn publish(&self, id: &str) -> AppResult<Ontology> {
        Ok(self.repo.set_status(id, OntologyStatus::Published).await?)
    }

    pub async fn deprecate(&self, id: &str) -> AppResult<Ontology> {
        Ok(self.repo.set_status(id, OntologyStatus::Deprecated).await?)
    }

    /// Creates a draft ontology holding the accepted suggestions for a document.
    ///
    /// The draft is removed again if its type definitions cannot be stored.
    pub async fn create_from_suggestions(
        &self,
        document_id: &str,
        entity_types: &[EntityTypeDefinition],
        edge_types: &[EdgeTypeDefinition],
    ) -> AppResult<Ontology> {
        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        let suffix = Uuid::new_v4().simple().to_string();
        let ontology = self
            .create(NewOntology {
                name: format!("Suggested types for {document_id} ({stamp}, {})", &suffix[..8]),
                domain: None,
                version: Some("1.0".to_string()),
                notes: Some(format!(
                    "Generated from document {document_id}: {} entity types, {} edge types",
                    entity_types.len(),
                    edge_types.len()
                )),
            })
            .await?;

        if let Err(err) = self
            .repo
            .add_type_definitions(&ontology.id, entity_types, edge_types)
            .await
        {
            match self.repo.delete(&ontology.id).await {
                Ok(()) => {
                    info!(ontology_id = %ontology.id, "removed draft after failed type import")
                }
                Err(cleanup) => warn!(
                    ontology_id = %ontology.id,
                    error = %cleanup,
                    "draft ontology left behind after failed type import"
                ),
            }
            return Err(err.into());
        }
        Ok(ontology)
    }
}

pub struct AirtableOntologyRepository {
    client: Arc<AirtableClient>,
}

impl AirtableOntologyRepository {
    pub fn new(client: Arc<AirtableClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OntologyRepository for AirtableOntologyRepository {
    async fn list(
        &self,
        domain: Option<&str>,
        status: Option<OntologyStatus>,
    ) -> Result<Vec<Ontology>> {
        let mut clauses = Vec::new();
        if let Some(domain) = domain {
            clauses.push(formula::field_equals("Domain", domain));
        }
        if let Some(status) = status {
            clauses.push(formula::field_equals("Status", status.as_str()));
        }
        let filter = formula::and(&clauses);

        let records = self
            .client
            .list_typed::<OntologyFields>(Table::Ontologies, Some(&filter))
            .await?;
        Ok(records.into_iter().map(Ontology::from).collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Ontology>> {
        let filter = formula::field_equals("Name", name);
        let records = self
            .client
            .list_typed::<OntologyFields>(Table::Ontologies, Some(&filter))
            .await?;
        Ok(records.into_iter().next().map(Ontology::from))
    }

    async fn insert(&self, ontology: NewOntology) -> Result<Ontology> {
        let fields = OntologyFields {
            name: ontology.name,
            domain: ontology.domain,
            version: ontology.version,
            status: OntologyStatus::Draft,
            notes: ontology.notes,
        };
        let record = self
            .client
            .create_typed::<OntologyFields>(Table::Ontologies, serde_json::to_value(fields)?)
            .await?;
        Ok(record.into())
    }

    async fn set_status(&self, id: &str, status: OntologyStatus) -> Result<Ontology> {
        let record = self
            .client
            .update_typed::<OntologyFields>(
                Table::Ontologies,
                id,
                json!({ "Status": status.as_str() }),
            )
            .await?;
        Ok(record.into())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete_record(Table::Ontologies, id).await
    }

    async fn add_type_definitions(
        &self,
        ontology_id: &str,
        entity_types: &[EntityTypeDefinition],
        edge_types: &[EdgeTypeDefinition],
    ) -> Result<()> {
        let entity_fields = entity_types
            .iter()
            .map(|entity| {
                serde_json::to_value(EntityDefinitionFields {
                    entity_name: entity.name.clone(),
                    examples: (!entity.examples.is_empty()).then(|| entity.examples.join(", ")),
                    description: Some(entity.description.clone()),
                    ontology: vec![ontology_id.to_string()],
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<Value>, _>>()?;

        let created = self
            .client
            .create_many_typed::<EntityDefinitionFields>(Table::EntityDefinitions, entity_fields)
            .await?;
        let ids_by_name: HashMap<String, String> = created
            .into_iter()
            .map(|record| (record.fields.entity_name, record.id))
            .collect();
        let link = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .filter_map(|name| ids_by_name.get(name).cloned())
                .collect()
        };

        let edge_fields = edge_types
            .iter()
            .map(|edge| {
                serde_json::to_value(EdgeDefinitionFields {
                    edge_name: edge.name.clone(),
                    source_entity: link(&edge.source_types),
                    target_entity: link(&edge.target_types),
                    description: Some(edge.description.clone()),
                    ontology: vec![ontology_id.to_string()],
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<Value>, _>>()?;

        if !edge_fields.is_empty() {
            self.client
                .create_many_typed::<EdgeDefinitionFields>(Table::EdgeDefinitions, edge_fields)
                .await?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct StoredOntology {
    ontology: Ontology,
    entity_types: Vec<EntityTypeDefinition>,
    edge_types: Vec<EdgeTypeDefinition>,
}

/// Process-local repository used when no Airtable credentials are present.
#[derive(Default)]
pub struct InMemoryOntologyRepository {
    records: RwLock<Vec<StoredOntology>>,
}

impl InMemoryOntologyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn type_counts(&self, id: &str) -> Option<(usize, usize)> {
        let guard = self.records.read().await;
        guard
            .iter()
            .find(|stored| stored.ontology.id == id)
            .map(|stored| (stored.entity_types.len(), stored.edge_types.len()))
    }
}

#[async_trait]
impl OntologyRepository for InMemoryOntologyRepository {
    async fn list(
        &self,
        domain: Option<&str>,
        status: Option<OntologyStatus>,
    ) -> Result<Vec<Ontology>> {
        let guard = self.records.read().await;
        Ok(guard
            .iter()
            .map(|stored| stored.ontology.clone())
            .filter(|o| domain.is_none_or(|d| o.domain.as_deref() == Some(d)))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Ontology>> {
        let guard = self.records.read().await;
        Ok(guard
            .iter()
            .map(|stored| &stored.ontology)
            .find(|o| o.name == name)
            .cloned())
    }

    async fn insert(&self, new: NewOntology) -> Result<Ontology> {
        let ontology = Ontology {
            id: format!("rec{}", Uuid::new_v4().simple()),
            name: new.name,
            domain: new.domain,
            version: new.version,
            status: OntologyStatus::Draft,
            notes: new.notes,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.records.write().await.push(StoredOntology {
            ontology: ontology.clone(),
            entity_types: Vec::new(),
            edge_types: Vec::new(),
        });
        Ok(ontology)
    }

    async fn set_status(&self, id: &str, status: OntologyStatus) -> Result<Ontology> {
        let mut guard = self.records.write().await;
        let ontology = guard
            .iter_mut()
            .map(|stored| &mut stored.ontology)
            .find(|o| o.id == id)
            .ok_or_else(|| AppError::not_found(format!("Ontology {id} not found")))?;
        ontology.status = status;
        Ok(ontology.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|stored| stored.ontology.id != id);
        if guard.len() == before {
            return Err(AppError::not_found(format!("Ontology {id} not found")).into());
        }
        Ok(())
    }

    async fn add_type_definitions(
        &self,
        ontology_id: &str,
        entity_types: &[EntityTypeDefinition],
        edge_types: &[EdgeTypeDefinition],
    ) -> Result<()> {
        let mut guard = self.records.write().await;
        let stored = guard
            .iter_mut()
            .find(|stored| stored.ontology.id == ontology_id)
            .ok_or_else(|| anyhow!("ontology {ontology_id} vanished before types were added"))?;
        stored.entity_types.extend_from_slice(entity_types);
        stored.edge_types.extend_from_slice(edge_types);
        Ok(())
    }
}
