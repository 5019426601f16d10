pub mod client;
pub mod formula;
pub mod ontology;
pub mod records;

pub use client::AirtableClient;
pub use ontology::{
    AirtableOntologyRepository, EdgeTypeDefinition, EntityTypeDefinition,
    InMemoryOntologyRepository, NewOntology, Ontology, OntologyRepository, OntologyService,
};
pub use records::{AirtableRecord, OntologyStatus, Table, TableRecord};
