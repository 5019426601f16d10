pub mod airtable;
pub mod documents;
pub mod graph;
pub mod ontologies;
pub mod suggestions;

pub mod types;

pub use airtable::airtable_routes;
pub use documents::document_routes;
pub use graph::graph_routes;
pub use ontologies::ontology_routes;
pub use suggestions::suggestion_routes;
