pub mod export;
pub mod filter;
pub mod types;

pub use export::{ExportFormat, export_graph};
pub use filter::{AttributeFilter, DateRange, FilterManager, FilterOperator, GraphFilters};
pub use types::{GraphData, GraphEdge, GraphMetadata, GraphNode, NodeType, Position};
