pub mod analyzer;
pub mod chunker;
pub mod extractor;
pub mod suggestions;
pub mod utils;

pub use analyzer::{AnalysisJob, AnalysisResult, DocumentAnalyzer, JobState};
pub use chunker::{Chunk, ChunkConfig, Chunker, TokenizerChunker};
pub use extractor::{DocumentExtractor, DoclingExtractor, Utf8DocumentExtractor};
pub use suggestions::{
    CachedSuggestions, LlmSuggestionEngine, SuggestedEdgeType, SuggestedEntityType, TypeSuggestionEngine,
    TypeSuggestions, predict_classification_rate, suggest_for_analysis,
};
pub use utils::{TiktokenTokenizer, Tokenizer};
