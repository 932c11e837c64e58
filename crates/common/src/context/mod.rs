//! Writing assistance core
//!
//! - `document_context`: bounded prompt fragment from uploaded documents
//! - `suggestions`: prompt assembly, reply parsing and the request pipeline
//! - `generation`: external language-model client abstraction

mod document_context;
mod generation;
mod suggestions;

pub use document_context::{ContextLimits, DocumentContextBuilder, SourceDocument, CONTINUES_MARKER};
pub use generation::{
    create_generation_client, AnthropicClient, GenerationClient, GenerationParams,
    MockGenerationClient,
};
pub use suggestions::{
    build_prompt, parse_suggestions, Suggestion, SuggestionKind, SuggestionPipeline,
};
