//! Lexical heuristics for deciding what to keep from a conversation.
//!
//! - [`classifier`] answers "is this reply worth retaining as a fact?"
//! - [`extractor`] reduces a user/assistant exchange to one tagged clause.
//!
//! Neither component can fail: every input yields a definite answer.

pub mod classifier;
pub mod extractor;

pub use classifier::{is_fact, Classification, FactClassifier, DEFAULT_MAX_WORDS};
pub use extractor::{extract_context, is_valid_context, ContextExtractor, ContextSummary, ExtractionRule};
