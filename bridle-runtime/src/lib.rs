//! Bridle runtime: vocabulary canonicalization, regex certification,
//! automaton compilation and caching, and per-request guides.

pub mod automaton;
pub mod backend;
pub mod cache;
pub mod canonical;
pub mod certify;
pub mod compiler;
pub mod config;
pub mod disk;
pub mod guide;
pub mod json_schema;
pub mod processor;

pub use automaton::{RegexEngine, TokenIndex};
pub use backend::{Grammar, GuidedDecodingBackend};
pub use cache::{AutomatonCache, CacheKey, CacheStats};
pub use canonical::build_vocabulary;
pub use certify::certify;
pub use compiler::GrammarCompiler;
pub use config::{CacheConfig, DiskCacheConfig, GuidedDecodingConfig};
pub use guide::{Guide, GuideStatus};
pub use json_schema::JsonSchemaTranslator;
pub use processor::{GuidedLogitsProcessor, ReasoningBoundary};
