//! Retrieval core for InvestIQ.
//!
//! A flat L2 index, the aligned document store, the ingested-file tracker and
//! their on-disk snapshot, driven through [`KnowledgeBase`].
pub mod flat;
pub mod knowledge_base;
pub mod relevance;
pub mod snapshot;
pub mod store;

pub use flat::{FlatL2Index, Neighbor};
pub use knowledge_base::{
    similarity_from_squared_l2, KnowledgeBase, KnowledgeBaseStats, SyncFailure, SyncReport, DEFAULT_TOP_K,
};
pub use relevance::{build_prompt, ContextDecision, RelevancePolicy};
pub use store::{DocumentStore, IngestionTracker};
