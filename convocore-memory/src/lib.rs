//! Write-through indexing of completed turns to the retrieval store
//! (spec.md §4.6).

pub mod indexer;
pub mod memstore;

pub use indexer::VectorIndexer;
pub use memstore::InMemoryVectorStore;
