//! Engram store - the collection-aware embedding and storage engine
//!
//! Composes the embedding layer with a vector database backend:
//!
//! - [`backend`]: the [`VectorBackend`] contract, Qdrant and in-memory
//!   implementations
//! - [`manager`]: per-collection ensure/verify with memoized outcomes
//! - [`service`]: the public operations (store, bulk store, find, get,
//!   update payload, delete, introspection)
//! - [`schema`]: payload conventions and response types
//!
//! Invariant held throughout: one collection is bound to exactly one
//! embedding model, recorded as the named vector slot in the backend.

pub mod backend;
pub mod error;
pub mod manager;
pub mod schema;
pub mod service;

// Re-exports
pub use backend::{InMemoryBackend, QdrantBackend, VectorBackend, VectorSpec};
pub use error::{Result, StoreError};
pub use manager::{CollectionManager, ResolvedCollection};
pub use schema::{
    BulkStoreReport, CollectionDetail, CollectionSummary, DeleteReport, MappingsReport,
    PointView, SearchEntry, SearchResponse, StoreReceipt, UpdateReport,
};
pub use service::MemoryService;
