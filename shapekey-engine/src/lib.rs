//! shapekey Engine - Extraction, Invalidation and the Dependency Store
//!
//! Builds dependency records for observed statements, keeps them in a
//! reader-writer locked store, and decides which shapes a mutation evicts.
//! All operations are synchronous and perform no I/O.

pub mod engine;
pub mod evaluate;
pub mod extract;
pub mod predicate;
pub mod store;

pub use engine::{
    AddQueryRequest, AddQueryResponse, ExplainRequest, ExplainResponse, InvalidateResponse,
    ShapeEngine, VersionInfo,
};
pub use evaluate::{Evaluator, InvalidationReason};
pub use extract::{extract, ExtractContext, ResultHint};
pub use predicate::{compare_values, eval_filter, values_equal};
pub use store::{DependencyStore, StoreStats};
