//! shapekey Core - Data Model and Fingerprints
//!
//! Statements, mutations and dependency records, plus the deterministic
//! canonical encoding and the SHA-256 shape id derived from it.
//! No invalidation logic lives here; see shapekey-engine.

pub mod canonical;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod mutation;
pub mod scalar;
pub mod schema;
pub mod shape_id;
pub mod statement;
pub mod validate;

pub use canonical::{canonicalize, canonicalize_statement, format_float, statement_shape_id, strip_diagnostics};
pub use config::EngineConfig;
pub use dependencies::{Dependencies, GroupByKv, PaginationBoundary};
pub use error::{ConfigError, EncodingError, ShapeError, ShapeResult, StoreError, ValidationError};
pub use mutation::{Action, Change, Kv, Mutation};
pub use scalar::{composite_id, row_identifier, scalar_to_id, COMPOSITE_SEPARATOR};
pub use schema::{AppSchema, IdConfig, ModelSchema, Relation};
pub use shape_id::{compute_shape_id, ShapeId, SHAPE_ID_HEX_LENGTH, SHAPE_ID_LENGTH, SHAPE_ID_PREFIX};
pub use statement::{
    Condition, Filter, Include, KnownOp, Operator, OrderBy, Pagination, Query, RelationKind,
    Statement, CUSTOM_OP_PREFIX, DIAGNOSTIC_FIELDS,
};
pub use validate::{validate_change, validate_dependencies, validate_mutation, validate_statement};

/// Version of the statement/mutation/dependencies contract.
pub const CONTRACT_VERSION: &str = "1";

/// Version of the in-process call surface.
pub const ABI_VERSION: &str = "1";
