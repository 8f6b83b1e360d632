//! `ShapeEngine`: the explicitly owned entry point.
//!
//! One engine holds one schema and one dependency store. Independent engines
//! in the same process share nothing.

use crate::evaluate::{Evaluator, InvalidationReason};
use crate::extract::{extract, ExtractContext, ResultHint};
use crate::store::{DependencyStore, StoreStats};
use serde::{Deserialize, Serialize};
use shapekey_core::{
    statement_shape_id, validate_mutation, validate_statement, AppSchema, Dependencies,
    EngineConfig, Mutation, ShapeError, ShapeId, ShapeResult, Statement, StoreError,
    ABI_VERSION, CONTRACT_VERSION,
};
use std::collections::BTreeSet;
use std::sync::RwLock;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// A statement observed with (optionally) the rows it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddQueryRequest {
    pub shape: Statement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_hint: Option<ResultHint>,
}

impl AddQueryRequest {
    pub fn new(shape: Statement) -> Self {
        Self {
            shape,
            result_hint: None,
        }
    }

    pub fn with_result_hint(mut self, hint: ResultHint) -> Self {
        self.result_hint = Some(hint);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddQueryResponse {
    pub shape_id: ShapeId,
    pub dependencies: Dependencies,
}

/// Shapes evicted by a mutation, sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub evict: Vec<ShapeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub mutation: Mutation,
    pub shape_id: ShapeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub invalidate: bool,
    pub reasons: Vec<InvalidationReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub core: String,
    pub contract: String,
    pub abi: String,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug)]
pub struct ShapeEngine {
    config: EngineConfig,
    evaluator: Evaluator,
    schema: RwLock<Option<AppSchema>>,
    store: DependencyStore,
}

impl Default for ShapeEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            evaluator: Evaluator::new(&config),
            config,
            schema: RwLock::new(None),
            store: DependencyStore::new(),
        }
    }
}

impl ShapeEngine {
    /// Create an engine after validating `config`.
    pub fn new(config: EngineConfig) -> ShapeResult<Self> {
        config.validate()?;
        Ok(Self {
            evaluator: Evaluator::new(&config),
            config,
            schema: RwLock::new(None),
            store: DependencyStore::new(),
        })
    }

    /// Create an engine configured from the environment.
    pub fn from_env() -> ShapeResult<Self> {
        Self::new(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the application schema, replacing any previous one.
    ///
    /// Records already stored keep the resolution they were extracted with.
    pub fn set_schema(&self, schema: AppSchema) -> ShapeResult<()> {
        schema.validate()?;
        let models = schema.models.len();
        let version = schema.version;
        *self.schema.write().map_err(|_| poisoned("schema"))? = Some(schema);
        tracing::info!(version, models, "Schema installed");
        Ok(())
    }

    /// Validate and fingerprint a statement.
    pub fn shape_id(&self, statement: &Statement) -> ShapeResult<ShapeId> {
        validate_statement(statement)?;
        statement_shape_id(statement)
    }

    /// Fingerprint a statement, extract its dependencies and store them.
    ///
    /// A later call for the same shape replaces the stored record.
    pub fn add_query(&self, request: AddQueryRequest) -> ShapeResult<AddQueryResponse> {
        let shape_id = self.shape_id(&request.shape)?;
        let dependencies = {
            let schema = self.schema.read().map_err(|_| poisoned("schema"))?;
            extract(
                &request.shape,
                &shape_id,
                request.result_hint.as_ref(),
                ExtractContext::new(schema.as_ref(), &self.config),
            )
        };
        self.store.upsert(dependencies.clone())?;
        Ok(AddQueryResponse {
            shape_id,
            dependencies,
        })
    }

    /// Decide which stored shapes `mutation` invalidates and evict them.
    pub fn invalidate(&self, mutation: &Mutation) -> ShapeResult<InvalidateResponse> {
        validate_mutation(mutation)?;
        let candidates = self.store.candidates(&mutation.models())?;
        let hits: BTreeSet<ShapeId> = self
            .evaluator
            .invalidate(mutation, candidates.iter().map(|d| &**d));
        let evicted = self.store.evict(&hits)?;

        tracing::info!(
            tx_id = mutation.tx_id.as_deref().unwrap_or(""),
            changes = mutation.changes.len(),
            candidates = candidates.len(),
            evicted,
            "Mutation evaluated"
        );

        Ok(InvalidateResponse {
            evict: hits.into_iter().collect(),
        })
    }

    /// Explain the decision for one shape without evicting anything.
    ///
    /// Unknown shapes yield `{invalidate: false, reasons: []}`.
    pub fn explain(&self, request: &ExplainRequest) -> ShapeResult<ExplainResponse> {
        validate_mutation(&request.mutation)?;
        let deps = self.store.get(&request.shape_id)?;
        let reasons = self.evaluator.explain(&request.mutation, deps.as_deref());
        tracing::debug!(
            shape_id = %request.shape_id,
            known = deps.is_some(),
            reasons = reasons.len(),
            "Explained invalidation"
        );
        Ok(ExplainResponse {
            invalidate: !reasons.is_empty(),
            reasons,
        })
    }

    /// Stored record for a shape, if it is live.
    pub fn dependencies(&self, shape_id: &ShapeId) -> ShapeResult<Option<Dependencies>> {
        Ok(self.store.get(shape_id)?.map(|d| d.as_ref().clone()))
    }

    /// Clear every stored record and the installed schema.
    pub fn reset(&self) -> ShapeResult<()> {
        self.store.reset()?;
        *self.schema.write().map_err(|_| poisoned("schema"))? = None;
        Ok(())
    }

    pub fn stats(&self) -> ShapeResult<StoreStats> {
        self.store.stats()
    }

    pub fn version(&self) -> VersionInfo {
        VersionInfo {
            core: env!("CARGO_PKG_VERSION").to_string(),
            contract: CONTRACT_VERSION.to_string(),
            abi: ABI_VERSION.to_string(),
        }
    }
}

fn poisoned(lock: &str) -> ShapeError {
    tracing::warn!(lock, "Engine lock poisoned");
    ShapeError::Store(StoreError::LockPoisoned)
}
