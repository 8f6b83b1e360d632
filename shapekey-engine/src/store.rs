//! In-memory dependency store.
//!
//! A single reader-writer lock guards the shape map and its model index, so
//! a replacement or reset is never observed half-applied. Records are shared
//! as `Arc`s; readers clone the pointer and release the lock before
//! evaluating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shapekey_core::{Dependencies, ShapeError, ShapeId, ShapeResult, StoreError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct StoreState {
    shapes: HashMap<ShapeId, Arc<Dependencies>>,
    /// Model name to every shape whose record references it.
    by_model: HashMap<String, HashSet<ShapeId>>,
    evictions: u64,
    last_reset_at: Option<DateTime<Utc>>,
}

impl StoreState {
    fn index(&mut self, deps: &Dependencies) {
        for model in deps.referenced_models() {
            self.by_model
                .entry(model.to_string())
                .or_default()
                .insert(deps.shape_id.clone());
        }
    }

    fn unindex(&mut self, deps: &Dependencies) {
        for model in deps.referenced_models() {
            if let Some(ids) = self.by_model.get_mut(model) {
                ids.remove(&deps.shape_id);
                if ids.is_empty() {
                    self.by_model.remove(model);
                }
            }
        }
    }
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live records.
    pub entries: usize,
    /// Models with at least one live record referencing them.
    pub indexed_models: usize,
    /// Records removed by invalidation since creation.
    pub evictions: u64,
    pub last_reset_at: Option<DateTime<Utc>>,
}

/// Map of shape id to its live dependency record.
#[derive(Debug, Default)]
pub struct DependencyStore {
    state: RwLock<StoreState>,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ShapeResult<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| {
            tracing::warn!("Dependency store lock poisoned on read");
            ShapeError::Store(StoreError::LockPoisoned)
        })
    }

    fn write(&self) -> ShapeResult<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| {
            tracing::warn!("Dependency store lock poisoned on write");
            ShapeError::Store(StoreError::LockPoisoned)
        })
    }

    /// Store a record, replacing any record with the same shape id.
    ///
    /// Returns the replaced record.
    pub fn upsert(&self, deps: Dependencies) -> ShapeResult<Option<Arc<Dependencies>>> {
        let mut state = self.write()?;
        let previous = state.shapes.remove(&deps.shape_id);
        if let Some(prev) = &previous {
            state.unindex(prev);
        }
        state.index(&deps);
        state.shapes.insert(deps.shape_id.clone(), Arc::new(deps));
        Ok(previous)
    }

    pub fn get(&self, shape_id: &ShapeId) -> ShapeResult<Option<Arc<Dependencies>>> {
        Ok(self.read()?.shapes.get(shape_id).cloned())
    }

    /// Records referencing any of `models`, ordered by shape id.
    pub fn candidates<S: AsRef<str>>(&self, models: &[S]) -> ShapeResult<Vec<Arc<Dependencies>>> {
        let state = self.read()?;
        let ids: BTreeSet<&ShapeId> = models
            .iter()
            .filter_map(|m| state.by_model.get(m.as_ref()))
            .flatten()
            .collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| state.shapes.get(id).cloned())
            .collect())
    }

    /// Every live record, ordered by shape id.
    pub fn snapshot(&self) -> ShapeResult<Vec<Arc<Dependencies>>> {
        let state = self.read()?;
        let mut all: Vec<Arc<Dependencies>> = state.shapes.values().cloned().collect();
        all.sort_by(|a, b| a.shape_id.cmp(&b.shape_id));
        Ok(all)
    }

    /// Remove the given records. Unknown ids are ignored.
    ///
    /// Returns how many records were removed.
    pub fn evict<'a, I>(&self, shape_ids: I) -> ShapeResult<usize>
    where
        I: IntoIterator<Item = &'a ShapeId>,
    {
        let mut state = self.write()?;
        let mut removed = 0;
        for id in shape_ids {
            if let Some(deps) = state.shapes.remove(id) {
                state.unindex(&deps);
                removed += 1;
            }
        }
        state.evictions += removed as u64;
        Ok(removed)
    }

    /// Drop every record.
    pub fn reset(&self) -> ShapeResult<()> {
        let mut state = self.write()?;
        let dropped = state.shapes.len();
        state.shapes.clear();
        state.by_model.clear();
        state.last_reset_at = Some(Utc::now());
        tracing::info!(dropped, "Dependency store reset");
        Ok(())
    }

    pub fn len(&self) -> ShapeResult<usize> {
        Ok(self.read()?.shapes.len())
    }

    pub fn is_empty(&self) -> ShapeResult<bool> {
        Ok(self.read()?.shapes.is_empty())
    }

    pub fn stats(&self) -> ShapeResult<StoreStats> {
        let state = self.read()?;
        Ok(StoreStats {
            entries: state.shapes.len(),
            indexed_models: state.by_model.len(),
            evictions: state.evictions,
            last_reset_at: state.last_reset_at,
        })
    }
}
