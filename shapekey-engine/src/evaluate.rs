//! Invalidation evaluation.
//!
//! Six independent rules are applied to every `(change, dependencies)` pair.
//! A shape is invalidated when any rule fires for any change. Rules err on
//! the side of eviction: whenever the outcome cannot be decided from the
//! change alone, the rule fires.

use crate::predicate::{compare_values, eval_filter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shapekey_core::{
    Action, Change, Dependencies, EngineConfig, Include, Mutation, PaginationBoundary,
    RelationKind, ShapeId,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// REASONS
// ============================================================================

/// Why a shape is invalidated. Declaration order is rule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// The changed model has specific rows tracked in the result.
    RecordMembership,
    /// A write could move a row across a stored filter boundary.
    FilterDependency,
    /// A write touches a relation loaded into or filtering the result.
    RelationDependency,
    /// A write could change which rows fall inside an ordered page.
    BoundaryShift,
    /// A write could create or move a group.
    GroupMembership,
    /// A `custom:*` operator on the changed model has unknown semantics.
    CustomOperator,
}

impl InvalidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::RecordMembership => "record_membership",
            InvalidationReason::FilterDependency => "filter_dependency",
            InvalidationReason::RelationDependency => "relation_dependency",
            InvalidationReason::BoundaryShift => "boundary_shift",
            InvalidationReason::GroupMembership => "group_membership",
            InvalidationReason::CustomOperator => "custom_operator",
        }
    }
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Applies the invalidation rules.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    precise_inserts: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            precise_inserts: true,
        }
    }
}

impl Evaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            precise_inserts: config.precise_inserts,
        }
    }

    /// Shapes among `records` that `mutation` invalidates, sorted.
    pub fn invalidate<'d, I>(&self, mutation: &Mutation, records: I) -> BTreeSet<ShapeId>
    where
        I: IntoIterator<Item = &'d Dependencies>,
    {
        records
            .into_iter()
            .filter(|deps| self.should_invalidate(mutation, deps))
            .map(|deps| deps.shape_id.clone())
            .collect()
    }

    /// Whether any rule fires for any change. Stops at the first hit.
    pub fn should_invalidate(&self, mutation: &Mutation, deps: &Dependencies) -> bool {
        mutation
            .changes
            .iter()
            .any(|change| !self.reasons_for_change(change, deps).is_empty())
    }

    /// Every reason across all changes, deduplicated in rule order.
    ///
    /// Unknown shapes have no dependencies and yield no reasons.
    pub fn explain(&self, mutation: &Mutation, deps: Option<&Dependencies>) -> Vec<InvalidationReason> {
        let Some(deps) = deps else {
            return Vec::new();
        };
        let reasons: BTreeSet<InvalidationReason> = mutation
            .changes
            .iter()
            .flat_map(|change| self.reasons_for_change(change, deps))
            .collect();
        reasons.into_iter().collect()
    }

    /// Rules that fire for one change, in rule order.
    pub fn reasons_for_change(&self, change: &Change, deps: &Dependencies) -> Vec<InvalidationReason> {
        let mut reasons = Vec::new();
        let on_primary = deps.model.as_deref() == Some(change.model.as_str());
        let excluded = on_primary && self.insert_excluded_by_filters(change, deps);

        if deps.records.contains_key(&change.model) {
            reasons.push(InvalidationReason::RecordMembership);
        }

        // Without `where` the primary model is bounded by the match-all
        // filter, so any write to it is a potential crossing.
        if on_primary && !excluded {
            reasons.push(InvalidationReason::FilterDependency);
        }

        if deps.relations.contains(&change.model)
            || deps
                .includes
                .iter()
                .any(|inc| self.include_affected(change, inc))
        {
            reasons.push(InvalidationReason::RelationDependency);
        }

        // Boundary and group rules fire only on the primary model and only
        // when the filter rule above has fired too (`excluded` is never set
        // for aggregates). They sharpen the explanation, not the eviction.
        if let Some(boundary) = deps.last_row.as_ref().filter(|_| on_primary) {
            if !excluded && boundary_shifts(change, boundary) {
                reasons.push(InvalidationReason::BoundaryShift);
            }
        }

        if let Some(group) = deps.group_by.as_ref().filter(|_| on_primary) {
            let fires = match change.action {
                Action::Delete => true,
                Action::Update => change.touches_any(&group.keys),
                Action::Insert => match assigned_tuple(change, &group.keys) {
                    Some(tuple) => !group.contains_tuple(&tuple),
                    None => true,
                },
            };
            if fires {
                reasons.push(InvalidationReason::GroupMembership);
            }
        }

        if uses_custom_operator(change, deps, on_primary) {
            reasons.push(InvalidationReason::CustomOperator);
        }

        for reason in &reasons {
            tracing::trace!(
                shape_id = %deps.shape_id,
                model = %change.model,
                action = change.action.as_str(),
                reason = %reason,
                "Invalidation rule fired"
            );
        }
        reasons
    }

    /// True only when the change is an insert that provably fails every
    /// stored filter of the primary model.
    fn insert_excluded_by_filters(&self, change: &Change, deps: &Dependencies) -> bool {
        self.precise_inserts
            && change.action == Action::Insert
            && !deps.aggregate
            && !deps.opaque
            && !deps.filters.is_empty()
            && deps
                .filters
                .iter()
                .all(|filter| eval_filter(filter, change) == Some(false))
    }

    fn include_affected(&self, change: &Change, include: &Include) -> bool {
        if include.model() != Some(change.model.as_str()) {
            return false;
        }
        // An insert that fails the relation filter cannot add a qualifying
        // related row, so `some` and `none` keep their truth value. `every`
        // flips on exactly such a row.
        let narrowable = matches!(include.kind, Some(RelationKind::Some | RelationKind::None))
            && include.extra.is_empty();
        if self.precise_inserts && change.action == Action::Insert && narrowable {
            let query = include.query.as_ref().filter(|q| q.extra.is_empty());
            if let Some(filter) = query.and_then(|q| q.filter.as_ref()) {
                return eval_filter(filter, change) != Some(false);
            }
        }
        true
    }
}

// ============================================================================
// RULE HELPERS
// ============================================================================

fn uses_custom_operator(change: &Change, deps: &Dependencies, on_primary: bool) -> bool {
    if on_primary && deps.filters.iter().any(|f| f.has_custom_operator()) {
        return true;
    }
    deps.includes.iter().any(|inc| {
        inc.model() == Some(change.model.as_str())
            && inc
                .query
                .as_ref()
                .and_then(|q| q.filter.as_ref())
                .is_some_and(|f| f.has_custom_operator())
    })
}

fn boundary_shifts(change: &Change, boundary: &PaginationBoundary) -> bool {
    match change.action {
        Action::Delete => true,
        Action::Update => {
            change.touches_any(
                &boundary
                    .order_by
                    .iter()
                    .map(|o| o.field.as_str())
                    .collect::<Vec<_>>(),
            ) || boundary
                .cursor
                .as_ref()
                .is_some_and(|c| change.assigned(&c.field).is_some())
        }
        // Unknown position counts as inside the page.
        Action::Insert => sorts_at_or_before(change, boundary).unwrap_or(true),
    }
}

/// Position of an inserted row relative to the boundary row.
///
/// `None` when any compared value is missing or incomparable. Text keys
/// always land here since their order belongs to the column collation.
fn sorts_at_or_before(change: &Change, boundary: &PaginationBoundary) -> Option<bool> {
    for order in &boundary.order_by {
        let new = change.assigned(&order.field)?;
        let old = boundary.row.get(&order.field)?;
        let ordering = match (new.is_null(), old.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if order.nulls_sort_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if order.nulls_sort_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(new, old)?;
                if order.is_descending() {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        match ordering {
            Ordering::Less => return Some(true),
            Ordering::Greater => return Some(false),
            Ordering::Equal => {}
        }
    }

    // Full tie: the cursor breaks it in the direction of the last key.
    let Some(cursor) = &boundary.cursor else {
        return Some(true);
    };
    let new = change.assigned(&cursor.field)?;
    let ord = compare_values(new, &cursor.value)?;
    let descending = boundary.order_by.last().is_some_and(|o| o.is_descending());
    let ord = if descending { ord.reverse() } else { ord };
    Some(ord != Ordering::Greater)
}

fn assigned_tuple(change: &Change, keys: &[String]) -> Option<BTreeMap<String, Value>> {
    keys.iter()
        .map(|k| change.assigned(k).map(|v| (k.clone(), v.clone())))
        .collect()
}
