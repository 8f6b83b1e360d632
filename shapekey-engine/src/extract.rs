//! Dependency extraction.
//!
//! Turns a statement, its shape id and an optional hint of the rows it
//! returned into the `Dependencies` record that later writes are checked
//! against. Extraction never fails: missing or odd hint data only makes the
//! record less precise, never less safe.

use serde_json::Value;
use shapekey_core::{
    row_identifier, AppSchema, Dependencies, EngineConfig, GroupByKv, Include, Kv, OrderBy,
    PaginationBoundary, ShapeId, Statement,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Rows returned for a statement, keyed by model name.
pub type ResultHint = BTreeMap<String, Vec<Value>>;

/// Inputs that shape extraction beyond the statement itself.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub schema: Option<&'a AppSchema>,
    pub config: &'a EngineConfig,
}

impl<'a> ExtractContext<'a> {
    pub fn new(schema: Option<&'a AppSchema>, config: &'a EngineConfig) -> Self {
        Self { schema, config }
    }

    fn id_fields(&self, model: &str) -> &'a [String] {
        self.schema
            .and_then(|s| s.id_fields(model))
            .unwrap_or(self.config.default_id_fields.as_slice())
    }

    fn resolve(&self, parent: Option<&str>, name: &str) -> String {
        match (self.schema, parent) {
            (Some(schema), Some(parent)) => schema
                .resolve_relation(parent, name)
                .unwrap_or(name)
                .to_string(),
            _ => name.to_string(),
        }
    }
}

/// Build the dependency record for `statement`.
pub fn extract(
    statement: &Statement,
    shape_id: &ShapeId,
    result_hint: Option<&ResultHint>,
    ctx: ExtractContext<'_>,
) -> Dependencies {
    let mut deps = Dependencies::new(shape_id.clone());
    deps.model = statement
        .model()
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    if let Some(hint) = result_hint {
        collect_records(&mut deps, hint, ctx);
    }

    if let Some(filter) = statement.query.as_ref().and_then(|q| q.filter.clone()) {
        deps.filters.push(filter);
    }
    if let Some(having) = &statement.having {
        deps.filters.push(having.clone());
    }

    let primary = deps.model.clone();
    collect_includes(&mut deps, &statement.includes, primary.as_deref(), ctx);

    let primary_rows = match (&deps.model, result_hint) {
        (Some(model), Some(hint)) => hint.get(model).map(Vec::as_slice),
        _ => None,
    };

    deps.last_row = pagination_boundary(statement, primary_rows, deps.model.as_deref(), ctx);

    if let Some(keys) = statement.grouping() {
        deps.group_by = Some(GroupByKv {
            keys: keys.to_vec(),
            values: observed_tuples(keys, primary_rows.unwrap_or_default()),
        });
    }
    deps.aggregate = statement.grouping().is_some() || statement.having.is_some();
    deps.opaque = statement.has_unknown_fields();

    tracing::debug!(
        shape_id = %deps.shape_id,
        model = deps.model.as_deref().unwrap_or(""),
        records = deps.records.len(),
        filters = deps.filters.len(),
        includes = deps.includes.len(),
        relations = deps.relations.len(),
        paginated = deps.last_row.is_some(),
        grouped = deps.group_by.is_some(),
        "Extracted dependencies"
    );

    deps
}

fn collect_records(deps: &mut Dependencies, hint: &ResultHint, ctx: ExtractContext<'_>) {
    let cap = ctx.config.max_tracked_ids;
    for (model, rows) in hint {
        if model.is_empty() {
            continue;
        }
        let id_fields = ctx.id_fields(model);
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in rows.iter().filter_map(|row| row_identifier(row, id_fields)) {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            continue;
        }
        if ids.len() > cap {
            tracing::debug!(
                model = %model,
                tracked = ids.len(),
                cap,
                "Truncating tracked ids"
            );
            ids.truncate(cap);
        }
        deps.records.insert(model.clone(), ids);
    }
}

fn collect_includes(
    deps: &mut Dependencies,
    includes: &[Include],
    parent: Option<&str>,
    ctx: ExtractContext<'_>,
) {
    for include in includes {
        let resolved = include
            .query
            .as_ref()
            .filter(|q| !q.model.is_empty())
            .map(|q| ctx.resolve(parent, &q.model));

        match (&resolved, include.kind) {
            (Some(model), Some(kind)) => {
                let mut query = include.query.clone().unwrap_or_default();
                query.model = model.clone();
                deps.includes.push(Include {
                    query: Some(query),
                    kind: Some(kind),
                    includes: Vec::new(),
                    extra: include.extra.clone(),
                });
            }
            (Some(model), None) => {
                deps.relations.insert(model.clone());
            }
            (None, _) => {}
        }

        let next_parent = resolved.as_deref().or(parent);
        collect_includes(deps, &include.includes, next_parent, ctx);
    }
}

fn pagination_boundary(
    statement: &Statement,
    rows: Option<&[Value]>,
    model: Option<&str>,
    ctx: ExtractContext<'_>,
) -> Option<PaginationBoundary> {
    let ordering = statement.query.as_ref()?.ordering()?;
    statement.page_bound()?;

    let backward = statement
        .pagination
        .as_ref()
        .is_some_and(|p| p.is_backward());

    // A backward page ends at its first row; reversing the ordering keeps
    // "sorts at or before the boundary" meaning "enters the page".
    let (row, order_by): (&Value, Vec<OrderBy>) = if backward {
        (rows?.first()?, ordering.iter().map(reversed).collect())
    } else {
        (rows?.last()?, ordering.to_vec())
    };
    let fields = row.as_object()?;

    let cursor = match model.map(|m| ctx.id_fields(m)) {
        Some([field]) => fields
            .get(field)
            .filter(|v| !v.is_null())
            .map(|v| Kv::new(field.clone(), v.clone())),
        _ => None,
    };

    Some(PaginationBoundary {
        order_by,
        row: fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        cursor,
    })
}

fn reversed(order_by: &OrderBy) -> OrderBy {
    OrderBy {
        field: order_by.field.clone(),
        descending: Some(!order_by.is_descending()),
        nulls_first: Some(!order_by.nulls_sort_first()),
        case_sensitive: order_by.case_sensitive,
        extra: order_by.extra.clone(),
    }
}

fn observed_tuples(keys: &[String], rows: &[Value]) -> Vec<BTreeMap<String, Value>> {
    let mut seen = BTreeSet::new();
    let mut tuples = Vec::new();
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let tuple: BTreeMap<String, Value> = keys
            .iter()
            .map(|k| (k.clone(), obj.get(k).cloned().unwrap_or(Value::Null)))
            .collect();
        if seen.insert(shapekey_core::canonicalize(&Value::Object(
            tuple.clone().into_iter().collect(),
        ))) {
            tuples.push(tuple);
        }
    }
    tuples
}
