//! Structural validation of statements, mutations and dependency records.
//!
//! Validation never coerces. The first violation is returned with the exact
//! field path of the offending component.

use crate::{
    Action, Change, Condition, Dependencies, Filter, Include, Mutation, OrderBy, Pagination, Query,
    Statement, ValidationError,
};

/// Validate a statement.
///
/// Checks that:
/// - `query.model` is non-empty (also inside includes)
/// - `limit` and `offset` are non-negative
/// - pagination `first`/`last` are positive
/// - forward and backward pagination are not mixed
/// - field lists and filters are well formed
pub fn validate_statement(statement: &Statement) -> Result<(), ValidationError> {
    let root = "statement";

    if let Some(query) = &statement.query {
        validate_query(query, &format!("{}.query", root))?;
    }
    if let Some(pagination) = &statement.pagination {
        validate_pagination(pagination, &format!("{}.pagination", root))?;
    }
    if let Some(keys) = &statement.group_by {
        validate_field_list(keys, &format!("{}.group_by", root))?;
    }
    if let Some(having) = &statement.having {
        validate_filter(having, &format!("{}.having", root))?;
    }
    for (i, include) in statement.includes.iter().enumerate() {
        validate_include(include, &format!("{}.includes[{}]", root, i))?;
    }
    Ok(())
}

/// Validate a mutation and every change in it.
///
/// An empty change list is accepted.
pub fn validate_mutation(mutation: &Mutation) -> Result<(), ValidationError> {
    for (i, change) in mutation.changes.iter().enumerate() {
        validate_change(change, &format!("mutation.changes[{}]", i))?;
    }
    Ok(())
}

/// Validate a single change against its action's invariants.
pub fn validate_change(change: &Change, path: &str) -> Result<(), ValidationError> {
    if change.model.is_empty() {
        return Err(ValidationError::EmptyField {
            path: format!("{}.model", path),
        });
    }

    match change.action {
        Action::Insert => {
            if change.sets.is_empty() {
                return Err(ValidationError::RequiredFieldMissing {
                    path: format!("{}.sets", path),
                });
            }
            if change.filter.is_some() {
                return Err(ValidationError::Forbidden {
                    path: format!("{}.where", path),
                    reason: "insert must not carry a where filter".to_string(),
                });
            }
        }
        Action::Update => {
            if change.sets.is_empty() {
                return Err(ValidationError::RequiredFieldMissing {
                    path: format!("{}.sets", path),
                });
            }
            if change.filter.is_none() {
                return Err(ValidationError::RequiredFieldMissing {
                    path: format!("{}.where", path),
                });
            }
        }
        Action::Delete => {
            if !change.sets.is_empty() {
                return Err(ValidationError::Forbidden {
                    path: format!("{}.sets", path),
                    reason: "delete must not assign fields".to_string(),
                });
            }
            if change.filter.is_none() {
                return Err(ValidationError::RequiredFieldMissing {
                    path: format!("{}.where", path),
                });
            }
        }
    }

    for (i, kv) in change.sets.iter().enumerate() {
        if kv.field.is_empty() {
            return Err(ValidationError::EmptyField {
                path: format!("{}.sets[{}].field", path, i),
            });
        }
    }
    if let Some(filter) = &change.filter {
        validate_filter(filter, &format!("{}.where", path))?;
    }
    Ok(())
}

/// Validate a dependency record received from outside the engine.
pub fn validate_dependencies(deps: &Dependencies) -> Result<(), ValidationError> {
    crate::ShapeId::parse(deps.shape_id.as_str()).map_err(|_| ValidationError::MalformedShapeId {
        path: "dependencies.shape_id".to_string(),
    })?;
    for (model, ids) in &deps.records {
        if model.is_empty() {
            return Err(ValidationError::EmptyField {
                path: "dependencies.records".to_string(),
            });
        }
        if ids.is_empty() {
            return Err(ValidationError::InvalidValue {
                path: format!("dependencies.records[{}]", model),
                reason: "empty id lists are never stored".to_string(),
            });
        }
    }
    for (i, filter) in deps.filters.iter().enumerate() {
        validate_filter(filter, &format!("dependencies.filters[{}]", i))?;
    }
    for (i, include) in deps.includes.iter().enumerate() {
        validate_include(include, &format!("dependencies.includes[{}]", i))?;
    }
    Ok(())
}

fn validate_query(query: &Query, path: &str) -> Result<(), ValidationError> {
    if query.model.is_empty() {
        return Err(ValidationError::EmptyField {
            path: format!("{}.model", path),
        });
    }
    if let Some(fields) = &query.fields {
        validate_field_list(fields, &format!("{}.fields", path))?;
    }
    if let Some(filter) = &query.filter {
        validate_filter(filter, &format!("{}.where", path))?;
    }
    if let Some(order_by) = &query.order_by {
        for (i, ob) in order_by.iter().enumerate() {
            validate_order_by(ob, &format!("{}.order_by[{}]", path, i))?;
        }
    }
    if let Some(limit) = query.limit {
        if limit < 0 {
            return Err(ValidationError::InvalidValue {
                path: format!("{}.limit", path),
                reason: format!("limit must be non-negative, got {}", limit),
            });
        }
    }
    if let Some(offset) = query.offset {
        if offset < 0 {
            return Err(ValidationError::InvalidValue {
                path: format!("{}.offset", path),
                reason: format!("offset must be non-negative, got {}", offset),
            });
        }
    }
    if let Some(distinct) = &query.distinct {
        validate_field_list(distinct, &format!("{}.distinct", path))?;
    }
    Ok(())
}

fn validate_pagination(pagination: &Pagination, path: &str) -> Result<(), ValidationError> {
    if pagination.is_forward() && pagination.is_backward() {
        return Err(ValidationError::Conflict {
            path: path.to_string(),
            reason: "forward (first/after) and backward (last/before) parameters are mutually exclusive"
                .to_string(),
        });
    }
    for (name, size) in [("first", pagination.first), ("last", pagination.last)] {
        if let Some(n) = size {
            if n <= 0 {
                return Err(ValidationError::InvalidValue {
                    path: format!("{}.{}", path, name),
                    reason: format!("{} must be positive, got {}", name, n),
                });
            }
        }
    }
    Ok(())
}

fn validate_include(include: &Include, path: &str) -> Result<(), ValidationError> {
    if let Some(query) = &include.query {
        validate_query(query, &format!("{}.query", path))?;
    } else if include.kind.is_some() {
        return Err(ValidationError::RequiredFieldMissing {
            path: format!("{}.query", path),
        });
    }
    for (i, nested) in include.includes.iter().enumerate() {
        validate_include(nested, &format!("{}.includes[{}]", path, i))?;
    }
    Ok(())
}

fn validate_filter(filter: &Filter, path: &str) -> Result<(), ValidationError> {
    if let Some(children) = &filter.and {
        for (i, child) in children.iter().enumerate() {
            validate_filter(child, &format!("{}.and[{}]", path, i))?;
        }
    }
    if let Some(children) = &filter.or {
        for (i, child) in children.iter().enumerate() {
            validate_filter(child, &format!("{}.or[{}]", path, i))?;
        }
    }
    if let Some(not) = &filter.not {
        validate_filter(not, &format!("{}.not", path))?;
    }
    if let Some(conditions) = &filter.conditions {
        for (i, condition) in conditions.iter().enumerate() {
            validate_condition(condition, &format!("{}.conditions[{}]", path, i))?;
        }
    }
    Ok(())
}

fn validate_condition(condition: &Condition, path: &str) -> Result<(), ValidationError> {
    if condition.field.is_empty() {
        return Err(ValidationError::EmptyField {
            path: format!("{}.field", path),
        });
    }
    if let Some(i) = condition.field_path.iter().position(String::is_empty) {
        return Err(ValidationError::EmptyField {
            path: format!("{}.field_path[{}]", path, i),
        });
    }
    Ok(())
}

fn validate_order_by(order_by: &OrderBy, path: &str) -> Result<(), ValidationError> {
    if order_by.field.is_empty() {
        return Err(ValidationError::EmptyField {
            path: format!("{}.field", path),
        });
    }
    Ok(())
}

fn validate_field_list(fields: &[String], path: &str) -> Result<(), ValidationError> {
    match fields.iter().position(String::is_empty) {
        Some(i) => Err(ValidationError::EmptyField {
            path: format!("{}[{}]", path, i),
        }),
        None => Ok(()),
    }
}
