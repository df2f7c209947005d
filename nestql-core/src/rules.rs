//! Directive rules.
//!
//! Every key inside a query node is either a directive (`@model`, `@field`,
//! `@sort`, `@pagination` by default) or a column filter. Each model gets a
//! [`RuleBook`] at registration time mapping those keys to a [`Rule`]; applying
//! a rule validates the raw value and compiles it into the token.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;

use crate::catalog::ModelDescriptor;
use crate::config::{DirectiveKeys, QueryConfig};
use crate::token::{Pagination, SortDirection, Token, TokenField, TokenSort};
use crate::value::ColumnType;

/// Directive validation failure; the display string is what callers see
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("value is not a string")]
    NotAString,

    #[error("field list is empty")]
    EmptyFieldList,

    #[error("missing field name in '{0}'")]
    MissingFieldName(String),

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("duplicate alias '{0}'")]
    DuplicateAlias(String),

    #[error("alias '{0}' collides with a column")]
    AliasShadowsColumn(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("expected {expected} for column '{column}'")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },
}

/// A compiled rule for one key of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Model,
    Field,
    Sort,
    Pagination,
    Column(ColumnType),
}

impl Rule {
    /// Validate `value` and compile it into `token`.
    pub fn apply(
        &self,
        descriptor: &ModelDescriptor,
        config: &QueryConfig,
        token: &mut Token,
        key: &str,
        value: &Value,
    ) -> Result<(), RuleError> {
        match self {
            // consumed during model resolution
            Rule::Model => Ok(()),
            Rule::Field => apply_field(descriptor, token, value),
            Rule::Sort => apply_sort(descriptor, token, value),
            Rule::Pagination => apply_pagination(config, token, value),
            Rule::Column(ty) => apply_column(*ty, token, key, value),
        }
    }
}

/// Key -> rule table for one model
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    rules: HashMap<String, Rule>,
}

impl RuleBook {
    pub fn for_model(descriptor: &ModelDescriptor, keys: &DirectiveKeys) -> Self {
        let mut rules = HashMap::new();

        for column in &descriptor.columns {
            rules.insert(column.key.clone(), Rule::Column(column.ty));
        }
        // directives win over a column of the same name
        rules.insert(keys.model.clone(), Rule::Model);
        rules.insert(keys.field.clone(), Rule::Field);
        rules.insert(keys.sort.clone(), Rule::Sort);
        rules.insert(keys.pagination.clone(), Rule::Pagination);

        Self { rules }
    }

    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.rules.get(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }
}

/// `"a,b:alias"` -> explicit projection, plus temporary join columns.
fn apply_field(
    descriptor: &ModelDescriptor,
    token: &mut Token,
    value: &Value,
) -> Result<(), RuleError> {
    let spec = value.as_str().ok_or(RuleError::NotAString)?;
    if spec.trim().is_empty() {
        return Err(RuleError::EmptyFieldList);
    }

    let mut fields = Vec::new();
    let mut sources: HashSet<&str> = HashSet::new();
    let mut names: HashSet<&str> = HashSet::new();

    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (field, alias) = match entry.split_once(':') {
            Some((field, alias)) => (field.trim(), Some(alias.trim()).filter(|a| !a.is_empty())),
            None => (entry, None),
        };

        if field.is_empty() {
            return Err(RuleError::MissingFieldName(entry.to_string()));
        }
        if sources.contains(field) || names.contains(field) {
            return Err(RuleError::DuplicateField(field.to_string()));
        }

        match alias {
            Some(alias) => {
                if alias == field || names.contains(alias) || sources.contains(alias) {
                    return Err(RuleError::DuplicateAlias(alias.to_string()));
                }
                if descriptor.has_column(alias) {
                    return Err(RuleError::AliasShadowsColumn(alias.to_string()));
                }
                names.insert(alias);
                fields.push(TokenField::aliased(field, alias));
            }
            None => fields.push(TokenField::new(field)),
        }
        sources.insert(field);
        names.insert(field);
    }

    if fields.is_empty() {
        return Err(RuleError::EmptyFieldList);
    }

    for column in descriptor.special_columns() {
        if !sources.contains(column.key.as_str()) {
            fields.push(TokenField::temporary(&column.key));
        }
    }

    token.fields = Some(fields);
    Ok(())
}

/// `"a,-b"` -> ascending a, descending b. Unknown columns are dropped.
fn apply_sort(
    descriptor: &ModelDescriptor,
    token: &mut Token,
    value: &Value,
) -> Result<(), RuleError> {
    let spec = value.as_str().ok_or(RuleError::NotAString)?;

    let sort = spec
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('-') {
            Some(field) => TokenSort {
                field: field.trim().to_string(),
                direction: SortDirection::Desc,
            },
            None => TokenSort {
                field: s.to_string(),
                direction: SortDirection::Asc,
            },
        })
        .filter(|s| descriptor.has_column(&s.field))
        .collect();

    token.sort = Some(sort);
    Ok(())
}

fn apply_pagination(
    config: &QueryConfig,
    token: &mut Token,
    value: &Value,
) -> Result<(), RuleError> {
    let defaults = &config.pagination;

    let pagination = match value {
        Value::Bool(true) => Pagination {
            enabled: true,
            offset: defaults.offset,
            limit: defaults.limit,
        },
        Value::Object(options) => {
            let enabled = match options.get("enabled") {
                None => true,
                Some(Value::Bool(b)) => *b,
                Some(_) => {
                    return Err(RuleError::InvalidPagination(
                        "'enabled' must be a boolean".to_string(),
                    ))
                }
            };
            Pagination {
                enabled,
                offset: read_count(options.get("offset"), "offset", defaults.offset)?,
                limit: read_count(options.get("limit"), "limit", defaults.limit)?,
            }
        }
        _ => {
            return Err(RuleError::InvalidPagination(
                "expected true or an object".to_string(),
            ))
        }
    };

    if pagination.enabled && !token.path.keys.contains(&defaults.key) {
        token.path.keys.push(defaults.key.clone());
    }
    token.pagination = Some(pagination);
    Ok(())
}

fn read_count(value: Option<&Value>, name: &str, default: u64) -> Result<u64, RuleError> {
    match value {
        None => Ok(default),
        Some(v) => v.as_u64().ok_or_else(|| {
            RuleError::InvalidPagination(format!("'{}' must be a non-negative integer", name))
        }),
    }
}

/// Column filter. Group nodes also accept an array, read as "any of".
fn apply_column(
    ty: ColumnType,
    token: &mut Token,
    key: &str,
    value: &Value,
) -> Result<(), RuleError> {
    let accepted = match value {
        Value::Array(items) if token.batch.is_group => ty.accept_any_of(items),
        other => ty.accept(other),
    };

    let filter = accepted.ok_or_else(|| RuleError::TypeMismatch {
        column: key.to_string(),
        expected: ty.name(),
    })?;
    token.set_filter(key, filter);
    Ok(())
}
