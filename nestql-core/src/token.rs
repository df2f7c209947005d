//! Tokens: one compiled unit of work per query node.
//!
//! A token never points at its parent. Ancestry is expressed through the
//! dotted path (`parent_keys` + `keys`), which doubles as the join cache key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::ResolvedModel;
use crate::value::FilterValue;

/// Whether a token resolves to one record or a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Single,
    Collection,
}

/// Position of a node in the query tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPath {
    /// This node's own segment(s), relative to its parent
    pub keys: Vec<String>,
    /// Full path of the nearest ancestor token
    pub parent_keys: Vec<String>,
}

impl TokenPath {
    pub fn full(&self) -> Vec<String> {
        self.parent_keys
            .iter()
            .chain(self.keys.iter())
            .cloned()
            .collect()
    }

    pub fn key(&self) -> String {
        self.full().join(".")
    }

    pub fn parent_key(&self) -> String {
        self.parent_keys.join(".")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFlags {
    /// The node itself returns a collection
    pub is_group: bool,
    /// The nearest ancestor resolves to a collection
    pub is_batch_parent: bool,
    pub is_batch: bool,
}

/// Join between a node and its parent.
///
/// The child is filtered by `child.local_key IN parent.referenced_key`, and
/// stitched back by the same equality. For a reversed link the parent owns the
/// relation, so `local_key` is the column the relation points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignLink {
    pub local_key: String,
    pub referenced_model: String,
    pub referenced_key: String,
    pub reversed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenField {
    pub source_field: String,
    pub alias: Option<String>,
    /// Needed for joins only; stripped before output
    pub temporary: bool,
}

impl TokenField {
    pub fn new(source_field: &str) -> Self {
        Self {
            source_field: source_field.to_string(),
            alias: None,
            temporary: false,
        }
    }

    pub fn aliased(source_field: &str, alias: &str) -> Self {
        Self {
            alias: Some(alias.to_string()),
            ..Self::new(source_field)
        }
    }

    pub fn temporary(source_field: &str) -> Self {
        Self {
            temporary: true,
            ..Self::new(source_field)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSort {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub enabled: bool,
    pub offset: u64,
    pub limit: u64,
}

/// Compiled work for one node of the query tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub model: String,
    pub kind: TokenKind,
    pub parser: String,
    pub executor: String,
    pub path: TokenPath,
    pub batch: BatchFlags,
    pub is_union: bool,
    pub foreign_link: Option<ForeignLink>,
    pub fields: Option<Vec<TokenField>>,
    pub sort: Option<Vec<TokenSort>>,
    pub pagination: Option<Pagination>,
    pub filter: Option<BTreeMap<String, FilterValue>>,
    /// Columns cached after fetch so descendants can join against them
    pub join_columns: Vec<String>,
    pub child_count: usize,
    pub errors: Vec<String>,
}

impl Token {
    pub fn new(
        resolved: &ResolvedModel,
        key: &str,
        parent: Option<&Token>,
        foreign_link: Option<ForeignLink>,
    ) -> Self {
        let descriptor = &resolved.descriptor;
        let is_group = resolved.is_group;
        let is_batch_parent = parent.map(|p| p.batch.is_batch).unwrap_or(false);

        let mut join_columns: Vec<String> =
            descriptor.special_columns().map(|c| c.key.clone()).collect();

        let mut token = Token {
            model: descriptor.name.clone(),
            kind: if is_group {
                TokenKind::Collection
            } else {
                TokenKind::Single
            },
            parser: descriptor.parser.clone(),
            executor: descriptor.executor.clone(),
            path: TokenPath {
                keys: vec![key.to_string()],
                parent_keys: parent.map(|p| p.path.full()).unwrap_or_default(),
            },
            batch: BatchFlags {
                is_group,
                is_batch_parent,
                is_batch: is_group || is_batch_parent,
            },
            is_union: parent.is_some(),
            foreign_link: None,
            fields: None,
            sort: None,
            pagination: None,
            filter: None,
            join_columns: Vec::new(),
            child_count: 0,
            errors: Vec::new(),
        };

        if let Some(link) = foreign_link {
            if !join_columns.contains(&link.local_key) {
                join_columns.push(link.local_key.clone());
            }
            token.filter = Some(BTreeMap::new());
            token.foreign_link = Some(link);
        }
        token.join_columns = join_columns;

        token
    }

    /// A placeholder for a top-level key whose model could not be resolved.
    pub fn unresolved(model: &str, key: &str, error: String) -> Self {
        Token {
            model: model.to_string(),
            kind: TokenKind::Single,
            parser: String::new(),
            executor: String::new(),
            path: TokenPath {
                keys: vec![key.to_string()],
                parent_keys: Vec::new(),
            },
            batch: BatchFlags::default(),
            is_union: false,
            foreign_link: None,
            fields: None,
            sort: None,
            pagination: None,
            filter: None,
            join_columns: Vec::new(),
            child_count: 0,
            errors: vec![error],
        }
    }

    pub fn is_top_level(&self) -> bool {
        !self.is_union
    }

    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_join_column(&mut self, column: &str) {
        if !self.join_columns.iter().any(|c| c == column) {
            self.join_columns.push(column.to_string());
        }
    }

    pub fn set_filter(&mut self, column: &str, value: FilterValue) {
        self.filter
            .get_or_insert_with(BTreeMap::new)
            .insert(column.to_string(), value);
    }

    /// Make sure an explicit projection still fetches every join column.
    pub fn ensure_join_fields(&mut self) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        for column in &self.join_columns {
            if !fields.iter().any(|f| &f.source_field == column) {
                fields.push(TokenField::temporary(column));
            }
        }
    }

    pub fn temporary_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flatten()
            .filter(|f| f.temporary)
            .map(|f| f.source_field.as_str())
    }

    /// `(source_field, alias)` pairs of explicitly aliased fields.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flatten()
            .filter_map(|f| f.alias.as_deref().map(|a| (f.source_field.as_str(), a)))
    }
}
