//! Tokenizer: compiles a nested query mapping into a flat token list.
//!
//! The output is a pre-order flattening of the query tree: every token is
//! immediately followed by its whole compiled subtree. The resolution engine
//! relies on that order to see a parent's join cache before any descendant.
//!
//! Failures are local to a node. A node that fails keeps its token (with the
//! error attached) but loses all of its descendants; siblings are untouched.

use serde_json::{Map, Value};

use crate::catalog::{Catalog, ModelDescriptor, ResolvedModel};
use crate::error::{CoreError, CoreResult};
use crate::token::{ForeignLink, Token};

/// Result of tokenizing one request
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    pub errors: Vec<String>,
}

pub struct Tokenizer<'a> {
    catalog: &'a Catalog,
}

impl<'a> Tokenizer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn tokenize(&self, input: &Map<String, Value>) -> Tokenized {
        let mut out = Tokenized::default();

        for (key, value) in input {
            let tokens = match self.resolve_node(key, value) {
                Ok(resolved) => self.compile(key, value, resolved, None, None, &mut out.errors),
                Err(err) => {
                    let message = format!("{}: {}", key, err);
                    tracing::warn!(path = %key, error = %err, "unresolved query key");
                    out.errors.push(message.clone());
                    vec![Token::unresolved(&self.model_name(key, value), key, message)]
                }
            };
            out.tokens.extend(tokens);
        }

        out
    }

    /// The model a node names: its `@model` directive, or the key itself.
    fn model_name(&self, key: &str, value: &Value) -> String {
        value
            .get(&self.catalog.config().keys.model)
            .and_then(Value::as_str)
            .unwrap_or(key)
            .to_string()
    }

    fn resolve_node(&self, key: &str, value: &Value) -> CoreResult<ResolvedModel> {
        if let Some(model) = value.get(&self.catalog.config().keys.model) {
            if !model.is_string() {
                return Err(CoreError::Directive {
                    key: self.catalog.config().keys.model.clone(),
                    source: crate::rules::RuleError::NotAString,
                });
            }
        }
        let name = self.model_name(key, value);
        self.catalog
            .resolve(&name)
            .ok_or(CoreError::UnknownModel(name))
    }

    fn compile(
        &self,
        key: &str,
        value: &Value,
        resolved: ResolvedModel,
        parent: Option<&Token>,
        link: Option<ForeignLink>,
        errors: &mut Vec<String>,
    ) -> Vec<Token> {
        let mut token = Token::new(&resolved, key, parent, link);

        let empty = Map::new();
        let node = match value {
            Value::Bool(true) => Ok(&empty),
            Value::Object(map) => Ok(map),
            _ => Err(CoreError::InvalidValue(key.to_string())),
        };

        match node.and_then(|node| self.compile_node(&mut token, &resolved.descriptor, node, errors)) {
            Ok(children) => {
                token.child_count = children.len();
                tracing::debug!(
                    model = %token.model,
                    path = %token.path.key(),
                    children = token.child_count,
                    "compiled token"
                );
                let mut tokens = Vec::with_capacity(children.len() + 1);
                tokens.push(token);
                tokens.extend(children);
                tokens
            }
            Err(err) => {
                let path = token.path.key();
                tracing::warn!(path = %path, error = %err, "query node rejected");
                let message = format!("{}: {}", path, err);
                errors.push(message.clone());
                token.errors.push(message);
                token.child_count = 0;
                vec![token]
            }
        }
    }

    /// Apply rules for directive/column keys, then compile nested models.
    ///
    /// Rules run first so that path changes (pagination) are in place before
    /// children copy the parent path.
    fn compile_node(
        &self,
        token: &mut Token,
        descriptor: &ModelDescriptor,
        node: &Map<String, Value>,
        errors: &mut Vec<String>,
    ) -> CoreResult<Vec<Token>> {
        let rules = self
            .catalog
            .rules(&descriptor.name)
            .ok_or_else(|| CoreError::UnknownModel(descriptor.name.clone()))?;

        let mut nested = Vec::new();
        for (key, value) in node {
            if value.is_null() {
                return Err(CoreError::NullValue(key.clone()));
            }
            match rules.get(key) {
                Some(rule) => rule
                    .apply(descriptor, self.catalog.config(), token, key, value)
                    .map_err(|source| CoreError::Directive {
                        key: key.clone(),
                        source,
                    })?,
                None => nested.push((key, value)),
            }
        }

        let mut children = Vec::new();
        for (key, value) in nested {
            let child = self
                .resolve_node(key, value)
                .map_err(|_| CoreError::UnknownKey(key.clone()))?;
            let link = foreign_link(&child.descriptor, descriptor).ok_or_else(|| {
                CoreError::NoRelation {
                    child: child.name().to_string(),
                    parent: descriptor.name.clone(),
                }
            })?;

            token.add_join_column(&link.referenced_key);
            children.extend(self.compile(key, value, child, Some(&*token), Some(link), errors));
        }

        token.ensure_join_fields();
        Ok(children)
    }
}

/// Link a child model to its parent through a declared relation.
///
/// Forward: the child declares a relation to the parent, so the child is
/// filtered by its own foreign key against the parent's referenced column.
/// Reverse: the parent declares a relation to the child; the child is filtered
/// on the column the relation points at, using the parent's foreign key values.
pub fn foreign_link(child: &ModelDescriptor, parent: &ModelDescriptor) -> Option<ForeignLink> {
    if let Some(relation) = child.relation_to(&parent.name) {
        return Some(ForeignLink {
            local_key: relation.local_key.clone(),
            referenced_model: relation.referenced_model.clone(),
            referenced_key: relation.referenced_key.clone(),
            reversed: false,
        });
    }

    parent.relation_to(&child.name).map(|relation| ForeignLink {
        local_key: relation.referenced_key.clone(),
        referenced_model: parent.name.clone(),
        referenced_key: relation.local_key.clone(),
        reversed: true,
    })
}
