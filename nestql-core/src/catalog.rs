//! Model catalog.
//!
//! Models are registered once, before any query runs, and the catalog is
//! read-only afterwards. Each model answers to two names: its own name (a
//! single record) and its group alias (a collection).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::QueryConfig;
use crate::error::{CoreError, CoreResult};
use crate::rules::RuleBook;
use crate::value::ColumnType;

/// One declared column of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelColumn {
    pub key: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_foreign: bool,
}

impl ModelColumn {
    pub fn new(key: &str, ty: ColumnType) -> Self {
        Self {
            key: key.to_string(),
            ty,
            desc: String::new(),
            is_primary: false,
            is_foreign: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn foreign(mut self) -> Self {
        self.is_foreign = true;
        self
    }

    /// Primary and foreign columns are cached for every fetched record.
    pub fn is_special(&self) -> bool {
        self.is_primary || self.is_foreign
    }
}

/// `local_key` on the owning model references `referenced_model.referenced_key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRelation {
    pub local_key: String,
    pub referenced_model: String,
    pub referenced_key: String,
}

fn default_parser() -> String {
    "default".to_string()
}

fn default_executor() -> String {
    "default".to_string()
}

/// Registered description of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub group_name: String,
    #[serde(default)]
    pub desc: String,
    pub columns: Vec<ModelColumn>,
    #[serde(default)]
    pub foreigns: Vec<ForeignKeyRelation>,
    #[serde(default = "default_parser")]
    pub parser: String,
    #[serde(default = "default_executor")]
    pub executor: String,
    /// Opaque payload for the executor
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ModelDescriptor {
    pub fn new(name: &str, group_name: &str) -> Self {
        Self {
            name: name.to_string(),
            group_name: group_name.to_string(),
            desc: String::new(),
            columns: Vec::new(),
            foreigns: Vec::new(),
            parser: default_parser(),
            executor: default_executor(),
            extra: Map::new(),
        }
    }

    pub fn column(mut self, column: ModelColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn references(mut self, local_key: &str, model: &str, referenced_key: &str) -> Self {
        self.foreigns.push(ForeignKeyRelation {
            local_key: local_key.to_string(),
            referenced_model: model.to_string(),
            referenced_key: referenced_key.to_string(),
        });
        self
    }

    pub fn parser(mut self, id: &str) -> Self {
        self.parser = id.to_string();
        self
    }

    pub fn executor(mut self, id: &str) -> Self {
        self.executor = id.to_string();
        self
    }

    pub fn extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn find_column(&self, key: &str) -> Option<&ModelColumn> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.find_column(key).is_some()
    }

    pub fn special_columns(&self) -> impl Iterator<Item = &ModelColumn> {
        self.columns.iter().filter(|c| c.is_special())
    }

    /// The relation this model declares towards `model`, if any.
    pub fn relation_to(&self, model: &str) -> Option<&ForeignKeyRelation> {
        self.foreigns.iter().find(|f| f.referenced_model == model)
    }
}

/// A catalog lookup result: the descriptor plus which of its names matched
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub descriptor: Arc<ModelDescriptor>,
    pub is_group: bool,
}

impl ResolvedModel {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

#[derive(Debug)]
struct ModelEntry {
    descriptor: Arc<ModelDescriptor>,
    rules: RuleBook,
}

/// Immutable registry of models, built once at startup
#[derive(Debug)]
pub struct Catalog {
    models: HashMap<String, ModelEntry>,
    /// name or group alias -> (model name, is_group)
    names: HashMap<String, (String, bool)>,
    order: Vec<String>,
    config: QueryConfig,
}

impl Catalog {
    /// Build a catalog with default directive settings.
    pub fn new(models: Vec<ModelDescriptor>) -> CoreResult<Self> {
        Self::with_config(models, QueryConfig::default())
    }

    /// Build a catalog, validating names and relations.
    pub fn with_config(models: Vec<ModelDescriptor>, config: QueryConfig) -> CoreResult<Self> {
        let mut catalog = Catalog {
            models: HashMap::new(),
            names: HashMap::new(),
            order: Vec::new(),
            config,
        };

        for descriptor in models {
            catalog.register(descriptor)?;
        }
        catalog.check_relations()?;

        Ok(catalog)
    }

    fn register(&mut self, descriptor: ModelDescriptor) -> CoreResult<()> {
        if descriptor.name.is_empty() || descriptor.group_name.is_empty() {
            return Err(CoreError::InvalidCatalog(
                "model name and group name must not be empty".to_string(),
            ));
        }
        if descriptor.name == descriptor.group_name {
            return Err(CoreError::InvalidCatalog(format!(
                "model '{}' uses its own name as group name",
                descriptor.name
            )));
        }
        for name in [&descriptor.name, &descriptor.group_name] {
            if self.names.contains_key(name) {
                return Err(CoreError::InvalidCatalog(format!(
                    "name '{}' is already registered",
                    name
                )));
            }
        }

        let name = descriptor.name.clone();
        self.names.insert(name.clone(), (name.clone(), false));
        self.names
            .insert(descriptor.group_name.clone(), (name.clone(), true));

        let rules = RuleBook::for_model(&descriptor, &self.config.keys);
        tracing::debug!(
            model = %name,
            group = %descriptor.group_name,
            columns = descriptor.columns.len(),
            "registered model"
        );
        self.models.insert(
            name.clone(),
            ModelEntry {
                descriptor: Arc::new(descriptor),
                rules,
            },
        );
        self.order.push(name);

        Ok(())
    }

    fn check_relations(&self) -> CoreResult<()> {
        for entry in self.models.values() {
            let descriptor = &entry.descriptor;
            for relation in &descriptor.foreigns {
                if !descriptor.has_column(&relation.local_key) {
                    return Err(CoreError::InvalidCatalog(format!(
                        "'{}.{}' is not a column",
                        descriptor.name, relation.local_key
                    )));
                }
                let target = self.models.get(&relation.referenced_model).ok_or_else(|| {
                    CoreError::InvalidCatalog(format!(
                        "'{}' references unknown model '{}'",
                        descriptor.name, relation.referenced_model
                    ))
                })?;
                if !target.descriptor.has_column(&relation.referenced_key) {
                    return Err(CoreError::InvalidCatalog(format!(
                        "'{}.{}' is not a column",
                        relation.referenced_model, relation.referenced_key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a model by exact name or group alias.
    pub fn resolve(&self, name: &str) -> Option<ResolvedModel> {
        let (model, is_group) = self.names.get(name)?;
        let entry = self.models.get(model)?;
        Some(ResolvedModel {
            descriptor: entry.descriptor.clone(),
            is_group: *is_group,
        })
    }

    pub fn descriptor(&self, model: &str) -> Option<&Arc<ModelDescriptor>> {
        self.models.get(model).map(|e| &e.descriptor)
    }

    /// Columns of a model in declaration order; empty for unknown models.
    pub fn columns(&self, model: &str) -> &[ModelColumn] {
        self.models
            .get(model)
            .map(|e| e.descriptor.columns.as_slice())
            .unwrap_or(&[])
    }

    pub fn special_columns(&self, model: &str) -> Vec<&ModelColumn> {
        self.columns(model).iter().filter(|c| c.is_special()).collect()
    }

    pub fn rules(&self, model: &str) -> Option<&RuleBook> {
        self.models.get(model).map(|e| &e.rules)
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Descriptors in registration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.order
            .iter()
            .filter_map(|name| self.models.get(name).map(|e| &e.descriptor))
    }
}
