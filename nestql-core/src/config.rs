//! Query compilation settings: directive key names and pagination defaults.

use serde::{Deserialize, Serialize};

/// Settings shared by the tokenizer and the directive rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub keys: DirectiveKeys,
    #[serde(default)]
    pub pagination: PaginationDefaults,
}

/// Reserved key names recognized as directives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveKeys {
    #[serde(default = "default_model_key")]
    pub model: String,
    #[serde(default = "default_field_key")]
    pub field: String,
    #[serde(default = "default_sort_key")]
    pub sort: String,
    #[serde(default = "default_pagination_key")]
    pub pagination: String,
}

fn default_model_key() -> String {
    "@model".to_string()
}

fn default_field_key() -> String {
    "@field".to_string()
}

fn default_sort_key() -> String {
    "@sort".to_string()
}

fn default_pagination_key() -> String {
    "@pagination".to_string()
}

impl Default for DirectiveKeys {
    fn default() -> Self {
        Self {
            model: default_model_key(),
            field: default_field_key(),
            sort: default_sort_key(),
            pagination: default_pagination_key(),
        }
    }
}

/// Defaults applied by the pagination directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationDefaults {
    /// Path segment appended to a node's keys when pagination is enabled
    #[serde(default = "default_page_key")]
    pub key: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page_key() -> String {
    "pagination".to_string()
}

fn default_limit() -> u64 {
    10
}

impl Default for PaginationDefaults {
    fn default() -> Self {
        Self {
            key: default_page_key(),
            offset: 0,
            limit: default_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.keys.model, "@model");
        assert_eq!(config.keys.pagination, "@pagination");
        assert_eq!(config.pagination.offset, 0);
        assert_eq!(config.pagination.limit, 10);
    }

    #[test]
    fn test_partial_override() {
        let config: QueryConfig =
            serde_json::from_str(r#"{"keys": {"field": "$fields"}, "pagination": {"limit": 50}}"#)
                .unwrap();
        assert_eq!(config.keys.field, "$fields");
        assert_eq!(config.keys.sort, "@sort");
        assert_eq!(config.pagination.limit, 50);
        assert_eq!(config.pagination.key, "pagination");
    }
}
