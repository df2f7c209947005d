//! Configuration handling for nestql
//!
//! Manages the nestql.toml configuration file: query settings under `[query]`
//! and the model catalog under `[[models]]`.
//!
//! ## Environment Variables
//!
//! The following environment variables can override config file settings:
//!
//! - `NESTQL_PAGINATION_LIMIT` - Default page size for `@pagination`
//! - `NESTQL_PAGINATION_OFFSET` - Default page offset for `@pagination`
//!
//! These can be set in a `.env` file next to the config file.

use std::path::Path;

use nestql_core::{Catalog, ModelDescriptor, QueryConfig};
use serde::{Deserialize, Serialize};

use crate::error::{NestqlError, NestqlResult};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "nestql.toml";

/// Environment variable names
pub const ENV_PAGINATION_LIMIT: &str = "NESTQL_PAGINATION_LIMIT";
pub const ENV_PAGINATION_OFFSET: &str = "NESTQL_PAGINATION_OFFSET";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directive keys and pagination defaults
    #[serde(default)]
    pub query: QueryConfig,
    /// Registered models
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// A `.env` file in the same directory is loaded first, then environment
    /// overrides are applied.
    pub fn load(path: &Path) -> NestqlResult<Self> {
        if let Some(dir) = path.parent() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
        }

        if !path.exists() {
            return Err(NestqlError::ConfigNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();

        tracing::debug!(
            path = %path.display(),
            models = config.models.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml(content: &str) -> NestqlResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(limit) = std::env::var(ENV_PAGINATION_LIMIT) {
            if let Ok(limit) = limit.parse::<u64>() {
                self.query.pagination.limit = limit;
            }
        }

        if let Ok(offset) = std::env::var(ENV_PAGINATION_OFFSET) {
            if let Ok(offset) = offset.parse::<u64>() {
                self.query.pagination.offset = offset;
            }
        }
    }

    /// Build the model catalog described by this configuration.
    pub fn catalog(&self) -> NestqlResult<Catalog> {
        Ok(Catalog::with_config(self.models.clone(), self.query.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[query.keys]
field = "@fields"

[query.pagination]
limit = 25

[[models]]
name = "user"
group_name = "users"
executor = "memory"

[[models.columns]]
key = "id"
type = "number"
is_primary = true

[[models.columns]]
key = "name"
type = "string"

[[models.extra.memory]]
id = 1
name = "Alice"
"#;

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.query.keys.field, "@fields");
        assert_eq!(config.query.keys.sort, "@sort");
        assert_eq!(config.query.pagination.limit, 25);
        assert_eq!(config.query.pagination.offset, 0);

        let user = &config.models[0];
        assert_eq!(user.group_name, "users");
        assert_eq!(user.parser, "default");
        assert_eq!(user.executor, "memory");
        assert!(user.columns[0].is_primary);
        assert_eq!(user.extra["memory"][0]["name"], "Alice");

        let catalog = config.catalog().unwrap();
        assert!(catalog.resolve("users").unwrap().is_group);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.models.is_empty());
        assert_eq!(config.query, QueryConfig::default());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.models.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap_err();
        assert!(matches!(err, NestqlError::ConfigNotFound(_)));
    }

    #[test]
    fn test_invalid_catalog() {
        let config = Config::from_toml(
            r#"
[[models]]
name = "user"
group_name = "user"
columns = []
"#,
        )
        .unwrap();
        assert!(matches!(config.catalog(), Err(NestqlError::CatalogError(_))));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var(ENV_PAGINATION_LIMIT, "3");
        std::env::set_var(ENV_PAGINATION_OFFSET, "not-a-number");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var(ENV_PAGINATION_LIMIT);
        std::env::remove_var(ENV_PAGINATION_OFFSET);

        assert_eq!(config.query.pagination.limit, 3);
        assert_eq!(config.query.pagination.offset, 0);
    }
}
