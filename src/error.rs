use nestql_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NestqlError {
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CoreError),
}

pub type NestqlResult<T> = Result<T, NestqlError>;
