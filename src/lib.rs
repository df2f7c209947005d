pub mod api;
pub mod config;
pub mod error;

pub use api::{ApiCode, Nestql, Output, MEMORY_EXECUTOR};
pub use config::Config;
pub use error::{NestqlError, NestqlResult};
