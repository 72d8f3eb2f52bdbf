pub mod auth;
pub mod config;
pub mod models;
pub mod render;
pub mod resolver;
pub mod rules;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use resolver::{ExtractionResult, FailureKind, Resolver};
pub use rules::RuleRegistry;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
