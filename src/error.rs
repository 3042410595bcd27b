//! Error types for the module workflow service.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Module workflow errors — validation and not-found failures surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Module {id} not found")]
    ModuleNotFound { id: Uuid },

    #[error("Module request {id} not found")]
    RequestNotFound { id: Uuid },

    #[error("Requirement {requirement_id} does not belong to module {module_id}")]
    RequirementMismatch {
        requirement_id: Uuid,
        module_id: Uuid,
    },

    #[error("Module request {id} is already {state}, cannot transition to {target}")]
    AlreadyResolved {
        id: Uuid,
        state: String,
        target: String,
    },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
