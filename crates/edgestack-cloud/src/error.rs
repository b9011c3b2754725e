//! Cloud synthesis and provider error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while synthesizing, packaging or deploying a stack
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Stack definition error: {0}")]
    Stack(#[from] edgestack_core::StackError),

    #[error("Duplicate logical id: {0}")]
    DuplicateLogicalId(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Unresolvable intrinsic in {context}: {message}")]
    Unresolvable { context: String, message: String },

    #[error("Asset directory not found: {0}")]
    AssetNotFound(PathBuf),

    #[error("Asset packaging failed for {path}: {message}")]
    AssetError { path: PathBuf, message: String },

    #[error("Cloud assembly error: {0}")]
    AssemblyError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Stack not deployed: {0}")]
    NotDeployed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
