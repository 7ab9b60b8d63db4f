//! Error types for the wrnzoo-core crate.

use crate::dataset::DatasetError;
use crate::hierarchy::{Granularity, HierarchyError};
use crate::identity::IdentityError;
use thiserror::Error;

/// Top-level error type for wrnzoo operations.
#[derive(Debug, Error)]
pub enum ZooError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Label space mismatch: {granularity} models use {expected} labels, got {actual}")]
    LabelSpace {
        granularity: Granularity,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Directory traversal error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ZooError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
