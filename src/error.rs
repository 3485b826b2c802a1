//! Error taxonomy shared by the schema, model and mapping layers.
//!
//! Every failure is raised where it is detected and propagated to the caller
//! unchanged. None of these conditions is transient, so nothing retries.

use thiserror::Error;

use crate::geom_id::GeomId;

/// Errors raised while describing geometry, composing identifiers or
/// building the geometry info dictionary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeomError {
    /// A referenced category, model, volume or GID does not exist.
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    /// An index vector or address rule does not fit the category schema.
    #[error("schema mismatch for category '{category}': {reason}")]
    SchemaMismatch { category: String, reason: String },

    /// The category schema itself is inconsistent or lacks a required entry.
    #[error("schema error: {0}")]
    Schema(String),

    /// An insertion would replace an existing dictionary entry.
    #[error("duplicate geometry ID {gid} (logical '{existing}' already mapped, rejected '{rejected}')")]
    DuplicateGid {
        gid: GeomId,
        existing: String,
        rejected: String,
    },

    /// The model factory must be locked before it can be mapped.
    #[error("model factory is not locked")]
    NotLocked,

    /// The object is locked and can no longer be modified.
    #[error("{0} is locked")]
    Locked(String),

    /// An item index lies outside an array placement.
    #[error("invalid item index {item} (placement has {count} items)")]
    InvalidItem { item: usize, count: usize },

    /// A textual identifier, directive or name could not be parsed.
    #[error("syntax error in '{input}': {reason}")]
    Syntax { input: String, reason: String },

    /// A placement was built from inconsistent parameters.
    #[error("invalid placement: {0}")]
    InvalidPlacement(String),
}

impl GeomError {
    pub(crate) fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        GeomError::NotFound {
            what,
            name: name.into(),
        }
    }

    pub(crate) fn syntax(input: impl Into<String>, reason: impl Into<String>) -> Self {
        GeomError::Syntax {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(category: impl Into<String>, reason: impl Into<String>) -> Self {
        GeomError::SchemaMismatch {
            category: category.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeomError>;
