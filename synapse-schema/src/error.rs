//! Error types for schema generation and execution
//!
//! Generation errors come in two flavours: [`SchemaError`] aborts a whole
//! generation pass, [`IntrospectionError`] is isolated to one model, method or
//! relationship and only reported. Execution errors never cross the schema
//! boundary as `Err`; they are folded into a [`crate::MutationResult`] as
//! [`MutationError`] entries.

use serde::Serialize;
use std::fmt;

/// Fatal generation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two generated operations or types share a name
    #[error("schema name conflict: `{name}` is generated by both {first} and {second}")]
    SchemaNameConflict {
        /// The colliding name
        name: String,
        /// What produced the name first
        first: String,
        /// What produced it again
        second: String,
    },
}

/// Generation error isolated to a single model, method or relationship
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntrospectionError {
    /// Method cannot be exposed as a mutation; the method is skipped
    #[error("{model}.{method}: unsupported method signature: {reason}")]
    UnsupportedMethodSignature {
        model: String,
        method: String,
        reason: String,
    },

    /// A declared base model does not exist; the model is skipped
    #[error("{model}: unknown base model `{base}`")]
    UnknownBase { model: String, base: String },

    /// The model inherits from itself; the model is skipped
    #[error("{model}: inheritance cycle through `{through}`")]
    InheritanceCycle { model: String, through: String },

    /// Relationship points at a model that is missing, skipped or abstract
    #[error("{model}.{relation}: unknown relationship target `{target}`")]
    UnknownRelationTarget {
        model: String,
        relation: String,
        target: String,
    },

    /// Two members of one model share a name; the model is skipped
    #[error("{model}: duplicate member `{name}`")]
    DuplicateMember { model: String, name: String },

    /// Identity field cannot be server-assigned; the model is skipped
    #[error("{model}: invalid identity field `{field}`: {reason}")]
    InvalidIdentity {
        model: String,
        field: String,
        reason: String,
    },

    /// Default value does not fit the field kind; the model is skipped
    #[error("{model}.{field}: invalid default: {reason}")]
    InvalidDefault {
        model: String,
        field: String,
        reason: String,
    },

    /// Model or member name is not an identifier; the model is skipped
    #[error("{model}: `{name}` is not a valid name")]
    InvalidName { model: String, name: String },

    /// Reverse relationship name is already taken on the target; the reverse side is dropped
    #[error("{target}.{name}: reverse of {model}.{relation} clashes with an existing member")]
    RelationNameClash {
        model: String,
        relation: String,
        target: String,
        name: String,
    },
}

/// Execution error taxonomy exposed in mutation envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// One or more field or input violations
    ValidationError,
    /// The identity does not resolve
    NotFound,
    /// The nested-write graph has a cycle
    CircularReference,
    /// Delete blocked by a dependent relationship
    CascadeRestricted,
    /// Storage failed mid-write; nothing was written
    TransactionFailure,
}

impl ErrorKind {
    /// Stable name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::CircularReference => "CircularReference",
            ErrorKind::CascadeRestricted => "CascadeRestricted",
            ErrorKind::TransactionFailure => "TransactionFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a mutation envelope's `errors` sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationError {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Offending input path (e.g. `author.name`), when the error is about one field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Item index for bulk operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl MutationError {
    /// Create an error without a field or index
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            index: None,
        }
    }

    /// Validation error attached to an input path
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationError,
            message: message.into(),
            field: Some(path.into()),
            index: None,
        }
    }

    /// The identity did not resolve
    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "not found")
    }

    /// Opaque storage failure
    pub fn transaction_failure() -> Self {
        Self::new(ErrorKind::TransactionFailure, "transaction failed")
    }

    /// Tag this error with a bulk item index
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Read-path error: malformed filter, ordering or argument shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid query arguments: {}", render_violations(.violations))]
pub struct QueryError {
    /// Accumulated violations
    pub violations: Vec<MutationError>,
}

impl QueryError {
    /// Single violation at a path
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![MutationError::field(path, message)],
        }
    }
}

impl From<Vec<MutationError>> for QueryError {
    fn from(violations: Vec<MutationError>) -> Self {
        Self { violations }
    }
}

fn render_violations(violations: &[MutationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Storage seam failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The caller-supplied timeout elapsed
    #[error("storage operation timed out")]
    Timeout,

    /// The operation was cancelled before commit
    #[error("operation cancelled")]
    Cancelled,

    /// No record with this identity
    #[error("no record {id} in {model}")]
    Missing { model: String, id: String },

    /// A record with this identity already exists
    #[error("duplicate identity {id} in {model}")]
    Duplicate { model: String, id: String },

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}
