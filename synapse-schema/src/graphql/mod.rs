//! Query/mutation surface generation
//!
//! This module generates the servable surface from model descriptors.
//! It creates:
//! - Output types (read shapes) with lazily resolved relationship fields
//! - Create/update/delete input types with requiredness inference
//! - Filter types with per-kind predicate sets and AND/OR/NOT composition
//! - Query operations (single, list, paginated) and their page types
//! - Mutation operations and the uniform result envelope
//! - The assembled, immutable [`Schema`]

pub mod connection;
pub mod filter;
pub mod input;
pub mod mutation;
pub mod naming;
pub mod object;
pub mod query;
pub mod schema;

pub use connection::{Page, PageInfo};
pub use filter::{FilterNode, FilterOp, NoRelations, Operand, RelatedRecords};
pub use mutation::MutationResult;
pub use query::{Direction, ListArgs, OrderKey, PageArgs};
pub use schema::{ModelSchema, Schema, generate};

use crate::value::ScalarKind;
use std::fmt;

/// Reference to a generated or scalar type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Type name
    pub name: String,
    /// List of non-null items
    pub list: bool,
    /// Value may be absent
    pub nullable: bool,
}

impl TypeRef {
    /// Non-null named type
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list: false,
            nullable: false,
        }
    }

    /// Non-null scalar type
    pub fn scalar(kind: ScalarKind) -> Self {
        Self::named(kind.graphql_name())
    }

    /// Make this a list
    pub fn list_of(mut self) -> Self {
        self.list = true;
        self
    }

    /// Allow absence
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "[{}!]", self.name)?;
        } else {
            f.write_str(&self.name)?;
        }
        if !self.nullable {
            f.write_str("!")?;
        }
        Ok(())
    }
}

/// A generated query or mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Operation name, unique across the schema
    pub name: String,
    /// What the operation does
    pub kind: OperationKind,
    /// Model the operation targets
    pub model: String,
    /// Declared arguments, in order
    pub arguments: Vec<Argument>,
    /// Result type
    pub returns: TypeRef,
    /// Free-text help
    pub description: Option<String>,
}

impl Operation {
    /// Argument by name
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

/// Operation kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Single,
    List,
    Pages,
    Create,
    Update,
    Delete,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
    /// Invocation of the named model method
    Method(String),
}

impl OperationKind {
    /// Read operations
    pub fn is_query(&self) -> bool {
        matches!(self, OperationKind::Single | OperationKind::List | OperationKind::Pages)
    }

    /// Short human description, used when reporting name conflicts
    pub fn describe(&self) -> &'static str {
        match self {
            OperationKind::Single => "single accessor",
            OperationKind::List => "list accessor",
            OperationKind::Pages => "paginated accessor",
            OperationKind::Create => "create mutation",
            OperationKind::Update => "update mutation",
            OperationKind::Delete => "delete mutation",
            OperationKind::BulkCreate => "bulk create mutation",
            OperationKind::BulkUpdate => "bulk update mutation",
            OperationKind::BulkDelete => "bulk delete mutation",
            OperationKind::Method(_) => "method",
        }
    }
}

/// An operation argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub ty: TypeRef,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty }
    }
}
