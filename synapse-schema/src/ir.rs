//! Intermediate Representation (IR) for schema generation
//!
//! Model descriptors are the normalized, backend-agnostic representation of
//! one registered model after inheritance has been merged and relationships
//! have been classified. Every generator consumes them; none mutates them.

use crate::registry::{ComputeOn, Generator, OnDelete};
use crate::value::{ScalarKind, Value};
use heck::ToSnakeCase;
use indexmap::IndexMap;

/// A model (entity) after introspection
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    /// Model name, unique within a registry
    pub name: String,

    /// Plural name used for the list accessor (snake_case)
    pub plural: String,

    /// Abstract models only contribute members to their subtypes
    pub is_abstract: bool,

    /// The identity field, also first in `fields`
    pub identity: FieldDescriptor,

    /// Fields in declaration order, identity first
    pub fields: IndexMap<String, FieldDescriptor>,

    /// Relationships, local and reverse
    pub relationships: IndexMap<String, RelationshipDescriptor>,

    /// Exposed methods
    pub methods: IndexMap<String, MethodDescriptor>,

    /// First declared base model
    pub parent: Option<String>,

    /// Free-text help
    pub help: Option<String>,
}

impl ModelDescriptor {
    /// Snake-case name used for the singular accessor
    pub fn singular(&self) -> String {
        self.name.to_snake_case()
    }

    /// The identity field
    pub fn identity(&self) -> &FieldDescriptor {
        &self.identity
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// Relationship by name
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(name)
    }
}

/// A field (column) of a model
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,

    /// Scalar kind
    pub kind: ScalarKind,

    /// Storage allows absence
    pub nullable: bool,

    /// Literal default, already coerced to `kind`
    pub default: Option<Value>,

    /// Value assigned by the system; never accepted from a caller
    pub computed: Option<Computed>,

    /// Identity field
    pub identity: bool,

    /// List-valued field
    pub list: bool,

    /// Free-text help
    pub help: Option<String>,
}

impl FieldDescriptor {
    /// A value is supplied automatically if omitted
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Value is assigned by the system
    pub fn is_server_computed(&self) -> bool {
        self.computed.is_some()
    }
}

/// How a server-computed value is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Computed {
    /// When the value is (re)assigned
    pub on: ComputeOn,
    /// What produces the value
    pub value: Generator,
}

/// Relationship cardinality, seen from the model holding the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Whether the relationship resolves to many records
    pub fn is_many(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// Which side of a relationship holds the reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// This model stores the reference under the relationship name
    Local,
    /// The target stores the reference under `field`
    Remote {
        /// Name of the owning relationship on the target
        field: String,
    },
}

/// A relationship between two models
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDescriptor {
    /// Relationship name
    pub name: String,

    /// Target model
    pub target: String,

    /// Cardinality seen from this model
    pub cardinality: Cardinality,

    /// Which side stores the reference
    pub ownership: Ownership,

    /// Reference may be absent (local single-valued relationships only)
    pub nullable: bool,

    /// Delete policy; meaningful on the owning side
    pub on_delete: OnDelete,

    /// Name of the other side, when one exists
    pub inverse: Option<String>,

    /// Free-text help
    pub help: Option<String>,
}

impl RelationshipDescriptor {
    /// This model stores the reference
    pub fn is_local(&self) -> bool {
        matches!(self.ownership, Ownership::Local)
    }

    /// Single-valued reference stored on this model (foreign key or owned one-to-one)
    pub fn is_foreign_key(&self) -> bool {
        self.is_local() && !self.cardinality.is_many()
    }
}

/// A parameter of an exposed method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ScalarKind,
    pub list: bool,
    pub required: bool,
}

/// What an exposed method returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    None,
    Scalar(ScalarKind),
    Structured,
}

/// A model method exposed as a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,

    /// Generated operation name
    pub operation: String,

    /// Declared parameters, in order
    pub params: Vec<ParamDescriptor>,

    /// Return shape
    pub returns: ReturnShape,

    /// Free-text help
    pub help: Option<String>,
}
