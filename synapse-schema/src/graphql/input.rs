//! Input type generation
//!
//! Generates the write shapes of a model:
//! - `CreateMInput`: identity and server-computed fields excluded
//! - `UpdateMInput`: identity required, everything else optional (partial update)
//! - `DeleteMInput`: identity only
//!
//! Requiredness follows a strict precedence: identity, server-computed,
//! default, nullable, otherwise required on create.

use super::{TypeRef, naming};
use crate::ir::{FieldDescriptor, ModelDescriptor, RelationshipDescriptor};
use crate::value::ScalarKind;

/// Operation an input type is shaped for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Create,
    Update,
    Delete,
}

/// Generated write shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputType {
    /// Type name
    pub name: String,
    /// Model the input writes
    pub model: String,
    /// Operation kind
    pub kind: InputKind,
    /// Accepted fields; excluded fields are absent
    pub fields: Vec<InputField>,
}

impl InputType {
    /// Field by name
    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of required fields
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name.as_str())
    }
}

/// A field accepted by an input type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField {
    pub name: String,
    pub shape: InputShape,
    /// Must be present
    pub required: bool,
    /// Explicit `null` is accepted
    pub accepts_null: bool,
    pub description: Option<String>,
}

impl InputField {
    /// Type reference as rendered in the surface
    pub fn type_ref(&self) -> TypeRef {
        let ty = match &self.shape {
            InputShape::Scalar { kind, list: false } => TypeRef::scalar(*kind),
            InputShape::Scalar { kind, list: true } => TypeRef::scalar(*kind).list_of(),
            InputShape::Relation(rel) if rel.many => {
                TypeRef::named(naming::reference_input(&rel.target)).list_of()
            }
            InputShape::Relation(rel) => TypeRef::named(naming::reference_input(&rel.target)),
        };
        ty.with_nullable(!self.required)
    }
}

/// What an input field accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputShape {
    /// A scalar (or list of scalars) value
    Scalar { kind: ScalarKind, list: bool },
    /// An identity to attach, a nested create object or a `$ref`
    Relation(RelationInput),
}

/// Relationship hook resolved by the nested operation handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInput {
    /// Related model
    pub target: String,
    /// Kind of the related model's identity (attach by identity)
    pub target_identity: ScalarKind,
    /// Create input of the related model (create-then-attach)
    pub create_input: String,
    /// Accepts a list
    pub many: bool,
}

/// Generate the input type of `kind` for a model
///
/// `models` resolves relationship targets; a target missing from it is skipped.
pub fn generate_input_type<'a>(
    model: &ModelDescriptor,
    kind: InputKind,
    models: impl Fn(&str) -> Option<&'a ModelDescriptor>,
) -> InputType {
    let name = match kind {
        InputKind::Create => naming::create_input(&model.name),
        InputKind::Update => naming::update_input(&model.name),
        InputKind::Delete => naming::delete_input(&model.name),
    };

    let mut fields = Vec::new();
    for field in model.fields.values() {
        if kind == InputKind::Delete && !field.identity {
            continue;
        }
        if let Some(input) = scalar_input(field, kind) {
            fields.push(input);
        }
    }

    if kind != InputKind::Delete {
        for rel in model.relationships.values() {
            let Some(target) = models(&rel.target) else {
                continue;
            };
            fields.push(relation_input(rel, target, kind));
        }
    }

    InputType {
        name,
        model: model.name.clone(),
        kind,
        fields,
    }
}

/// Requiredness of one scalar field, `None` when excluded
fn scalar_input(field: &FieldDescriptor, kind: InputKind) -> Option<InputField> {
    let required = if field.identity {
        match kind {
            InputKind::Create => return None,
            InputKind::Update | InputKind::Delete => true,
        }
    } else if field.is_server_computed() {
        return None;
    } else if field.has_default() || field.nullable {
        false
    } else {
        kind == InputKind::Create
    };

    Some(InputField {
        name: field.name.clone(),
        shape: InputShape::Scalar {
            kind: field.kind,
            list: field.list,
        },
        required,
        accepts_null: field.nullable,
        description: field.help.clone(),
    })
}

fn relation_input(rel: &RelationshipDescriptor, target: &ModelDescriptor, kind: InputKind) -> InputField {
    let many = rel.cardinality.is_many();
    let required = kind == InputKind::Create && rel.is_foreign_key() && !rel.nullable;
    InputField {
        name: rel.name.clone(),
        shape: InputShape::Relation(RelationInput {
            target: rel.target.clone(),
            target_identity: target.identity().kind,
            create_input: naming::create_input(&rel.target),
            many,
        }),
        required,
        accepts_null: rel.is_foreign_key() && rel.nullable,
        description: rel.help.clone(),
    }
}
