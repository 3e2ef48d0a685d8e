//! Output type generation
//!
//! One output type per model: a field per scalar field, mirroring storage
//! nullability, followed by one resolver field per relationship. Relationship
//! fields are resolved lazily at execution time (see [`crate::Engine::resolve`]).

use super::{TypeRef, naming};
use crate::ir::{Cardinality, ModelDescriptor};
use crate::value::ScalarKind;

/// Generated read shape of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputType {
    /// Type name
    pub name: String,
    /// Model the type reads
    pub model: String,
    /// Fields in declaration order, relationships last
    pub fields: Vec<OutputField>,
    /// Free-text help
    pub description: Option<String>,
}

impl OutputType {
    /// Field by name
    pub fn field(&self, name: &str) -> Option<&OutputField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A field of an output type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    pub name: String,
    pub ty: TypeRef,
    pub source: OutputSource,
    pub description: Option<String>,
}

/// Where an output field's value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSource {
    /// Stored scalar
    Scalar(ScalarKind),
    /// Resolved through a relationship
    Relation {
        target: String,
        cardinality: Cardinality,
    },
}

/// Generate the output type for a model
pub fn generate_output_type(model: &ModelDescriptor) -> OutputType {
    let mut fields = Vec::with_capacity(model.fields.len() + model.relationships.len());

    for field in model.fields.values() {
        let mut ty = TypeRef::scalar(field.kind);
        if field.list {
            ty = ty.list_of();
        }
        fields.push(OutputField {
            name: field.name.clone(),
            ty: ty.with_nullable(field.nullable),
            source: OutputSource::Scalar(field.kind),
            description: field.help.clone(),
        });
    }

    for rel in model.relationships.values() {
        let target = naming::output_type(&rel.target);
        let ty = if rel.cardinality.is_many() {
            TypeRef::named(target).list_of()
        } else {
            // Reverse one-to-one may have no counterpart
            TypeRef::named(target).with_nullable(rel.nullable || !rel.is_local())
        };
        fields.push(OutputField {
            name: rel.name.clone(),
            ty,
            source: OutputSource::Relation {
                target: rel.target.clone(),
                cardinality: rel.cardinality,
            },
            description: rel.help.clone(),
        });
    }

    OutputType {
        name: naming::output_type(&model.name),
        model: model.name.clone(),
        fields,
        description: model.help.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::introspect;
    use crate::registry::{FieldDefinition, ModelDefinition, RelationDefinition, RelationKind, Registry};

    fn registry() -> Registry {
        let mut registry = Registry::default();
        registry
            .register(
                ModelDefinition::new("Author")
                    .field(FieldDefinition::new("name", ScalarKind::String))
                    .field(FieldDefinition::new("email", ScalarKind::String).nullable()),
            )
            .register(
                ModelDefinition::new("Post")
                    .field(FieldDefinition::new("title", ScalarKind::String))
                    .field(FieldDefinition::new("tags", ScalarKind::String).list())
                    .relation(RelationDefinition::new("author", RelationKind::ForeignKey, "Author")),
            )
            .register(ModelDefinition::new("Empty"));
        registry
    }

    #[test]
    fn test_output_type_follows_declaration_order() {
        let models = introspect(&registry()).unwrap().models;
        let author = generate_output_type(&models["Author"]);
        let names: Vec<_> = author.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email", "posts"]);
        assert_eq!(author.field("email").unwrap().ty.to_string(), "String");
        assert_eq!(author.field("name").unwrap().ty.to_string(), "String!");
        assert_eq!(author.field("posts").unwrap().ty.to_string(), "[Post!]!");
    }

    #[test]
    fn test_relationship_fields_resolve_to_targets() {
        let models = introspect(&registry()).unwrap().models;
        let post = generate_output_type(&models["Post"]);
        assert_eq!(post.field("tags").unwrap().ty.to_string(), "[String!]!");
        let author = post.field("author").unwrap();
        assert_eq!(author.ty.to_string(), "Author!");
        assert_eq!(
            author.source,
            OutputSource::Relation {
                target: "Author".to_string(),
                cardinality: Cardinality::ManyToOne
            }
        );
    }

    #[test]
    fn test_empty_model_exposes_identity_only() {
        let models = introspect(&registry()).unwrap().models;
        let empty = generate_output_type(&models["Empty"]);
        assert_eq!(empty.fields.len(), 1);
        assert_eq!(empty.fields[0].name, "id");
        assert_eq!(empty.fields[0].ty.to_string(), "Int!");
    }
}
