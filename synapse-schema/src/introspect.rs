//! Model introspection
//!
//! Turns a [`Registry`] into [`ModelDescriptor`]s:
//! - merges inherited members (earlier base wins, the subtype's own
//!   declaration replaces a member entirely)
//! - settles the identity field and validates defaults/computed values
//! - screens methods for exposure
//! - classifies every relationship and synthesizes its reverse side
//!
//! Problems confined to one model, method or relationship are collected as
//! [`IntrospectionError`]s and the rest of the registry still builds.

use crate::error::{IntrospectionError, SchemaError};
use crate::graphql::naming::pluralize;
use crate::ir::{
    Cardinality, Computed, FieldDescriptor, MethodDescriptor, ModelDescriptor, Ownership,
    ParamDescriptor, RelationshipDescriptor, ReturnShape,
};
use crate::registry::{
    ComputeOn, FieldDefinition, Generator, MethodDefinition, ModelDefinition, RelationDefinition,
    RelationKind, Registry, ReturnDefinition,
};
use crate::value::{ScalarKind, Value};
use heck::ToSnakeCase;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Name of the identity field added when a model declares none
pub const IMPLICIT_IDENTITY: &str = "id";

/// Result of introspecting a registry
#[derive(Debug, Clone, PartialEq)]
pub struct Introspection {
    /// Descriptors of every model that built, abstract ones included, in registration order
    pub models: IndexMap<String, ModelDescriptor>,

    /// Isolated problems, in registration order
    pub issues: Vec<IntrospectionError>,
}

/// Introspect every registered model
///
/// Only a duplicated model name is fatal; everything else is isolated.
pub fn introspect(registry: &Registry) -> Result<Introspection, SchemaError> {
    let mut definitions: IndexMap<&str, &ModelDefinition> = IndexMap::new();
    for model in &registry.models {
        if definitions.insert(model.name.as_str(), model).is_some() {
            return Err(SchemaError::SchemaNameConflict {
                name: model.name.clone(),
                first: format!("model `{}`", model.name),
                second: format!("model `{}`", model.name),
            });
        }
    }

    let mut issues = Vec::new();
    let mut resolver = MergeResolver {
        definitions: &definitions,
        cache: HashMap::new(),
    };

    // Pass 1: merged members, fields and methods
    let mut built: IndexMap<String, (ModelDescriptor, Vec<RelationDefinition>)> = IndexMap::new();
    for def in definitions.values() {
        let merged = match resolver.resolve(&def.name, &mut Vec::new()) {
            Ok(merged) => merged,
            Err(err) => {
                issues.push(err);
                continue;
            }
        };
        match build_model(def, merged, &mut issues) {
            Ok(built_model) => {
                built.insert(def.name.clone(), built_model);
            }
            Err(err) => issues.push(err),
        }
    }

    // Pass 2: relationships against the surviving model set
    let concrete: HashSet<String> = built
        .iter()
        .filter(|(_, (model, _))| !model.is_abstract)
        .map(|(name, _)| name.clone())
        .collect();

    // (declaring model, receiving model, reverse side)
    let mut reverse: Vec<(String, String, RelationshipDescriptor)> = Vec::new();
    let names: Vec<String> = built.keys().cloned().collect();
    for name in &names {
        let Some((model, relations)) = built.get_mut(name) else {
            continue;
        };
        for rel in std::mem::take(relations) {
            if !concrete.contains(&rel.target) {
                issues.push(IntrospectionError::UnknownRelationTarget {
                    model: name.clone(),
                    relation: rel.name.clone(),
                    target: rel.target.clone(),
                });
                continue;
            }
            let local = local_relationship(&rel);
            if !model.is_abstract {
                reverse.push((
                    name.clone(),
                    rel.target.clone(),
                    reverse_relationship(&model.name, &rel),
                ));
            }
            model.relationships.insert(rel.name.clone(), local);
        }
    }

    for (declaring, receiving, rev) in reverse {
        let owning = match &rev.ownership {
            Ownership::Remote { field } => field.clone(),
            Ownership::Local => continue,
        };
        let Some((target, _)) = built.get_mut(&receiving) else {
            continue;
        };
        if target.fields.contains_key(&rev.name) || target.relationships.contains_key(&rev.name) {
            issues.push(IntrospectionError::RelationNameClash {
                model: declaring.clone(),
                relation: owning.clone(),
                target: target.name.clone(),
                name: rev.name.clone(),
            });
            continue;
        }
        let reverse_name = rev.name.clone();
        target.relationships.insert(reverse_name.clone(), rev);
        if let Some((owner, _)) = built.get_mut(&declaring) {
            if let Some(local) = owner.relationships.get_mut(&owning) {
                local.inverse = Some(reverse_name);
            }
        }
    }

    let models: IndexMap<String, ModelDescriptor> = built
        .into_iter()
        .map(|(name, (model, _))| (name, model))
        .collect();

    debug!(
        models = models.len(),
        issues = issues.len(),
        "introspected model registry"
    );

    Ok(Introspection { models, issues })
}

/// Members of a model after inheritance merge
#[derive(Debug, Clone, Default)]
struct Merged {
    fields: IndexMap<String, FieldDefinition>,
    relations: IndexMap<String, RelationDefinition>,
    methods: IndexMap<String, MethodDefinition>,
}

impl Merged {
    /// Add a member unless one with the same name is already present
    fn inherit(&mut self, base: &Merged) {
        for (name, field) in &base.fields {
            if !self.has_member(name) {
                self.fields.insert(name.clone(), field.clone());
            }
        }
        for (name, rel) in &base.relations {
            if !self.has_member(name) {
                self.relations.insert(name.clone(), rel.clone());
            }
        }
        for (name, method) in &base.methods {
            self.methods.entry(name.clone()).or_insert_with(|| method.clone());
        }
    }

    fn has_member(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.relations.contains_key(name)
    }

    /// Replace a member entirely with the subtype's declaration
    fn override_field(&mut self, field: &FieldDefinition) {
        self.relations.shift_remove(&field.name);
        self.fields.insert(field.name.clone(), field.clone());
    }

    fn override_relation(&mut self, rel: &RelationDefinition) {
        self.fields.shift_remove(&rel.name);
        self.relations.insert(rel.name.clone(), rel.clone());
    }
}

/// Memoized inheritance resolution with cycle detection
struct MergeResolver<'a> {
    definitions: &'a IndexMap<&'a str, &'a ModelDefinition>,
    cache: HashMap<String, Result<Merged, IntrospectionError>>,
}

impl MergeResolver<'_> {
    fn resolve(&mut self, name: &str, stack: &mut Vec<String>) -> Result<Merged, IntrospectionError> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }
        let Some(def) = self.definitions.get(name).copied() else {
            return Err(IntrospectionError::UnknownBase {
                model: stack.last().cloned().unwrap_or_else(|| name.to_string()),
                base: name.to_string(),
            });
        };

        stack.push(name.to_string());
        let result = self.merge(def, stack);
        stack.pop();

        self.cache.insert(name.to_string(), result.clone());
        result
    }

    fn merge(&mut self, def: &ModelDefinition, stack: &mut Vec<String>) -> Result<Merged, IntrospectionError> {
        check_own_members(def)?;

        let mut merged = Merged::default();
        for base in &def.bases {
            if stack.iter().any(|s| s == base) {
                return Err(IntrospectionError::InheritanceCycle {
                    model: def.name.clone(),
                    through: base.clone(),
                });
            }
            let base_members = match self.resolve(base, stack) {
                Ok(members) => members,
                Err(IntrospectionError::InheritanceCycle { .. }) => {
                    return Err(IntrospectionError::InheritanceCycle {
                        model: def.name.clone(),
                        through: base.clone(),
                    });
                }
                Err(_) => {
                    return Err(IntrospectionError::UnknownBase {
                        model: def.name.clone(),
                        base: base.clone(),
                    });
                }
            };
            merged.inherit(&base_members);
        }

        for field in &def.fields {
            merged.override_field(field);
        }
        for rel in &def.relations {
            merged.override_relation(rel);
        }
        for method in &def.methods {
            merged.methods.insert(method.name.clone(), method.clone());
        }
        Ok(merged)
    }
}

/// Names must start with an ASCII letter and continue with letters, digits or `_`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_names(def: &ModelDefinition) -> Result<(), IntrospectionError> {
    let snake = def.name.to_snake_case();
    let reverse_names = def
        .relations
        .iter()
        .filter_map(|r| r.related_name.as_ref())
        .map(|template| template.replace("{model}", &snake));
    let names = std::iter::once(def.name.clone())
        .chain(def.plural.clone())
        .chain(def.fields.iter().map(|f| f.name.clone()))
        .chain(def.relations.iter().map(|r| r.name.clone()))
        .chain(reverse_names);
    for name in names {
        if !is_valid_name(&name) {
            return Err(IntrospectionError::InvalidName {
                model: def.name.clone(),
                name,
            });
        }
    }
    Ok(())
}

/// Fields and relationships share one namespace within a declaration
fn check_own_members(def: &ModelDefinition) -> Result<(), IntrospectionError> {
    check_names(def)?;
    let mut seen = HashSet::new();
    let members = def
        .fields
        .iter()
        .map(|f| &f.name)
        .chain(def.relations.iter().map(|r| &r.name));
    for name in members {
        if !seen.insert(name.as_str()) {
            return Err(IntrospectionError::DuplicateMember {
                model: def.name.clone(),
                name: name.clone(),
            });
        }
    }
    let mut methods = HashSet::new();
    for method in &def.methods {
        if !methods.insert(method.name.as_str()) {
            return Err(IntrospectionError::DuplicateMember {
                model: def.name.clone(),
                name: method.name.clone(),
            });
        }
    }
    Ok(())
}

/// Build the descriptor for one merged model; relationships are attached later
fn build_model(
    def: &ModelDefinition,
    merged: Merged,
    issues: &mut Vec<IntrospectionError>,
) -> Result<(ModelDescriptor, Vec<RelationDefinition>), IntrospectionError> {
    let fields = build_fields(&def.name, &merged.fields)?;
    let identity = fields
        .values()
        .find(|f| f.identity)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| IMPLICIT_IDENTITY.to_string());

    if merged.relations.contains_key(&identity) {
        return Err(IntrospectionError::InvalidIdentity {
            model: def.name.clone(),
            field: identity,
            reason: "a relationship uses the identity name".to_string(),
        });
    }

    let mut methods = IndexMap::new();
    for method in merged.methods.values() {
        if !method.exposed {
            continue;
        }
        match build_method(&def.name, &identity, method) {
            Ok(descriptor) => {
                methods.insert(descriptor.name.clone(), descriptor);
            }
            Err(err) => issues.push(err),
        }
    }

    let plural = match &def.plural {
        Some(plural) => plural.to_snake_case(),
        None => pluralize(&def.name.to_snake_case()),
    };

    let identity_field = fields
        .values()
        .find(|f| f.identity)
        .cloned()
        .ok_or_else(|| IntrospectionError::InvalidIdentity {
            model: def.name.clone(),
            field: identity.clone(),
            reason: "no identity field".to_string(),
        })?;

    let model = ModelDescriptor {
        name: def.name.clone(),
        plural,
        is_abstract: def.is_abstract,
        identity: identity_field,
        fields,
        relationships: IndexMap::new(),
        methods,
        parent: def.bases.first().cloned(),
        help: def.help.clone(),
    };
    Ok((model, merged.relations.into_values().collect()))
}

fn build_fields(
    model: &str,
    merged: &IndexMap<String, FieldDefinition>,
) -> Result<IndexMap<String, FieldDescriptor>, IntrospectionError> {
    let declared_identities: Vec<&FieldDefinition> =
        merged.values().filter(|f| f.identity).collect();

    let mut fields = IndexMap::new();
    match declared_identities.as_slice() {
        [] => {
            if merged.contains_key(IMPLICIT_IDENTITY) {
                return Err(IntrospectionError::InvalidIdentity {
                    model: model.to_string(),
                    field: IMPLICIT_IDENTITY.to_string(),
                    reason: "field `id` exists but is not marked as identity".to_string(),
                });
            }
            fields.insert(
                IMPLICIT_IDENTITY.to_string(),
                FieldDescriptor {
                    name: IMPLICIT_IDENTITY.to_string(),
                    kind: ScalarKind::Integer,
                    nullable: false,
                    default: None,
                    computed: Some(Computed {
                        on: ComputeOn::Create,
                        value: Generator::Sequence,
                    }),
                    identity: true,
                    list: false,
                    help: None,
                },
            );
        }
        [_] => {}
        [_, second, ..] => {
            return Err(IntrospectionError::InvalidIdentity {
                model: model.to_string(),
                field: second.name.clone(),
                reason: "more than one identity field".to_string(),
            });
        }
    }

    for def in merged.values() {
        let field = if def.identity {
            identity_field(model, def)?
        } else {
            plain_field(model, def)?
        };
        fields.insert(def.name.clone(), field);
    }

    // Identity leads the declaration order
    if let Some(index) = fields.values().position(|f| f.identity) {
        fields.move_index(index, 0);
    }
    Ok(fields)
}

fn identity_field(model: &str, def: &FieldDefinition) -> Result<FieldDescriptor, IntrospectionError> {
    let invalid = |reason: &str| IntrospectionError::InvalidIdentity {
        model: model.to_string(),
        field: def.name.clone(),
        reason: reason.to_string(),
    };
    if !def.kind.is_identity_capable() {
        return Err(invalid("identity must be an integer or uuid"));
    }
    if def.nullable || def.list || def.default.is_some() {
        return Err(invalid("identity cannot be nullable, list-valued or defaulted"));
    }
    let generator = match (def.computed, def.kind) {
        (Some(computed), _) if computed.on == ComputeOn::Create && computed.value.produces(def.kind) => {
            computed.value
        }
        (Some(_), _) => return Err(invalid("identity must be assigned once, on create")),
        (None, ScalarKind::Uuid) => Generator::Uuid,
        (None, _) => Generator::Sequence,
    };
    Ok(FieldDescriptor {
        name: def.name.clone(),
        kind: def.kind,
        nullable: false,
        default: None,
        computed: Some(Computed {
            on: ComputeOn::Create,
            value: generator,
        }),
        identity: true,
        list: false,
        help: def.help.clone(),
    })
}

fn plain_field(model: &str, def: &FieldDefinition) -> Result<FieldDescriptor, IntrospectionError> {
    let invalid = |reason: String| IntrospectionError::InvalidDefault {
        model: model.to_string(),
        field: def.name.clone(),
        reason,
    };

    let computed = match def.computed {
        Some(c) if def.list => {
            return Err(invalid(format!("`{:?}` cannot fill a list-valued field", c.value)));
        }
        Some(c) if !c.value.produces(def.kind) => {
            return Err(invalid(format!(
                "`{:?}` cannot produce a {} value",
                c.value, def.kind
            )));
        }
        Some(c) => Some(Computed {
            on: c.on,
            value: c.value,
        }),
        None => None,
    };

    let default = match &def.default {
        None => None,
        Some(json) => {
            let value = Value::from_json(def.kind, def.list, json).map_err(invalid)?;
            if value.is_null() && !def.nullable {
                return Err(invalid("null default on a non-nullable field".to_string()));
            }
            Some(value)
        }
    };

    Ok(FieldDescriptor {
        name: def.name.clone(),
        kind: def.kind,
        nullable: def.nullable,
        default,
        computed,
        identity: false,
        list: def.list,
        help: def.help.clone(),
    })
}

fn build_method(
    model: &str,
    identity: &str,
    def: &MethodDefinition,
) -> Result<MethodDescriptor, IntrospectionError> {
    let unsupported = |reason: String| IntrospectionError::UnsupportedMethodSignature {
        model: model.to_string(),
        method: def.name.clone(),
        reason,
    };

    let operation = def.operation.clone().unwrap_or_else(|| def.name.clone());
    for name in [&def.name, &operation] {
        if !is_valid_name(name) {
            return Err(unsupported(format!("`{}` is not a valid name", name)));
        }
    }

    let mut seen = HashSet::new();
    let mut params = Vec::with_capacity(def.params.len());
    for param in &def.params {
        if !is_valid_name(&param.name) {
            return Err(unsupported(format!("parameter `{}` is not a valid name", param.name)));
        }
        if param.variadic {
            return Err(unsupported(format!("parameter `{}` is variadic", param.name)));
        }
        let Some(kind) = param.kind else {
            return Err(unsupported(format!("parameter `{}` is untyped", param.name)));
        };
        if param.name == identity {
            return Err(unsupported(format!(
                "parameter `{}` shadows the identity argument",
                param.name
            )));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(unsupported(format!("parameter `{}` is declared twice", param.name)));
        }
        params.push(ParamDescriptor {
            name: param.name.clone(),
            kind,
            list: param.list,
            required: param.required,
        });
    }

    let returns = match def.returns {
        ReturnDefinition::None => ReturnShape::None,
        ReturnDefinition::Scalar(kind) => ReturnShape::Scalar(kind),
        ReturnDefinition::Structured => ReturnShape::Structured,
    };

    Ok(MethodDescriptor {
        name: def.name.clone(),
        operation,
        params,
        returns,
        help: def.help.clone(),
    })
}

fn local_relationship(def: &RelationDefinition) -> RelationshipDescriptor {
    let cardinality = match def.kind {
        RelationKind::ForeignKey => Cardinality::ManyToOne,
        RelationKind::OneToOne => Cardinality::OneToOne,
        RelationKind::ManyToMany => Cardinality::ManyToMany,
    };
    RelationshipDescriptor {
        name: def.name.clone(),
        target: def.target.clone(),
        cardinality,
        ownership: Ownership::Local,
        nullable: def.nullable || def.kind == RelationKind::ManyToMany,
        on_delete: def.on_delete,
        inverse: None,
        help: def.help.clone(),
    }
}

fn reverse_relationship(declaring: &str, def: &RelationDefinition) -> RelationshipDescriptor {
    let snake = declaring.to_snake_case();
    let name = match &def.related_name {
        Some(template) => template.replace("{model}", &snake),
        None if def.kind == RelationKind::OneToOne => snake,
        None => pluralize(&snake),
    };
    let cardinality = match def.kind {
        RelationKind::ForeignKey => Cardinality::OneToMany,
        RelationKind::OneToOne => Cardinality::OneToOne,
        RelationKind::ManyToMany => Cardinality::ManyToMany,
    };
    RelationshipDescriptor {
        name,
        target: declaring.to_string(),
        cardinality,
        ownership: Ownership::Remote {
            field: def.name.clone(),
        },
        nullable: true,
        on_delete: def.on_delete,
        inverse: Some(def.name.clone()),
        help: None,
    }
}
