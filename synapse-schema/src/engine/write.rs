//! Write planning
//!
//! Validates a create/update input tree against the generated input types
//! and turns it into a pending write graph: one node per record to create or
//! update, one link per reference to set. Every violation in the tree is
//! collected with its input path; nothing touches storage here.

use crate::error::MutationError;
use crate::graphql::ModelSchema;
use crate::graphql::input::{InputKind, InputShape};
use crate::graphql::schema::Schema;
use crate::ir::{Cardinality, Ownership, RelationshipDescriptor};
use crate::value::{Identity, Value};
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

/// Key labelling a nested create object
pub const LABEL_KEY: &str = "$id";
/// Key referencing a labelled nested create object
pub const REF_KEY: &str = "$ref";

/// What a node does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Create,
    Update(Identity),
}

/// A record to write
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub model: String,
    pub action: Action,
    /// Scalar values supplied by the caller, coerced
    pub values: IndexMap<String, Value>,
    /// Input path, empty for the root
    pub path: String,
}

/// A record taking part in a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ref {
    /// Written by this plan
    Node(usize),
    /// Already stored
    Existing(Identity),
}

/// Reference to set on `holder`
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub holder: Ref,
    pub holder_model: String,
    /// Local relationship on the holder model
    pub field: String,
    /// `None` clears a nullable reference
    pub value: Option<Ref>,
    pub value_model: String,
    /// Adds to a link set instead of setting a single reference
    pub many: bool,
    pub path: String,
}

/// A validated write graph; node 0 is the root
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone)]
enum RawRef {
    Node(usize),
    Existing(Identity),
    Label { label: String, model: String },
}

#[derive(Debug, Clone)]
struct RawLink {
    holder: RawRef,
    holder_model: String,
    field: String,
    value: Option<RawRef>,
    value_model: String,
    many: bool,
    path: String,
}

/// Plan a create or update of `model`
pub(crate) fn plan(
    schema: &Schema,
    model: &ModelSchema,
    kind: InputKind,
    input: &Json,
) -> Result<Plan, Vec<MutationError>> {
    let mut planner = Planner {
        schema,
        nodes: Vec::new(),
        links: Vec::new(),
        labels: HashMap::new(),
        required: Vec::new(),
        errors: Vec::new(),
    };
    planner.node(model, kind, input, "", None);
    planner.finish()
}

struct Planner<'s> {
    schema: &'s Schema,
    nodes: Vec<Node>,
    links: Vec<RawLink>,
    labels: HashMap<String, (usize, String)>,
    /// (node, relationship, path) that must end up linked
    required: Vec<(usize, String, String)>,
    errors: Vec<MutationError>,
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn error(path: &str, message: impl Into<String>) -> MutationError {
    if path.is_empty() {
        MutationError::new(crate::error::ErrorKind::ValidationError, message)
    } else {
        MutationError::field(path, message)
    }
}

impl Planner<'_> {
    /// Validate one input object and add its node
    ///
    /// `linked_by` names the relationship the enclosing object sets on this node.
    fn node(
        &mut self,
        model: &ModelSchema,
        kind: InputKind,
        input: &Json,
        path: &str,
        linked_by: Option<&str>,
    ) -> Option<usize> {
        let Json::Object(map) = input else {
            self.errors.push(error(path, "expected an input object"));
            return None;
        };

        let identity = model.identity();
        let action = match kind {
            InputKind::Update => match map.get(identity) {
                None => {
                    self.errors.push(error(&join(path, identity), "field is required"));
                    return None;
                }
                Some(raw) => match Identity::from_json(model.descriptor.identity().kind, raw) {
                    Ok(id) => Action::Update(id),
                    Err(message) => {
                        self.errors.push(error(&join(path, identity), message));
                        return None;
                    }
                },
            },
            _ => Action::Create,
        };

        let index = self.nodes.len();
        self.nodes.push(Node {
            model: model.descriptor.name.clone(),
            action,
            values: IndexMap::new(),
            path: path.to_string(),
        });

        if let Some(label) = map.get(LABEL_KEY) {
            self.label(index, model, label, path);
        }

        let input_type = model.input(kind);
        for (key, value) in map {
            if key == LABEL_KEY || (kind == InputKind::Update && key == identity) {
                continue;
            }
            let here = join(path, key);
            let Some(field) = input_type.field(key) else {
                let message = if model.descriptor.field(key).is_some() {
                    "field is assigned by the server"
                } else {
                    "unknown field"
                };
                self.errors.push(error(&here, message));
                continue;
            };
            if linked_by == Some(key.as_str()) {
                self.errors.push(error(&here, "field is set by the enclosing object"));
                continue;
            }
            if value.is_null() && !field.accepts_null {
                self.errors.push(error(&here, "field cannot be null"));
                continue;
            }
            match &field.shape {
                InputShape::Scalar { kind, list } => match Value::from_json(*kind, *list, value) {
                    Ok(v) => {
                        self.nodes[index].values.insert(key.clone(), v);
                    }
                    Err(message) => self.errors.push(error(&here, message)),
                },
                InputShape::Relation(_) => {
                    let Some(rel) = model.descriptor.relationship(key) else {
                        continue;
                    };
                    self.relation(index, model, rel, value, &here);
                }
            }
        }

        if kind == InputKind::Create {
            for field in input_type.fields.iter().filter(|f| f.required) {
                let supplied = map.contains_key(&field.name) || linked_by == Some(field.name.as_str());
                match field.shape {
                    InputShape::Scalar { .. } if !supplied => {
                        self.errors.push(error(&join(path, &field.name), "field is required"));
                    }
                    InputShape::Relation(_) if !supplied => {
                        self.required.push((index, field.name.clone(), join(path, &field.name)));
                    }
                    _ => {}
                }
            }
        }
        Some(index)
    }

    fn label(&mut self, index: usize, model: &ModelSchema, label: &Json, path: &str) {
        let here = join(path, LABEL_KEY);
        let Some(label) = label.as_str() else {
            self.errors.push(error(&here, "label must be a string"));
            return;
        };
        if self.nodes[index].action != Action::Create {
            self.errors.push(error(&here, "only created objects can be labelled"));
            return;
        }
        if self
            .labels
            .insert(label.to_string(), (index, model.descriptor.name.clone()))
            .is_some()
        {
            self.errors.push(error(&here, format!("label `{}` is used twice", label)));
        }
    }

    /// Record the links a relationship input creates
    fn relation(
        &mut self,
        index: usize,
        model: &ModelSchema,
        rel: &RelationshipDescriptor,
        value: &Json,
        path: &str,
    ) {
        let Some(target) = self.schema.model(&rel.target) else {
            return;
        };
        let this = model.descriptor.name.clone();
        let many = rel.cardinality.is_many();

        let items: Vec<(&Json, String)> = if many {
            let Json::Array(items) = value else {
                self.errors.push(error(path, "expected a list"));
                return;
            };
            items
                .iter()
                .enumerate()
                .map(|(i, item)| (item, format!("{}[{}]", path, i)))
                .collect()
        } else {
            vec![(value, path.to_string())]
        };

        for (item, here) in items {
            match &rel.ownership {
                Ownership::Local => {
                    let value = if item.is_null() {
                        if many {
                            self.errors.push(error(&here, "list items must not be null"));
                            continue;
                        }
                        None
                    } else {
                        match self.item(target, item, &here, None) {
                            Some(r) => Some(r),
                            None => continue,
                        }
                    };
                    self.links.push(RawLink {
                        holder: RawRef::Node(index),
                        holder_model: this.clone(),
                        field: rel.name.clone(),
                        value,
                        value_model: rel.target.clone(),
                        many,
                        path: here,
                    });
                }
                Ownership::Remote { field } => {
                    let Some(holder) = self.item(target, item, &here, Some(field)) else {
                        continue;
                    };
                    self.links.push(RawLink {
                        holder,
                        holder_model: rel.target.clone(),
                        field: field.clone(),
                        value: Some(RawRef::Node(index)),
                        value_model: this.clone(),
                        many: rel.cardinality == Cardinality::ManyToMany,
                        path: here,
                    });
                }
            }
        }
    }

    /// An identity (attach), a `$ref`, or a nested create object
    fn item(&mut self, target: &ModelSchema, item: &Json, path: &str, linked_by: Option<&str>) -> Option<RawRef> {
        match item {
            Json::Object(map) if map.contains_key(REF_KEY) => self.reference(target, map, path),
            Json::Object(_) => self
                .node(target, InputKind::Create, item, path, linked_by)
                .map(RawRef::Node),
            raw => match Identity::from_json(target.descriptor.identity().kind, raw) {
                Ok(id) => Some(RawRef::Existing(id)),
                Err(message) => {
                    self.errors.push(error(path, message));
                    None
                }
            },
        }
    }

    fn reference(&mut self, target: &ModelSchema, map: &Map<String, Json>, path: &str) -> Option<RawRef> {
        if map.len() != 1 {
            self.errors.push(error(path, "a reference cannot carry other fields"));
            return None;
        }
        match map.get(REF_KEY).and_then(Json::as_str) {
            Some(label) => Some(RawRef::Label {
                label: label.to_string(),
                model: target.descriptor.name.clone(),
            }),
            None => {
                self.errors.push(error(&join(path, REF_KEY), "label must be a string"));
                None
            }
        }
    }

    fn resolve(&mut self, raw: RawRef, path: &str) -> Option<Ref> {
        match raw {
            RawRef::Node(index) => Some(Ref::Node(index)),
            RawRef::Existing(id) => Some(Ref::Existing(id)),
            RawRef::Label { label, model } => match self.labels.get(&label) {
                Some((index, labelled)) if *labelled == model => Some(Ref::Node(*index)),
                Some((_, labelled)) => {
                    self.errors.push(error(
                        path,
                        format!("`{}` labels a {}, expected a {}", label, labelled, model),
                    ));
                    None
                }
                None => {
                    self.errors.push(error(path, format!("unknown reference `{}`", label)));
                    None
                }
            },
        }
    }

    fn finish(mut self) -> Result<Plan, Vec<MutationError>> {
        let mut links = Vec::with_capacity(self.links.len());
        for raw in std::mem::take(&mut self.links) {
            let holder = self.resolve(raw.holder, &raw.path);
            let value = match raw.value {
                Some(value) => self.resolve(value, &raw.path).map(Some),
                None => Some(None),
            };
            if let (Some(holder), Some(value)) = (holder, value) {
                links.push(Link {
                    holder,
                    holder_model: raw.holder_model,
                    field: raw.field,
                    value,
                    value_model: raw.value_model,
                    many: raw.many,
                    path: raw.path,
                });
            }
        }

        for (index, relation, path) in std::mem::take(&mut self.required) {
            let linked = links.iter().any(|l| {
                l.holder == Ref::Node(index) && l.field == relation && l.value.is_some()
            });
            if !linked {
                self.errors.push(error(&path, "field is required"));
            }
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(Plan {
            nodes: self.nodes,
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::generate;
    use crate::registry::{
        FieldDefinition, ModelDefinition, RelationDefinition, RelationKind, Registry,
    };
    use crate::value::ScalarKind;
    use serde_json::json;

    fn schema() -> Schema {
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
                    .relation(RelationDefinition::new("author", RelationKind::ForeignKey, "Author")),
            );
        generate(&registry).unwrap()
    }

    fn plan_for(schema: &Schema, model: &str, kind: InputKind, input: Json) -> Result<Plan, Vec<MutationError>> {
        plan(schema, schema.model(model).unwrap(), kind, &input)
    }

    fn paths(errors: &[MutationError]) -> Vec<String> {
        let mut paths: Vec<_> = errors.iter().filter_map(|e| e.field.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_violations_accumulate_with_paths() {
        let schema = schema();
        let errors = plan_for(
            &schema,
            "Post",
            InputKind::Create,
            json!({ "id": 4, "author": { "email": 7 }, "extra": true }),
        )
        .unwrap_err();
        assert_eq!(
            paths(&errors),
            vec!["author.email", "author.name", "extra", "id", "title"]
        );
        let id = errors.iter().find(|e| e.field.as_deref() == Some("id")).unwrap();
        assert_eq!(id.message, "field is assigned by the server");
    }

    #[test]
    fn test_nested_create_builds_links() {
        let schema = schema();
        let plan = plan_for(
            &schema,
            "Author",
            InputKind::Create,
            json!({ "name": "Ada", "posts": [ { "title": "One" }, 7 ] }),
        )
        .unwrap();
        assert_eq!(plan.nodes.len(), 2);
        assert_eq!(plan.nodes[1].path, "posts[0]");
        assert_eq!(plan.links.len(), 2);
        assert_eq!(plan.links[0].holder, Ref::Node(1));
        assert_eq!(plan.links[0].field, "author");
        assert_eq!(plan.links[0].value, Some(Ref::Node(0)));
        assert_eq!(plan.links[1].holder, Ref::Existing(Identity::Int(7)));
    }

    #[test]
    fn test_parent_link_satisfies_required_reference() {
        let schema = schema();
        assert!(plan_for(&schema, "Post", InputKind::Create, json!({ "title": "x" })).is_err());
        let errors = plan_for(
            &schema,
            "Author",
            InputKind::Create,
            json!({ "name": "Ada", "posts": [ { "title": "x", "author": 3 } ] }),
        )
        .unwrap_err();
        assert_eq!(paths(&errors), vec!["posts[0].author"]);
    }

    #[test]
    fn test_labels_resolve_and_must_exist() {
        let schema = schema();
        let errors = plan_for(
            &schema,
            "Post",
            InputKind::Create,
            json!({ "title": "x", "author": { "$ref": "nobody" } }),
        )
        .unwrap_err();
        assert_eq!(errors[0].message, "unknown reference `nobody`");
    }

    #[test]
    fn test_update_requires_identity_and_allows_partial_input() {
        let schema = schema();
        assert!(plan_for(&schema, "Author", InputKind::Update, json!({ "name": "x" })).is_err());
        let plan = plan_for(&schema, "Author", InputKind::Update, json!({ "id": 1, "email": null })).unwrap();
        assert_eq!(plan.nodes[0].action, Action::Update(Identity::Int(1)));
        assert_eq!(plan.nodes[0].values.get("email"), Some(&Value::Null));
        assert!(plan.nodes[0].values.get("name").is_none());

        let errors = plan_for(&schema, "Author", InputKind::Update, json!({ "id": 1, "name": null })).unwrap_err();
        assert_eq!(errors[0].message, "field cannot be null");
    }
}
