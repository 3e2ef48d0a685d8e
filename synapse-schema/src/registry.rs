//! Model registration interface
//!
//! A [`Registry`] is the sole input to introspection: the raw, declared
//! metadata of every model, as a collaborator enumerates it. It is usually
//! deserialized from a JSON document, but can be assembled in code as well.

use crate::options::SchemaOptions;
use crate::value::ScalarKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The registered model set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    /// Generation options
    #[serde(default)]
    pub options: SchemaOptions,

    /// Registered models, in registration order
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
}

impl Registry {
    /// Parse a registry document
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Register a model
    pub fn register(&mut self, model: ModelDefinition) -> &mut Self {
        self.models.push(model);
        self
    }

    /// Find a model definition by name
    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// A registered model, as declared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefinition {
    /// Model name
    pub name: String,

    /// Abstract base: contributes members, gets no operations
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    /// Base models, highest precedence first
    #[serde(default)]
    pub bases: Vec<String>,

    /// Plural override for the list accessor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,

    /// Declared fields
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    /// Declared relationships (owning side only)
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,

    /// Declared methods
    #[serde(default)]
    pub methods: Vec<MethodDefinition>,

    /// Free-text help
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ModelDefinition {
    /// A concrete model with no members
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Mark abstract
    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add a base model
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Add a field
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a relationship
    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }
}

/// A declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,

    pub kind: ScalarKind,

    #[serde(default)]
    pub nullable: bool,

    /// Literal default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Json>,

    /// Server-computed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<ComputedDefinition>,

    #[serde(default)]
    pub identity: bool,

    /// List-valued
    #[serde(default)]
    pub list: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl FieldDefinition {
    /// A required scalar field
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
            computed: None,
            identity: false,
            list: false,
            help: None,
        }
    }

    /// Allow absence
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Supply a default
    pub fn default_value(mut self, value: Json) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark server-computed
    pub fn computed(mut self, on: ComputeOn, value: Generator) -> Self {
        self.computed = Some(ComputedDefinition { on, value });
        self
    }

    /// Mark as identity
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Make list-valued
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    /// Attach help text
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Declaration of a server-computed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputedDefinition {
    #[serde(default)]
    pub on: ComputeOn,
    pub value: Generator,
}

/// When a server-computed value is assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeOn {
    /// Once, when the record is created
    #[default]
    Create,
    /// On create and on every update
    Save,
}

/// Producer of a server-computed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    /// Current timestamp (datetime) or time of day (time)
    Now,
    /// Current date
    Today,
    /// Random v4 UUID
    Uuid,
    /// Per-model increasing integer
    Sequence,
}

impl Generator {
    /// Whether this generator can produce values of `kind`
    pub fn produces(&self, kind: ScalarKind) -> bool {
        matches!(
            (self, kind),
            (Generator::Now, ScalarKind::Datetime)
                | (Generator::Now, ScalarKind::Time)
                | (Generator::Today, ScalarKind::Date)
                | (Generator::Uuid, ScalarKind::Uuid)
                | (Generator::Uuid, ScalarKind::String)
                | (Generator::Sequence, ScalarKind::Integer)
        )
    }
}

/// Declared relationship kind (owning side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Many-to-one reference
    ForeignKey,
    /// Unique single reference
    OneToOne,
    /// Link set
    ManyToMany,
}

/// Delete policy for dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Block the delete while dependents exist
    #[default]
    Restrict,
    /// Delete dependents too
    Cascade,
    /// Clear the dependents' reference when nullable
    SetNull,
}

/// A declared relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDefinition {
    pub name: String,

    /// Target model
    pub target: String,

    pub kind: RelationKind,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub on_delete: OnDelete,

    /// Name of the reverse side on the target; `{model}` expands to the declaring model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl RelationDefinition {
    /// A non-nullable, restricting relationship
    pub fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            nullable: false,
            on_delete: OnDelete::Restrict,
            related_name: None,
            help: None,
        }
    }

    /// Allow absence
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Delete policy
    pub fn on_delete(mut self, policy: OnDelete) -> Self {
        self.on_delete = policy;
        self
    }

    /// Reverse side name
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }
}

/// A declared method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDefinition {
    pub name: String,

    /// Only explicitly exposed methods become mutations
    #[serde(default)]
    pub exposed: bool,

    /// Operation name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(default)]
    pub params: Vec<ParamDefinition>,

    #[serde(default)]
    pub returns: ReturnDefinition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl MethodDefinition {
    /// An exposed method with no parameters and no return value
    pub fn exposed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exposed: true,
            ..Default::default()
        }
    }

    /// Add a parameter
    pub fn param(mut self, param: ParamDefinition) -> Self {
        self.params.push(param);
        self
    }

    /// Declare the return shape
    pub fn returns(mut self, returns: ReturnDefinition) -> Self {
        self.returns = returns;
        self
    }
}

/// A declared method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDefinition {
    pub name: String,

    /// `None` means untyped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ScalarKind>,

    #[serde(default)]
    pub list: bool,

    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default)]
    pub variadic: bool,
}

impl ParamDefinition {
    /// A required typed parameter
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            list: false,
            required: true,
            variadic: false,
        }
    }

    /// Make optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

fn default_true() -> bool {
    true
}

/// Declared return shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDefinition {
    #[default]
    None,
    Scalar(ScalarKind),
    Structured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_document() {
        let registry = Registry::from_json_str(
            r#"{
                "options": { "relation_filter_depth": 2 },
                "models": [{
                    "name": "Post",
                    "bases": ["Timestamped"],
                    "fields": [
                        { "name": "title", "kind": "string" },
                        { "name": "created_at", "kind": "datetime",
                          "computed": { "on": "create", "value": "now" } }
                    ],
                    "relations": [
                        { "name": "author", "target": "Author", "kind": "foreign_key",
                          "on_delete": "cascade" }
                    ],
                    "methods": [
                        { "name": "publish", "exposed": true,
                          "params": [{ "name": "at", "kind": "datetime", "required": false }],
                          "returns": { "scalar": "boolean" } },
                        { "name": "helper" }
                    ]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(registry.options.relation_filter_depth, 2);
        let post = registry.model("Post").unwrap();
        assert_eq!(post.bases, vec!["Timestamped"]);
        assert_eq!(
            post.fields[1].computed,
            Some(ComputedDefinition {
                on: ComputeOn::Create,
                value: Generator::Now
            })
        );
        assert_eq!(post.relations[0].on_delete, OnDelete::Cascade);
        assert!(!post.relations[0].nullable);
        assert_eq!(
            post.methods[0].returns,
            ReturnDefinition::Scalar(ScalarKind::Boolean)
        );
        assert!(!post.methods[0].params[0].required);
        assert!(!post.methods[1].exposed);
        assert_eq!(post.methods[1].returns, ReturnDefinition::None);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Registry::from_json_str(
            r#"{ "models": [{ "name": "A", "fields": [{ "name": "x", "kind": "string", "unique": true }] }] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[test]
    fn test_builder_matches_document() {
        let built = ModelDefinition::new("Tag")
            .field(FieldDefinition::new("label", ScalarKind::String).help("Display label"));
        let parsed: ModelDefinition = serde_json::from_str(
            r#"{ "name": "Tag", "fields": [{ "name": "label", "kind": "string", "help": "Display label" }] }"#,
        )
        .unwrap();
        assert_eq!(built, parsed);
    }
}
