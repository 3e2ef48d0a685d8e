//! Schema assembly
//!
//! Runs introspection, generates every type and operation of every concrete
//! model and merges them into one immutable [`Schema`]. Type and operation
//! names share a single name table: two different origins producing the same
//! name abort the pass with [`SchemaError::SchemaNameConflict`].

use super::connection::{self, PageType};
use super::filter::{FilterFieldKind, FilterType, OperatorType};
use super::input::{InputKind, InputType, generate_input_type};
use super::mutation::{self, generate_method_mutations, generate_mutations};
use super::naming::{self, OperationNames};
use super::object::{OutputType, generate_output_type};
use super::query::{self, OrderType, generate_order_type, generate_queries};
use super::{Operation, OperationKind, filter};
use crate::error::{IntrospectionError, SchemaError};
use crate::introspect::{Introspection, introspect};
use crate::ir::ModelDescriptor;
use crate::options::SchemaOptions;
use crate::registry::Registry;
use crate::value::ScalarKind;
use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::{info, warn};

/// Root type names
pub const QUERY_ROOT: &str = "Query";
pub const MUTATION_ROOT: &str = "Mutation";

/// Generated surface of one concrete model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    pub descriptor: ModelDescriptor,
    pub output: OutputType,
    pub create_input: InputType,
    pub update_input: InputType,
    pub delete_input: InputType,
    pub filter: FilterType,
    pub order: OrderType,
    pub page: PageType,
    pub names: OperationNames,
}

impl ModelSchema {
    /// Input type for an operation kind
    pub fn input(&self, kind: InputKind) -> &InputType {
        match kind {
            InputKind::Create => &self.create_input,
            InputKind::Update => &self.update_input,
            InputKind::Delete => &self.delete_input,
        }
    }

    /// Name of the identity field
    pub fn identity(&self) -> &str {
        &self.descriptor.identity().name
    }
}

/// An assembled, immutable schema snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Concrete models, in registration order
    pub models: IndexMap<String, ModelSchema>,
    /// Every introspected model, abstract ones included
    pub descriptors: IndexMap<String, ModelDescriptor>,
    /// Every operation by name, queries first per model
    pub operations: IndexMap<String, Operation>,
    /// Shared operator inputs used by the filter types
    pub operator_types: IndexMap<String, OperatorType>,
    /// Isolated generation problems
    pub issues: Vec<IntrospectionError>,
    /// Options the schema was generated with
    pub options: SchemaOptions,
}

impl Schema {
    /// An empty schema
    pub fn empty() -> Self {
        Self {
            models: IndexMap::new(),
            descriptors: IndexMap::new(),
            operations: IndexMap::new(),
            operator_types: IndexMap::new(),
            issues: Vec::new(),
            options: SchemaOptions::default(),
        }
    }

    /// Concrete model by name
    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    /// Operation by name
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Read operations, in generation order
    pub fn queries(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values().filter(|op| op.kind.is_query())
    }

    /// Write operations, in generation order
    pub fn mutations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values().filter(|op| !op.kind.is_query())
    }

    /// Every distinct filter type, nested ones included
    pub fn filter_types(&self) -> Vec<&FilterType> {
        let mut seen = IndexMap::new();
        for model in self.models.values() {
            for ty in model.filter.walk() {
                seen.entry(ty.name.as_str()).or_insert(ty);
            }
        }
        seen.into_values().collect()
    }
}

/// Names claimed so far and what claimed them
#[derive(Default)]
struct NameTable {
    owners: IndexMap<String, String>,
}

impl NameTable {
    /// Claim `name`; the same origin may claim a name more than once
    fn claim(&mut self, name: &str, origin: impl Into<String>) -> Result<(), SchemaError> {
        let origin = origin.into();
        match self.owners.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(origin);
                Ok(())
            }
            Entry::Occupied(slot) if *slot.get() == origin => Ok(()),
            Entry::Occupied(slot) => Err(SchemaError::SchemaNameConflict {
                name: name.to_string(),
                first: slot.get().clone(),
                second: origin,
            }),
        }
    }
}

const BUILTIN: &str = "built-in type";

/// Generate a schema snapshot from a registry
///
/// Isolated problems are kept in [`Schema::issues`]; only naming collisions
/// (and duplicate model names) are fatal.
pub fn generate(registry: &Registry) -> Result<Schema, SchemaError> {
    info!(models = registry.models.len(), "schema generation started");

    let Introspection { models: descriptors, issues } = introspect(registry)?;
    for issue in &issues {
        warn!(%issue, "model issue isolated during generation");
    }

    let options = registry.options;
    let mut names = NameTable::default();
    for builtin in ScalarKind::ALL.iter().map(ScalarKind::graphql_name).chain([
        QUERY_ROOT,
        MUTATION_ROOT,
        connection::PAGE_INFO,
        query::ORDER_DIRECTION,
        mutation::MUTATION_RESULT,
        mutation::MUTATION_ERROR,
        mutation::ERROR_KIND,
        mutation::BULK_POLICY,
    ]) {
        names.claim(builtin, BUILTIN)?;
    }

    let lookup = |name: &str| descriptors.get(name).filter(|m| !m.is_abstract);
    let mut models = IndexMap::new();
    let mut operations = IndexMap::new();
    let mut operator_types = IndexMap::new();

    for model in descriptors.values().filter(|m| !m.is_abstract) {
        let m = &model.name;
        let op_names = OperationNames::for_model(model);

        let output = generate_output_type(model);
        let create_input = generate_input_type(model, InputKind::Create, lookup);
        let update_input = generate_input_type(model, InputKind::Update, lookup);
        let delete_input = generate_input_type(model, InputKind::Delete, lookup);
        let filter = filter::generate_filter_type(model, &lookup, options.relation_filter_depth);
        let order = generate_order_type(model);
        let page = connection::generate_page_type(m);

        names.claim(&output.name, format!("output type of model `{}`", m))?;
        for input in [&create_input, &update_input, &delete_input] {
            names.claim(&input.name, format!("input type of model `{}`", m))?;
        }
        names.claim(&naming::reference_input(m), format!("reference input of model `{}`", m))?;
        for ty in filter.walk() {
            names.claim(&ty.name, format!("filter of model `{}`", ty.model))?;
            for field in &ty.fields {
                if let FilterFieldKind::Scalar { kind, list, nullable, .. } = &field.kind {
                    let operator = OperatorType::new(*kind, *list, *nullable);
                    names.claim(&operator.name, BUILTIN)?;
                    operator_types.entry(operator.name.clone()).or_insert(operator);
                }
            }
        }
        names.claim(&order.name, format!("ordering of model `{}`", m))?;
        names.claim(&order.input, format!("ordering of model `{}`", m))?;
        names.claim(&page.name, format!("page type of model `{}`", m))?;

        let generated = generate_queries(model, &op_names)
            .into_iter()
            .chain(generate_mutations(model, &op_names))
            .chain(generate_method_mutations(model));
        for op in generated {
            let origin = match &op.kind {
                OperationKind::Method(method) => format!("method `{}.{}`", m, method),
                kind => format!("{} of model `{}`", kind.describe(), m),
            };
            names.claim(&op.name, origin)?;
            operations.insert(op.name.clone(), op);
        }

        models.insert(
            m.clone(),
            ModelSchema {
                descriptor: model.clone(),
                output,
                create_input,
                update_input,
                delete_input,
                filter,
                order,
                page,
                names: op_names,
            },
        );
    }

    info!(
        models = models.len(),
        operations = operations.len(),
        issues = issues.len(),
        "schema generation finished"
    );

    Ok(Schema {
        models,
        descriptors,
        operations,
        operator_types,
        issues,
        options,
    })
}
