//! Mutation operation generation and the result envelope
//!
//! Per concrete model: `create_m`, `update_m`, `delete_m` and the bulk
//! variants, plus one operation per exposed method. Every mutation returns the
//! same [`MutationResult`] envelope.

use super::naming::{self, OperationNames};
use super::{Argument, Operation, OperationKind, TypeRef};
use crate::error::MutationError;
use crate::ir::ModelDescriptor;
use serde::Serialize;
use serde_json::Value as Json;

/// Name of the shared envelope type
pub const MUTATION_RESULT: &str = "MutationResult";
/// Name of the envelope error entry type
pub const MUTATION_ERROR: &str = "MutationError";
/// Name of the error kind enum
pub const ERROR_KIND: &str = "ErrorKind";
/// Name of the bulk policy enum
pub const BULK_POLICY: &str = "BulkPolicy";

/// Generate the CRUD and bulk mutations of a model
pub fn generate_mutations(model: &ModelDescriptor, names: &OperationNames) -> Vec<Operation> {
    let result = || TypeRef::named(MUTATION_RESULT);
    let input = |name: String| Argument::new("input", TypeRef::named(name));
    let items = |name: String| Argument::new("items", TypeRef::named(name).list_of());
    let policy = || Argument::new("policy", TypeRef::named(BULK_POLICY));
    let op = |name: &str, kind: OperationKind, arguments: Vec<Argument>, description: String| Operation {
        name: name.to_string(),
        kind,
        model: model.name.clone(),
        arguments,
        returns: result(),
        description: Some(description),
    };

    let m = &model.name;
    vec![
        op(
            &names.create,
            OperationKind::Create,
            vec![input(naming::create_input(m))],
            format!("Create a {}", m),
        ),
        op(
            &names.update,
            OperationKind::Update,
            vec![input(naming::update_input(m))],
            format!("Update a {}; omitted fields are left unchanged", m),
        ),
        op(
            &names.delete,
            OperationKind::Delete,
            vec![input(naming::delete_input(m))],
            format!("Delete a {}", m),
        ),
        op(
            &names.bulk_create,
            OperationKind::BulkCreate,
            vec![items(naming::create_input(m)), policy()],
            format!("Create several {} records", m),
        ),
        op(
            &names.bulk_update,
            OperationKind::BulkUpdate,
            vec![items(naming::update_input(m)), policy()],
            format!("Update several {} records", m),
        ),
        op(
            &names.bulk_delete,
            OperationKind::BulkDelete,
            vec![items(naming::delete_input(m)), policy()],
            format!("Delete several {} records", m),
        ),
    ]
}

/// Generate one mutation per exposed method
///
/// The receiver is addressed by the model's identity argument; declared
/// parameters follow in order.
pub fn generate_method_mutations(model: &ModelDescriptor) -> Vec<Operation> {
    let identity = model.identity();
    model
        .methods
        .values()
        .map(|method| {
            let mut arguments = vec![Argument::new(&identity.name, TypeRef::scalar(identity.kind))];
            for param in &method.params {
                let mut ty = TypeRef::scalar(param.kind);
                if param.list {
                    ty = ty.list_of();
                }
                arguments.push(Argument::new(&param.name, ty.with_nullable(!param.required)));
            }
            Operation {
                name: method.operation.clone(),
                kind: OperationKind::Method(method.name.clone()),
                model: model.name.clone(),
                arguments,
                returns: TypeRef::named(MUTATION_RESULT),
                description: method.help.clone(),
            }
        })
        .collect()
}

/// Uniform mutation response
///
/// `object` is populated for single-target operations, `objects` for bulk
/// operations; both are absent only on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationResult {
    pub ok: bool,
    pub object: Option<Json>,
    pub objects: Option<Vec<Option<Json>>>,
    pub errors: Vec<MutationError>,
}

impl MutationResult {
    /// Successful single-target result
    pub fn single(object: Json) -> Self {
        Self {
            ok: true,
            object: Some(object),
            objects: None,
            errors: Vec::new(),
        }
    }

    /// Bulk result; `ok` only when no item failed
    pub fn bulk(objects: Vec<Option<Json>>, errors: Vec<MutationError>) -> Self {
        Self {
            ok: errors.is_empty(),
            object: None,
            objects: Some(objects),
            errors,
        }
    }

    /// Failed result with no payload
    pub fn failure(errors: Vec<MutationError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self {
            ok: false,
            object: None,
            objects: None,
            errors,
        }
    }

    /// The single result object
    pub fn record(&self) -> Option<&Json> {
        self.object.as_ref()
    }

    /// Bulk results, `None` at failed indices
    pub fn records(&self) -> &[Option<Json>] {
        self.objects.as_deref().unwrap_or(&[])
    }

    /// Render as JSON
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}
