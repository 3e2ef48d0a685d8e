//! Exposed model methods
//!
//! A method mutation runs a registered handler against its receiver record
//! inside the mutation's transaction. Handlers see the receiver and the
//! coerced arguments and may write through the [`MethodContext`].

use crate::error::{ErrorKind, MutationError, StorageError};
use crate::graphql::ModelSchema;
use crate::graphql::schema::Schema;
use crate::ir::MethodDescriptor;
use crate::storage::Transaction;
use crate::value::{Identity, Record, Value};
use serde_json::Value as Json;

/// Failure raised by a method handler
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    /// The arguments or the state of the receiver were rejected
    #[error("method input rejected")]
    Validation(Vec<MutationError>),

    /// The handler failed; reported to the caller as an opaque transaction failure
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MethodError {
    /// A single validation error at a field
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        MethodError::Validation(vec![MutationError::field(path, message)])
    }
}

/// Business logic behind an exposed method
///
/// Returns the method's result as JSON; it is ignored when the method declares
/// no return value, and must match the declared kind for scalar returns.
pub trait MethodHandler: Send + Sync {
    /// Run the method
    fn call(&self, ctx: &mut MethodContext<'_>, args: &Record) -> Result<Json, MethodError>;
}

impl<F> MethodHandler for F
where
    F: Fn(&mut MethodContext<'_>, &Record) -> Result<Json, MethodError> + Send + Sync,
{
    fn call(&self, ctx: &mut MethodContext<'_>, args: &Record) -> Result<Json, MethodError> {
        self(ctx, args)
    }
}

/// What a handler can reach while it runs
pub struct MethodContext<'a> {
    tx: &'a mut dyn Transaction,
    schema: &'a Schema,
    model: &'a ModelSchema,
    receiver: Record,
}

impl<'a> MethodContext<'a> {
    pub(crate) fn new(
        tx: &'a mut dyn Transaction,
        schema: &'a Schema,
        model: &'a ModelSchema,
        receiver: Record,
    ) -> Self {
        Self {
            tx,
            schema,
            model,
            receiver,
        }
    }

    /// The record the method was invoked on, with any changes made so far
    pub fn receiver(&self) -> &Record {
        &self.receiver
    }

    /// Schema snapshot the call runs against
    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// Read any record, seeing this transaction's writes
    pub fn get(&self, model: &str, id: Identity) -> Result<Option<Record>, MethodError> {
        Ok(self.tx.get(model, id)?)
    }

    /// Set a scalar field of the receiver and write it back
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), MethodError> {
        let descriptor = &self.model.descriptor;
        let Some(def) = descriptor.field(field) else {
            return Err(MethodError::field(field, "unknown field"));
        };
        if def.identity {
            return Err(MethodError::field(field, "identity cannot change"));
        }
        if value.is_null() && !def.nullable {
            return Err(MethodError::field(field, "field cannot be null"));
        }
        if !value.fits(def.kind, def.list) {
            return Err(MethodError::field(field, format!("expected {}", def.kind)));
        }
        self.receiver.set(field, value);
        let id = self.receiver_id()?;
        self.tx
            .replace(&descriptor.name, id, self.receiver.clone())
            .map_err(MethodError::from)
    }

    /// Raw access to the transaction
    pub fn transaction(&mut self) -> &mut dyn Transaction {
        &mut *self.tx
    }

    fn receiver_id(&self) -> Result<Identity, MethodError> {
        self.receiver
            .identity(self.model.identity())
            .ok_or_else(|| MethodError::Failed("receiver has no identity".to_string()))
    }

    /// Receiver as stored now
    pub(crate) fn reload(&mut self) -> Result<Option<Record>, StorageError> {
        match self.receiver.identity(self.model.identity()) {
            Some(id) => self.tx.get(&self.model.descriptor.name, id),
            None => Ok(None),
        }
    }
}

/// Validate a method call's arguments: the receiver identity plus declared parameters
pub(crate) fn parse_arguments(
    model: &ModelSchema,
    method: &MethodDescriptor,
    args: &Json,
) -> Result<(Identity, Record), Vec<MutationError>> {
    let empty = serde_json::Map::new();
    let map = match args {
        Json::Object(map) => map,
        Json::Null => &empty,
        _ => {
            return Err(vec![MutationError::new(
                ErrorKind::ValidationError,
                "expected an argument object",
            )]);
        }
    };

    let mut errors = Vec::new();
    let identity = model.identity();
    let id = match map.get(identity) {
        None => {
            errors.push(MutationError::field(identity, "argument is required"));
            None
        }
        Some(raw) => match Identity::from_json(model.descriptor.identity().kind, raw) {
            Ok(id) => Some(id),
            Err(message) => {
                errors.push(MutationError::field(identity, message));
                None
            }
        },
    };

    for key in map.keys() {
        if key != identity && !method.params.iter().any(|p| &p.name == key) {
            errors.push(MutationError::field(key.as_str(), "unknown argument"));
        }
    }

    let mut params = Record::new();
    for param in &method.params {
        match map.get(&param.name).filter(|v| !v.is_null()) {
            Some(raw) => match Value::from_json(param.kind, param.list, raw) {
                Ok(value) => params.set(param.name.clone(), value),
                Err(message) => errors.push(MutationError::field(param.name.as_str(), message)),
            },
            None if param.required => {
                errors.push(MutationError::field(param.name.as_str(), "argument is required"))
            }
            None => params.set(param.name.clone(), Value::Null),
        }
    }

    match id {
        Some(id) if errors.is_empty() => Ok((id, params)),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::generate;
    use crate::registry::{FieldDefinition, MethodDefinition, ModelDefinition, ParamDefinition, Registry};
    use crate::value::ScalarKind;
    use serde_json::json;

    fn schema() -> Schema {
        let mut registry = Registry::default();
        registry.register(
            ModelDefinition::new("Account")
                .field(FieldDefinition::new("balance", ScalarKind::Integer))
                .method(
                    MethodDefinition::exposed("deposit")
                        .param(ParamDefinition::new("amount", ScalarKind::Integer))
                        .param(ParamDefinition::new("memo", ScalarKind::String).optional()),
                ),
        );
        generate(&registry).unwrap()
    }

    #[test]
    fn test_arguments_are_coerced() {
        let schema = schema();
        let model = schema.model("Account").unwrap();
        let method = &model.descriptor.methods["deposit"];
        let (id, params) = parse_arguments(model, method, &json!({ "id": 3, "amount": 10 })).unwrap();
        assert_eq!(id, Identity::Int(3));
        assert_eq!(params.get("amount"), Some(&Value::Int(10)));
        assert_eq!(params.get("memo"), Some(&Value::Null));
    }

    #[test]
    fn test_argument_violations_accumulate() {
        let schema = schema();
        let model = schema.model("Account").unwrap();
        let method = &model.descriptor.methods["deposit"];
        let errors = parse_arguments(model, method, &json!({ "amount": "ten", "tip": 1 })).unwrap_err();
        let mut fields: Vec<_> = errors.iter().filter_map(|e| e.field.clone()).collect();
        fields.sort();
        assert_eq!(fields, vec!["amount", "id", "tip"]);
    }
}
