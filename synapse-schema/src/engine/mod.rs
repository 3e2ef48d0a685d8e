//! Request execution
//!
//! The [`Engine`] resolves generated operations against a [`Store`]. Every
//! call loads one schema snapshot and uses it throughout; every mutation
//! call runs in exactly one storage transaction (one per item for
//! best-effort bulk calls) and always answers with a [`MutationResult`].

mod delete;
mod method;
mod nested;
mod write;

pub use method::{MethodContext, MethodError, MethodHandler};
pub use write::{LABEL_KEY, REF_KEY};

use crate::error::{ErrorKind, MutationError, QueryError, StorageError};
use crate::graphql::input::InputKind;
use crate::graphql::query::sort_records;
use crate::graphql::schema::Schema;
use crate::graphql::{
    FilterNode, ListArgs, ModelSchema, MutationResult, OperationKind, OrderKey, Page, PageArgs,
    RelatedRecords,
};
use crate::ir::{Ownership, ReturnShape};
use crate::live::{LiveSchema, global};
use crate::options::{BulkPolicy, ExecutionOptions};
use crate::storage::{ReadView, Store, Transaction};
use crate::value::{Identity, Record, Value};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a transaction did not commit
#[derive(Debug)]
pub(crate) enum Failure {
    /// Caller-visible errors
    Rejected(Vec<MutationError>),
    /// Storage failure, reported opaquely
    Storage(StorageError),
    /// Broken handler or engine invariant, reported opaquely
    Internal(String),
}

impl Failure {
    fn rejected(error: MutationError) -> Self {
        Failure::Rejected(vec![error])
    }

    fn at_index(self, index: usize) -> Self {
        match self {
            Failure::Rejected(errors) => {
                Failure::Rejected(errors.into_iter().map(|e| e.at_index(index)).collect())
            }
            other => other,
        }
    }

    fn into_errors(self) -> Vec<MutationError> {
        match self {
            Failure::Rejected(errors) => errors,
            Failure::Storage(error) => {
                warn!(%error, "storage failure, transaction rolled back");
                vec![MutationError::transaction_failure()]
            }
            Failure::Internal(message) => {
                warn!(%message, "mutation aborted, transaction rolled back");
                vec![MutationError::transaction_failure()]
            }
        }
    }
}

impl From<StorageError> for Failure {
    fn from(error: StorageError) -> Self {
        Failure::Storage(error)
    }
}

impl From<MethodError> for Failure {
    fn from(error: MethodError) -> Self {
        match error {
            MethodError::Validation(errors) => Failure::Rejected(errors),
            MethodError::Failed(message) => Failure::Internal(message),
            MethodError::Storage(error) => Failure::Storage(error),
        }
    }
}

/// Whether a stored reference (single or link set) points at `id`
pub(crate) fn references(value: Option<&Value>, id: &Value) -> bool {
    match value {
        Some(Value::List(items)) => items.contains(id),
        Some(value) => value == id,
        None => false,
    }
}

/// Records reached from `record` through `relation`
pub(crate) fn related_records<V: ReadView + ?Sized>(
    view: &V,
    schema: &Schema,
    model: &str,
    record: &Record,
    relation: &str,
) -> Result<Vec<Record>, StorageError> {
    let Some(descriptor) = schema.descriptors.get(model) else {
        return Ok(Vec::new());
    };
    let Some(rel) = descriptor.relationship(relation) else {
        return Ok(Vec::new());
    };
    match &rel.ownership {
        Ownership::Local => {
            let ids: Vec<Identity> = match record.get(&rel.name) {
                Some(Value::List(items)) => items.iter().filter_map(Identity::from_value).collect(),
                Some(value) => Identity::from_value(value).into_iter().collect(),
                None => Vec::new(),
            };
            let mut related = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(found) = view.get(&rel.target, id)? {
                    related.push(found);
                }
            }
            Ok(related)
        }
        Ownership::Remote { field } => {
            let Some(id) = record.identity(&descriptor.identity().name) else {
                return Ok(Vec::new());
            };
            let key = Value::from(id);
            Ok(view
                .scan(&rel.target)?
                .into_iter()
                .filter(|r| references(r.get(field), &key))
                .collect())
        }
    }
}

/// Relationship access for filter evaluation over one read snapshot
struct ViewRelations<'a> {
    schema: &'a Schema,
    view: &'a dyn ReadView,
}

impl RelatedRecords for ViewRelations<'_> {
    fn related(&self, model: &str, record: &Record, relation: &str) -> Vec<Record> {
        related_records(self.view, self.schema, model, record, relation).unwrap_or_else(|error| {
            warn!(%error, model, relation, "relationship lookup failed during filtering");
            Vec::new()
        })
    }
}

fn model_schema<'s>(schema: &'s Schema, model: &str) -> Result<&'s ModelSchema, QueryError> {
    schema
        .model(model)
        .ok_or_else(|| QueryError::at("model", format!("unknown model `{}`", model)))
}

fn read_failure(error: StorageError) -> QueryError {
    warn!(%error, "read failed");
    QueryError::from(vec![MutationError::transaction_failure()])
}

fn validation(message: impl Into<String>) -> Vec<MutationError> {
    vec![MutationError::new(ErrorKind::ValidationError, message)]
}

/// Log and wrap a mutation outcome
fn report(operation: &str, model: &str, result: MutationResult) -> MutationResult {
    if result.ok {
        info!(operation, model, "mutation succeeded");
    } else {
        let kind = result.errors.first().map(|e| e.kind.as_str()).unwrap_or("unknown");
        warn!(operation, model, errors = result.errors.len(), kind, "mutation failed");
    }
    result
}

fn single(result: Result<Json, Vec<MutationError>>) -> MutationResult {
    match result {
        Ok(object) => MutationResult::single(object),
        Err(errors) => MutationResult::failure(errors),
    }
}

/// A mutation item checked and ready to run
enum Prepared {
    Write {
        plan: write::Plan,
        order: Vec<usize>,
    },
    Delete(Identity),
}

/// Executes queries and mutations against a store
pub struct Engine<S: Store> {
    store: Arc<S>,
    schema: Arc<LiveSchema>,
    methods: HashMap<(String, String), Arc<dyn MethodHandler>>,
}

impl<S: Store> Engine<S> {
    /// Serve `schema` from `store`
    pub fn new(store: Arc<S>, schema: Arc<LiveSchema>) -> Self {
        Self {
            store,
            schema,
            methods: HashMap::new(),
        }
    }

    /// Serve the process-wide live schema
    pub fn with_global_schema(store: Arc<S>) -> Self {
        Self::new(store, global())
    }

    /// Register the handler behind an exposed method
    pub fn register_method<F>(&mut self, model: impl Into<String>, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut MethodContext<'_>, &Record) -> Result<Json, MethodError> + Send + Sync + 'static,
    {
        self.register_handler(model, method, Arc::new(handler))
    }

    /// Register a shared handler
    pub fn register_handler(
        &mut self,
        model: impl Into<String>,
        method: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> &mut Self {
        self.methods.insert((model.into(), method.into()), handler);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The live schema handle
    pub fn live(&self) -> &LiveSchema {
        &self.schema
    }

    /// Current schema snapshot
    pub fn schema(&self) -> Arc<Schema> {
        self.schema.load()
    }

    // Queries

    /// Record by identity, or `None`
    pub fn single(&self, model: &str, id: &Json) -> Result<Option<Record>, QueryError> {
        let schema = self.schema.load();
        self.single_in(&schema, model, id)
    }

    /// Filtered, ordered records with optional offset and limit
    pub fn list(&self, model: &str, args: &ListArgs) -> Result<Vec<Record>, QueryError> {
        let schema = self.schema.load();
        self.list_in(&schema, model, args)
    }

    /// One page of filtered, ordered records
    pub fn pages(&self, model: &str, args: &PageArgs) -> Result<Page, QueryError> {
        let schema = self.schema.load();
        self.pages_in(&schema, model, args)
    }

    /// Resolve a relationship field of a fetched record
    pub fn resolve(&self, model: &str, record: &Record, relation: &str) -> Result<Vec<Record>, QueryError> {
        let schema = self.schema.load();
        let ms = model_schema(&schema, model)?;
        if ms.descriptor.relationship(relation).is_none() {
            return Err(QueryError::at(relation, "unknown relationship"));
        }
        let view = self.store.read();
        related_records(view.as_ref(), &schema, model, record, relation).map_err(read_failure)
    }

    /// Run a query operation by name with JSON arguments
    pub fn query(&self, operation: &str, args: &Json) -> Result<Json, QueryError> {
        let schema = self.schema.load();
        let op = schema
            .operation(operation)
            .ok_or_else(|| QueryError::at("operation", format!("unknown operation `{}`", operation)))?;
        let ms = model_schema(&schema, &op.model)?;
        let result = match &op.kind {
            OperationKind::Single => {
                let id = args.get(ms.identity()).unwrap_or(&Json::Null);
                self.single_in(&schema, &op.model, id)?
                    .map(|r| r.to_json())
                    .unwrap_or(Json::Null)
            }
            OperationKind::List => {
                let args = ListArgs::from_json(ms, args)?;
                Json::Array(
                    self.list_in(&schema, &op.model, &args)?
                        .iter()
                        .map(Record::to_json)
                        .collect(),
                )
            }
            OperationKind::Pages => {
                let args = PageArgs::from_json(ms, args)?;
                self.pages_in(&schema, &op.model, &args)?.to_json()
            }
            _ => {
                return Err(QueryError::at(
                    "operation",
                    format!("`{}` is a mutation", operation),
                ));
            }
        };
        debug!(operation, "query resolved");
        Ok(result)
    }

    fn single_in(&self, schema: &Schema, model: &str, id: &Json) -> Result<Option<Record>, QueryError> {
        let ms = model_schema(schema, model)?;
        let id = Identity::from_json(ms.descriptor.identity().kind, id)
            .map_err(|message| QueryError::at(ms.identity(), message))?;
        self.store.read().get(model, id).map_err(read_failure)
    }

    fn select(
        &self,
        schema: &Schema,
        model: &str,
        filter: Option<&FilterNode>,
        order_by: &[OrderKey],
    ) -> Result<Vec<Record>, QueryError> {
        let ms = model_schema(schema, model)?;
        let view = self.store.read();
        let mut records = view.scan(model).map_err(read_failure)?;
        if let Some(filter) = filter {
            let ctx = ViewRelations {
                schema,
                view: view.as_ref(),
            };
            records.retain(|r| filter.matches(model, r, &ctx));
        }
        sort_records(&mut records, order_by, ms.identity());
        Ok(records)
    }

    fn list_in(&self, schema: &Schema, model: &str, args: &ListArgs) -> Result<Vec<Record>, QueryError> {
        let records = self.select(schema, model, args.filter.as_ref(), &args.order_by)?;
        let limit = args.limit.unwrap_or(usize::MAX);
        Ok(records.into_iter().skip(args.offset).take(limit).collect())
    }

    fn pages_in(&self, schema: &Schema, model: &str, args: &PageArgs) -> Result<Page, QueryError> {
        let records = self.select(schema, model, args.filter.as_ref(), &args.order_by)?;
        let page_size = args.effective_page_size(&schema.options);
        Ok(Page::slice(records, args.offset, page_size))
    }

    // Mutations

    /// Create a record, with nested creates and attachments
    pub fn create(&self, model: &str, input: &Json, options: &ExecutionOptions) -> MutationResult {
        let schema = self.schema.load();
        report("create", model, single(self.run(&schema, model, InputKind::Create, input, options)))
    }

    /// Update the supplied fields of a record
    pub fn update(&self, model: &str, input: &Json, options: &ExecutionOptions) -> MutationResult {
        let schema = self.schema.load();
        report("update", model, single(self.run(&schema, model, InputKind::Update, input, options)))
    }

    /// Delete a record, applying on-delete policies
    pub fn delete(&self, model: &str, input: &Json, options: &ExecutionOptions) -> MutationResult {
        let schema = self.schema.load();
        report("delete", model, single(self.run(&schema, model, InputKind::Delete, input, options)))
    }

    /// Create several records
    pub fn bulk_create(
        &self,
        model: &str,
        items: &[Json],
        policy: BulkPolicy,
        options: &ExecutionOptions,
    ) -> MutationResult {
        let schema = self.schema.load();
        report("bulk_create", model, self.bulk(&schema, model, InputKind::Create, items, policy, options))
    }

    /// Update several records
    pub fn bulk_update(
        &self,
        model: &str,
        items: &[Json],
        policy: BulkPolicy,
        options: &ExecutionOptions,
    ) -> MutationResult {
        let schema = self.schema.load();
        report("bulk_update", model, self.bulk(&schema, model, InputKind::Update, items, policy, options))
    }

    /// Delete several records
    pub fn bulk_delete(
        &self,
        model: &str,
        items: &[Json],
        policy: BulkPolicy,
        options: &ExecutionOptions,
    ) -> MutationResult {
        let schema = self.schema.load();
        report("bulk_delete", model, self.bulk(&schema, model, InputKind::Delete, items, policy, options))
    }

    /// Invoke an exposed method; `args` carries the receiver identity and the parameters
    pub fn invoke(&self, model: &str, method: &str, args: &Json, options: &ExecutionOptions) -> MutationResult {
        let schema = self.schema.load();
        report(method, model, single(self.invoke_in(&schema, model, method, args, options)))
    }

    /// Run a mutation operation by name with JSON arguments
    ///
    /// CRUD operations take `{input}`, bulk operations `{items, policy}`, and
    /// method operations the receiver identity plus their parameters.
    pub fn mutate(&self, operation: &str, args: &Json, options: &ExecutionOptions) -> MutationResult {
        let schema = self.schema.load();
        let Some(op) = schema.operation(operation) else {
            return report(
                operation,
                "",
                MutationResult::failure(validation(format!("unknown operation `{}`", operation))),
            );
        };
        let model = op.model.as_str();
        let input = || {
            args.get("input")
                .ok_or_else(|| vec![MutationError::field("input", "argument is required")])
        };
        let result = match &op.kind {
            OperationKind::Create => single(input().and_then(|i| self.run(&schema, model, InputKind::Create, i, options))),
            OperationKind::Update => single(input().and_then(|i| self.run(&schema, model, InputKind::Update, i, options))),
            OperationKind::Delete => single(input().and_then(|i| self.run(&schema, model, InputKind::Delete, i, options))),
            OperationKind::BulkCreate => self.bulk_args(&schema, model, InputKind::Create, args, options),
            OperationKind::BulkUpdate => self.bulk_args(&schema, model, InputKind::Update, args, options),
            OperationKind::BulkDelete => self.bulk_args(&schema, model, InputKind::Delete, args, options),
            OperationKind::Method(method) => single(self.invoke_in(&schema, model, method, args, options)),
            OperationKind::Single | OperationKind::List | OperationKind::Pages => {
                MutationResult::failure(validation(format!("`{}` is a query", operation)))
            }
        };
        report(operation, model, result)
    }

    fn bulk_args(
        &self,
        schema: &Schema,
        model: &str,
        kind: InputKind,
        args: &Json,
        options: &ExecutionOptions,
    ) -> MutationResult {
        let mut errors = Vec::new();
        let items = match args.get("items") {
            Some(Json::Array(items)) => Some(items.as_slice()),
            Some(_) => {
                errors.push(MutationError::field("items", "expected a list"));
                None
            }
            None => {
                errors.push(MutationError::field("items", "argument is required"));
                None
            }
        };
        let policy = match args.get("policy") {
            Some(raw) => match serde_json::from_value::<BulkPolicy>(raw.clone()) {
                Ok(policy) => Some(policy),
                Err(_) => {
                    errors.push(MutationError::field("policy", "expected all_or_nothing or best_effort"));
                    None
                }
            },
            None => {
                errors.push(MutationError::field("policy", "argument is required"));
                None
            }
        };
        match (items, policy) {
            (Some(items), Some(policy)) => self.bulk(schema, model, kind, items, policy, options),
            _ => MutationResult::failure(errors),
        }
    }

    /// Validate one item and, for writes, check it for reference cycles
    fn prepare(&self, schema: &Schema, ms: &ModelSchema, kind: InputKind, input: &Json) -> Result<Prepared, Vec<MutationError>> {
        match kind {
            InputKind::Delete => delete_identity(ms, input).map(Prepared::Delete),
            _ => {
                let plan = write::plan(schema, ms, kind, input)?;
                let order = nested::order(&plan).map_err(|e| vec![e])?;
                Ok(Prepared::Write { plan, order })
            }
        }
    }

    fn execute(
        tx: &mut dyn Transaction,
        schema: &Schema,
        model: &str,
        prepared: &Prepared,
        options: &ExecutionOptions,
    ) -> Result<Json, Failure> {
        let record = match prepared {
            Prepared::Write { plan, order } => nested::apply(tx, schema, plan, order, options)?,
            Prepared::Delete(id) => delete::delete(tx, schema, model, *id, options)?,
        };
        Ok(record.to_json())
    }

    fn run(
        &self,
        schema: &Schema,
        model: &str,
        kind: InputKind,
        input: &Json,
        options: &ExecutionOptions,
    ) -> Result<Json, Vec<MutationError>> {
        let ms = model_schema(schema, model).map_err(|e| e.violations)?;
        let prepared = self.prepare(schema, ms, kind, input)?;
        self.transact(options, |tx| Self::execute(tx, schema, model, &prepared, options))
    }

    fn bulk(
        &self,
        schema: &Schema,
        model: &str,
        kind: InputKind,
        items: &[Json],
        policy: BulkPolicy,
        options: &ExecutionOptions,
    ) -> MutationResult {
        match policy {
            BulkPolicy::BestEffort => {
                let mut objects = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    match self.run(schema, model, kind, item, options) {
                        Ok(object) => objects.push(Some(object)),
                        Err(failed) => {
                            objects.push(None);
                            errors.extend(failed.into_iter().map(|e| e.at_index(index)));
                        }
                    }
                }
                MutationResult::bulk(objects, errors)
            }
            BulkPolicy::AllOrNothing => {
                let ms = match model_schema(schema, model) {
                    Ok(ms) => ms,
                    Err(error) => return MutationResult::failure(error.violations),
                };
                let mut prepared = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    match self.prepare(schema, ms, kind, item) {
                        Ok(item) => prepared.push(item),
                        Err(failed) => errors.extend(failed.into_iter().map(|e| e.at_index(index))),
                    }
                }
                if !errors.is_empty() {
                    return MutationResult::failure(errors);
                }
                let result = self.transact(options, |tx| {
                    let mut objects = Vec::with_capacity(prepared.len());
                    for (index, item) in prepared.iter().enumerate() {
                        let object = Self::execute(tx, schema, model, item, options)
                            .map_err(|failure| failure.at_index(index))?;
                        objects.push(Some(object));
                    }
                    Ok(objects)
                });
                match result {
                    Ok(objects) => MutationResult::bulk(objects, Vec::new()),
                    Err(errors) => MutationResult::failure(errors),
                }
            }
        }
    }

    fn invoke_in(
        &self,
        schema: &Schema,
        model: &str,
        method: &str,
        args: &Json,
        options: &ExecutionOptions,
    ) -> Result<Json, Vec<MutationError>> {
        let ms = model_schema(schema, model).map_err(|e| e.violations)?;
        let Some(descriptor) = ms.descriptor.methods.get(method) else {
            return Err(validation(format!("{} has no exposed method `{}`", model, method)));
        };
        let (id, params) = method::parse_arguments(ms, descriptor, args)?;
        let Some(handler) = self.methods.get(&(model.to_string(), method.to_string())) else {
            warn!(model, method, "no handler registered for exposed method");
            return Err(vec![MutationError::transaction_failure()]);
        };

        self.transact(options, |tx| {
            let receiver = tx
                .get(model, id)?
                .ok_or_else(|| Failure::rejected(MutationError::not_found()))?;
            let mut ctx = MethodContext::new(tx, schema, ms, receiver);
            let output = handler.call(&mut ctx, &params)?;
            match descriptor.returns {
                ReturnShape::None => ctx
                    .reload()?
                    .map(|r| r.to_json())
                    .ok_or_else(|| Failure::Internal(format!("{} {} removed by {}", model, id, method))),
                ReturnShape::Scalar(kind) => match Value::from_json(kind, false, &output) {
                    Ok(value) if !value.is_null() => Ok(output),
                    _ => Err(Failure::Internal(format!(
                        "{}.{} returned {} where {} was declared",
                        model, method, output, kind
                    ))),
                },
                ReturnShape::Structured => Ok(output),
            }
        })
    }

    /// Run `work` in one transaction: commit on success, roll back otherwise
    fn transact<T>(
        &self,
        options: &ExecutionOptions,
        work: impl FnOnce(&mut dyn Transaction) -> Result<T, Failure>,
    ) -> Result<T, Vec<MutationError>> {
        if options.is_cancelled() {
            return Err(Failure::from(StorageError::Cancelled).into_errors());
        }
        let mut tx = self
            .store
            .begin(options.timeout)
            .map_err(|e| Failure::from(e).into_errors())?;

        let outcome = work(tx.as_mut()).and_then(|value| {
            if options.is_cancelled() {
                Err(StorageError::Cancelled.into())
            } else {
                Ok(value)
            }
        });
        match outcome {
            Ok(value) => match tx.commit() {
                Ok(()) => {
                    debug!("transaction committed");
                    Ok(value)
                }
                Err(error) => Err(Failure::from(error).into_errors()),
            },
            Err(failure) => {
                tx.rollback();
                debug!("transaction rolled back");
                Err(failure.into_errors())
            }
        }
    }
}

/// Identity named by a delete input
fn delete_identity(ms: &ModelSchema, input: &Json) -> Result<Identity, Vec<MutationError>> {
    let Json::Object(map) = input else {
        return Err(validation("expected an input object"));
    };
    let identity = ms.identity();
    let mut errors: Vec<MutationError> = map
        .keys()
        .filter(|k| k.as_str() != identity)
        .map(|k| MutationError::field(k.as_str(), "unknown field"))
        .collect();
    let id = match map.get(identity) {
        None => {
            errors.push(MutationError::field(identity, "field is required"));
            None
        }
        Some(raw) => Identity::from_json(ms.descriptor.identity().kind, raw)
            .map_err(|message| errors.push(MutationError::field(identity, message)))
            .ok(),
    };
    match id {
        Some(id) if errors.is_empty() => Ok(id),
        _ => Err(errors),
    }
}
