//! Nested write handler
//!
//! Orders a planned write graph so every record is written after the records
//! it references, rejects reference cycles before any transaction is opened,
//! and applies the graph inside the caller's transaction.

use super::Failure;
use super::write::{Action, Link, Plan, Ref};
use crate::error::{ErrorKind, MutationError, StorageError};
use crate::graphql::ModelSchema;
use crate::graphql::schema::Schema;
use crate::ir::{Cardinality, FieldDescriptor};
use crate::options::ExecutionOptions;
use crate::registry::{ComputeOn, Generator};
use crate::storage::Transaction;
use crate::value::{Identity, Record, ScalarKind, Value};
use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Apply order for `plan`, dependencies first
///
/// A node depends on the nodes its single-valued references point at. Ties
/// resolve by input order, so the same plan always applies the same way.
pub(crate) fn order(plan: &Plan) -> Result<Vec<usize>, MutationError> {
    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); plan.nodes.len()];
    for link in plan.links.iter().filter(|l| !l.many) {
        if let (Ref::Node(holder), Some(Ref::Node(value))) = (link.holder, link.value) {
            if !deps[holder].contains(&value) {
                deps[holder].push(value);
            }
        }
    }

    let mut marks = vec![Mark::New; plan.nodes.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(plan.nodes.len());
    for start in 0..plan.nodes.len() {
        if let Err(cycle) = visit(start, &deps, &mut marks, &mut path, &mut order) {
            return Err(cycle_error(plan, &cycle));
        }
    }
    Ok(order)
}

fn visit(
    node: usize,
    deps: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match marks[node] {
        Mark::Done => return Ok(()),
        Mark::Active => {
            let from = path.iter().position(|&p| p == node).unwrap_or(0);
            let mut cycle = path[from..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        Mark::New => {}
    }
    marks[node] = Mark::Active;
    path.push(node);
    for &dep in &deps[node] {
        visit(dep, deps, marks, path, order)?;
    }
    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}

fn cycle_error(plan: &Plan, cycle: &[usize]) -> MutationError {
    let describe = |index: usize| {
        let node = &plan.nodes[index];
        if node.path.is_empty() {
            node.model.clone()
        } else {
            format!("{} at `{}`", node.model, node.path)
        }
    };
    let chain: Vec<String> = cycle.iter().map(|&i| describe(i)).collect();
    let mut error = MutationError::new(
        ErrorKind::CircularReference,
        format!("circular reference: {}", chain.join(" -> ")),
    );
    if let Some(&first) = cycle.first() {
        if !plan.nodes[first].path.is_empty() {
            error.field = Some(plan.nodes[first].path.clone());
        }
    }
    error
}

/// Apply `plan` in `order`, returning the root record as written
pub(crate) fn apply(
    tx: &mut dyn Transaction,
    schema: &Schema,
    plan: &Plan,
    order: &[usize],
    options: &ExecutionOptions,
) -> Result<Record, Failure> {
    let mut ids: Vec<Option<Identity>> = vec![None; plan.nodes.len()];
    for &index in order {
        if options.is_cancelled() {
            return Err(StorageError::Cancelled.into());
        }
        let node = &plan.nodes[index];
        let model = lookup(schema, &node.model)?;
        let id = match node.action {
            Action::Create => create(tx, model, plan, index, &ids)?,
            Action::Update(id) => {
                update(tx, model, plan, index, id, &ids)?;
                id
            }
        };
        ids[index] = Some(id);
    }

    // References stored on records outside the graph, and link sets
    for link in plan
        .links
        .iter()
        .filter(|l| l.many || matches!(l.holder, Ref::Existing(_)))
    {
        if options.is_cancelled() {
            return Err(StorageError::Cancelled.into());
        }
        attach(tx, schema, link, &ids)?;
    }

    let (Some(root), Some(Some(id))) = (plan.nodes.first(), ids.first()) else {
        return Err(Failure::Internal("empty write plan".to_string()));
    };
    tx.get(&root.model, *id)?
        .ok_or_else(|| Failure::Internal(format!("{} {} vanished after write", root.model, id)))
}

fn lookup<'s>(schema: &'s Schema, name: &str) -> Result<&'s ModelSchema, Failure> {
    schema
        .model(name)
        .ok_or_else(|| Failure::Internal(format!("model {} is not in the schema", name)))
}

fn resolve(r: Ref, ids: &[Option<Identity>]) -> Result<Identity, Failure> {
    match r {
        Ref::Existing(id) => Ok(id),
        Ref::Node(index) => ids
            .get(index)
            .copied()
            .flatten()
            .ok_or_else(|| Failure::Internal(format!("node {} referenced before it was written", index))),
    }
}

/// Produce a server-computed value
fn generate(
    tx: &mut dyn Transaction,
    model: &str,
    field: &FieldDescriptor,
    generator: Generator,
) -> Result<Value, Failure> {
    let now = Utc::now();
    let value = match (generator, field.kind) {
        (Generator::Now, ScalarKind::Datetime) => Value::DateTime(now),
        (Generator::Now, ScalarKind::Time) => Value::Time(now.time()),
        (Generator::Today, ScalarKind::Date) => Value::Date(now.date_naive()),
        (Generator::Uuid, ScalarKind::Uuid) => Value::Uuid(Uuid::new_v4()),
        (Generator::Uuid, ScalarKind::String) => Value::String(Uuid::new_v4().to_string()),
        (Generator::Sequence, ScalarKind::Integer) => {
            let key = if field.identity {
                model.to_string()
            } else {
                format!("{}.{}", model, field.name)
            };
            Value::Int(tx.next_sequence(&key)?)
        }
        (generator, kind) => {
            return Err(Failure::Internal(format!(
                "{:?} cannot produce {} for {}.{}",
                generator, kind, model, field.name
            )));
        }
    };
    Ok(value)
}

fn ensure_exists(tx: &dyn Transaction, model: &str, target: Ref, id: Identity, path: &str) -> Result<(), Failure> {
    if matches!(target, Ref::Existing(_)) && tx.get(model, id)?.is_none() {
        return Err(Failure::rejected(MutationError::field(
            path,
            format!("no {} with identity {}", model, id),
        )));
    }
    Ok(())
}

/// A one-to-one target may be held by at most one record
fn ensure_unique(
    tx: &dyn Transaction,
    model: &ModelSchema,
    relation: &str,
    value: &Value,
    holder: Option<Identity>,
    path: &str,
) -> Result<(), Failure> {
    let identity = model.identity();
    let taken = tx
        .scan(&model.descriptor.name)?
        .iter()
        .any(|r| r.get(relation) == Some(value) && r.identity(identity) != holder);
    if taken {
        return Err(Failure::rejected(MutationError::field(
            path,
            format!("{} is already linked to another {}", value, model.descriptor.name),
        )));
    }
    Ok(())
}

/// Resolve the single-valued reference a link sets, checking the target
fn reference_value(tx: &dyn Transaction, link: &Link, ids: &[Option<Identity>]) -> Result<Value, Failure> {
    match link.value {
        None => Ok(Value::Null),
        Some(target) => {
            let id = resolve(target, ids)?;
            ensure_exists(tx, &link.value_model, target, id, &link.path)?;
            Ok(Value::from(id))
        }
    }
}

fn set_local_references(
    tx: &dyn Transaction,
    model: &ModelSchema,
    plan: &Plan,
    index: usize,
    ids: &[Option<Identity>],
    holder: Option<Identity>,
    record: &mut Record,
) -> Result<(), Failure> {
    for link in plan
        .links
        .iter()
        .filter(|l| !l.many && l.holder == Ref::Node(index))
    {
        let value = reference_value(tx, link, ids)?;
        let one_to_one = model
            .descriptor
            .relationship(&link.field)
            .is_some_and(|r| r.cardinality == Cardinality::OneToOne);
        if one_to_one && !value.is_null() {
            ensure_unique(tx, model, &link.field, &value, holder, &link.path)?;
        }
        record.set(link.field.clone(), value);
    }
    Ok(())
}

fn create(
    tx: &mut dyn Transaction,
    model: &ModelSchema,
    plan: &Plan,
    index: usize,
    ids: &[Option<Identity>],
) -> Result<Identity, Failure> {
    let node = &plan.nodes[index];
    let name = model.descriptor.name.as_str();
    let mut record = Record::new();
    for field in model.descriptor.fields.values() {
        let value = if let Some(computed) = field.computed {
            generate(tx, name, field, computed.value)?
        } else if let Some(value) = node.values.get(&field.name) {
            value.clone()
        } else if let Some(default) = &field.default {
            default.clone()
        } else {
            Value::Null
        };
        record.set(field.name.clone(), value);
    }
    let id = record
        .identity(model.identity())
        .ok_or_else(|| Failure::Internal(format!("{} identity was not assigned", name)))?;

    for rel in model.descriptor.relationships.values().filter(|r| r.is_local()) {
        let empty = if rel.cardinality.is_many() {
            Value::List(Vec::new())
        } else {
            Value::Null
        };
        record.set(rel.name.clone(), empty);
    }
    set_local_references(tx, model, plan, index, ids, Some(id), &mut record)?;

    tx.insert(name, id, record)?;
    Ok(id)
}

fn update(
    tx: &mut dyn Transaction,
    model: &ModelSchema,
    plan: &Plan,
    index: usize,
    id: Identity,
    ids: &[Option<Identity>],
) -> Result<(), Failure> {
    let node = &plan.nodes[index];
    let name = model.descriptor.name.as_str();
    let mut record = tx
        .get(name, id)?
        .ok_or_else(|| Failure::rejected(MutationError::not_found()))?;

    for (field, value) in &node.values {
        record.set(field.clone(), value.clone());
    }
    for field in model.descriptor.fields.values() {
        if let Some(computed) = field.computed.filter(|c| c.on == ComputeOn::Save) {
            let value = generate(tx, name, field, computed.value)?;
            record.set(field.name.clone(), value);
        }
    }
    set_local_references(tx, model, plan, index, ids, Some(id), &mut record)?;

    tx.replace(name, id, record)?;
    Ok(())
}

/// Set a reference held outside the graph, or add to a link set
fn attach(tx: &mut dyn Transaction, schema: &Schema, link: &Link, ids: &[Option<Identity>]) -> Result<(), Failure> {
    let holder_model = lookup(schema, &link.holder_model)?;
    let holder = resolve(link.holder, ids)?;
    let mut record = tx.get(&link.holder_model, holder)?.ok_or_else(|| {
        Failure::rejected(MutationError::field(
            &link.path,
            format!("no {} with identity {}", link.holder_model, holder),
        ))
    })?;
    let value = reference_value(tx, link, ids)?;

    if link.many {
        let mut items = match record.get(&link.field) {
            Some(Value::List(items)) => items.clone(),
            _ => Vec::new(),
        };
        if !value.is_null() && !items.contains(&value) {
            items.push(value);
        }
        record.set(link.field.clone(), Value::List(items));
    } else {
        let one_to_one = holder_model
            .descriptor
            .relationship(&link.field)
            .is_some_and(|r| r.cardinality == Cardinality::OneToOne);
        if one_to_one && !value.is_null() {
            ensure_unique(tx, holder_model, &link.field, &value, Some(holder), &link.path)?;
        }
        record.set(link.field.clone(), value);
    }

    tx.replace(&link.holder_model, holder, record)?;
    Ok(())
}
