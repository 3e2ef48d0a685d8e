//! Delete with on-delete policies
//!
//! Before a record goes, every record referencing it through a relationship
//! is visited: `restrict` blocks the delete, `cascade` deletes the dependent
//! (recursively), `set_null` clears the reference. Link sets are unlinked.
//! The caller's transaction makes the whole traversal atomic.

use super::{Failure, references};
use crate::error::{ErrorKind, MutationError, StorageError};
use crate::graphql::schema::Schema;
use crate::ir::Cardinality;
use crate::options::ExecutionOptions;
use crate::registry::OnDelete;
use crate::storage::Transaction;
use crate::value::{Identity, Record, Value};
use std::collections::HashSet;

/// Delete `id` of `model`, returning the record as it was
pub(crate) fn delete(
    tx: &mut dyn Transaction,
    schema: &Schema,
    model: &str,
    id: Identity,
    options: &ExecutionOptions,
) -> Result<Record, Failure> {
    let record = tx
        .get(model, id)?
        .ok_or_else(|| Failure::rejected(MutationError::not_found()))?;
    let mut visited = HashSet::new();
    remove(tx, schema, model, id, &mut visited, options)?;
    Ok(record)
}

fn remove(
    tx: &mut dyn Transaction,
    schema: &Schema,
    model: &str,
    id: Identity,
    visited: &mut HashSet<(String, Identity)>,
    options: &ExecutionOptions,
) -> Result<(), Failure> {
    if !visited.insert((model.to_string(), id)) {
        return Ok(());
    }
    if options.is_cancelled() {
        return Err(StorageError::Cancelled.into());
    }
    if !schema.descriptors.contains_key(model) {
        return Err(Failure::Internal(format!("model {} is not in the schema", model)));
    }
    let key = Value::from(id);

    // Owning sides are consulted directly; a reverse side may have been dropped
    let owners = schema
        .descriptors
        .values()
        .filter(|d| !d.is_abstract)
        .flat_map(|d| d.relationships.values().map(move |rel| (d, rel)))
        .filter(|(_, rel)| rel.is_local() && rel.target == model);

    for (holder, owner) in owners {
        let field = &owner.name;
        let holder_name = holder.name.as_str();
        let holder_identity = holder.identity().name.as_str();

        let dependents: Vec<Record> = tx
            .scan(holder_name)?
            .into_iter()
            .filter(|r| references(r.get(field), &key))
            .filter(|r| !(holder_name == model && r.identity(holder_identity) == Some(id)))
            .collect();
        if dependents.is_empty() {
            continue;
        }

        let link_set = owner.cardinality == Cardinality::ManyToMany;
        match owner.on_delete {
            OnDelete::Cascade if !link_set => {
                for dependent in &dependents {
                    if let Some(dep) = dependent.identity(holder_identity) {
                        remove(tx, schema, holder_name, dep, visited, options)?;
                    }
                }
            }
            OnDelete::Cascade | OnDelete::SetNull if link_set => {
                for mut dependent in dependents {
                    let Some(dep) = dependent.identity(holder_identity) else {
                        continue;
                    };
                    if let Some(Value::List(items)) = dependent.get(field) {
                        let kept = items.iter().filter(|v| **v != key).cloned().collect();
                        dependent.set(field.clone(), Value::List(kept));
                    }
                    tx.replace(holder_name, dep, dependent)?;
                }
            }
            OnDelete::SetNull if owner.nullable => {
                for mut dependent in dependents {
                    let Some(dep) = dependent.identity(holder_identity) else {
                        continue;
                    };
                    dependent.set(field.clone(), Value::Null);
                    tx.replace(holder_name, dep, dependent)?;
                }
            }
            _ => {
                let mut error = MutationError::new(
                    ErrorKind::CascadeRestricted,
                    format!(
                        "cannot delete {} {}: referenced by {} {} record(s) through {}.{}",
                        model,
                        id,
                        dependents.len(),
                        holder_name,
                        holder_name,
                        field
                    ),
                );
                error.field = Some(
                    owner
                        .inverse
                        .clone()
                        .unwrap_or_else(|| format!("{}.{}", holder_name, field)),
                );
                return Err(Failure::rejected(error));
            }
        }
    }

    tx.remove(model, id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::generate;
    use crate::registry::{FieldDefinition, ModelDefinition, RelationDefinition, RelationKind, Registry};
    use crate::storage::{MemoryStore, ReadView, Store};
    use crate::value::ScalarKind;

    fn schema(policy: OnDelete, nullable: bool) -> Schema {
        let mut relation = RelationDefinition::new("author", RelationKind::ForeignKey, "Author").on_delete(policy);
        if nullable {
            relation = relation.nullable();
        }
        let mut registry = Registry::default();
        registry
            .register(ModelDefinition::new("Author").field(FieldDefinition::new("name", ScalarKind::String)))
            .register(
                ModelDefinition::new("Post")
                    .field(FieldDefinition::new("title", ScalarKind::String))
                    .relation(relation),
            );
        generate(&registry).unwrap()
    }

    fn seed(store: &MemoryStore) {
        let mut tx = store.begin(None).unwrap();
        let author: Record = [("id", Value::Int(1)), ("name", Value::String("Ada".into()))]
            .into_iter()
            .collect();
        tx.insert("Author", Identity::Int(1), author).unwrap();
        for n in 1..=2 {
            let post: Record = [
                ("id", Value::Int(n)),
                ("title", Value::String(format!("post {}", n))),
                ("author", Value::Int(1)),
            ]
            .into_iter()
            .collect();
            tx.insert("Post", Identity::Int(n), post).unwrap();
        }
        tx.commit().unwrap();
    }

    fn run(schema: &Schema, store: &MemoryStore) -> Result<Record, Failure> {
        let mut tx = store.begin(None).unwrap();
        let result = delete(tx.as_mut(), schema, "Author", Identity::Int(1), &ExecutionOptions::default());
        match result {
            Ok(_) => tx.commit().unwrap(),
            Err(_) => tx.rollback(),
        }
        result
    }

    #[test]
    fn test_restrict_blocks_and_names_relation() {
        let schema = schema(OnDelete::Restrict, false);
        let store = MemoryStore::new();
        seed(&store);
        match run(&schema, &store) {
            Err(Failure::Rejected(errors)) => {
                assert_eq!(errors[0].kind, ErrorKind::CascadeRestricted);
                assert_eq!(errors[0].field.as_deref(), Some("posts"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.count("Author"), 1);
        assert_eq!(store.count("Post"), 2);
    }

    #[test]
    fn test_cascade_removes_dependents() {
        let schema = schema(OnDelete::Cascade, false);
        let store = MemoryStore::new();
        seed(&store);
        let deleted = run(&schema, &store).unwrap();
        assert_eq!(deleted.get("name"), Some(&Value::String("Ada".into())));
        assert_eq!(store.count("Author"), 0);
        assert_eq!(store.count("Post"), 0);
    }

    #[test]
    fn test_set_null_clears_nullable_references() {
        let schema = schema(OnDelete::SetNull, true);
        let store = MemoryStore::new();
        seed(&store);
        run(&schema, &store).unwrap();
        let post = store.read().get("Post", Identity::Int(1)).unwrap().unwrap();
        assert_eq!(post.get("author"), Some(&Value::Null));
    }

    #[test]
    fn test_set_null_on_required_reference_restricts() {
        let schema = schema(OnDelete::SetNull, false);
        let store = MemoryStore::new();
        seed(&store);
        assert!(matches!(run(&schema, &store), Err(Failure::Rejected(_))));
        assert_eq!(store.count("Post"), 2);
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let schema = schema(OnDelete::Restrict, false);
        let store = MemoryStore::new();
        match run(&schema, &store) {
            Err(Failure::Rejected(errors)) => assert_eq!(errors[0].kind, ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_policy_applies_when_reverse_side_was_dropped() {
        let mut registry = Registry::default();
        registry
            .register(
                ModelDefinition::new("Author")
                    .field(FieldDefinition::new("name", ScalarKind::String))
                    .field(FieldDefinition::new("posts", ScalarKind::Integer).nullable()),
            )
            .register(
                ModelDefinition::new("Post")
                    .field(FieldDefinition::new("title", ScalarKind::String))
                    .relation(RelationDefinition::new("author", RelationKind::ForeignKey, "Author")),
            );
        let schema = generate(&registry).unwrap();
        assert!(schema.descriptors["Author"].relationship("posts").is_none());

        let store = MemoryStore::new();
        seed(&store);
        match run(&schema, &store) {
            Err(Failure::Rejected(errors)) => {
                assert_eq!(errors[0].kind, ErrorKind::CascadeRestricted);
                assert_eq!(errors[0].field.as_deref(), Some("Post.author"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.count("Author"), 1);
        let post = store.read().get("Post", Identity::Int(1)).unwrap().unwrap();
        assert_eq!(post.get("author"), Some(&Value::Int(1)));
    }
}
