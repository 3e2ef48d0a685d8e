//! End-to-end tests driving the engine through generated operation names

use serde_json::{Value as Json, json};
use std::sync::Arc;
use synapse_schema::registry::{
    ComputeOn, FieldDefinition, Generator, MethodDefinition, ModelDefinition, OnDelete, ParamDefinition,
    RelationDefinition, RelationKind, ReturnDefinition,
};
use synapse_schema::storage::{ReadView, Transaction};
use synapse_schema::{
    BulkPolicy, Engine, ErrorKind, ExecutionOptions, Identity, LiveSchema, MemoryStore, MethodError,
    Registry, ScalarKind, Value,
};

fn blog() -> Registry {
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
                .field(FieldDefinition::new("views", ScalarKind::Integer).default_value(json!(0)))
                .relation(
                    RelationDefinition::new("author", RelationKind::ForeignKey, "Author")
                        .on_delete(OnDelete::Cascade),
                )
                .method(
                    MethodDefinition::exposed("bump")
                        .param(ParamDefinition::new("by", ScalarKind::Integer).optional())
                        .returns(ReturnDefinition::Scalar(ScalarKind::Integer)),
                )
                .method(MethodDefinition::exposed("archive"))
                .method(MethodDefinition::exposed("feature")),
        )
        .register(
            ModelDefinition::new("Comment")
                .field(FieldDefinition::new("body", ScalarKind::String))
                .relation(
                    RelationDefinition::new("post", RelationKind::ForeignKey, "Post")
                        .nullable()
                        .on_delete(OnDelete::SetNull),
                ),
        );
    registry
}

fn engine_for(registry: &Registry) -> Engine<MemoryStore> {
    let live = LiveSchema::from_registry(registry).unwrap();
    Engine::new(Arc::new(MemoryStore::new()), Arc::new(live))
}

fn engine() -> Engine<MemoryStore> {
    let mut engine = engine_for(&blog());
    engine
        .register_method("Post", "bump", |ctx, args| {
            let by = match args.get("by") {
                Some(Value::Int(by)) => *by,
                _ => 1,
            };
            let views = match ctx.receiver().get("views") {
                Some(Value::Int(views)) => *views,
                _ => return Err(MethodError::Failed("views missing".to_string())),
            };
            ctx.set("views", Value::Int(views + by))?;
            Ok(json!(views + by))
        })
        .register_method("Post", "archive", |ctx, _args| {
            ctx.set("title", Value::String("[archived]".to_string()))?;
            // Detach comments directly through the open transaction
            let post = ctx.receiver().get("id").cloned().unwrap_or(Value::Null);
            let tx = ctx.transaction();
            for mut comment in tx.scan("Comment")? {
                let Some(Value::Int(id)) = comment.get("id").cloned() else {
                    continue;
                };
                if comment.get("post") == Some(&post) {
                    comment.set("post", Value::Null);
                    tx.replace("Comment", Identity::Int(id), comment)?;
                }
            }
            Ok(Json::Null)
        });
    engine
}

fn opts() -> ExecutionOptions {
    ExecutionOptions::default()
}

fn seed(engine: &Engine<MemoryStore>) {
    let result = engine.mutate(
        "create_author",
        &json!({ "input": { "name": "ada", "posts": [ { "title": "first" }, { "title": "second" } ] } }),
        &opts(),
    );
    assert!(result.ok, "{:?}", result.errors);
}

#[test]
fn test_create_and_read_back() {
    let engine = engine();
    let created = engine.mutate("create_author", &json!({ "input": { "name": "ada" } }), &opts());
    assert!(created.ok, "{:?}", created.errors);
    assert_eq!(created.record(), Some(&json!({ "id": 1, "name": "ada", "email": null })));

    let listed = engine.query("authors", &json!({})).unwrap();
    assert_eq!(listed, json!([{ "id": 1, "name": "ada", "email": null }]));
}

#[test]
fn test_nested_create_links_children() {
    let engine = engine();
    seed(&engine);

    assert_eq!(engine.store().count("Author"), 1);
    assert_eq!(engine.store().count("Post"), 2);

    let author = engine.single("Author", &json!(1)).unwrap().unwrap();
    let posts = engine.resolve("Author", &author, "posts").unwrap();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|p| p.get("author") == Some(&Value::Int(1))));
    assert!(posts.iter().all(|p| p.get("views") == Some(&Value::Int(0))));
}

#[test]
fn test_validation_reports_every_violation() {
    let engine = engine();
    let result = engine.mutate(
        "create_post",
        &json!({ "input": { "id": 7, "views": "many", "color": "red" } }),
        &opts(),
    );
    assert!(!result.ok);
    let mut fields: Vec<_> = result.errors.iter().filter_map(|e| e.field.clone()).collect();
    fields.sort();
    assert_eq!(fields, ["author", "color", "id", "title", "views"]);
    assert!(result.errors.iter().all(|e| e.kind == ErrorKind::ValidationError));
    assert_eq!(engine.store().count("Post"), 0);
}

#[test]
fn test_cycle_is_rejected_before_writing() {
    let mut registry = Registry::default();
    for (name, next) in [("A", "B"), ("B", "C"), ("C", "A")] {
        registry.register(
            ModelDefinition::new(name)
                .field(FieldDefinition::new("name", ScalarKind::String))
                .relation(
                    RelationDefinition::new(next.to_lowercase(), RelationKind::ForeignKey, next).nullable(),
                ),
        );
    }
    let engine = engine_for(&registry);
    let result = engine.mutate(
        "create_a",
        &json!({ "input": {
            "$id": "root",
            "name": "a",
            "b": { "name": "b", "c": { "name": "c", "a": { "$ref": "root" } } }
        } }),
        &opts(),
    );
    assert!(!result.ok);
    assert_eq!(result.errors[0].kind, ErrorKind::CircularReference);
    for model in ["A", "B", "C"] {
        assert_eq!(engine.store().count(model), 0);
    }
}

#[test]
fn test_partial_update_keeps_other_fields() {
    let engine = engine();
    seed(&engine);

    let result = engine.mutate("update_post", &json!({ "input": { "id": 1, "title": "renamed" } }), &opts());
    assert!(result.ok, "{:?}", result.errors);
    let post = result.record().unwrap();
    assert_eq!(post["title"], "renamed");
    assert_eq!(post["views"], 0);
    assert_eq!(post["author"], 1);

    let missing = engine.mutate("update_post", &json!({ "input": { "id": 42, "title": "x" } }), &opts());
    assert_eq!(missing.errors[0].kind, ErrorKind::NotFound);
}

#[test]
fn test_delete_applies_policies() {
    let engine = engine();
    seed(&engine);
    let comment = engine.mutate("create_comment", &json!({ "input": { "body": "nice", "post": 1 } }), &opts());
    assert!(comment.ok, "{:?}", comment.errors);

    let deleted = engine.mutate("delete_author", &json!({ "input": { "id": 1 } }), &opts());
    assert!(deleted.ok, "{:?}", deleted.errors);
    assert_eq!(deleted.record().unwrap()["name"], "ada");

    assert_eq!(engine.store().count("Author"), 0);
    assert_eq!(engine.store().count("Post"), 0);
    let comment = engine.single("Comment", &json!(1)).unwrap().unwrap();
    assert_eq!(comment.get("post"), Some(&Value::Null));
}

#[test]
fn test_restrict_blocks_delete() {
    let mut registry = Registry::default();
    registry
        .register(ModelDefinition::new("Owner").field(FieldDefinition::new("name", ScalarKind::String)))
        .register(
            ModelDefinition::new("Pet")
                .field(FieldDefinition::new("name", ScalarKind::String))
                .relation(RelationDefinition::new("owner", RelationKind::ForeignKey, "Owner")),
        );
    let engine = engine_for(&registry);
    let created = engine.create("Owner", &json!({ "name": "sam", "pets": [ { "name": "rex" } ] }), &opts());
    assert!(created.ok, "{:?}", created.errors);

    let result = engine.delete("Owner", &json!({ "id": 1 }), &opts());
    assert!(!result.ok);
    assert_eq!(result.errors[0].kind, ErrorKind::CascadeRestricted);
    assert_eq!(engine.store().count("Owner"), 1);
    assert_eq!(engine.store().count("Pet"), 1);
}

#[test]
fn test_bulk_all_or_nothing_rolls_back() {
    let engine = engine();
    seed(&engine);

    let items = [
        json!({ "title": "ok", "author": 1 }),
        json!({ "title": "dangling", "author": 99 }),
    ];
    let result = engine.bulk_create("Post", &items, BulkPolicy::AllOrNothing, &opts());
    assert!(!result.ok);
    assert_eq!(result.errors[0].index, Some(1));
    assert!(result.records().is_empty());
    assert_eq!(engine.store().count("Post"), 2);
}

#[test]
fn test_bulk_best_effort_keeps_successes() {
    let engine = engine();
    seed(&engine);

    let result = engine.mutate(
        "bulk_create_post",
        &json!({
            "policy": "best_effort",
            "items": [
                { "title": "ok", "author": 1 },
                { "title": "dangling", "author": 99 },
                { "title": "also ok", "author": 1 }
            ]
        }),
        &opts(),
    );
    assert!(!result.ok);
    assert_eq!(result.records().len(), 3);
    assert!(result.records()[0].is_some());
    assert!(result.records()[1].is_none());
    assert!(result.records()[2].is_some());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, Some(1));
    assert_eq!(engine.store().count("Post"), 4);
}

#[test]
fn test_bulk_delete() {
    let engine = engine();
    seed(&engine);
    let result = engine.bulk_delete(
        "Post",
        &[json!({ "id": 1 }), json!({ "id": 2 })],
        BulkPolicy::AllOrNothing,
        &opts(),
    );
    assert!(result.ok, "{:?}", result.errors);
    assert_eq!(engine.store().count("Post"), 0);
}

#[test]
fn test_methods() {
    let engine = engine();
    seed(&engine);

    let bumped = engine.mutate("bump", &json!({ "id": 1, "by": 5 }), &opts());
    assert!(bumped.ok, "{:?}", bumped.errors);
    assert_eq!(bumped.record(), Some(&json!(5)));

    let bumped = engine.invoke("Post", "bump", &json!({ "id": 1 }), &opts());
    assert_eq!(bumped.record(), Some(&json!(6)));

    let comment = engine.create("Comment", &json!({ "body": "nice", "post": 2 }), &opts());
    assert!(comment.ok, "{:?}", comment.errors);
    let archived = engine.mutate("archive", &json!({ "id": 2 }), &opts());
    assert!(archived.ok, "{:?}", archived.errors);
    assert_eq!(archived.record().unwrap()["title"], "[archived]");
    assert_eq!(engine.query("comment", &json!({ "id": 1 })).unwrap()["post"], Json::Null);

    let missing = engine.mutate("bump", &json!({ "id": 42 }), &opts());
    assert_eq!(missing.errors[0].kind, ErrorKind::NotFound);

    let unbound = engine.mutate("feature", &json!({ "id": 1 }), &opts());
    assert_eq!(unbound.errors[0].kind, ErrorKind::TransactionFailure);
}

#[test]
fn test_pagination() {
    let engine = engine();
    for name in ["a", "b", "c", "d", "e"] {
        assert!(engine.create("Author", &json!({ "name": name }), &opts()).ok);
    }

    let first = engine.query("author_pages", &json!({ "page_size": 2, "order_by": ["-name"] })).unwrap();
    assert_eq!(first["total_count"], 5);
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    assert_eq!(first["items"][0]["name"], "e");
    assert_eq!(first["page_info"]["has_next_page"], true);
    assert_eq!(first["page_info"]["has_previous_page"], false);

    let cursor = first["page_info"]["end_cursor"].clone();
    let second = engine
        .query("author_pages", &json!({ "page_size": 2, "order_by": ["-name"], "after": cursor }))
        .unwrap();
    let names: Vec<_> = second["items"].as_array().unwrap().iter().map(|i| i["name"].clone()).collect();
    assert_eq!(names, [json!("c"), json!("b")]);
    assert_eq!(second["page_info"]["has_previous_page"], true);

    let filtered = engine
        .query("authors", &json!({ "filter": { "name": { "in": ["a", "c"] } } }))
        .unwrap();
    assert_eq!(filtered.as_array().unwrap().len(), 2);
}

#[test]
fn test_malformed_cursors_are_rejected() {
    let engine = engine();
    assert!(engine.create("Author", &json!({ "name": "ada" }), &opts()).ok);

    let overflowing = base62::encode(u64::MAX);
    for after in [json!(overflowing), json!("not a cursor!"), json!(7)] {
        let err = engine.query("author_pages", &json!({ "after": after })).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field.as_deref(), Some("after"));
        assert_eq!(err.violations[0].kind, ErrorKind::ValidationError);
    }

    let past_the_end = base62::encode(40u64);
    let page = engine.query("author_pages", &json!({ "after": past_the_end })).unwrap();
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["total_count"], 1);
}

#[test]
fn test_storage_failure_rolls_back() {
    let engine = engine();
    engine.store().fail_writes_to("Post");

    let result = engine.create("Author", &json!({ "name": "ada", "posts": [ { "title": "x" } ] }), &opts());
    assert!(!result.ok);
    assert_eq!(result.errors[0].kind, ErrorKind::TransactionFailure);
    assert_eq!(engine.store().count("Author"), 0);

    engine.store().clear_failures();
    assert!(engine.create("Author", &json!({ "name": "ada" }), &opts()).ok);
}

#[test]
fn test_live_schema_swap() {
    let mut registry = Registry::default();
    registry.register(ModelDefinition::new("Tag").field(FieldDefinition::new("label", ScalarKind::String)));
    let engine = engine_for(&registry);
    let before = engine.schema();
    assert!(engine.query("labels", &json!({})).is_err());

    registry.register(ModelDefinition::new("Label").field(FieldDefinition::new("text", ScalarKind::String)));
    engine.live().regenerate(&registry).unwrap();
    assert_eq!(engine.query("labels", &json!({})).unwrap(), json!([]));
    assert!(before.operation("labels").is_none());

    registry.register(ModelDefinition::new("Tag"));
    assert!(engine.live().regenerate(&registry).is_err());
    assert!(engine.schema().operation("labels").is_some());
}

#[test]
fn test_engine_on_global_schema() {
    let mut registry = Registry::default();
    registry.register(ModelDefinition::new("Note").field(FieldDefinition::new("text", ScalarKind::String)));
    let engine = Engine::with_global_schema(Arc::new(MemoryStore::new()));
    assert!(engine.query("notes", &json!({})).is_err());

    synapse_schema::live::global().regenerate(&registry).unwrap();
    let created = engine.mutate("create_note", &json!({ "input": { "text": "hi" } }), &opts());
    assert!(created.ok, "{:?}", created.errors);
    assert!(std::ptr::eq(engine.live(), &*synapse_schema::live::global()));
}

#[test]
fn test_round_trip_populates_computed_fields() {
    let mut registry = Registry::default();
    registry.register(
        ModelDefinition::new("Event")
            .field(FieldDefinition::new("name", ScalarKind::String))
            .field(FieldDefinition::new("starts", ScalarKind::Date))
            .field(FieldDefinition::new("price", ScalarKind::Decimal).nullable())
            .field(
                FieldDefinition::new("token", ScalarKind::Uuid)
                    .computed(ComputeOn::Create, Generator::Uuid),
            ),
    );
    let engine = engine_for(&registry);

    let input = json!({ "name": "launch", "starts": "2026-01-02", "price": "9.50" });
    let created = engine.mutate("create_event", &json!({ "input": input }), &opts());
    assert!(created.ok, "{:?}", created.errors);
    let object = created.record().unwrap().clone();

    let fetched = engine.query("event", &json!({ "id": object["id"].clone() })).unwrap();
    assert_eq!(fetched, object);
    for key in ["name", "starts", "price"] {
        assert_eq!(fetched[key], input[key]);
    }
    assert!(fetched["token"].as_str().is_some_and(|t| t.len() == 36));
}

#[test]
fn test_update_distinguishes_omitted_from_null() {
    let engine = engine();
    let created = engine.create("Author", &json!({ "name": "ada", "email": "ada@example.com" }), &opts());
    assert!(created.ok, "{:?}", created.errors);

    let updated = engine.update("Author", &json!({ "id": 1, "email": null }), &opts());
    assert!(updated.ok, "{:?}", updated.errors);
    assert_eq!(updated.record(), Some(&json!({ "id": 1, "name": "ada", "email": null })));

    let rejected = engine.update("Author", &json!({ "id": 1, "name": null }), &opts());
    assert!(!rejected.ok);
    assert_eq!(rejected.errors[0].field.as_deref(), Some("name"));
    assert_eq!(rejected.errors[0].kind, ErrorKind::ValidationError);
}

#[test]
fn test_bulk_policies_with_invalid_item() {
    let items = [
        json!({ "name": "one" }),
        json!({ "email": "missing-name@example.com" }),
        json!({ "name": "three" }),
    ];

    let engine = engine();
    let result = engine.bulk_create("Author", &items, BulkPolicy::AllOrNothing, &opts());
    assert!(!result.ok);
    assert_eq!(result.errors[0].index, Some(1));
    assert_eq!(engine.query("authors", &json!({})).unwrap(), json!([]));

    let result = engine.bulk_create("Author", &items, BulkPolicy::BestEffort, &opts());
    assert!(!result.ok);
    assert_eq!(result.records().len(), 3);
    assert!(result.records()[1].is_none());
    assert_eq!(result.errors[0].index, Some(1));
    assert_eq!(result.errors[0].field.as_deref(), Some("name"));
    assert_eq!(engine.store().count("Author"), 2);
}
