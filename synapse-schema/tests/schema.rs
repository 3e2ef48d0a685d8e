//! Generation-level tests over whole registries

use proptest::prelude::*;
use synapse_schema::backends::{get_backend, render_sdl};
use synapse_schema::graphql::OperationKind;
use synapse_schema::registry::{FieldDefinition, MethodDefinition, ModelDefinition};
use synapse_schema::{IntrospectionError, Registry, ScalarKind, SchemaError, generate};

const BLOG: &str = r#"{
    "options": { "default_page_size": 10 },
    "models": [
        { "name": "Timestamped", "abstract": true,
          "fields": [
            { "name": "created_at", "kind": "datetime", "computed": { "on": "create", "value": "now" } },
            { "name": "updated_at", "kind": "datetime", "computed": { "on": "save", "value": "now" } }
          ] },
        { "name": "Author", "fields": [ { "name": "name", "kind": "string" } ] },
        { "name": "Post", "bases": ["Timestamped"],
          "fields": [ { "name": "title", "kind": "string" } ],
          "relations": [
            { "name": "author", "target": "Author", "kind": "foreign_key", "on_delete": "cascade" },
            { "name": "editor", "target": "Ghost", "kind": "foreign_key", "nullable": true }
          ],
          "methods": [
            { "name": "publish", "exposed": true, "returns": { "scalar": "boolean" } },
            { "name": "spread", "exposed": true, "params": [ { "name": "rest", "variadic": true } ] }
          ] }
    ]
}"#;

#[test]
fn test_generate_from_document() {
    let registry = Registry::from_json_str(BLOG).unwrap();
    let schema = generate(&registry).unwrap();

    assert_eq!(schema.models.keys().collect::<Vec<_>>(), ["Author", "Post"]);
    assert!(schema.descriptors["Timestamped"].is_abstract);
    assert_eq!(schema.options.default_page_size, 10);

    let post = &schema.models["Post"];
    let fields: Vec<_> = post.descriptor.fields.keys().map(String::as_str).collect();
    assert_eq!(fields, ["id", "created_at", "updated_at", "title"]);
    assert!(post.descriptor.relationship("editor").is_none());

    let names: Vec<_> = schema.operations.keys().map(String::as_str).collect();
    assert!(names.contains(&"post_pages"));
    assert!(names.contains(&"bulk_delete_author"));
    assert!(matches!(
        schema.operation("publish").map(|op| &op.kind),
        Some(OperationKind::Method(method)) if method == "publish"
    ));
    assert!(schema.operation("spread").is_none());

    assert_eq!(schema.issues.len(), 2);
    assert!(schema
        .issues
        .iter()
        .any(|issue| matches!(issue, IntrospectionError::UnknownRelationTarget { target, .. } if target == "Ghost")));
    assert!(schema
        .issues
        .iter()
        .any(|issue| matches!(issue, IntrospectionError::UnsupportedMethodSignature { method, .. } if method == "spread")));
}

#[test]
fn test_operation_name_collision_is_fatal() {
    let mut method = MethodDefinition::exposed("list_all");
    method.operation = Some("posts".to_string());
    let mut registry = Registry::default();
    registry.register(
        ModelDefinition::new("Post")
            .field(FieldDefinition::new("title", ScalarKind::String))
            .method(method),
    );

    let err = generate(&registry).unwrap_err();
    assert!(matches!(err, SchemaError::SchemaNameConflict { ref name, .. } if name == "posts"));
    assert!(err.to_string().contains("posts"));
}

#[test]
fn test_plural_equal_to_singular_is_fatal() {
    let registry = Registry::from_json_str(r#"{ "models": [ { "name": "Sheep", "plural": "sheep" } ] }"#).unwrap();
    let err = generate(&registry).unwrap_err();
    let SchemaError::SchemaNameConflict { name, first, second } = err;
    assert_eq!(name, "sheep");
    assert_ne!(first, second);
}

#[test]
fn test_invalid_names_never_reach_backends() {
    let registry = Registry::from_json_str(
        r#"{ "models": [
            { "name": "Person", "fields": [ { "name": "first-name", "kind": "string" } ] },
            { "name": "Tag", "fields": [ { "name": "label", "kind": "string" } ] }
        ] }"#,
    )
    .unwrap();
    let schema = generate(&registry).unwrap();
    assert_eq!(schema.models.keys().collect::<Vec<_>>(), ["Tag"]);
    assert!(matches!(
        schema.issues.as_slice(),
        [IntrospectionError::InvalidName { model, name }] if model == "Person" && name == "first-name"
    ));

    for backend in ["sdl", "rust"] {
        let files = get_backend(backend).unwrap().generate(&schema).unwrap();
        assert!(files.iter().all(|file| !file.content.contains("first-name")));
        assert!(files.iter().any(|file| file.content.contains("label")));
    }
}

#[test]
fn test_model_named_like_builtin_is_fatal() {
    let mut registry = Registry::default();
    registry.register(ModelDefinition::new("PageInfo"));
    assert!(matches!(
        generate(&registry),
        Err(SchemaError::SchemaNameConflict { name, .. }) if name == "PageInfo"
    ));
}

#[test]
fn test_backends_are_deterministic() {
    let registry = Registry::from_json_str(BLOG).unwrap();
    for backend in ["sdl", "rust"] {
        let backend = get_backend(backend).unwrap();
        let first = backend.generate(&generate(&registry).unwrap()).unwrap();
        let second = backend.generate(&generate(&registry).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_sdl_mentions_every_operation() {
    let schema = generate(&Registry::from_json_str(BLOG).unwrap()).unwrap();
    let sdl = render_sdl(&schema);
    for name in schema.operations.keys() {
        assert!(sdl.contains(&format!("  {}(", name)) || sdl.contains(&format!("  {}:", name)), "{}", name);
    }
}

fn kind() -> impl Strategy<Value = ScalarKind> {
    prop::sample::select(ScalarKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn generation_is_stable(fields in prop::collection::vec(("[a-z]{1,8}", kind(), any::<bool>()), 0..8)) {
        let mut model = ModelDefinition::new("Item");
        for (name, kind, nullable) in fields {
            let field = FieldDefinition::new(name, kind);
            model = model.field(if nullable { field.nullable() } else { field });
        }
        let mut registry = Registry::default();
        registry.register(model);

        let first = generate(&registry).unwrap();
        let second = generate(&registry).unwrap();
        prop_assert_eq!(render_sdl(&first), render_sdl(&second));
        prop_assert_eq!(first, second);
    }
}
