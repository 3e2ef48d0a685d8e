//! Rust bindings backend
//!
//! Generates one module per concrete model with serde structs for the
//! stored record, the three input shapes and the ordering enum, so clients
//! can build arguments with types instead of raw JSON.

use super::{Backend, BackendError, GeneratedFile};
use crate::graphql::input::{InputField, InputKind, InputShape, InputType};
use crate::graphql::{ModelSchema, Schema};
use crate::ir::Ownership;
use crate::value::ScalarKind;
use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// Rust structs for records and inputs
pub struct RustBackend;

impl Backend for RustBackend {
    fn name(&self) -> &str {
        "rust"
    }

    fn file_extension(&self) -> &str {
        "rs"
    }

    fn generate(&self, schema: &Schema) -> Result<Vec<GeneratedFile>, BackendError> {
        let mut files = Vec::with_capacity(schema.models.len() + 1);
        let mut modules = Vec::with_capacity(schema.models.len());
        for model in schema.models.values() {
            let module = model.descriptor.name.to_snake_case();
            files.push(GeneratedFile {
                name: format!("{}.{}", module, self.file_extension()),
                content: generate_model(schema, model)?,
            });
            modules.push(module);
        }
        files.push(GeneratedFile {
            name: format!("mod.{}", self.file_extension()),
            content: generate_module(&modules),
        });
        Ok(files)
    }
}

fn format(code: TokenStream) -> String {
    let content = code.to_string();
    match syn::parse_file(&content) {
        Ok(parsed) => prettyplease::unparse(&parsed),
        Err(_) => content,
    }
}

fn escape_rust_keyword(name: &str) -> proc_macro2::Ident {
    const RUST_KEYWORDS: &[&str] = &[
        "as", "break", "const", "continue", "else", "enum", "extern", "false", "fn", "for", "if",
        "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
        "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while", "async",
        "await", "dyn", "abstract", "become", "box", "do", "final", "macro", "override", "priv",
        "typeof", "unsized", "virtual", "yield", "try", "gen",
    ];
    // Not allowed as raw identifiers
    const RESERVED: &[&str] = &["crate", "self", "Self", "super"];

    if RESERVED.contains(&name) {
        format_ident!("{}_", name)
    } else if RUST_KEYWORDS.contains(&name) {
        format_ident!("r#{}", name)
    } else {
        format_ident!("{}", name)
    }
}

fn rust_type(kind: ScalarKind) -> TokenStream {
    match kind {
        ScalarKind::String => quote! { String },
        ScalarKind::Integer => quote! { i64 },
        ScalarKind::Float => quote! { f64 },
        ScalarKind::Boolean => quote! { bool },
        ScalarKind::Date => quote! { chrono::NaiveDate },
        ScalarKind::Time => quote! { chrono::NaiveTime },
        ScalarKind::Datetime => quote! { chrono::DateTime<chrono::Utc> },
        ScalarKind::Decimal => quote! { rust_decimal::Decimal },
        ScalarKind::Uuid => quote! { uuid::Uuid },
        // Seconds
        ScalarKind::Duration => quote! { f64 },
        ScalarKind::Json => quote! { serde_json::Value },
    }
}

fn doc(text: Option<&str>) -> TokenStream {
    match text {
        Some(text) => quote! { #[doc = #text] },
        None => quote! {},
    }
}

/// Rename attribute when the Rust identifier differs from the field name
fn rename(name: &str, ident: &proc_macro2::Ident) -> TokenStream {
    if ident.to_string().trim_start_matches("r#") == name {
        quote! {}
    } else {
        quote! { #[serde(rename = #name)] }
    }
}

fn identity_type(schema: &Schema, model: &str) -> Result<TokenStream, BackendError> {
    schema
        .descriptors
        .get(model)
        .map(|d| rust_type(d.identity().kind))
        .ok_or_else(|| BackendError::CodeGenError(format!("unknown relationship target {}", model)))
}

fn generate_model(schema: &Schema, model: &ModelSchema) -> Result<String, BackendError> {
    let descriptor = &model.descriptor;
    let record_ident = format_ident!("{}", descriptor.name.to_upper_camel_case());
    let record_doc = doc(descriptor.help.as_deref());

    let mut record_fields = Vec::new();
    for field in descriptor.fields.values() {
        let ident = escape_rust_keyword(&field.name);
        let rename = rename(&field.name, &ident);
        let field_doc = doc(field.help.as_deref());
        let mut ty = rust_type(field.kind);
        if field.list {
            ty = quote! { Vec<#ty> };
        }
        if field.nullable {
            ty = quote! { Option<#ty> };
        }
        record_fields.push(quote! {
            #field_doc
            #rename
            pub #ident: #ty,
        });
    }
    // Stored references; reverse sides resolve through the engine
    for rel in descriptor.relationships.values() {
        if rel.ownership != Ownership::Local {
            continue;
        }
        let ident = escape_rust_keyword(&rel.name);
        let rename = rename(&rel.name, &ident);
        let id = identity_type(schema, &rel.target)?;
        let ty = if rel.cardinality.is_many() {
            quote! { Vec<#id> }
        } else if rel.nullable {
            quote! { Option<#id> }
        } else {
            id
        };
        record_fields.push(quote! {
            #rename
            pub #ident: #ty,
        });
    }

    let create = generate_input(&model.create_input);
    let update = generate_input(&model.update_input);
    let delete = generate_input(&model.delete_input);

    let order_ident = format_ident!("{}", model.order.name);
    let order_variants = model.order.fields.iter().map(|field| {
        let variant = format_ident!("{}", field.to_upper_camel_case());
        quote! {
            #[serde(rename = #field)]
            #variant,
        }
    });

    let code = quote! {
        //! Bindings for one model
        //! @generated

        #![allow(missing_docs)]
        #![allow(unused_imports)]

        use serde::{Deserialize, Serialize};

        #record_doc
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct #record_ident {
            #(#record_fields)*
        }

        #create
        #update
        #delete

        /// Sortable fields
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum #order_ident {
            #(#order_variants)*
        }
    };
    Ok(format(code))
}

fn input_field(field: &InputField, kind: InputKind) -> TokenStream {
    let ident = escape_rust_keyword(&field.name);
    let rename = rename(&field.name, &ident);
    let field_doc = doc(field.description.as_deref());

    let value = match &field.shape {
        InputShape::Scalar { kind, list: false } => rust_type(*kind),
        InputShape::Scalar { kind, list: true } => {
            let item = rust_type(*kind);
            quote! { Vec<#item> }
        }
        // Identity, nested create object or `$ref`
        InputShape::Relation(rel) if rel.many => quote! { Vec<serde_json::Value> },
        InputShape::Relation(_) => quote! { serde_json::Value },
    };

    if field.required {
        return quote! {
            #field_doc
            #rename
            pub #ident: #value,
        };
    }
    // Absent and explicit null differ on update
    let ty = if kind == InputKind::Update && field.accepts_null {
        quote! { Option<Option<#value>> }
    } else {
        quote! { Option<#value> }
    };
    quote! {
        #field_doc
        #rename
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub #ident: #ty,
    }
}

fn generate_input(input: &InputType) -> TokenStream {
    let ident = format_ident!("{}", input.name);
    let fields = input.fields.iter().map(|f| input_field(f, input.kind));
    quote! {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct #ident {
            #(#fields)*
        }
    }
}

fn generate_module(modules: &[String]) -> String {
    let items = modules.iter().map(|m| {
        let ident = escape_rust_keyword(m);
        quote! {
            pub mod #ident;
            pub use #ident::*;
        }
    });
    format(quote! {
        //! Generated model bindings
        //! @generated

        #(#items)*
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::generate;
    use crate::registry::{FieldDefinition, ModelDefinition, RelationDefinition, RelationKind, Registry};

    fn schema() -> Schema {
        let mut registry = Registry::default();
        registry
            .register(ModelDefinition::new("Author").field(FieldDefinition::new("name", ScalarKind::String)))
            .register(
                ModelDefinition::new("Post")
                    .field(FieldDefinition::new("title", ScalarKind::String))
                    .field(FieldDefinition::new("type", ScalarKind::String).nullable())
                    .relation(RelationDefinition::new("author", RelationKind::ForeignKey, "Author")),
            );
        generate(&registry).unwrap()
    }

    #[test]
    fn test_generated_module_parses() {
        let files = RustBackend.generate(&schema()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["author.rs", "post.rs", "mod.rs"]);
        for file in &files {
            assert!(syn::parse_file(&file.content).is_ok(), "{}", file.content);
        }
    }

    #[test]
    fn test_record_and_update_shapes() {
        let files = RustBackend.generate(&schema()).unwrap();
        let post = &files[1].content;
        assert!(post.contains("pub struct Post {"));
        assert!(post.contains("pub r#type: Option<String>,"));
        assert!(post.contains("pub author: i64,"));
        assert!(post.contains("pub struct UpdatePostInput {"));
        assert!(post.contains("Option<Option<String>>"));
        assert!(post.contains("pub enum PostOrderField {"));
    }

    #[test]
    fn test_reserved_names_are_suffixed() {
        assert_eq!(escape_rust_keyword("self").to_string(), "self_");
        assert_eq!(escape_rust_keyword("match").to_string(), "r#match");
        assert_eq!(escape_rust_keyword("title").to_string(), "title");
    }
}
