//! Naming conventions for the generated surface
//!
//! Every generated operation and type name is derived here so the naming
//! contract stays stable across regenerations for the same model name.

use crate::ir::ModelDescriptor;
use heck::{ToSnakeCase, ToUpperCamelCase};

/// Pluralize a snake_case word with English suffix rules
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{}es", word);
    }
    let mut chars = lower.chars().rev();
    if let (Some('y'), Some(before)) = (chars.next(), chars.next()) {
        if !"aeiou".contains(before) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    format!("{}s", word)
}

/// Operation names generated for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationNames {
    pub single: String,
    pub list: String,
    pub pages: String,
    pub create: String,
    pub update: String,
    pub delete: String,
    pub bulk_create: String,
    pub bulk_update: String,
    pub bulk_delete: String,
}

impl OperationNames {
    /// Derive the names for a model
    pub fn for_model(model: &ModelDescriptor) -> Self {
        let single = model.singular();
        let list = model.plural.to_snake_case();
        Self {
            pages: format!("{}_pages", single),
            create: format!("create_{}", single),
            update: format!("update_{}", single),
            delete: format!("delete_{}", single),
            bulk_create: format!("bulk_create_{}", single),
            bulk_update: format!("bulk_update_{}", single),
            bulk_delete: format!("bulk_delete_{}", single),
            single,
            list,
        }
    }

    /// All names in generation order
    pub fn all(&self) -> [&str; 9] {
        [
            self.single.as_str(),
            self.list.as_str(),
            self.pages.as_str(),
            self.create.as_str(),
            self.update.as_str(),
            self.delete.as_str(),
            self.bulk_create.as_str(),
            self.bulk_update.as_str(),
            self.bulk_delete.as_str(),
        ]
    }
}

/// Output type name
pub fn output_type(model: &str) -> String {
    model.to_upper_camel_case()
}

/// Create input type name
pub fn create_input(model: &str) -> String {
    format!("Create{}Input", model.to_upper_camel_case())
}

/// Update input type name
pub fn update_input(model: &str) -> String {
    format!("Update{}Input", model.to_upper_camel_case())
}

/// Delete input type name
pub fn delete_input(model: &str) -> String {
    format!("Delete{}Input", model.to_upper_camel_case())
}

/// Filter type name for a model at `remaining` traversal depth out of `depth`
pub fn filter_type(model: &str, remaining: usize, depth: usize) -> String {
    let base = model.to_upper_camel_case();
    if remaining == depth {
        format!("{}Filter", base)
    } else if remaining == 0 {
        format!("{}ScalarFilter", base)
    } else {
        format!("{}FilterDepth{}", base, remaining)
    }
}

/// Ordering enum name
pub fn order_field(model: &str) -> String {
    format!("{}OrderField", model.to_upper_camel_case())
}

/// Ordering input name
pub fn order_by(model: &str) -> String {
    format!("{}OrderBy", model.to_upper_camel_case())
}

/// Page type name
pub fn page_type(model: &str) -> String {
    format!("{}Page", model.to_upper_camel_case())
}

/// Reference input accepted by relationship fields on input types
pub fn reference_input(model: &str) -> String {
    format!("{}Reference", model.to_upper_camel_case())
}
