//! Schema definition language backend
//!
//! Renders a schema snapshot as one GraphQL SDL document. Declarations come
//! out in a fixed order (shared types, then each model's types in
//! registration order, then the root types) so the same snapshot always
//! renders byte-identically.

use super::{Backend, BackendError, GeneratedFile};
use crate::error::ErrorKind;
use crate::graphql::connection::PAGE_INFO;
use crate::graphql::filter::{FilterFieldKind, FilterOp, FilterType, OperatorType};
use crate::graphql::input::InputType;
use crate::graphql::mutation::{BULK_POLICY, ERROR_KIND, MUTATION_ERROR, MUTATION_RESULT};
use crate::graphql::naming;
use crate::graphql::query::ORDER_DIRECTION;
use crate::graphql::schema::{MUTATION_ROOT, QUERY_ROOT};
use crate::graphql::{ModelSchema, Operation, Schema, TypeRef};
use crate::value::ScalarKind;
use std::fmt::Write;

/// Scalars every GraphQL server knows
const STANDARD_SCALARS: [ScalarKind; 4] = [
    ScalarKind::String,
    ScalarKind::Integer,
    ScalarKind::Float,
    ScalarKind::Boolean,
];

const ERROR_KINDS: [ErrorKind; 5] = [
    ErrorKind::ValidationError,
    ErrorKind::NotFound,
    ErrorKind::CircularReference,
    ErrorKind::CascadeRestricted,
    ErrorKind::TransactionFailure,
];

/// GraphQL SDL output
pub struct SdlBackend;

impl Backend for SdlBackend {
    fn name(&self) -> &str {
        "sdl"
    }

    fn file_extension(&self) -> &str {
        "graphql"
    }

    fn generate(&self, schema: &Schema) -> Result<Vec<GeneratedFile>, BackendError> {
        Ok(vec![GeneratedFile {
            name: format!("schema.{}", self.file_extension()),
            content: render(schema),
        }])
    }
}

/// Render a snapshot as SDL
pub fn render(schema: &Schema) -> String {
    let mut out = String::from("# @generated\n");
    shared_types(&mut out, schema);

    for ty in schema.operator_types.values() {
        operator_type(&mut out, ty);
    }
    for model in schema.models.values() {
        model_types(&mut out, model);
    }
    for filter in schema.filter_types() {
        filter_type(&mut out, filter);
    }

    root(&mut out, QUERY_ROOT, schema.queries());
    root(&mut out, MUTATION_ROOT, schema.mutations());
    out
}

fn description(out: &mut String, indent: &str, text: Option<&str>) {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "{}\"\"\"{}\"\"\"", indent, text.replace("\"\"\"", "\\\"\"\""));
    }
}

fn shared_types(out: &mut String, schema: &Schema) {
    out.push('\n');
    for kind in ScalarKind::ALL.iter().filter(|k| !STANDARD_SCALARS.contains(k)) {
        let _ = writeln!(out, "scalar {}", kind.graphql_name());
    }
    for model in schema.models.keys() {
        let _ = writeln!(out, "scalar {}", naming::reference_input(model));
    }

    let _ = write!(out, "\nenum {} {{\n  ASC\n  DESC\n}}\n", ORDER_DIRECTION);
    let _ = write!(out, "\nenum {} {{\n  all_or_nothing\n  best_effort\n}}\n", BULK_POLICY);
    let _ = writeln!(out, "\nenum {} {{", ERROR_KIND);
    for kind in ERROR_KINDS {
        let _ = writeln!(out, "  {}", kind.as_str());
    }
    out.push_str("}\n");

    let _ = write!(
        out,
        "\ntype {} {{\n  has_next_page: Boolean!\n  has_previous_page: Boolean!\n  start_cursor: String\n  end_cursor: String\n}}\n",
        PAGE_INFO
    );
    let _ = write!(
        out,
        "\ntype {} {{\n  kind: {}!\n  message: String!\n  field: String\n  index: Int\n}}\n",
        MUTATION_ERROR, ERROR_KIND
    );
    let _ = write!(
        out,
        "\ntype {} {{\n  ok: Boolean!\n  object: JSON\n  objects: [JSON]\n  errors: [{}!]!\n}}\n",
        MUTATION_RESULT, MUTATION_ERROR
    );
}

/// Operand type of an operator in an operator input
fn operand(op: FilterOp, ty: &OperatorType) -> String {
    let value = TypeRef::scalar(ty.kind).with_nullable(true);
    let value = if ty.list { value.list_of() } else { value };
    let item = if ty.list {
        TypeRef::scalar(ty.kind).list_of()
    } else {
        TypeRef::scalar(ty.kind)
    };
    match op {
        FilterOp::IsNull => "Boolean".to_string(),
        FilterOp::In | FilterOp::NotIn => format!("[{}]", item),
        FilterOp::Range => format!("[{}]", TypeRef::scalar(ty.kind)),
        FilterOp::Eq | FilterOp::Ne => value.to_string(),
        _ => TypeRef::scalar(ty.kind).with_nullable(true).to_string(),
    }
}

fn operator_type(out: &mut String, ty: &OperatorType) {
    let _ = writeln!(out, "\ninput {} {{", ty.name);
    for op in &ty.operators {
        let _ = writeln!(out, "  {}: {}", op.as_str(), operand(*op, ty));
    }
    out.push_str("}\n");
}

fn input_type(out: &mut String, input: &InputType) {
    let _ = writeln!(out, "\ninput {} {{", input.name);
    for field in &input.fields {
        description(out, "  ", field.description.as_deref());
        let _ = writeln!(out, "  {}: {}", field.name, field.type_ref());
    }
    out.push_str("}\n");
}

fn model_types(out: &mut String, model: &ModelSchema) {
    let output = &model.output;
    out.push('\n');
    description(out, "", output.description.as_deref());
    let _ = writeln!(out, "type {} {{", output.name);
    for field in &output.fields {
        description(out, "  ", field.description.as_deref());
        let _ = writeln!(out, "  {}: {}", field.name, field.ty);
    }
    out.push_str("}\n");

    input_type(out, &model.create_input);
    input_type(out, &model.update_input);
    input_type(out, &model.delete_input);

    let order = &model.order;
    let _ = writeln!(out, "\nenum {} {{", order.name);
    for field in &order.fields {
        let _ = writeln!(out, "  {}", field);
    }
    out.push_str("}\n");
    let _ = write!(
        out,
        "\ninput {} {{\n  field: {}!\n  direction: {} = ASC\n}}\n",
        order.input, order.name, ORDER_DIRECTION
    );

    let page = &model.page;
    let _ = write!(
        out,
        "\ntype {} {{\n  items: [{}!]!\n  total_count: Int!\n  page_info: {}!\n}}\n",
        page.name, page.item, PAGE_INFO
    );
}

fn filter_type(out: &mut String, filter: &FilterType) {
    let _ = writeln!(out, "\ninput {} {{", filter.name);
    let _ = writeln!(out, "  and: [{}!]", filter.name);
    let _ = writeln!(out, "  or: [{}!]", filter.name);
    let _ = writeln!(out, "  not: {}", filter.name);
    for field in &filter.fields {
        let ty = match &field.kind {
            FilterFieldKind::Scalar { kind, list, nullable, .. } => {
                crate::graphql::filter::operator_type_name(*kind, *list, *nullable)
            }
            FilterFieldKind::Relation { filter, .. } => filter.name.clone(),
        };
        let _ = writeln!(out, "  {}: {}", field.name, ty);
    }
    out.push_str("}\n");
}

fn root<'a>(out: &mut String, name: &str, operations: impl Iterator<Item = &'a Operation>) {
    let operations: Vec<&Operation> = operations.collect();
    if operations.is_empty() {
        return;
    }
    let _ = writeln!(out, "\ntype {} {{", name);
    for op in operations {
        description(out, "  ", op.description.as_deref());
        let args: Vec<String> = op
            .arguments
            .iter()
            .map(|a| format!("{}: {}", a.name, a.ty))
            .collect();
        if args.is_empty() {
            let _ = writeln!(out, "  {}: {}", op.name, op.returns);
        } else {
            let _ = writeln!(out, "  {}({}): {}", op.name, args.join(", "), op.returns);
        }
    }
    out.push_str("}\n");
}
