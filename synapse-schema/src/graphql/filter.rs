//! Filter types and the filter expression algebra
//!
//! Generates:
//! - Per-kind operator inputs (`StringFilter`, `NullableIntFilter`, `StringListFilter`, ...)
//! - Model filter types (`PostFilter`), with relationship fields scoped to the
//!   related model's filter, nested up to `relation_filter_depth` hops
//!
//! and defines [`FilterNode`], the parsed form of the filter expression
//! surface `{field: {operator: value}}` / `{and|or|not: ...}`. Evaluation is a
//! pure predicate over a candidate record.

use super::naming;
use crate::error::{MutationError, QueryError};
use crate::ir::ModelDescriptor;
use crate::value::{Record, ScalarKind, Value};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;

/// Filter predicate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterOp {
    Eq,
    Ne,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Range,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IExact,
    IsNull,
}

impl FilterOp {
    /// Every operator, in surface order
    pub const ALL: [FilterOp; 17] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::In,
        FilterOp::NotIn,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Range,
        FilterOp::Contains,
        FilterOp::IContains,
        FilterOp::StartsWith,
        FilterOp::IStartsWith,
        FilterOp::EndsWith,
        FilterOp::IEndsWith,
        FilterOp::IExact,
        FilterOp::IsNull,
    ];

    /// Name used in filter expressions
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Range => "range",
            FilterOp::Contains => "contains",
            FilterOp::IContains => "icontains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::IStartsWith => "istarts_with",
            FilterOp::EndsWith => "ends_with",
            FilterOp::IEndsWith => "iends_with",
            FilterOp::IExact => "iexact",
            FilterOp::IsNull => "is_null",
        }
    }

    /// Look up an operator by name
    pub fn from_name(name: &str) -> Option<FilterOp> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }

    fn is_text(&self) -> bool {
        matches!(
            self,
            FilterOp::Contains
                | FilterOp::IContains
                | FilterOp::StartsWith
                | FilterOp::IStartsWith
                | FilterOp::EndsWith
                | FilterOp::IEndsWith
                | FilterOp::IExact
        )
    }
}

/// Predicate set for a field of `kind`
pub fn operators_for(kind: ScalarKind, list: bool, nullable: bool) -> Vec<FilterOp> {
    let mut ops = vec![FilterOp::Eq, FilterOp::Ne, FilterOp::In, FilterOp::NotIn];
    if !list {
        if kind.is_orderable() {
            ops.extend([FilterOp::Lt, FilterOp::Lte, FilterOp::Gt, FilterOp::Gte, FilterOp::Range]);
        }
        if kind.is_text() {
            ops.extend(FilterOp::ALL.iter().copied().filter(FilterOp::is_text));
        }
    }
    if nullable {
        ops.push(FilterOp::IsNull);
    }
    ops
}

/// Name of the shared operator input for a field shape
pub fn operator_type_name(kind: ScalarKind, list: bool, nullable: bool) -> String {
    let mut name = String::new();
    if nullable {
        name.push_str("Nullable");
    }
    name.push_str(kind.graphql_name());
    if list {
        name.push_str("List");
    }
    name.push_str("Filter");
    name
}

/// Shared operator input type (e.g. `StringFilter`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorType {
    pub name: String,
    pub kind: ScalarKind,
    pub list: bool,
    pub operators: Vec<FilterOp>,
}

impl OperatorType {
    /// Operator input for a field shape
    pub fn new(kind: ScalarKind, list: bool, nullable: bool) -> Self {
        Self {
            name: operator_type_name(kind, list, nullable),
            kind,
            list,
            operators: operators_for(kind, list, nullable),
        }
    }
}

/// Generated filter type of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterType {
    pub name: String,
    pub model: String,
    pub fields: Vec<FilterField>,
}

impl FilterType {
    /// Field by name
    pub fn field(&self, name: &str) -> Option<&FilterField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// This type and every nested relation filter, depth first
    pub fn walk(&self) -> Vec<&FilterType> {
        let mut out = vec![self];
        for field in &self.fields {
            if let FilterFieldKind::Relation { filter, .. } = &field.kind {
                out.extend(filter.walk());
            }
        }
        out
    }
}

/// A filterable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterField {
    pub name: String,
    pub kind: FilterFieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterFieldKind {
    /// Scalar field with its operator set
    Scalar {
        kind: ScalarKind,
        list: bool,
        nullable: bool,
        operators: Vec<FilterOp>,
    },
    /// Relationship scoped to the target's filter
    Relation {
        target: String,
        many: bool,
        filter: Box<FilterType>,
    },
}

/// Generate the filter type for a model
///
/// Relationships are followed `depth` hops; at the last hop only scalar
/// fields remain.
pub fn generate_filter_type<'a>(
    model: &ModelDescriptor,
    models: &impl Fn(&str) -> Option<&'a ModelDescriptor>,
    depth: usize,
) -> FilterType {
    filter_at(model, models, depth, depth)
}

fn filter_at<'a>(
    model: &ModelDescriptor,
    models: &impl Fn(&str) -> Option<&'a ModelDescriptor>,
    remaining: usize,
    depth: usize,
) -> FilterType {
    let mut fields: Vec<FilterField> = model
        .fields
        .values()
        .map(|f| FilterField {
            name: f.name.clone(),
            kind: FilterFieldKind::Scalar {
                kind: f.kind,
                list: f.list,
                nullable: f.nullable,
                operators: operators_for(f.kind, f.list, f.nullable),
            },
        })
        .collect();

    if remaining > 0 {
        for rel in model.relationships.values() {
            let Some(target) = models(&rel.target) else {
                continue;
            };
            fields.push(FilterField {
                name: rel.name.clone(),
                kind: FilterFieldKind::Relation {
                    target: rel.target.clone(),
                    many: rel.cardinality.is_many(),
                    filter: Box::new(filter_at(target, models, remaining - 1, depth)),
                },
            });
        }
    }

    FilterType {
        name: naming::filter_type(&model.name, remaining, depth),
        model: model.name.clone(),
        fields,
    }
}

/// Comparison operand of a leaf predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Values(Vec<Value>),
    Range(Value, Value),
    Flag(bool),
}

impl Operand {
    fn to_json(&self) -> Json {
        match self {
            Operand::Value(v) => v.to_json(),
            Operand::Values(vs) => Json::Array(vs.iter().map(Value::to_json).collect()),
            Operand::Range(lo, hi) => Json::Array(vec![lo.to_json(), hi.to_json()]),
            Operand::Flag(b) => Json::Bool(*b),
        }
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// `{field: {op: operand}}`
    Leaf {
        field: String,
        op: FilterOp,
        operand: Operand,
    },
    /// `{relation: <filter over target>}`
    Related {
        relation: String,
        target: String,
        filter: Box<FilterNode>,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

/// Access to related records during evaluation
pub trait RelatedRecords {
    /// Records reached from `record` (of `model`) through `relation`
    fn related(&self, model: &str, record: &Record, relation: &str) -> Vec<Record>;
}

/// Evaluation context without relationships; relation filters never match
pub struct NoRelations;

impl RelatedRecords for NoRelations {
    fn related(&self, _model: &str, _record: &Record, _relation: &str) -> Vec<Record> {
        Vec::new()
    }
}

impl FilterNode {
    /// Leaf predicate
    pub fn leaf(field: impl Into<String>, op: FilterOp, operand: Operand) -> Self {
        FilterNode::Leaf {
            field: field.into(),
            op,
            operand,
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::leaf(field, FilterOp::Eq, Operand::Value(value))
    }

    /// Negation
    pub fn negate(self) -> Self {
        FilterNode::Not(Box::new(self))
    }

    /// Parse a filter expression against a model's filter type
    ///
    /// Every violation is collected, each with its path under `filter`.
    pub fn parse(filter: &FilterType, json: &Json) -> Result<FilterNode, QueryError> {
        let mut errors = Vec::new();
        let node = parse_object(filter, json, "filter", &mut errors);
        if errors.is_empty() {
            Ok(node)
        } else {
            Err(QueryError::from(errors))
        }
    }

    /// Render back to the expression surface
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        match self {
            FilterNode::Leaf { field, op, operand } => {
                let mut ops = Map::new();
                ops.insert(op.as_str().to_string(), operand.to_json());
                map.insert(field.clone(), Json::Object(ops));
            }
            FilterNode::Related { relation, filter, .. } => {
                map.insert(relation.clone(), filter.to_json());
            }
            FilterNode::And(children) => {
                map.insert("and".to_string(), Json::Array(children.iter().map(Self::to_json).collect()));
            }
            FilterNode::Or(children) => {
                map.insert("or".to_string(), Json::Array(children.iter().map(Self::to_json).collect()));
            }
            FilterNode::Not(child) => {
                map.insert("not".to_string(), child.to_json());
            }
        }
        Json::Object(map)
    }

    /// Evaluate against a record of `model`
    pub fn matches(&self, model: &str, record: &Record, ctx: &dyn RelatedRecords) -> bool {
        match self {
            FilterNode::Leaf { field, op, operand } => {
                let value = record.get(field).unwrap_or(&Value::Null);
                leaf_matches(value, *op, operand)
            }
            FilterNode::Related {
                relation,
                target,
                filter,
            } => ctx
                .related(model, record, relation)
                .iter()
                .any(|r| filter.matches(target, r, ctx)),
            FilterNode::And(children) => children.iter().all(|c| c.matches(model, record, ctx)),
            FilterNode::Or(children) => children.iter().any(|c| c.matches(model, record, ctx)),
            FilterNode::Not(child) => !child.matches(model, record, ctx),
        }
    }
}

fn leaf_matches(value: &Value, op: FilterOp, operand: &Operand) -> bool {
    match (op, operand) {
        (FilterOp::Eq, Operand::Value(v)) => value == v,
        (FilterOp::Ne, Operand::Value(v)) => value != v,
        (FilterOp::In, Operand::Values(vs)) => vs.contains(value),
        (FilterOp::NotIn, Operand::Values(vs)) => !vs.contains(value),
        (FilterOp::Lt, Operand::Value(v)) => value.compare(v) == Some(Ordering::Less),
        (FilterOp::Lte, Operand::Value(v)) => {
            matches!(value.compare(v), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOp::Gt, Operand::Value(v)) => value.compare(v) == Some(Ordering::Greater),
        (FilterOp::Gte, Operand::Value(v)) => {
            matches!(value.compare(v), Some(Ordering::Greater | Ordering::Equal))
        }
        (FilterOp::Range, Operand::Range(lo, hi)) => {
            matches!(value.compare(lo), Some(Ordering::Greater | Ordering::Equal))
                && matches!(value.compare(hi), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOp::IsNull, Operand::Flag(flag)) => value.is_null() == *flag,
        (op, Operand::Value(v)) if op.is_text() => match (value.as_str(), v.as_str()) {
            (Some(text), Some(needle)) => text_matches(op, text, needle),
            _ => false,
        },
        _ => false,
    }
}

fn text_matches(op: FilterOp, text: &str, needle: &str) -> bool {
    match op {
        FilterOp::Contains => text.contains(needle),
        FilterOp::StartsWith => text.starts_with(needle),
        FilterOp::EndsWith => text.ends_with(needle),
        FilterOp::IContains => text.to_lowercase().contains(&needle.to_lowercase()),
        FilterOp::IStartsWith => text.to_lowercase().starts_with(&needle.to_lowercase()),
        FilterOp::IEndsWith => text.to_lowercase().ends_with(&needle.to_lowercase()),
        FilterOp::IExact => text.to_lowercase() == needle.to_lowercase(),
        _ => false,
    }
}

fn parse_object(filter: &FilterType, json: &Json, path: &str, errors: &mut Vec<MutationError>) -> FilterNode {
    let Json::Object(map) = json else {
        errors.push(MutationError::field(path, "expected a filter object"));
        return FilterNode::And(Vec::new());
    };

    let mut nodes = Vec::with_capacity(map.len());
    for (key, value) in map {
        let here = format!("{}.{}", path, key);
        match key.as_str() {
            "and" | "or" => {
                let Json::Array(items) = value else {
                    errors.push(MutationError::field(here, "expected a list of filters"));
                    continue;
                };
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| parse_object(filter, item, &format!("{}[{}]", here, i), errors))
                    .collect();
                nodes.push(if key == "and" {
                    FilterNode::And(children)
                } else {
                    FilterNode::Or(children)
                });
            }
            "not" => {
                let child = match value {
                    Json::Array(items) if items.len() == 1 => &items[0],
                    Json::Array(_) => {
                        errors.push(MutationError::field(here, "`not` takes exactly one filter"));
                        continue;
                    }
                    other => other,
                };
                nodes.push(parse_object(filter, child, &here, errors).negate());
            }
            name => match filter.field(name).map(|f| &f.kind) {
                None => errors.push(MutationError::field(
                    here,
                    format!("unknown filter field on {}", filter.name),
                )),
                Some(FilterFieldKind::Relation { target, filter: inner, .. }) => {
                    nodes.push(FilterNode::Related {
                        relation: name.to_string(),
                        target: target.clone(),
                        filter: Box::new(parse_object(inner, value, &here, errors)),
                    });
                }
                Some(FilterFieldKind::Scalar {
                    kind,
                    list,
                    operators,
                    ..
                }) => parse_predicates(name, *kind, *list, operators, value, &here, &mut nodes, errors),
            },
        }
    }

    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        FilterNode::And(nodes)
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_predicates(
    field: &str,
    kind: ScalarKind,
    list: bool,
    operators: &[FilterOp],
    json: &Json,
    path: &str,
    nodes: &mut Vec<FilterNode>,
    errors: &mut Vec<MutationError>,
) {
    let Json::Object(ops) = json else {
        errors.push(MutationError::field(path, "expected an operator object"));
        return;
    };
    for (name, raw) in ops {
        let here = format!("{}.{}", path, name);
        let Some(op) = FilterOp::from_name(name).filter(|op| operators.contains(op)) else {
            errors.push(MutationError::field(
                here,
                format!("operator `{}` is not available for this field", name),
            ));
            continue;
        };
        match parse_operand(op, kind, list, raw) {
            Ok(operand) => nodes.push(FilterNode::leaf(field, op, operand)),
            Err(message) => errors.push(MutationError::field(here, message)),
        }
    }
}

fn parse_operand(op: FilterOp, kind: ScalarKind, list: bool, raw: &Json) -> Result<Operand, String> {
    let single = |json: &Json| -> Result<Value, String> {
        if json.is_null() {
            return Err("null is not a comparison value; use is_null".to_string());
        }
        Value::from_json(kind, list, json)
    };
    match op {
        FilterOp::IsNull => raw
            .as_bool()
            .map(Operand::Flag)
            .ok_or_else(|| "expected a boolean".to_string()),
        FilterOp::In | FilterOp::NotIn => {
            let Json::Array(items) = raw else {
                return Err("expected a list of values".to_string());
            };
            items
                .iter()
                .map(single)
                .collect::<Result<Vec<_>, _>>()
                .map(Operand::Values)
        }
        FilterOp::Range => match raw {
            Json::Array(bounds) if bounds.len() == 2 => {
                Ok(Operand::Range(single(&bounds[0])?, single(&bounds[1])?))
            }
            _ => Err("expected a [low, high] pair".to_string()),
        },
        _ => single(raw).map(Operand::Value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::introspect;
    use crate::registry::{FieldDefinition, ModelDefinition, RelationDefinition, RelationKind, Registry};
    use indexmap::IndexMap;
    use proptest::prelude::*;
    use serde_json::json;

    fn models(depth_target: bool) -> IndexMap<String, ModelDescriptor> {
        let mut registry = Registry::default();
        registry.register(
            ModelDefinition::new("Author")
                .field(FieldDefinition::new("name", ScalarKind::String))
                .field(FieldDefinition::new("age", ScalarKind::Integer).nullable()),
        );
        let mut post = ModelDefinition::new("Post")
            .field(FieldDefinition::new("title", ScalarKind::String))
            .field(FieldDefinition::new("tags", ScalarKind::String).list());
        if depth_target {
            post = post.relation(RelationDefinition::new("author", RelationKind::ForeignKey, "Author"));
        }
        registry.register(post);
        introspect(&registry).unwrap().models
    }

    fn post_filter(depth: usize) -> FilterType {
        let models = models(true);
        generate_filter_type(&models["Post"], &|name: &str| models.get(name), depth)
    }

    fn author(name: &str, age: Option<i64>) -> Record {
        [
            ("id", Value::Int(1)),
            ("name", Value::String(name.to_string())),
            ("age", age.map(Value::Int).unwrap_or(Value::Null)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_operator_sets() {
        let text = operators_for(ScalarKind::String, false, false);
        assert!(text.contains(&FilterOp::IContains));
        assert!(text.contains(&FilterOp::Range));
        assert!(!text.contains(&FilterOp::IsNull));

        let flag = operators_for(ScalarKind::Boolean, false, true);
        assert_eq!(
            flag,
            vec![FilterOp::Eq, FilterOp::Ne, FilterOp::In, FilterOp::NotIn, FilterOp::IsNull]
        );

        let tags = operators_for(ScalarKind::String, true, false);
        assert_eq!(tags, vec![FilterOp::Eq, FilterOp::Ne, FilterOp::In, FilterOp::NotIn]);

        assert_eq!(operator_type_name(ScalarKind::Integer, false, true), "NullableIntFilter");
        assert_eq!(operator_type_name(ScalarKind::String, true, false), "StringListFilter");
    }

    #[test]
    fn test_relation_filters_respect_depth() {
        let filter = post_filter(1);
        assert_eq!(filter.name, "PostFilter");
        let Some(FilterFieldKind::Relation { filter: inner, .. }) = filter.field("author").map(|f| &f.kind) else {
            panic!("author filter missing");
        };
        assert_eq!(inner.name, "AuthorScalarFilter");
        assert!(inner.field("posts").is_none());

        let flat = post_filter(0);
        assert!(flat.field("author").is_none());
        assert_eq!(flat.walk().len(), 1);

        let deep = post_filter(2);
        let names: Vec<_> = deep.walk().iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, vec!["PostFilter", "AuthorFilterDepth1", "PostScalarFilter"]);
    }

    #[test]
    fn test_parse_implicit_and_and_round_trip() {
        let filter = post_filter(1);
        let node = FilterNode::parse(
            &filter,
            &json!({ "title": { "icontains": "rust" }, "not": { "tags": { "eq": ["draft"] } } }),
        )
        .unwrap();
        let FilterNode::And(children) = &node else {
            panic!("expected implicit and, got {:?}", node);
        };
        assert_eq!(children.len(), 2);

        let reparsed = FilterNode::parse(&filter, &node.to_json()).unwrap();
        assert_eq!(reparsed, node);
    }

    #[test]
    fn test_parse_collects_every_violation() {
        let filter = post_filter(1);
        let err = FilterNode::parse(
            &filter,
            &json!({
                "title": { "eq": 3, "gt": "a" },
                "nope": { "eq": 1 },
                "tags": { "contains": "x" },
                "or": [ { "title": { "eq": null } } ]
            }),
        )
        .unwrap_err();
        let mut paths: Vec<_> = err
            .violations
            .iter()
            .filter_map(|v| v.field.as_deref())
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "filter.nope",
                "filter.or[0].title.eq",
                "filter.tags.contains",
                "filter.title.eq"
            ]
        );
    }

    #[test]
    fn test_not_requires_exactly_one_child() {
        let filter = post_filter(0);
        assert!(FilterNode::parse(&filter, &json!({ "not": [] })).is_err());
        assert!(FilterNode::parse(&filter, &json!({ "not": [{ "title": { "eq": "a" } }] })).is_ok());
    }

    #[test]
    fn test_evaluate_predicates() {
        let models = models(false);
        let filter = generate_filter_type(&models["Author"], &|name: &str| models.get(name), 1);
        let parse = |json: Json| FilterNode::parse(&filter, &json).unwrap();
        let ada = author("Ada", Some(36));
        let anon = author("anon", None);

        let older = parse(json!({ "age": { "gte": 30 } }));
        assert!(older.matches("Author", &ada, &NoRelations));
        assert!(!older.matches("Author", &anon, &NoRelations));

        let not_36 = parse(json!({ "age": { "ne": 36 } }));
        assert!(!not_36.matches("Author", &ada, &NoRelations));
        assert!(not_36.matches("Author", &anon, &NoRelations));

        let in_range = parse(json!({ "age": { "range": [36, 40] } }));
        assert!(in_range.matches("Author", &ada, &NoRelations));

        let missing = parse(json!({ "age": { "is_null": true } }));
        assert!(missing.matches("Author", &anon, &NoRelations));

        let prefix = parse(json!({ "name": { "istarts_with": "AD" } }));
        assert!(prefix.matches("Author", &ada, &NoRelations));
        assert!(!prefix.matches("Author", &anon, &NoRelations));

        let any = parse(json!({ "or": [ { "name": { "eq": "anon" } }, { "age": { "in": [1, 36] } } ] }));
        assert!(any.matches("Author", &ada, &NoRelations));
        assert!(any.matches("Author", &anon, &NoRelations));
    }

    #[test]
    fn test_empty_combinators() {
        let record = author("Ada", None);
        assert!(FilterNode::And(vec![]).matches("Author", &record, &NoRelations));
        assert!(!FilterNode::Or(vec![]).matches("Author", &record, &NoRelations));
        assert_eq!(
            FilterNode::parse(&post_filter(0), &json!({})).unwrap(),
            FilterNode::And(vec![])
        );
    }

    fn arb_leaf() -> impl Strategy<Value = FilterNode> {
        prop_oneof![
            any::<i64>().prop_map(|n| FilterNode::eq("age", Value::Int(n))),
            any::<i64>().prop_map(|n| FilterNode::leaf("age", FilterOp::Lt, Operand::Value(Value::Int(n)))),
            any::<bool>().prop_map(|b| FilterNode::leaf("age", FilterOp::IsNull, Operand::Flag(b))),
            "[a-c]{0,2}".prop_map(|s| FilterNode::leaf("name", FilterOp::Contains, Operand::Value(Value::String(s)))),
        ]
    }

    fn arb_filter() -> impl Strategy<Value = FilterNode> {
        arb_leaf().prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(FilterNode::And),
                prop::collection::vec(inner.clone(), 0..4).prop_map(FilterNode::Or),
                inner.prop_map(FilterNode::negate),
            ]
        })
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        (proptest::option::of(-5i64..5), "[a-c]{0,3}").prop_map(|(age, name)| author(&name, age))
    }

    proptest! {
        #[test]
        fn prop_empty_and_matches_every_record(record in arb_record()) {
            prop_assert!(FilterNode::And(vec![]).matches("Author", &record, &NoRelations));
            prop_assert!(!FilterNode::Or(vec![]).matches("Author", &record, &NoRelations));
        }

        #[test]
        fn prop_double_negation_is_identity(filter in arb_filter(), record in arb_record()) {
            let twice = filter.clone().negate().negate();
            prop_assert_eq!(
                twice.matches("Author", &record, &NoRelations),
                filter.matches("Author", &record, &NoRelations)
            );
        }

        #[test]
        fn prop_and_is_associative(a in arb_filter(), b in arb_filter(), c in arb_filter(), record in arb_record()) {
            let left = FilterNode::And(vec![FilterNode::And(vec![a.clone(), b.clone()]), c.clone()]);
            let right = FilterNode::And(vec![a, FilterNode::And(vec![b, c])]);
            prop_assert_eq!(
                left.matches("Author", &record, &NoRelations),
                right.matches("Author", &record, &NoRelations)
            );
        }
    }
}
