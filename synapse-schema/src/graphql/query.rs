//! Query operation generation and read arguments
//!
//! Per model `M` (snake `m`, plural `ms`):
//! - `m(id)`: one object or null
//! - `ms(filter, order_by, limit, offset)`: stable-ordered list
//! - `m_pages(filter, order_by, page_size, after, offset)`: one page plus totals
//!
//! Ordering always ends with the identity ascending, so equal keys never
//! reorder between calls.

use super::connection::decode_cursor;
use super::filter::FilterNode;
use super::naming::{self, OperationNames};
use super::schema::ModelSchema;
use super::{Argument, Operation, OperationKind, TypeRef};
use crate::error::{MutationError, QueryError};
use crate::ir::ModelDescriptor;
use crate::options::SchemaOptions;
use crate::value::{Record, ScalarKind};
use serde_json::Value as Json;
use std::cmp::Ordering;

/// Name of the shared direction enum
pub const ORDER_DIRECTION: &str = "OrderDirection";

/// Sortable fields of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderType {
    /// Field enum name (`MOrderField`)
    pub name: String,
    /// Ordering input name (`MOrderBy`)
    pub input: String,
    pub model: String,
    pub fields: Vec<String>,
}

impl OrderType {
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Collect the sortable fields of a model
pub fn generate_order_type(model: &ModelDescriptor) -> OrderType {
    OrderType {
        name: naming::order_field(&model.name),
        input: naming::order_by(&model.name),
        model: model.name.clone(),
        fields: model
            .fields
            .values()
            .filter(|f| !f.list && f.kind.is_sortable())
            .map(|f| f.name.clone())
            .collect(),
    }
}

/// Generate the read operations of a model
pub fn generate_queries(model: &ModelDescriptor, names: &OperationNames) -> Vec<Operation> {
    let output = naming::output_type(&model.name);
    let identity = model.identity();
    let filter = TypeRef::named(naming::filter_type(&model.name, 1, 1)).nullable();
    let order_by = TypeRef::named(naming::order_by(&model.name)).list_of().nullable();
    let int = || TypeRef::scalar(ScalarKind::Integer).nullable();

    vec![
        Operation {
            name: names.single.clone(),
            kind: OperationKind::Single,
            model: model.name.clone(),
            arguments: vec![Argument::new(&identity.name, TypeRef::scalar(identity.kind))],
            returns: TypeRef::named(&output).nullable(),
            description: Some(format!("Fetch one {} by identity", model.name)),
        },
        Operation {
            name: names.list.clone(),
            kind: OperationKind::List,
            model: model.name.clone(),
            arguments: vec![
                Argument::new("filter", filter.clone()),
                Argument::new("order_by", order_by.clone()),
                Argument::new("limit", int()),
                Argument::new("offset", int()),
            ],
            returns: TypeRef::named(&output).list_of(),
            description: Some(format!("List {} records", model.name)),
        },
        Operation {
            name: names.pages.clone(),
            kind: OperationKind::Pages,
            model: model.name.clone(),
            arguments: vec![
                Argument::new("filter", filter),
                Argument::new("order_by", order_by),
                Argument::new("page_size", int()),
                Argument::new("after", TypeRef::scalar(ScalarKind::String).nullable()),
                Argument::new("offset", int()),
            ],
            returns: TypeRef::named(naming::page_type(&model.name)),
            description: Some(format!("Page through {} records", model.name)),
        },
    ]
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ordering key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub direction: Direction,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Arguments of a list query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListArgs {
    pub filter: Option<FilterNode>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListArgs {
    /// Parse `{filter, order_by, limit, offset}`
    pub fn from_json(model: &ModelSchema, args: &Json) -> Result<Self, QueryError> {
        let mut errors = Vec::new();
        let map = object_args(args, &["filter", "order_by", "limit", "offset"], &mut errors);
        let filter = parse_filter(model, map.and_then(|m| m.get("filter")), &mut errors);
        let order_by = parse_order_by(model, map.and_then(|m| m.get("order_by")), &mut errors);
        let limit = parse_count(map.and_then(|m| m.get("limit")), "limit", &mut errors);
        let offset = parse_count(map.and_then(|m| m.get("offset")), "offset", &mut errors);
        if !errors.is_empty() {
            return Err(errors.into());
        }
        Ok(Self {
            filter,
            order_by,
            limit,
            offset: offset.unwrap_or(0),
        })
    }
}

/// Arguments of a paginated query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageArgs {
    pub filter: Option<FilterNode>,
    pub order_by: Vec<OrderKey>,
    pub page_size: Option<usize>,
    /// Absolute offset of the first item
    pub offset: usize,
}

impl PageArgs {
    /// Parse `{filter, order_by, page_size, after | offset}`
    pub fn from_json(model: &ModelSchema, args: &Json) -> Result<Self, QueryError> {
        let mut errors = Vec::new();
        let map = object_args(
            args,
            &["filter", "order_by", "page_size", "after", "offset"],
            &mut errors,
        );
        let get = |key: &str| map.and_then(|m| m.get(key)).filter(|v| !v.is_null());
        let filter = parse_filter(model, get("filter"), &mut errors);
        let order_by = parse_order_by(model, get("order_by"), &mut errors);
        let page_size = parse_count(get("page_size"), "page_size", &mut errors);
        let offset = parse_count(get("offset"), "offset", &mut errors);

        let after = match get("after") {
            None => None,
            Some(Json::String(cursor)) => {
                let resume = decode_cursor(cursor).and_then(|position| position.checked_add(1));
                if resume.is_none() {
                    errors.push(MutationError::field("after", "invalid cursor"));
                }
                resume
            }
            Some(_) => {
                errors.push(MutationError::field("after", "expected a cursor string"));
                None
            }
        };
        if after.is_some() && offset.is_some() {
            errors.push(MutationError::field("after", "`after` and `offset` are exclusive"));
        }
        if page_size == Some(0) {
            errors.push(MutationError::field("page_size", "must be positive"));
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }
        Ok(Self {
            filter,
            order_by,
            page_size,
            offset: after.or(offset).unwrap_or(0),
        })
    }

    /// Requested page size, defaulted and capped
    pub fn effective_page_size(&self, options: &SchemaOptions) -> usize {
        self.page_size
            .unwrap_or(options.default_page_size)
            .min(options.max_page_size)
            .max(1)
    }
}

fn object_args<'a>(
    args: &'a Json,
    known: &[&str],
    errors: &mut Vec<MutationError>,
) -> Option<&'a serde_json::Map<String, Json>> {
    match args {
        Json::Null => None,
        Json::Object(map) => {
            for key in map.keys() {
                if !known.contains(&key.as_str()) {
                    errors.push(MutationError::field(key.as_str(), "unknown argument"));
                }
            }
            Some(map)
        }
        _ => {
            errors.push(MutationError::new(
                crate::error::ErrorKind::ValidationError,
                "arguments must be an object",
            ));
            None
        }
    }
}

fn parse_filter(model: &ModelSchema, raw: Option<&Json>, errors: &mut Vec<MutationError>) -> Option<FilterNode> {
    let raw = raw.filter(|v| !v.is_null())?;
    match FilterNode::parse(&model.filter, raw) {
        Ok(node) => Some(node),
        Err(err) => {
            errors.extend(err.violations);
            None
        }
    }
}

/// `["title", "-created_at"]` or `[{"field": "title", "direction": "DESC"}]`
fn parse_order_by(model: &ModelSchema, raw: Option<&Json>, errors: &mut Vec<MutationError>) -> Vec<OrderKey> {
    let items = match raw {
        None | Some(Json::Null) => return Vec::new(),
        Some(Json::Array(items)) => items.as_slice(),
        Some(single) => std::slice::from_ref(single),
    };

    let mut keys = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("order_by[{}]", i);
        let key = match item {
            Json::String(spec) => match spec.strip_prefix('-') {
                Some(field) => OrderKey::desc(field),
                None => OrderKey::asc(spec.as_str()),
            },
            Json::Object(map) => {
                let Some(field) = map.get("field").and_then(Json::as_str) else {
                    errors.push(MutationError::field(path, "missing `field`"));
                    continue;
                };
                let direction = match map.get("direction").and_then(Json::as_str) {
                    None | Some("ASC") | Some("asc") => Direction::Asc,
                    Some("DESC") | Some("desc") => Direction::Desc,
                    Some(other) => {
                        errors.push(MutationError::field(path, format!("unknown direction `{}`", other)));
                        continue;
                    }
                };
                OrderKey {
                    field: field.to_string(),
                    direction,
                }
            }
            _ => {
                errors.push(MutationError::field(path, "expected a field name"));
                continue;
            }
        };
        if !model.order.contains(&key.field) {
            errors.push(MutationError::field(path, format!("cannot order by `{}`", key.field)));
            continue;
        }
        keys.push(key);
    }
    keys
}

fn parse_count(raw: Option<&Json>, name: &str, errors: &mut Vec<MutationError>) -> Option<usize> {
    let raw = raw.filter(|v| !v.is_null())?;
    match raw.as_u64().and_then(|n| usize::try_from(n).ok()) {
        Some(n) => Some(n),
        None => {
            errors.push(MutationError::field(name, "expected a non-negative integer"));
            None
        }
    }
}

/// Sort records by `keys`, then by identity ascending
pub fn sort_records(records: &mut [Record], keys: &[OrderKey], identity: &str) {
    records.sort_by(|a, b| {
        for key in keys {
            let left = a.get(&key.field).unwrap_or(&crate::value::Value::Null);
            let right = b.get(&key.field).unwrap_or(&crate::value::Value::Null);
            let ord = match key.direction {
                Direction::Asc => left.sort_cmp(right),
                Direction::Desc => right.sort_cmp(left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.identity(identity).cmp(&b.identity(identity))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn record(id: i64, rank: Option<i64>) -> Record {
        [
            ("id", Value::Int(id)),
            ("rank", rank.map(Value::Int).unwrap_or(Value::Null)),
        ]
        .into_iter()
        .collect()
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .filter_map(|r| match r.get("id") {
                Some(Value::Int(i)) => Some(*i),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_identity_breaks_ties() {
        let mut records = vec![record(3, Some(1)), record(1, Some(2)), record(2, Some(1))];
        sort_records(&mut records, &[], "id");
        assert_eq!(ids(&records), vec![1, 2, 3]);

        sort_records(&mut records, &[OrderKey::asc("rank")], "id");
        assert_eq!(ids(&records), vec![2, 3, 1]);

        sort_records(&mut records, &[OrderKey::desc("rank")], "id");
        assert_eq!(ids(&records), vec![1, 2, 3]);
    }

    #[test]
    fn test_nulls_sort_first_ascending() {
        let mut records = vec![record(1, Some(5)), record(2, None)];
        sort_records(&mut records, &[OrderKey::asc("rank")], "id");
        assert_eq!(ids(&records), vec![2, 1]);
    }

    #[test]
    fn test_page_size_is_defaulted_and_capped() {
        let options = SchemaOptions::default();
        let mut args = PageArgs::default();
        assert_eq!(args.effective_page_size(&options), 20);
        args.page_size = Some(1_000);
        assert_eq!(args.effective_page_size(&options), 100);
    }
}
