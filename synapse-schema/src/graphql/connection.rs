//! Paginated result types
//!
//! Generates:
//! - PageInfo type (shared)
//! - Entity page types (PostPage, AuthorPage, etc.)
//!
//! Cursors are opaque base62 strings encoding the absolute offset of an item
//! within the filtered, ordered result.

use super::naming;
use crate::value::Record;
use serde::Serialize;
use serde_json::{Value as Json, json};

/// Name of the shared page metadata type
pub const PAGE_INFO: &str = "PageInfo";

/// Generated page type of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageType {
    pub name: String,
    pub model: String,
    /// Output type of the items
    pub item: String,
}

/// Generate the page type for a model
pub fn generate_page_type(model: &str) -> PageType {
    PageType {
        name: naming::page_type(model),
        model: model.to_string(),
        item: naming::output_type(model),
    }
}

/// Paging metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// More items follow the last one
    pub has_next_page: bool,
    /// Items precede the first one
    pub has_previous_page: bool,
    /// Cursor of the first item
    pub start_cursor: Option<String>,
    /// Cursor of the last item
    pub end_cursor: Option<String>,
}

/// One page of a filtered, ordered result
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    /// Size of the filtered set, not of the page
    pub total_count: usize,
    pub page_info: PageInfo,
}

impl Page {
    /// Cut a page out of a filtered, ordered result
    pub fn slice(mut records: Vec<Record>, offset: usize, page_size: usize) -> Self {
        let total_count = records.len();
        let start = offset.min(total_count);
        let end = start.saturating_add(page_size).min(total_count);
        let items: Vec<Record> = records.drain(start..end).collect();

        let page_info = PageInfo {
            has_next_page: end < total_count,
            has_previous_page: start > 0,
            start_cursor: (!items.is_empty()).then(|| encode_cursor(start)),
            end_cursor: (!items.is_empty()).then(|| encode_cursor(end - 1)),
        };
        Self {
            items,
            total_count,
            page_info,
        }
    }

    /// Render as JSON
    pub fn to_json(&self) -> Json {
        json!({
            "items": self.items.iter().map(Record::to_json).collect::<Vec<_>>(),
            "total_count": self.total_count,
            "page_info": serde_json::to_value(&self.page_info).unwrap_or(Json::Null),
        })
    }
}

/// Cursor of the item at `offset`
pub fn encode_cursor(offset: usize) -> String {
    base62::encode(offset as u64)
}

/// Offset encoded in a cursor
pub fn decode_cursor(cursor: &str) -> Option<usize> {
    base62::decode(cursor)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
}
